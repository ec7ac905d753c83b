use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use super::earley::{Chart, parse_chart};
use super::forest::Forest;
use super::parse_grammar::parse_rules;
use super::syntree::SynTree;
use crate::error::Error;

/// Marks the auxiliary rules a parenthesized group is flattened into
pub const GROUP_SEPARATOR: &str = "--";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Production {
  Terminal(String),
  Nonterminal(String),
}

impl Production {
  pub fn symbol_str(&self) -> &str {
    match self {
      Self::Terminal(s) | Self::Nonterminal(s) => s,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Terminal(_))
  }

  pub fn is_nonterminal(&self) -> bool {
    matches!(self, Self::Nonterminal(_))
  }
}

impl fmt::Display for Production {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Terminal(s) => write!(f, "{:?}", s),
      Self::Nonterminal(s) => write!(f, "{}", s),
    }
  }
}

/// One alternative of a formal grammar rule: `symbol -> productions`
#[derive(Debug, PartialEq)]
pub struct Rule {
  /// unique within its grammar, assigned on construction
  pub id: usize,
  pub symbol: String,
  pub productions: Vec<Production>,
}

impl Rule {
  pub fn new(symbol: impl Into<String>, productions: Vec<Production>) -> Self {
    Self {
      id: 0,
      symbol: symbol.into(),
      productions,
    }
  }

  pub fn len(&self) -> usize {
    self.productions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ->", self.symbol)?;
    for p in self.productions.iter() {
      write!(f, " {}", p)?;
    }
    write!(f, ";")
  }
}

/// A context-free grammar over whitespace-separated words, parsed with an
/// Earley chart.
#[derive(Debug)]
pub struct Grammar {
  pub start: String,
  pub rules: HashMap<String, Vec<Rc<Rule>>>,
  nullables: HashSet<String>,
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "// start: {}", self.start)?;
    let mut nullables = self.nullables.iter().collect::<Vec<_>>();
    nullables.sort();
    write!(f, "// nullables:")?;
    for nt in nullables {
      write!(f, " {}", nt)?;
    }
    writeln!(f)?;

    let mut rules = self.rules.values().flatten().collect::<Vec<_>>();
    rules.sort_by_key(|r| r.id);
    for rule in rules {
      writeln!(f, "{}", rule)?;
    }
    Ok(())
  }
}

impl Grammar {
  /// Builds a grammar whose start symbol is the first rule's. Every
  /// referenced nonterminal must have at least one rule.
  pub fn new(rules: Vec<Rule>) -> Result<Self, Error> {
    let start = rules
      .first()
      .map(|r| r.symbol.clone())
      .ok_or_else(|| Error::Grammar("empty ruleset".into()))?;

    let rules: HashMap<String, Vec<Rc<Rule>>> =
      rules
        .into_iter()
        .enumerate()
        .fold(HashMap::new(), |mut map, (id, rule)| {
          map
            .entry(rule.symbol.clone())
            .or_default()
            .push(Rc::new(Rule { id, ..rule }));
          map
        });

    for rule in rules.values().flatten() {
      for p in rule.productions.iter().filter(|p| p.is_nonterminal()) {
        if !rules.contains_key(p.symbol_str()) {
          return Err(Error::Grammar(format!(
            "{} refers to undefined nonterminal {}",
            rule.symbol,
            p.symbol_str()
          )));
        }
      }
    }

    let nullables = Self::find_nullables(&rules);
    Ok(Self {
      start,
      rules,
      nullables,
    })
  }

  fn rule_is_nullable(nullables: &HashSet<String>, rule: &Rule) -> bool {
    rule.productions.iter().all(|p| match p {
      Production::Nonterminal(s) => nullables.contains(s),
      Production::Terminal(_) => false,
    })
  }

  fn find_nullables(rules: &HashMap<String, Vec<Rc<Rule>>>) -> HashSet<String> {
    let mut nullables: HashSet<String> = HashSet::new();

    let mut last_length = 1;
    while last_length != nullables.len() {
      last_length = nullables.len();
      for r in rules.values().flatten() {
        if !nullables.contains(&r.symbol) && Self::rule_is_nullable(&nullables, r) {
          nullables.insert(r.symbol.clone());
        }
      }
    }

    nullables
  }

  pub fn is_nullable(&self, s: &str) -> bool {
    self.nullables.contains(s)
  }

  pub fn parse_chart(&self, input: &[&str]) -> Chart {
    parse_chart(self, input)
  }

  pub fn parse_forest(&self, input: &[&str]) -> Forest {
    Forest::new(self.parse_chart(input), input)
  }

  /// Recognition only, without building trees
  pub fn accepts(&self, input: &[&str]) -> bool {
    self.parse_chart(input).is_complete(&self.start)
  }

  /// Every parse of `input`, with group rules spliced into their parents
  pub fn parse(&self, input: &[&str]) -> Vec<SynTree<String, String>> {
    let forest = self.parse_forest(input);
    forest
      .trees(self)
      .into_iter()
      .map(|t| inline_groups(bare_tree(&t)))
      .collect()
  }

  /// The first parse of `input`, without enumerating the ambiguous ones
  pub fn first_parse(&self, input: &[&str]) -> Option<SynTree<String, String>> {
    let forest = self.parse_forest(input);
    forest.first_tree(self).map(|t| inline_groups(bare_tree(&t)))
  }
}

impl FromStr for Grammar {
  type Err = Error;

  /// Parses grammar text in the `name -> "word" other ( "a" | b ) | ;`
  /// notation. The first rule's symbol is the start symbol.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (rules, rest) = parse_rules(s).map_err(Error::Grammar)?;
    if !rest.trim().is_empty() {
      return Err(Error::Grammar(format!("trailing input: {}", rest)));
    }
    Self::new(rules)
  }
}

fn bare_tree(tree: &SynTree<Rc<Rule>, String>) -> SynTree<String, String> {
  tree.map(&|c| c.value.symbol.clone(), &|w| w.value.clone())
}

fn inline_groups(tree: SynTree<String, String>) -> SynTree<String, String> {
  fn splice(tree: SynTree<String, String>, out: &mut Vec<SynTree<String, String>>) {
    match tree {
      SynTree::Branch(c, children) if c.value.contains(GROUP_SEPARATOR) => {
        for child in children {
          splice(child, out);
        }
      }
      SynTree::Branch(c, children) => out.push(SynTree::Branch(c, inline_children(children))),
      leaf => out.push(leaf),
    }
  }

  fn inline_children(children: Vec<SynTree<String, String>>) -> Vec<SynTree<String, String>> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
      splice(child, &mut out);
    }
    out
  }

  match tree {
    SynTree::Branch(c, children) => SynTree::Branch(c, inline_children(children)),
    leaf => leaf,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_words() {
    let g: Grammar = r#"
      main -> "go" "to" "the" place | "stop" ;
      place -> "kitchen" | "living" "room" ;
    "#
    .parse()
    .unwrap();

    assert!(g.accepts(&["go", "to", "the", "living", "room"]));
    assert!(g.accepts(&["stop"]));
    assert!(!g.accepts(&["go", "to", "the"]));

    let tree = g.first_parse(&["go", "to", "the", "kitchen"]).unwrap();
    assert_eq!(tree.to_string(), "(main go to the (place kitchen))");
  }

  #[test]
  fn test_groups_are_inlined() {
    let g: Grammar = r#"main -> ( "go" | "walk" ) ( "home" | ) ;"#.parse().unwrap();
    assert_eq!(g.parse(&["walk", "home"]).len(), 1);
    assert_eq!(g.first_parse(&["go"]).unwrap().to_string(), "(main go)");
  }

  #[test]
  fn test_undefined_nonterminal() {
    let err = r#"main -> missing ;"#.parse::<Grammar>().unwrap_err();
    assert!(matches!(err, Error::Grammar(_)));
    assert!("".parse::<Grammar>().is_err());
  }

  #[test]
  fn test_nullable_at_end() {
    let g: Grammar = r#"
      main -> "a" opt ;
      opt -> ;
      opt -> "b" ;
    "#
    .parse()
    .unwrap();
    assert!(g.accepts(&["a"]));
    assert!(g.accepts(&["a", "b"]));
    assert_eq!(g.parse(&["a"]).len(), 1);
    assert_eq!(g.first_parse(&["a"]).unwrap().to_string(), "(main a (opt))");
  }

  #[test]
  fn test_terminal_named_like_rule() {
    let g: Grammar = r#"
      main -> go "go" ;
      go -> "go" ;
    "#
    .parse()
    .unwrap();
    assert!(g.accepts(&["go", "go"]));
    assert!(!g.accepts(&["go"]));
  }
}
