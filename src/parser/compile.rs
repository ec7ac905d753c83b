//! Turns a rule table into formal grammar text and an Earley parser over it.
//!
//! Every head becomes one rule, `name -> alternative | alternative ;`. Text is
//! split into quoted words, `$NonTerminal` references become lower-cased rule
//! names, and wildcards with their own productions become `wild_<snake>`
//! rules. Any other wildcard is accepted either in its bracket form or as its
//! anonymized marker; wildcards that anonymize to the same marker (a beacon
//! and a placement are both `<location>`) therefore overlap, and that is
//! accepted rather than disambiguated. Void wildcards are left out.
use std::collections::HashMap;
use std::fmt::Write;

use super::UtteranceParser;
use super::grammar::Grammar;
use super::parse_grammar::quote_terminal;
use super::syntree::SynTree;
use crate::error::{Error, Result};
use crate::rules::RuleTable;
use crate::symbol::{Symbol, Wildcard};
use crate::tree::Tree;

fn rule_name(rules: &RuleTable, symbol: &Symbol) -> Option<String> {
  match symbol {
    Symbol::NonTerminal(name) => Some(name.to_lowercase()),
    Symbol::Wildcard(w) if rules.contains(symbol) => Some(format!("wild_{}", w.to_snake_case())),
    _ => None,
  }
}

fn push_words(out: &mut String, text: &str) {
  for word in text.split_whitespace() {
    out.push(' ');
    out.push_str(&quote_terminal(word));
  }
}

fn push_literal_wildcard(out: &mut String, wildcard: &Wildcard) {
  out.push_str(" (");
  push_words(out, &wildcard.to_string());
  out.push_str(" |");
  push_words(out, &wildcard.anonymized_marker());
  out.push_str(" )");
}

fn push_alternatives(out: &mut String, rules: &RuleTable, options: &[Tree]) {
  for (idx, option) in options.iter().enumerate() {
    if idx > 0 {
      out.push_str(" |");
    }
    push_tree(out, rules, option);
  }
}

fn push_tree(out: &mut String, rules: &RuleTable, tree: &Tree) {
  match tree {
    Tree::Leaf(symbol) if symbol.is_void() => {}
    Tree::Leaf(Symbol::Text(text)) => push_words(out, text),
    Tree::Leaf(Symbol::Wildcard(w)) if !rules.contains(&Symbol::Wildcard(w.clone())) => {
      push_literal_wildcard(out, w)
    }
    Tree::Leaf(symbol) => {
      if let Some(name) = rule_name(rules, symbol) {
        out.push(' ');
        out.push_str(&name);
      }
    }
    Tree::Expression(children) => {
      for child in children {
        push_tree(out, rules, child);
      }
    }
    Tree::Choice(options) => {
      out.push_str(" (");
      push_alternatives(out, rules, options);
      out.push_str(" )");
    }
    // logical-form nodes never occur in utterance rules
    other => push_words(out, &other.to_string()),
  }
}

/// A bare top-level `a | b` production is a rule's alternatives, not a group
fn top_level_alternatives(production: &Tree) -> &[Tree] {
  match production {
    Tree::Choice(options) => options,
    Tree::Expression(children) => match children.as_slice() {
      [Tree::Choice(options)] => options,
      _ => std::slice::from_ref(production),
    },
    _ => std::slice::from_ref(production),
  }
}

/// Two heads whose compiled names coincide (`$Go` and `$go`, or
/// `$wild_object` and `{object}`) would silently merge into one rule
fn check_name_collisions(rules: &RuleTable) -> Result<()> {
  let mut seen: HashMap<String, &Symbol> = HashMap::new();
  for head in rules.heads() {
    let Some(name) = rule_name(rules, head) else {
      continue;
    };
    if let Some(other) = seen.insert(name.clone(), head) {
      return Err(Error::Grammar(format!("{} and {} both compile to rule {}", other, head, name)));
    }
  }
  Ok(())
}

/// The formal grammar text for `rules`, with `start`'s rule first
pub fn grammar_text(rules: &RuleTable, start: &Symbol) -> Result<String> {
  let undefined = rules.undefined_nonterminals();
  if !undefined.is_empty() {
    let names = undefined.into_iter().collect::<Vec<_>>().join(", ");
    return Err(Error::UndefinedRule(names));
  }
  if !rules.contains(start) {
    return Err(Error::UndefinedRule(start.to_string()));
  }
  check_name_collisions(rules)?;

  let heads = std::iter::once(start).chain(rules.heads().filter(|h| *h != start));
  let mut out = String::new();
  for head in heads {
    let (Some(name), Some(productions)) = (rule_name(rules, head), rules.productions(head)) else {
      continue;
    };
    let alternatives = productions
      .iter()
      .flat_map(|p| top_level_alternatives(p).iter().cloned())
      .collect::<Vec<_>>();
    let mut line = String::new();
    push_alternatives(&mut line, rules, &alternatives);
    // writing to a String can't fail
    let _ = writeln!(out, "{} ->{} ;", name, line);
  }
  Ok(out)
}

/// Compiles from the `$Main` root
pub fn compile(rules: &RuleTable) -> Result<GrammarParser> {
  compile_with_start(rules, &Symbol::root())
}

pub fn compile_with_start(rules: &RuleTable, start: &Symbol) -> Result<GrammarParser> {
  let text = grammar_text(rules, start)?;
  let grammar: Grammar = text.parse()?;
  tracing::debug!(rules = rules.len(), start = %start, "compiled grammar");
  Ok(GrammarParser { grammar })
}

/// Parses whitespace-separated text against a compiled grammar. Text outside
/// the grammar is `None`, never an error.
#[derive(Debug)]
pub struct GrammarParser {
  grammar: Grammar,
}

impl GrammarParser {
  pub fn new(grammar: Grammar) -> Self {
    Self { grammar }
  }

  pub fn grammar(&self) -> &Grammar {
    &self.grammar
  }

  pub fn parse(&self, text: &str) -> Option<SynTree<String, String>> {
    let words = text.split_whitespace().collect::<Vec<_>>();
    let tree = self.grammar.first_parse(&words);
    if tree.is_none() {
      tracing::trace!(text, "no parse");
    }
    tree
  }

  pub fn accepts(&self, text: &str) -> bool {
    let words = text.split_whitespace().collect::<Vec<_>>();
    self.grammar.accepts(&words)
  }
}

impl UtteranceParser for GrammarParser {
  type Output = SynTree<String, String>;

  fn parse(&self, utterance: &str) -> Option<Self::Output> {
    GrammarParser::parse(self, utterance)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::knowledge::KnowledgeBase;

  fn table(text: &str, expand: bool) -> RuleTable {
    let mut rules = RuleTable::new();
    rules.load_rules(text, expand).unwrap();
    rules
  }

  #[test]
  fn test_grammar_text() {
    let rules = table(
      "$place = kitchen | \"big\" room\n$Main = go to the $place {void meta: note} | (stop | halt) {object}",
      false,
    );
    assert_eq!(
      grammar_text(&rules, &Symbol::root()).unwrap(),
      concat!(
        r#"main -> "go" "to" "the" place | ( "stop" | "halt" ) ( "{object}" | "<object>" ) ;"#,
        "\n",
        r#"place -> "kitchen" | "\"big\"" "room" ;"#,
        "\n",
      )
    );
  }

  #[test]
  fn test_kitchen_table() {
    let rules = table("$Main = go to the {location placement 1} and get the {object}", true);
    let kb = KnowledgeBase::new()
      .with_values("location", ["kitchen table"])
      .with_values("object", ["apple"]);
    let parser = compile(&rules.with_grounding_rules(&kb).unwrap()).unwrap();

    let tree = parser.parse("go to the kitchen table and get the apple").unwrap();
    assert_eq!(
      tree.to_string(),
      "(main go to the (wild_location_placement_1 kitchen table) and get the (wild_object apple))"
    );
    assert!(parser.parse("go get the apple").is_none());
    assert!(!parser.accepts("go to the kitchen table and get the"));
  }

  #[test]
  fn test_literal_wildcards() {
    let parser = compile(&table("$Main = bring the {object 1} to the {beacon}", true)).unwrap();
    assert!(parser.accepts("bring the {object 1} to the {location beacon}"));
    assert!(parser.accepts("bring the <object> to the <location>"));
    assert!(!parser.accepts("bring the apple to the <location>"));
  }

  #[test]
  fn test_undefined_rules() {
    let err = compile(&table("$Main = go $nowhere", true)).unwrap_err();
    assert!(matches!(err, Error::UndefinedRule(names) if names == "nowhere"));

    let err = compile(&table("$Other = go", true)).unwrap_err();
    assert!(matches!(err, Error::UndefinedRule(name) if name == "$Main"));

    let parser = compile_with_start(&table("$Other = go", true), &Symbol::nonterminal("Other")).unwrap();
    assert!(parser.accepts("go"));
  }

  #[test]
  fn test_rule_name_collisions() {
    let err = compile(&table("$Main = $Go\n$Go = walk\n$go = fly", true)).unwrap_err();
    assert!(matches!(err, Error::Grammar(msg) if msg.contains("$Go") && msg.contains("$go")));

    let kb = KnowledgeBase::new().with_values("object", ["apple"]);
    let rules = table("$Main = get the {object} | $wild_object\n$wild_object = nothing", true);
    let err = compile(&rules.with_grounding_rules(&kb).unwrap()).unwrap_err();
    assert!(matches!(err, Error::Grammar(msg) if msg.contains("wild_object")));
  }

  #[test]
  fn test_parse_words_are_the_input() {
    let rules = table("$Main = $a x $b | $c\n$a = p | p q r\n$b = y | r x y\n$c = p q $b", true);
    let parser = compile(&rules).unwrap();
    let tree = parser.parse("p q r x y").unwrap();
    assert_eq!(tree.leaves(), ["p", "q", "r", "x", "y"]);
    assert_eq!(parser.grammar().parse(&["p", "q", "r", "x", "y"]).len(), 2);
    assert!(parser.parse("p x r x y").is_some());
  }

  #[test]
  fn test_utterance_parser() {
    fn through_trait<P: UtteranceParser>(p: &P, s: &str) -> Option<P::Output> {
      p.parse(s)
    }
    let parser = compile(&table("$Main = hello", true)).unwrap();
    assert!(through_trait(&parser, "  hello ").is_some());
    assert!(through_trait(&parser, "").is_none());
  }
}
