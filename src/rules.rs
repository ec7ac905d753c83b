use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::grounding::candidate_values;
use crate::knowledge::KnowledgeBase;
use crate::parse_rules::{parse_rule_line, scrub};
use crate::symbol::{Symbol, Wildcard};
use crate::tree::Tree;

/// Productions for every nonterminal (and, in the grounded and anonymized
/// variants, every wildcard), in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
  rules: IndexMap<Symbol, Vec<Tree>>,
}

impl RuleTable {
  pub fn new() -> Self {
    Default::default()
  }

  /// Parses and adds every rule line in `text`, returning how many productions
  /// were added. With `expand`, `(a | b)` choices are expanded into separate
  /// productions.
  pub fn load_rules(&mut self, text: &str, expand: bool) -> Result<usize> {
    let mut count = 0;
    for (idx, line) in text.lines().enumerate() {
      let cleaned = scrub(line);
      let Some((head, production)) = parse_rule_line(&cleaned).map_err(|e| Error::syntax(idx + 1, line, e))? else {
        continue;
      };

      let productions = if expand {
        expand_shorthand(&production)
      } else {
        vec![production]
      };
      for mut production in productions {
        production.normalize();
        self.add_rule(head.clone(), production);
        count += 1;
      }
    }
    tracing::debug!(count, heads = self.rules.len(), "loaded rules");
    Ok(count)
  }

  pub fn load_rule_file(&mut self, path: impl AsRef<Path>, expand: bool) -> Result<usize> {
    let text = std::fs::read_to_string(path.as_ref())?;
    self.load_rules(&text, expand)
  }

  /// Loads several files into one table. Later files extend earlier heads.
  pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
    let mut table = Self::new();
    for path in paths {
      table.load_rule_file(path, true)?;
    }
    Ok(table)
  }

  pub fn add_rule(&mut self, head: Symbol, production: Tree) {
    self.rules.entry(head).or_default().push(production);
  }

  /// Merges `other` in, appending to heads that exist already
  pub fn extend(&mut self, other: RuleTable) {
    for (head, productions) in other.rules {
      self.rules.entry(head).or_default().extend(productions);
    }
  }

  pub fn productions(&self, symbol: &Symbol) -> Option<&[Tree]> {
    self.rules.get(symbol).map(|p| p.as_slice())
  }

  /// Whether generation can rewrite `symbol`
  pub fn contains(&self, symbol: &Symbol) -> bool {
    self.rules.contains_key(symbol)
  }

  pub fn heads(&self) -> impl Iterator<Item = &Symbol> {
    self.rules.keys()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &[Tree])> {
    self.rules.iter().map(|(k, v)| (k, v.as_slice()))
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// Every distinct wildcard used in a production, void included
  pub fn wildcards(&self) -> IndexSet<Wildcard> {
    self
      .rules
      .values()
      .flatten()
      .flat_map(|production| production.wildcards())
      .cloned()
      .collect()
  }

  /// Nonterminals referenced somewhere but never defined. Generation drops
  /// any sentence that reaches one of these.
  pub fn undefined_nonterminals(&self) -> IndexSet<String> {
    self
      .rules
      .values()
      .flatten()
      .flat_map(|production| production.leaves())
      .filter(|s| s.is_nonterminal() && !self.contains(s))
      .map(|s| match s {
        Symbol::NonTerminal(name) => name.clone(),
        other => other.to_string(),
      })
      .collect()
  }

  /// A copy of this table where every wildcard also expands into each
  /// vocabulary value it may take.
  ///
  /// Occurrences of one wildcard with different `where` conditions share a
  /// single head, so that head gets the union of their candidates.
  pub fn with_grounding_rules(&self, kb: &KnowledgeBase) -> Result<Self> {
    let mut grounding: IndexMap<Symbol, IndexSet<String>> = IndexMap::new();
    for production in self.rules.values().flatten() {
      for wildcard in production.wildcards().filter(|w| !w.is_void()) {
        let head = Symbol::Wildcard(wildcard.clone());
        if self.contains(&head) {
          continue;
        }
        grounding.entry(head).or_default().extend(candidate_values(kb, wildcard)?);
      }
    }

    let mut table = self.clone();
    for (head, values) in grounding {
      if values.is_empty() {
        tracing::warn!(wildcard = %head, "no vocabulary satisfies wildcard");
      }
      for value in values {
        table.add_rule(head.clone(), Tree::text(&value));
      }
    }
    Ok(table)
  }

  /// A copy of this table where every wildcard expands to a single marker
  /// such as `<object>` (or `<location placement 1>` with `show_details`).
  pub fn with_anonymized_rules(&self, show_details: bool) -> Self {
    let mut table = self.clone();
    for wildcard in self.wildcards() {
      if wildcard.is_void() {
        continue;
      }
      let head = Symbol::Wildcard(wildcard.clone());
      if self.contains(&head) {
        continue;
      }
      let marker = if wildcard.is_pronoun() {
        "them".to_string()
      } else if show_details {
        let bracketed = wildcard.to_string();
        format!("<{}>", &bracketed[1..bracketed.len() - 1])
      } else {
        wildcard.anonymized_marker()
      };
      table.add_rule(head, Tree::text(&marker));
    }
    table
  }
}

impl fmt::Display for RuleTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (head, productions) in self.rules.iter() {
      writeln!(f, "{}", head)?;
      for production in productions {
        writeln!(f, "\t{}", production)?;
      }
    }
    Ok(())
  }
}

/// Path of child indices from the root to the shallowest choice node
fn shallowest_choice(tree: &Tree) -> Option<Vec<usize>> {
  let mut queue = VecDeque::from([(tree, Vec::new())]);
  while let Some((node, path)) = queue.pop_front() {
    if matches!(node, Tree::Choice(_)) {
      return Some(path);
    }
    for (idx, child) in node.children().iter().enumerate() {
      let mut child_path = path.clone();
      child_path.push(idx);
      queue.push_back((child, child_path));
    }
  }
  None
}

fn node_at<'a>(tree: &'a Tree, path: &[usize]) -> &'a Tree {
  path.iter().fold(tree, |node, idx| &node.children()[*idx])
}

fn node_at_mut<'a>(tree: &'a mut Tree, path: &[usize]) -> &'a mut Tree {
  path.iter().fold(tree, |node, idx| &mut node.children_mut()[*idx])
}

/// Rewrites `(a | b | c)` shorthand into one tree per combination of
/// choices, in branch order. A tree without choices comes back alone.
pub fn expand_shorthand(tree: &Tree) -> Vec<Tree> {
  let mut done = Vec::new();
  let mut stack = vec![tree.clone()];

  while let Some(current) = stack.pop() {
    let Some(path) = shallowest_choice(&current) else {
      done.push(current);
      continue;
    };

    let Tree::Choice(options) = node_at(&current, &path) else {
      unreachable!("path leads to a choice");
    };
    for option in options.iter().rev() {
      let mut expanded = current.clone();
      // a choice at the root replaces the whole tree
      *node_at_mut(&mut expanded, &path) = option.clone();
      stack.push(expanded);
    }
  }

  done
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parse_rules::parse_expansion;

  fn expand(s: &str) -> Vec<String> {
    expand_shorthand(&parse_expansion(s).unwrap())
      .into_iter()
      .map(|mut t| {
        t.normalize();
        t.to_string()
      })
      .collect()
  }

  #[test]
  fn test_expand_shorthand() {
    assert_eq!(expand("a b c"), vec!["a b c"]);
    assert_eq!(expand("(a | b) x"), vec!["a x", "b x"]);
    assert_eq!(
      expand("(a | b) and (c | d | e)"),
      vec!["a and c", "a and d", "a and e", "b and c", "b and d", "b and e"]
    );
  }

  #[test]
  fn test_expand_root_choice() {
    assert_eq!(expand("front | back"), vec!["front", "back"]);
    assert_eq!(expand("(front | back)"), vec!["front", "back"]);
  }

  #[test]
  fn test_expand_without_choices_is_identity() {
    for text in ["a b c", "bring the {object 1} to $place", "{void meta: (x | y)} go"] {
      let tree = parse_expansion(text).unwrap();
      assert_eq!(expand_shorthand(&tree), vec![tree.clone()]);
    }
  }

  #[test]
  fn test_expansions_are_distinct() {
    for text in ["(a | b) and (c | d | e)", "everyone | all the (people | guests)", "(x | (y | z) w) (p | q)"] {
      let expanded = expand(text);
      let mut distinct = expanded.clone();
      distinct.sort();
      distinct.dedup();
      assert_eq!(distinct.len(), expanded.len(), "{:?}", expanded);
    }
  }

  #[test]
  fn test_expand_nested() {
    assert_eq!(
      expand("everyone | all the (people | guests)"),
      vec!["everyone", "all the people", "all the guests"]
    );
    assert_eq!(expand("((a | b) | c) d"), vec!["a d", "b d", "c d"]);
  }

  #[test]
  fn test_load_rules() {
    let mut rules = RuleTable::new();
    let count = rules
      .load_rules(
        "# comment\n$Main = $vbgo to the {room}\n$vbgo = go | navigate\n\n$vbgo = walk",
        true,
      )
      .unwrap();
    assert_eq!(count, 4);
    assert_eq!(rules.len(), 2);
    assert_eq!(rules.productions(&Symbol::nonterminal("vbgo")).unwrap().len(), 3);
    assert!(rules.undefined_nonterminals().is_empty());
    assert_eq!(rules.wildcards().len(), 1);
    assert_eq!(rules.to_string(), "$Main\n\t$vbgo to the {location room}\n$vbgo\n\tgo\n\tnavigate\n\twalk\n");
  }

  #[test]
  fn test_load_rules_bad_line() {
    let err = RuleTable::new()
      .load_rules("$Main = fine\n$Broken = (unclosed", true)
      .unwrap_err();
    assert!(matches!(err, Error::Syntax { line: 2, .. }));
  }

  #[test]
  fn test_undefined_nonterminals() {
    let mut rules = RuleTable::new();
    rules.load_rules("$Main = $missing thing", true).unwrap();
    assert_eq!(
      rules.undefined_nonterminals().into_iter().collect::<Vec<_>>(),
      vec!["missing".to_string()]
    );
  }

  #[test]
  fn test_grounding_and_anonymized_rules() {
    let mut rules = RuleTable::new();
    rules.load_rules("$Main = take the {object} to the {room} {void meta: x}", true).unwrap();
    let kb = KnowledgeBase::new()
      .with_values("object", ["ball", "cube"])
      .with_values("room", ["kitchen"]);

    let grounded = rules.with_grounding_rules(&kb).unwrap();
    let object = Symbol::Wildcard(Wildcard::new("object"));
    assert_eq!(grounded.productions(&object).unwrap().len(), 2);
    assert_eq!(grounded.len(), 3);

    let anonymized = rules.with_anonymized_rules(false);
    assert_eq!(anonymized.productions(&object).unwrap()[0].to_string(), "<object>");
    let room = Symbol::Wildcard(Wildcard::new("location").with_subtype("room"));
    assert_eq!(anonymized.productions(&room).unwrap()[0].to_string(), "<room>");
    let detailed = rules.with_anonymized_rules(true);
    assert_eq!(detailed.productions(&room).unwrap()[0].to_string(), "<location room>");
  }
}
