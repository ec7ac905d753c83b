use std::fmt;
use std::rc::Rc;

use super::earley::Chart;
use super::grammar::{Grammar, Rule};
use super::syntree::{Constituent, SynTree, Word};
use crate::utils::combinations;

type RuleTree = SynTree<Rc<Rule>, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct ForestState {
  rule: Rc<Rule>,
  span: (usize, usize),
}

impl ForestState {
  pub fn new(rule: &Rc<Rule>, start: usize, end: usize) -> Self {
    Self {
      rule: rule.clone(),
      span: (start, end),
    }
  }
}

impl fmt::Display for ForestState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {}", self.span.0, self.span.1, self.rule)
  }
}

impl From<&ForestState> for Constituent<Rc<Rule>> {
  fn from(state: &ForestState) -> Self {
    Constituent {
      value: state.rule.clone(),
      span: state.span,
    }
  }
}

/// Completed chart states indexed by the position they start at, plus the
/// words they were completed over
#[derive(Debug, Clone, PartialEq)]
pub struct Forest {
  states: Vec<Vec<ForestState>>,
  input: Vec<String>,
}

impl Forest {
  pub fn new(chart: Chart, input: &[&str]) -> Self {
    // indexed by origin; empty rules can start (and end) at the last position
    let mut states = vec![Vec::new(); chart.len()];

    for (k, column) in chart.into_iter() {
      for state in column {
        // unfinished rules can't contribute to a tree
        if !state.lr0.is_active() {
          if let Some(origin) = states.get_mut(state.origin) {
            origin.push(ForestState::new(&state.lr0.rule, state.origin, k));
          }
        }
      }
    }

    Self {
      states,
      input: input.iter().map(|w| w.to_string()).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.states.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of input words the forest was built over
  fn input_len(&self) -> usize {
    self.len().saturating_sub(1)
  }

  /// Checks if a subtree has already been completed by make_trees(),
  /// or if it is a leaf and doesn't need to be completed
  fn subtree_is_complete(node: &RuleTree) -> bool {
    if let Some((cons, children)) = node.get_branch() {
      cons.value.productions.len() == children.len()
    } else {
      true
    }
  }

  /// Takes a rule and search span, and returns a vec of all possible sequences
  /// of trees that correspond to the rule's productions.
  /// So for the situation:
  /// ```text
  /// g := '''
  ///   S -> "x" ;
  ///   S -> S S ;
  /// '''
  /// chart := parse(g, "x x x")
  /// chart.extend_out(g, S -> S S, start = 0, end = 3)
  /// ```
  /// , which has a forest that looks like:
  ///
  /// ```text
  /// 0..1: S -> "x"
  /// 0..2: S -> S S
  /// 0..3: S -> S S
  /// 1..2: S -> "x"
  /// 1..3: S -> S S
  /// 2..3: S -> "x"
  /// ```
  ///
  /// You'd get
  ///
  /// ```text
  /// [[(S -> "x", 0..1), (S -> S S, (), 1..3)],
  ///  [(S -> S S, (), 0..2), (S -> "x", 2..3)]]
  /// ```
  ///
  /// Nonterminals may match zero words, so an empty span doesn't end the
  /// search; only running out of productions does. A terminal only matches
  /// the input word at its position.
  fn extend_out(&self, rule: &Rule, prod_idx: usize, search_start: usize, search_end: usize) -> Vec<Vec<RuleTree>> {
    if prod_idx == rule.len() {
      return if search_start == search_end {
        vec![Vec::new()]
      } else {
        Vec::new()
      };
    }

    let next_production = &rule.productions[prod_idx];
    if next_production.is_nonterminal() {
      let wanted_symbol = next_production.symbol_str();
      let Some(candidates) = self.states.get(search_start) else {
        return Vec::new();
      };
      candidates
        .iter()
        .filter(|s| s.span.1 <= search_end && s.rule.symbol == wanted_symbol)
        .flat_map(|state| {
          self
            .extend_out(rule, prod_idx + 1, state.span.1, search_end)
            .into_iter()
            .map(move |mut seq| {
              // uncompleted tree headed by this state, filled in by make_trees
              seq.insert(0, SynTree::Branch(state.into(), Vec::new()));
              seq
            })
        })
        .collect()
    } else {
      let word = next_production.symbol_str();
      if search_start >= search_end || self.input.get(search_start).map(String::as_str) != Some(word) {
        return Vec::new();
      }
      let leaf = SynTree::Leaf(Word {
        value: word.to_string(),
        span: (search_start, search_start + 1),
      });

      self
        .extend_out(rule, prod_idx + 1, search_start + 1, search_end)
        .into_iter()
        .map(move |mut seq| {
          seq.insert(0, leaf.clone());
          seq
        })
        .collect()
    }
  }

  /// Takes a possibly-uncompleted tree, and returns all possible trees it describes.
  /// An uncompleted tree is a constituent with fewer children than its rule has
  /// productions.
  fn make_trees(&self, tree: RuleTree) -> Vec<RuleTree> {
    if Self::subtree_is_complete(&tree) {
      return vec![tree];
    }
    let Some((cons, _)) = tree.get_branch() else {
      return vec![tree];
    };
    self
      .extend_out(&cons.value, 0, cons.span.0, cons.span.1)
      .into_iter()
      .flat_map(|children| {
        let child_sets = children
          .into_iter()
          .map(|child| self.make_trees(child))
          .collect::<Vec<_>>();
        combinations(&child_sets)
          .into_iter()
          .map(|set| SynTree::Branch(cons.clone(), set))
      })
      .collect::<Vec<_>>()
  }

  /// Like make_trees, but stops at the first completion of every subtree
  fn make_first(&self, tree: RuleTree) -> Option<RuleTree> {
    if Self::subtree_is_complete(&tree) {
      return Some(tree);
    }
    let (cons, _) = tree.get_branch()?;
    self
      .extend_out(&cons.value, 0, cons.span.0, cons.span.1)
      .into_iter()
      .find_map(|children| {
        let children = children
          .into_iter()
          .map(|child| self.make_first(child))
          .collect::<Option<Vec<_>>>()?;
        Some(SynTree::Branch(cons.clone(), children))
      })
  }

  /// Seed trees: states that start at 0, span the whole input, and are
  /// named by the grammar's start symbol
  fn roots<'a>(&'a self, g: &'a Grammar) -> impl Iterator<Item = RuleTree> + 'a {
    let end = self.input_len();
    self
      .states
      .first()
      .into_iter()
      .flatten()
      .filter(move |state| state.span.1 == end && state.rule.symbol == g.start)
      .map(|state| SynTree::Branch(state.into(), Vec::new()))
  }

  pub fn trees(&self, g: &Grammar) -> Vec<RuleTree> {
    self.roots(g).flat_map(|tree| self.make_trees(tree)).collect()
  }

  pub fn first_tree(&self, g: &Grammar) -> Option<RuleTree> {
    self.roots(g).find_map(|tree| self.make_first(tree))
  }
}

impl fmt::Display for Forest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for k in 0..self.len() {
      writeln!(f, "Origin {}:", k)?;
      for fs in self.states[k].iter() {
        writeln!(f, "  {}", fs)?;
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::earley::parse_chart;

  fn ambiguous() -> Grammar {
    r#"
      S -> "x" ;
      S -> S S ;
    "#
    .parse()
    .unwrap()
  }

  #[test]
  fn test_parse_chart() {
    let g = ambiguous();

    let get_rule_with_len = |len: usize| g.rules.get("S").unwrap().iter().find(|r| r.len() == len).unwrap();

    let rule1 = get_rule_with_len(1);
    let rule2 = get_rule_with_len(2);

    let forest = Forest::new(parse_chart(&g, &["x", "x", "x"]), &["x", "x", "x"]);

    assert_eq!(
      forest.states,
      vec![
        vec![
          ForestState::new(rule1, 0, 1),
          ForestState::new(rule2, 0, 2),
          ForestState::new(rule2, 0, 3),
        ],
        vec![ForestState::new(rule1, 1, 2), ForestState::new(rule2, 1, 3),],
        vec![ForestState::new(rule1, 2, 3)],
        vec![],
      ]
    );
  }

  #[test]
  fn test_tree_generation() {
    // naive forest walking also finds the spurious [x][x] and [xx][xx];
    // only the two real bracketings should come back:
    //  (S (S x) (S (S x) (S x)))
    //  (S (S (S x) (S x)) (S x))
    let g = ambiguous();
    let forest = Forest::new(parse_chart(&g, &["x", "x", "x"]), &["x", "x", "x"]);
    let trees = forest.trees(&g);
    assert_eq!(trees.len(), 2);

    let first = forest.first_tree(&g).unwrap();
    assert!(trees.contains(&first));
    assert_eq!(first.span(), (0, 3));
  }

  #[test]
  fn test_zero_width_children() {
    let g: Grammar = r#"
      S -> A "x" A ;
      A -> ;
    "#
    .parse()
    .unwrap();
    let forest = Forest::new(parse_chart(&g, &["x"]), &["x"]);
    let trees = forest.trees(&g);
    assert_eq!(trees.len(), 1);
    assert_eq!(
      trees[0].map(&|c| c.value.symbol.clone(), &|w| w.value.clone()).to_string(),
      "(S (A) x (A))"
    );
  }

  #[test]
  fn test_no_parse() {
    let g = ambiguous();
    let forest = Forest::new(parse_chart(&g, &["y"]), &["y"]);
    assert!(forest.trees(&g).is_empty());
    assert!(forest.first_tree(&g).is_none());
  }

  #[test]
  fn test_terminals_match_their_input_word() {
    // `a -> "p"` and `b -> "r" "x" "y"` are both completed, but the `x`
    // between them would sit on `q`
    let g: Grammar = r#"
      main -> a "x" b ;
      main -> c ;
      a -> "p" ;
      a -> "p" "q" "r" ;
      b -> "y" ;
      b -> "r" "x" "y" ;
      c -> "p" "q" b ;
    "#
    .parse()
    .unwrap();
    let input = ["p", "q", "r", "x", "y"];
    let forest = Forest::new(parse_chart(&g, &input), &input);
    let trees = forest.trees(&g);
    assert_eq!(trees.len(), 2);
    for tree in trees.iter().chain(forest.first_tree(&g).iter()) {
      assert_eq!(tree.leaves(), input);
    }
  }
}
