use rand::RngCore;
use rand::seq::SliceRandom;
use std::collections::VecDeque;

use crate::rules::{RuleTable, expand_shorthand};
use crate::symbol::Symbol;
use crate::tree::Tree;

/// Order in which partially expanded trees are pulled off the worklist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Traversal {
  #[default]
  DepthFirst,
  BreadthFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationConfig {
  /// At most this many productions are explored per rewritten symbol
  pub branch_cap: Option<usize>,
  pub traversal: Traversal,
}

impl GenerationConfig {
  pub fn with_branch_cap(mut self, cap: usize) -> Self {
    self.branch_cap = Some(cap);
    self
  }

  pub fn with_traversal(mut self, traversal: Traversal) -> Self {
    self.traversal = traversal;
    self
  }
}

/// One rewriting step: which symbol occurrence to replace and with what
pub(crate) struct Expansion<'r> {
  pub target: Symbol,
  pub productions: Vec<&'r Tree>,
}

/// Picks the symbol to rewrite next in `tree` and the productions to try for
/// it. Without an rng this is the first rewritable symbol and the first
/// `branch_cap` productions; with one, a random symbol and a random sample.
pub(crate) fn next_expansion<'r, R>(
  rules: &'r RuleTable,
  tree: &Tree,
  branch_cap: Option<usize>,
  rng: Option<&mut R>,
) -> Option<Expansion<'r>>
where
  R: RngCore + ?Sized,
{
  let candidates = tree.leaves().filter(|s| rules.contains(s)).collect::<Vec<_>>();

  let (target, productions) = match rng {
    Some(rng) => {
      let target = *candidates.choose(&mut *rng)?;
      let all = rules.productions(target)?;
      let productions = match branch_cap {
        Some(cap) => all.choose_multiple(&mut *rng, cap.min(all.len())).collect(),
        None => {
          let mut productions = all.iter().collect::<Vec<_>>();
          productions.shuffle(rng);
          productions
        }
      };
      (target, productions)
    }
    None => {
      let target = *candidates.first()?;
      let all = rules.productions(target)?;
      let cap = branch_cap.unwrap_or(all.len()).min(all.len());
      (target, all[..cap].iter().collect())
    }
  };

  Some(Expansion {
    target: target.clone(),
    productions,
  })
}

/// Expands trees by rewriting nonterminals (and any wildcards the rule table
/// has productions for) until nothing rewritable is left.
///
/// ```
/// use gpsr_grammar::{Generator, RuleTable, Symbol};
///
/// let mut rules = RuleTable::new();
/// rules.load_rules("$Main = (go | walk) to the $place\n$place = kitchen", true).unwrap();
/// let sentences = Generator::new(&rules)
///   .generate_from(Symbol::root())
///   .map(|t| t.to_string())
///   .collect::<Vec<_>>();
/// assert_eq!(sentences, vec!["go to the kitchen", "walk to the kitchen"]);
/// ```
pub struct Generator<'a> {
  rules: &'a RuleTable,
  config: GenerationConfig,
  rng: Option<&'a mut dyn RngCore>,
}

impl<'a> Generator<'a> {
  pub fn new(rules: &'a RuleTable) -> Self {
    Self {
      rules,
      config: GenerationConfig::default(),
      rng: None,
    }
  }

  pub fn with_config(mut self, config: GenerationConfig) -> Self {
    self.config = config;
    self
  }

  /// Makes `rng` the only source of non-determinism. Without one, generation
  /// is a deterministic exhaustive enumeration.
  pub fn with_rng(mut self, rng: &'a mut dyn RngCore) -> Self {
    self.rng = Some(rng);
    self
  }

  pub fn generate(self, start: Tree) -> Sentences<'a> {
    Sentences {
      rules: self.rules,
      config: self.config,
      rng: self.rng,
      worklist: VecDeque::from([start]),
    }
  }

  pub fn generate_from(self, symbol: Symbol) -> Sentences<'a> {
    self.generate(Tree::start(symbol))
  }
}

/// Lazily yields fully expanded, normalized trees
pub struct Sentences<'a> {
  rules: &'a RuleTable,
  config: GenerationConfig,
  rng: Option<&'a mut dyn RngCore>,
  worklist: VecDeque<Tree>,
}

impl Sentences<'_> {
  fn pop(&mut self) -> Option<Tree> {
    match self.config.traversal {
      Traversal::DepthFirst => self.worklist.pop_back(),
      Traversal::BreadthFirst => self.worklist.pop_front(),
    }
  }

  /// Queues trees so that, depth-first, the first one is popped first
  fn push_all(&mut self, trees: Vec<Tree>) {
    match self.config.traversal {
      Traversal::DepthFirst => self.worklist.extend(trees.into_iter().rev()),
      Traversal::BreadthFirst => self.worklist.extend(trees),
    }
  }
}

impl Iterator for Sentences<'_> {
  type Item = Tree;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(mut tree) = self.pop() {
      // productions loaded without shorthand expansion still carry `(a | b)`
      if tree.has_choice() {
        let mut alternatives = expand_shorthand(&tree);
        if let Some(rng) = self.rng.as_deref_mut() {
          alternatives.shuffle(rng);
        }
        self.push_all(alternatives);
        continue;
      }

      let step = next_expansion(self.rules, &tree, self.config.branch_cap, self.rng.as_deref_mut());
      let Some(Expansion { target, productions }) = step else {
        tree.normalize();
        if tree.has_nonterminals() {
          tracing::error!(sentence = %tree, "sentence still has nonterminals after expansion");
          continue;
        }
        return Some(tree);
      };

      tracing::trace!(%target, branches = productions.len(), "expanding");
      let expanded = productions
        .into_iter()
        .map(|production| {
          let mut next = tree.clone();
          next.replace_first(&target, production);
          next
        })
        .collect::<Vec<_>>();
      self.push_all(expanded);
    }
    None
  }
}
