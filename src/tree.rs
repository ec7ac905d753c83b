use indexmap::IndexSet;
use std::fmt;

use crate::symbol::{Symbol, Wildcard};

/// An expression tree over grammar symbols.
///
/// Utterance rules only use `Leaf`, `Expression` and (before shorthand
/// expansion) `Choice`. The remaining variants appear in logical forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tree {
  Leaf(Symbol),
  /// An unlabeled sequence
  Expression(Vec<Tree>),
  /// `(a | b | c)`, gone after shorthand expansion
  Choice(Vec<Tree>),
  /// `name(arg, arg)`
  Predicate(String, Vec<Tree>),
  /// `(lambda $1:type . body)`
  Lambda { var: String, ty: String, body: Box<Tree> },
  /// A parenthesized logical-form group with no alternatives
  Group(Box<Tree>),
  /// A quoted string constant
  Constant(Box<Tree>),
}

impl Tree {
  pub fn expression(children: Vec<Tree>) -> Self {
    Self::Expression(children)
  }

  /// A sequence of leaves
  pub fn from_symbols<I>(symbols: I) -> Self
  where
    I: IntoIterator<Item = Symbol>,
  {
    Self::Expression(symbols.into_iter().map(Self::Leaf).collect())
  }

  /// The tree generation starts from: a sequence holding just `symbol`
  pub fn start(symbol: Symbol) -> Self {
    Self::Expression(vec![Self::Leaf(symbol)])
  }

  /// A sequence of the whitespace-separated words of `s`, as one text node
  pub fn text(s: &str) -> Self {
    let words = s.split_whitespace().collect::<Vec<_>>();
    if words.is_empty() {
      Self::Expression(Vec::new())
    } else {
      Self::Expression(vec![Self::Leaf(Symbol::Text(words.join(" ")))])
    }
  }

  pub fn children(&self) -> &[Tree] {
    match self {
      Self::Leaf(_) => &[],
      Self::Expression(c) | Self::Choice(c) | Self::Predicate(_, c) => c,
      Self::Lambda { body, .. } | Self::Group(body) | Self::Constant(body) => std::slice::from_ref(&**body),
    }
  }

  pub fn children_mut(&mut self) -> &mut [Tree] {
    match self {
      Self::Leaf(_) => &mut [],
      Self::Expression(c) | Self::Choice(c) | Self::Predicate(_, c) => c,
      Self::Lambda { body, .. } | Self::Group(body) | Self::Constant(body) => std::slice::from_mut(&mut **body),
    }
  }

  /// All leaf symbols in pre-order. Wildcard metadata isn't descended into.
  pub fn leaves(&self) -> Leaves<'_> {
    Leaves { stack: vec![self] }
  }

  pub fn has_choice(&self) -> bool {
    matches!(self, Self::Choice(_)) || self.children().iter().any(Tree::has_choice)
  }

  /// Distinct nonterminals and wildcards, in order of first appearance
  pub fn placeholders(&self) -> IndexSet<Symbol> {
    self.leaves().filter(|s| s.is_placeholder()).cloned().collect()
  }

  pub fn has_placeholders(&self) -> bool {
    self.leaves().any(Symbol::is_placeholder)
  }

  pub fn has_nonterminals(&self) -> bool {
    self.leaves().any(Symbol::is_nonterminal)
  }

  /// Every wildcard occurrence, in order, repeats included
  pub fn wildcards(&self) -> impl Iterator<Item = &Wildcard> {
    self.leaves().filter_map(Symbol::wildcard)
  }

  /// Wildcards carrying `meta:` content, with their leaf position
  pub fn metadata(&self) -> Vec<(usize, &Wildcard)> {
    self
      .leaves()
      .enumerate()
      .filter_map(|(idx, s)| s.wildcard().filter(|w| w.metadata.is_some()).map(|w| (idx, w)))
      .collect()
  }

  /// Replaces the first pre-order occurrence of `target`. Returns whether
  /// anything was replaced.
  pub fn replace_first(&mut self, target: &Symbol, replacement: &Tree) -> bool {
    if matches!(self, Self::Leaf(s) if s == target) {
      *self = replacement.clone();
      return true;
    }
    self
      .children_mut()
      .iter_mut()
      .any(|child| child.replace_first(target, replacement))
  }

  /// Replaces every occurrence of `target`. With `escape`, each replacement is
  /// wrapped as a quoted constant unless it already sits inside one.
  pub fn replace_all(&mut self, target: &Symbol, replacement: &Tree, escape: bool) -> usize {
    self.replace_all_inner(target, replacement, escape, false)
  }

  fn replace_all_inner(&mut self, target: &Symbol, replacement: &Tree, escape: bool, quoted: bool) -> usize {
    if matches!(self, Self::Leaf(s) if s == target) {
      *self = if escape && !quoted {
        Self::Constant(Box::new(replacement.clone()))
      } else {
        replacement.clone()
      };
      return 1;
    }
    let quoted = quoted || matches!(self, Self::Constant(_));
    self
      .children_mut()
      .iter_mut()
      .map(|child| child.replace_all_inner(target, replacement, escape, quoted))
      .sum()
  }

  /// Splices nested sequences into their parent and joins adjacent text into
  /// a single text node, so that trees reached by different derivations
  /// compare equal.
  pub fn normalize(&mut self) {
    for child in self.children_mut() {
      child.normalize();
    }
    if let Self::Expression(children) = self {
      let mut merged = Vec::with_capacity(children.len());
      for child in children.drain(..) {
        match child {
          Self::Expression(inner) => inner.into_iter().for_each(|c| push_merged(&mut merged, c)),
          other => push_merged(&mut merged, other),
        }
      }
      *children = merged;
    }
  }

  /// Throws away the `{void}` annotations meant for the referee
  pub fn discard_void(&mut self) {
    if let Self::Expression(c) | Self::Choice(c) | Self::Predicate(_, c) = self {
      c.retain(|t| !matches!(t, Self::Leaf(s) if s.is_void()));
    }
    for child in self.children_mut() {
      child.discard_void();
    }
  }
}

fn push_merged(out: &mut Vec<Tree>, tree: Tree) {
  if let Tree::Leaf(Symbol::Text(s)) = &tree {
    if s.is_empty() {
      return;
    }
  }
  if let (Some(Tree::Leaf(Symbol::Text(prev))), Tree::Leaf(Symbol::Text(next))) = (out.last_mut(), &tree) {
    prev.push(' ');
    prev.push_str(next);
    return;
  }
  out.push(tree);
}

/// Pre-order leaf iterator backed by an explicit stack
pub struct Leaves<'a> {
  stack: Vec<&'a Tree>,
}

impl<'a> Iterator for Leaves<'a> {
  type Item = &'a Symbol;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(tree) = self.stack.pop() {
      match tree {
        Tree::Leaf(s) => return Some(s),
        other => self.stack.extend(other.children().iter().rev()),
      }
    }
    None
  }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Tree], sep: &str, skip_empty: bool) -> fmt::Result {
  let mut first = true;
  for item in items {
    let rendered = item.to_string();
    if skip_empty && rendered.is_empty() {
      continue;
    }
    if !first {
      f.write_str(sep)?;
    }
    f.write_str(&rendered)?;
    first = false;
  }
  Ok(())
}

impl fmt::Display for Tree {
  /// Canonical whitespace-joined rendering. Void wildcards render as nothing.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf(s) if s.is_void() => Ok(()),
      Self::Leaf(s) => write!(f, "{}", s),
      Self::Expression(children) => write_joined(f, children, " ", true),
      Self::Choice(options) => {
        f.write_str("(")?;
        write_joined(f, options, " | ", false)?;
        f.write_str(")")
      }
      Self::Predicate(name, args) => {
        write!(f, "{}(", name)?;
        write_joined(f, args, ", ", false)?;
        f.write_str(")")
      }
      Self::Lambda { var, ty, body } => write!(f, "(lambda {}:{} . {})", var, ty, body),
      Self::Group(inner) => write!(f, "({})", inner),
      Self::Constant(inner) => write!(f, "\"{}\"", inner),
    }
  }
}

/// Renders a tree the way every file output and downstream comparison expects
pub fn tree_printer(tree: &Tree) -> String {
  tree.to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn object(id: u32) -> Symbol {
    Wildcard::new("object").with_id(id).into()
  }

  #[test]
  fn test_normalize_joins_text() {
    let mut t = Tree::expression(vec![
      Tree::Leaf(Symbol::text("bring")),
      Tree::expression(vec![Tree::Leaf(Symbol::text("me")), Tree::Leaf(Symbol::text("the"))]),
      Tree::Leaf(object(1)),
      Tree::expression(vec![Tree::expression(vec![Tree::Leaf(Symbol::text("now"))])]),
    ]);
    t.normalize();
    assert_eq!(
      t,
      Tree::from_symbols([Symbol::text("bring me the"), object(1), Symbol::text("now")])
    );
    assert_eq!(tree_printer(&t), "bring me the {object 1} now");
  }

  #[test]
  fn test_replace_first_only_once() {
    let mut t = Tree::from_symbols([object(1), Symbol::text("and"), object(1)]);
    assert!(t.replace_first(&object(1), &Tree::text("apple")));
    t.normalize();
    assert_eq!(t.to_string(), "apple and {object 1}");
    assert!(!t.replace_first(&object(2), &Tree::text("pear")));
  }

  #[test]
  fn test_replace_all_escapes() {
    let mut sem = Tree::expression(vec![Tree::Predicate(
      "put".into(),
      vec![
        Tree::from_symbols([object(1)]),
        Tree::expression(vec![Tree::Constant(Box::new(Tree::from_symbols([
          Symbol::text("the"),
          object(1),
        ])))]),
      ],
    )]);
    assert_eq!(sem.replace_all(&object(1), &Tree::text("red cup"), true), 2);
    sem.normalize();
    assert_eq!(sem.to_string(), "put(\"red cup\", \"the red cup\")");
  }

  #[test]
  fn test_void_is_invisible() {
    let void = Wildcard {
      metadata: Some(vec![Tree::Leaf(Symbol::text("call the referee"))]),
      ..Wildcard::new("void")
    };
    let mut t = Tree::from_symbols([Symbol::text("go"), void.clone().into(), Symbol::text("now")]);
    assert_eq!(t.to_string(), "go now");

    let meta = t.metadata();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].0, 1);
    assert_eq!(meta[0].1.render_metadata().unwrap(), "call the referee");

    t.discard_void();
    t.normalize();
    assert_eq!(t, Tree::from_symbols([Symbol::text("go now")]));
  }

  #[test]
  fn test_placeholders() {
    let t = Tree::from_symbols([Symbol::nonterminal("vbgo"), object(1), object(1), Symbol::text("x")]);
    assert_eq!(t.placeholders().len(), 2);
    assert!(t.has_nonterminals());
    assert_eq!(t.wildcards().count(), 2);
  }
}
