//! Filling wildcards with concrete vocabulary.
//!
//! Every distinct wildcard (by identity) in a tree is a slot. Slots that share
//! a name but not an identity must take different values; occurrences of the
//! same slot always take the same value. Subtypes and `where` clauses narrow
//! each slot's candidates using the knowledge base's attribute tables.
use indexmap::IndexMap;
use rand::RngCore;
use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::knowledge::{AttrValue, KnowledgeBase};
use crate::symbol::{Symbol, Wildcard};
use crate::tree::Tree;

/// Concrete value per wildcard slot, in order of first appearance
pub type Assignment = IndexMap<Wildcard, String>;

fn pronoun_word(wildcard: &Wildcard) -> &'static str {
  match wildcard.subtype.as_deref() {
    Some("sub") => "they",
    Some("paj") => "their",
    Some("pabs") => "theirs",
    _ => "them",
  }
}

/// The knowledge base category a wildcard draws its values from
fn source_category<'w>(kb: &KnowledgeBase, wildcard: &'w Wildcard) -> &'w str {
  match (wildcard.name.as_str(), wildcard.subtype.as_deref(), wildcard.obfuscated) {
    ("object", _, true) => "category",
    ("location", _, true) => "room",
    ("location", Some("room"), false) if kb.values("room").is_some() => "room",
    (name, _, _) => name,
  }
}

/// Conditions implied by a location subtype, applied only if the knowledge
/// base tracks that attribute at all
fn derived_conditions(kb: &KnowledgeBase, category: &str, wildcard: &Wildcard) -> Vec<(String, AttrValue)> {
  let attr = match (wildcard.name.as_str(), wildcard.subtype.as_deref()) {
    ("location", Some("placement")) => "isplacement",
    ("location", Some("beacon")) => "isbeacon",
    ("location", Some("room")) => "isroom",
    _ => return Vec::new(),
  };
  if kb.has_attribute(category, attr) {
    vec![(attr.to_string(), AttrValue::Bool(true))]
  } else {
    Vec::new()
  }
}

/// Every value `wildcard` may take, in knowledge base order, ignoring other
/// wildcards.
///
/// `where` clauses on obfuscated wildcards describe the hidden object, not
/// the category or room that is said instead, so they aren't applied.
pub fn candidate_values(kb: &KnowledgeBase, wildcard: &Wildcard) -> Result<Vec<String>> {
  if wildcard.is_pronoun() {
    return Ok(vec![pronoun_word(wildcard).to_string()]);
  }

  let category = source_category(kb, wildcard);
  let values = kb
    .values(category)
    .ok_or_else(|| Error::UnknownCategory(category.to_string()))?;

  let mut conditions = derived_conditions(kb, category, wildcard);
  if !wildcard.obfuscated {
    conditions.extend(wildcard.conditions.iter().cloned());
  }

  let mut candidates = Vec::with_capacity(values.len());
  'values: for value in values {
    for (key, expected) in conditions.iter() {
      if !kb.satisfies(category, value, key, expected)? {
        continue 'values;
      }
    }
    candidates.push(value.clone());
  }
  Ok(candidates)
}

/// Substitutes an assignment into a tree. With `escape`, values go in as
/// quoted constants, which is what logical forms want.
pub fn apply_assignment(tree: &Tree, assignment: &Assignment, escape: bool) -> Tree {
  let mut grounded = tree.clone();
  for (wildcard, value) in assignment {
    grounded.replace_all(&Symbol::Wildcard(wildcard.clone()), &Tree::text(value), escape);
  }
  grounded.normalize();
  grounded
}

pub struct Grounder<'a> {
  kb: &'a KnowledgeBase,
  rng: Option<&'a mut dyn RngCore>,
}

impl<'a> Grounder<'a> {
  pub fn new(kb: &'a KnowledgeBase) -> Self {
    Self { kb, rng: None }
  }

  /// Shuffle every slot's candidates with `rng` so groundings come out in a
  /// random (but reproducible) order
  pub fn with_rng(mut self, rng: &'a mut dyn RngCore) -> Self {
    self.rng = Some(rng);
    self
  }

  /// All consistent assignments for the wildcards of `tree`. Fails up front
  /// on an unknown category or attribute; running out of candidates just
  /// ends the iterator.
  pub fn assignments(&mut self, tree: &Tree) -> Result<Assignments> {
    let mut slots: IndexMap<Wildcard, Wildcard> = IndexMap::new();
    for wildcard in tree.wildcards().filter(|w| !w.is_void()) {
      let slot = slots.entry(wildcard.clone()).or_insert_with(|| wildcard.clone());
      for condition in wildcard.conditions.iter() {
        if !slot.conditions.contains(condition) {
          slot.conditions.push(condition.clone());
        }
      }
    }
    let slots = slots.into_values().collect::<Vec<_>>();

    let mut candidates = Vec::with_capacity(slots.len());
    for slot in slots.iter() {
      let mut values = candidate_values(self.kb, slot)?;
      if let Some(rng) = self.rng.as_deref_mut() {
        values.shuffle(rng);
      }
      tracing::trace!(wildcard = %slot, candidates = values.len(), "grounding slot");
      candidates.push(values);
    }

    let conflicts = slots
      .iter()
      .enumerate()
      .map(|(idx, slot)| {
        slots[..idx]
          .iter()
          .enumerate()
          .filter(|(_, other)| !slot.is_pronoun() && other.name == slot.name)
          .map(|(j, _)| j)
          .collect::<Vec<_>>()
      })
      .collect::<Vec<_>>();

    Ok(Assignments {
      slots,
      candidates,
      conflicts,
      cursor: Vec::new(),
      state: SearchState::Fresh,
    })
  }

  pub fn groundings(&mut self, tree: &Tree) -> Result<Groundings> {
    Ok(Groundings {
      tree: tree.clone(),
      assignments: self.assignments(tree)?,
    })
  }

  /// The tree under the first assignment, or None if there is none
  pub fn ground(&mut self, tree: &Tree) -> Result<Option<Tree>> {
    Ok(self.groundings(tree)?.next())
  }

  /// Grounds an utterance and its logical form with the same assignment
  pub fn pair_groundings(&mut self, utterance: &Tree, semantics: Option<&Tree>) -> Result<PairGroundings> {
    Ok(PairGroundings {
      utterance: utterance.clone(),
      semantics: semantics.cloned(),
      assignments: self.assignments(utterance)?,
    })
  }

  pub fn ground_pair(&mut self, utterance: &Tree, semantics: Option<&Tree>) -> Result<Option<(Tree, Option<Tree>)>> {
    Ok(self.pair_groundings(utterance, semantics)?.next())
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SearchState {
  Fresh,
  Searching,
  Exhausted,
}

/// Backtracking search over slot candidates, one assignment per `next`
#[derive(Debug)]
pub struct Assignments {
  slots: Vec<Wildcard>,
  candidates: Vec<Vec<String>>,
  /// earlier slots each slot must differ from
  conflicts: Vec<Vec<usize>>,
  /// candidate index chosen at each depth of the search
  cursor: Vec<usize>,
  state: SearchState,
}

impl Assignments {
  fn consistent(&self, depth: usize, pos: usize) -> bool {
    let value = &self.candidates[depth][pos];
    self.conflicts[depth]
      .iter()
      .all(|&other| &self.candidates[other][self.cursor[other]] != value)
  }

  fn current(&self) -> Assignment {
    self
      .slots
      .iter()
      .zip(self.cursor.iter())
      .enumerate()
      .map(|(depth, (slot, &pos))| (slot.clone(), self.candidates[depth][pos].clone()))
      .collect()
  }
}

impl Iterator for Assignments {
  type Item = Assignment;

  fn next(&mut self) -> Option<Self::Item> {
    match self.state {
      SearchState::Exhausted => return None,
      SearchState::Fresh if self.slots.is_empty() => {
        self.state = SearchState::Exhausted;
        return Some(Assignment::new());
      }
      SearchState::Fresh => {
        self.state = SearchState::Searching;
        self.cursor.push(0);
      }
      SearchState::Searching => {
        if let Some(last) = self.cursor.last_mut() {
          *last += 1;
        }
      }
    }

    while let Some(&pos) = self.cursor.last() {
      let depth = self.cursor.len() - 1;
      if pos >= self.candidates[depth].len() {
        self.cursor.pop();
        if let Some(last) = self.cursor.last_mut() {
          *last += 1;
        }
        continue;
      }
      if !self.consistent(depth, pos) {
        self.cursor[depth] += 1;
        continue;
      }
      if depth + 1 == self.slots.len() {
        return Some(self.current());
      }
      self.cursor.push(0);
    }

    self.state = SearchState::Exhausted;
    None
  }
}

pub struct Groundings {
  tree: Tree,
  assignments: Assignments,
}

impl Iterator for Groundings {
  type Item = Tree;

  fn next(&mut self) -> Option<Self::Item> {
    let assignment = self.assignments.next()?;
    Some(apply_assignment(&self.tree, &assignment, false))
  }
}

pub struct PairGroundings {
  utterance: Tree,
  semantics: Option<Tree>,
  assignments: Assignments,
}

impl Iterator for PairGroundings {
  type Item = (Tree, Option<Tree>);

  fn next(&mut self) -> Option<Self::Item> {
    let assignment = self.assignments.next()?;
    Some((
      apply_assignment(&self.utterance, &assignment, false),
      self.semantics.as_ref().map(|s| apply_assignment(s, &assignment, true)),
    ))
  }
}
