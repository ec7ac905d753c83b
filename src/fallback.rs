//! Best-effort parsing for text outside the grammar.
use std::collections::HashMap;
use std::hash::Hash;

use crate::anonymizer::Anonymize;
use crate::parser::UtteranceParser;

/// How far apart two utterances are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distance {
  /// Character edit distance
  #[default]
  Levenshtein,
  /// One minus the Jaccard overlap of the two word sets, so always in `0..=1`
  TokenJaccard,
}

impl Distance {
  pub fn between(&self, a: &str, b: &str) -> f64 {
    match self {
      Self::Levenshtein => strsim::levenshtein(a, b) as f64,
      Self::TokenJaccard => {
        let a = a.split_whitespace().collect::<std::collections::HashSet<_>>();
        let b = b.split_whitespace().collect::<std::collections::HashSet<_>>();
        let union = a.union(&b).count();
        if union == 0 {
          return 0.0;
        }
        1.0 - a.intersection(&b).count() as f64 / union as f64
      }
    }
  }
}

/// Parses the neighbors closest to an utterance instead of the utterance
/// itself.
///
/// Neighbors are ranked by distance, earlier neighbors first on ties. The
/// `k` closest ones under the threshold each get parsed, and the parse most
/// of them agree on wins; between equally common parses, the one from the
/// closer neighbor does.
pub struct NearestNeighborParser<P> {
  parser: P,
  neighbors: Vec<String>,
  distance: Distance,
  k: usize,
  threshold: f64,
}

impl<P: UtteranceParser> NearestNeighborParser<P> {
  /// One neighbor, edit distance, threshold 20
  pub fn new(parser: P, neighbors: impl IntoIterator<Item = String>) -> Self {
    Self {
      parser,
      neighbors: neighbors.into_iter().collect(),
      distance: Distance::default(),
      k: 1,
      threshold: 20.0,
    }
  }

  pub fn with_distance(mut self, distance: Distance) -> Self {
    self.distance = distance;
    self
  }

  pub fn with_k(mut self, k: usize) -> Self {
    self.k = k.max(1);
    self
  }

  /// Neighbors at this distance or further are never used
  pub fn with_threshold(mut self, threshold: f64) -> Self {
    self.threshold = threshold;
    self
  }

  /// Neighbors closer than the threshold, nearest first
  pub fn nearest(&self, utterance: &str) -> Vec<(&str, f64)> {
    let mut ranked = self
      .neighbors
      .iter()
      .map(|n| (n.as_str(), self.distance.between(n, utterance)))
      .filter(|(_, d)| *d < self.threshold)
      .collect::<Vec<_>>();
    // stable, so ties keep insertion order
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked.truncate(self.k);
    ranked
  }
}

impl<P> UtteranceParser for NearestNeighborParser<P>
where
  P: UtteranceParser,
  P::Output: PartialEq,
{
  type Output = P::Output;

  fn parse(&self, utterance: &str) -> Option<Self::Output> {
    let nearest = self.nearest(utterance);
    if nearest.is_empty() {
      tracing::debug!(utterance, "no neighbor under the distance threshold");
      return None;
    }

    // (parse, votes), in order of the first neighbor that produced it
    let mut votes: Vec<(P::Output, usize)> = Vec::new();
    for (neighbor, distance) in nearest {
      let Some(parse) = self.parser.parse(neighbor) else {
        continue;
      };
      tracing::trace!(neighbor, distance, "neighbor vote");
      match votes.iter_mut().find(|(p, _)| *p == parse) {
        Some((_, count)) => *count += 1,
        None => votes.push((parse, 1)),
      }
    }

    let best = votes.iter().map(|(_, count)| *count).max()?;
    votes.into_iter().find(|(_, count)| *count == best).map(|(parse, _)| parse)
  }
}

/// Anonymizes an utterance before handing it to the wrapped parser
pub struct AnonymizingParser<P, A> {
  parser: P,
  anonymizer: A,
}

impl<P, A> AnonymizingParser<P, A> {
  pub fn new(parser: P, anonymizer: A) -> Self {
    Self { parser, anonymizer }
  }
}

impl<P: UtteranceParser, A: Anonymize> UtteranceParser for AnonymizingParser<P, A> {
  type Output = P::Output;

  fn parse(&self, utterance: &str) -> Option<Self::Output> {
    self.parser.parse(&self.anonymizer.anonymize(utterance))
  }
}

/// Looks the wrapped parser's output up in a table. Parses missing from the
/// table are `None`.
pub struct MappingParser<P: UtteranceParser, V> {
  parser: P,
  mapping: HashMap<P::Output, V>,
}

impl<P, V> MappingParser<P, V>
where
  P: UtteranceParser,
  P::Output: Hash + Eq,
{
  pub fn new(parser: P, mapping: HashMap<P::Output, V>) -> Self {
    Self { parser, mapping }
  }
}

impl<P, V> UtteranceParser for MappingParser<P, V>
where
  P: UtteranceParser,
  P::Output: Hash + Eq,
  V: Clone,
{
  type Output = V;

  fn parse(&self, utterance: &str) -> Option<Self::Output> {
    let parse = self.parser.parse(utterance)?;
    self.mapping.get(&parse).cloned()
  }
}

/// Exact lookup, for neighbor sets that already know their parses
impl<V: Clone> UtteranceParser for HashMap<String, V> {
  type Output = V;

  fn parse(&self, utterance: &str) -> Option<Self::Output> {
    self.get(utterance).cloned()
  }
}
