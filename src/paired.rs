//! Lock-step generation of utterances and their logical forms.
//!
//! A logical-form template is attached as soon as the partially expanded
//! utterance is exactly one of the annotated patterns; from then on every
//! rewrite applied to the utterance is also applied to the logical form.
//! Annotations whose pattern is never produced verbatim by top-down
//! expansion are never attached.
use rand::RngCore;
use std::collections::VecDeque;
use std::fmt::Write;

use crate::generator::{Expansion, GenerationConfig, next_expansion};
use crate::rules::{RuleTable, expand_shorthand};
use crate::semantics::SemanticsTable;
use crate::symbol::Symbol;
use crate::tree::Tree;

pub type Pair = (Tree, Option<Tree>);

pub struct PairedGenerator<'a> {
  rules: &'a RuleTable,
  semantics: &'a SemanticsTable,
  config: GenerationConfig,
  rng: Option<&'a mut dyn RngCore>,
}

impl<'a> PairedGenerator<'a> {
  pub fn new(rules: &'a RuleTable, semantics: &'a SemanticsTable) -> Self {
    Self {
      rules,
      semantics,
      config: GenerationConfig::default(),
      rng: None,
    }
  }

  /// Only `branch_cap` is used: the frontier is always first-in first-out.
  pub fn with_config(mut self, config: GenerationConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_rng(mut self, rng: &'a mut dyn RngCore) -> Self {
    self.rng = Some(rng);
    self
  }

  /// Expands `start` (with `semantics` already attached, if given). With
  /// `yield_requires_semantics`, sentences that never got a logical form are
  /// skipped.
  pub fn generate(self, start: Tree, semantics: Option<Tree>, yield_requires_semantics: bool) -> Pairs<'a> {
    self.pairs(VecDeque::from([(start, semantics)]), yield_requires_semantics)
  }

  pub fn generate_from(self, symbol: Symbol, yield_requires_semantics: bool) -> Pairs<'a> {
    self.generate(Tree::start(symbol), None, yield_requires_semantics)
  }

  /// Runs a generation from every annotated pattern in turn, yielding
  /// everything each of them derives.
  pub fn expand_all_semantics(self) -> Pairs<'a> {
    let starts = self
      .semantics
      .iter()
      .map(|(utterance, _)| (utterance.clone(), None))
      .collect();
    self.pairs(starts, false)
  }

  fn pairs(self, starts: VecDeque<Pair>, yield_requires_semantics: bool) -> Pairs<'a> {
    Pairs {
      rules: self.rules,
      semantics: self.semantics,
      branch_cap: self.config.branch_cap,
      rng: self.rng,
      yield_requires_semantics,
      starts,
      frontier: VecDeque::new(),
    }
  }
}

pub struct Pairs<'a> {
  rules: &'a RuleTable,
  semantics: &'a SemanticsTable,
  branch_cap: Option<usize>,
  rng: Option<&'a mut dyn RngCore>,
  yield_requires_semantics: bool,
  /// start points still waiting for the frontier to drain
  starts: VecDeque<Pair>,
  frontier: VecDeque<Pair>,
}

fn is_unknown(semantics: &Tree) -> bool {
  matches!(
    semantics.children().first(),
    Some(Tree::Leaf(Symbol::Text(t))) if t.split_whitespace().next() == Some("UNKNOWN")
  )
}

fn joined(symbols: &[&Symbol]) -> String {
  symbols.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" ")
}

impl Pairs<'_> {
  /// Checks a fully expanded pair. Mismatched placeholders drop the pair;
  /// the plain `{pron}` is the one placeholder logical forms may leave out.
  fn finish(&self, sentence: Tree, semantics: Option<Tree>) -> Option<Pair> {
    if sentence.has_nonterminals() {
      tracing::error!(%sentence, "sentence still has nonterminals after expansion");
      return None;
    }

    let Some(mut semantics) = semantics else {
      return if self.yield_requires_semantics {
        None
      } else {
        Some((sentence, None))
      };
    };
    semantics.discard_void();
    semantics.normalize();

    let in_sentence = sentence.placeholders();
    let in_semantics = semantics.placeholders();

    let unfilled = in_semantics.iter().filter(|p| !in_sentence.contains(*p)).collect::<Vec<_>>();
    if !unfilled.is_empty() {
      tracing::warn!(
        unfilled = %joined(&unfilled),
        %sentence,
        %semantics,
        "logical form has placeholders the sentence doesn't; annotation is probably wrong"
      );
      return None;
    }

    let not_annotated = in_sentence.iter().filter(|p| !in_semantics.contains(*p)).collect::<Vec<_>>();
    let only_pronoun = matches!(
      not_annotated.as_slice(),
      [Symbol::Wildcard(w)] if w.is_indeterminate_pronoun()
    );
    if !not_annotated.is_empty() && !only_pronoun {
      if is_unknown(&semantics) {
        tracing::debug!(%sentence, "dropping sentence with unknown semantics");
      } else {
        tracing::warn!(
          missing = %joined(&not_annotated),
          %sentence,
          %semantics,
          "logical form is missing placeholders present in the sentence"
        );
      }
      return None;
    }

    Some((sentence, Some(semantics)))
  }
}

impl Iterator for Pairs<'_> {
  type Item = Pair;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let (sentence, semantics) = match self.frontier.pop_front() {
        Some(pair) => pair,
        None => self.starts.pop_front()?,
      };
      if sentence.has_choice() {
        // rules loaded without shorthand expansion
        for mut alternative in expand_shorthand(&sentence) {
          alternative.discard_void();
          alternative.normalize();
          self.frontier.push_back((alternative, semantics.clone()));
        }
        continue;
      }
      let semantics = semantics.or_else(|| self.semantics.get(&sentence).cloned());

      let step = next_expansion(self.rules, &sentence, self.branch_cap, self.rng.as_deref_mut());
      let Some(Expansion { target, productions }) = step else {
        match self.finish(sentence, semantics) {
          Some(pair) => return Some(pair),
          None => continue,
        }
      };

      for production in productions {
        let mut next = sentence.clone();
        next.replace_first(&target, production);
        next.discard_void();
        next.normalize();

        let next_semantics = semantics.as_ref().map(|s| {
          let mut s = s.clone();
          s.replace_all(&target, production, false);
          s
        });
        self.frontier.push_back((next, next_semantics));
      }
    }
  }
}

/// Renders pairs in the line-delimited `sentence\nlogical_form\n` format.
/// A missing logical form is an empty line.
pub fn format_pairs<I>(pairs: I) -> String
where
  I: IntoIterator<Item = Pair>,
{
  let mut out = String::new();
  for (sentence, semantics) in pairs {
    let semantics = semantics.map(|s| s.to_string()).unwrap_or_default();
    // writing to a String can't fail
    let _ = write!(out, "{}\n{}\n", sentence, semantics);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::knowledge::KnowledgeBase;
  use crate::parse_rules::{parse_expansion, parse_logical_form};

  fn tables(grammar: &str, annotations: &str) -> (RuleTable, SemanticsTable) {
    let mut rules = RuleTable::new();
    rules.load_rules(grammar, true).unwrap();
    let mut semantics = SemanticsTable::new();
    semantics.load_semantics(annotations).unwrap();
    (rules, semantics)
  }

  fn render(pairs: impl Iterator<Item = Pair>) -> Vec<(String, Option<String>)> {
    pairs
      .map(|(s, l)| (s.to_string(), l.map(|l| l.to_string())))
      .collect()
  }

  #[test]
  fn test_grounded_pairs() {
    let (rules, semantics) = tables("$Main = {object}", "{object} = exists({object})");
    let kb = KnowledgeBase::new().with_values("object", ["ball", "cube"]);
    let grounded = rules.with_grounding_rules(&kb).unwrap();

    let pairs = render(PairedGenerator::new(&grounded, &semantics).generate_from(Symbol::root(), true));
    assert_eq!(
      pairs,
      vec![
        ("ball".to_string(), Some("exists(ball)".to_string())),
        ("cube".to_string(), Some("exists(cube)".to_string())),
      ]
    );
    assert_eq!(
      format_pairs(PairedGenerator::new(&grounded, &semantics).generate_from(Symbol::root(), true)),
      "ball\nexists(ball)\ncube\nexists(cube)\n"
    );
  }

  #[test]
  fn test_semantics_attach_mid_derivation() {
    let (rules, semantics) = tables(
      "$Main = $deliver | $vbgo home\n$deliver = $vbbring me the {object}\n$vbbring = bring | give\n$vbgo = go",
      "$vbbring me the {object} = bring({object})",
    );
    let pairs = render(PairedGenerator::new(&rules, &semantics).generate_from(Symbol::root(), true));
    assert_eq!(
      pairs,
      vec![
        ("bring me the {object}".to_string(), Some("bring({object})".to_string())),
        ("give me the {object}".to_string(), Some("bring({object})".to_string())),
      ]
    );

    let all = render(PairedGenerator::new(&rules, &semantics).generate_from(Symbol::root(), false));
    assert_eq!(all.len(), 3);
    assert!(all.contains(&("go home".to_string(), None)));
  }

  #[test]
  fn test_unfilled_semantics_dropped() {
    let rules = RuleTable::new();
    let semantics = SemanticsTable::new();
    let start = parse_expansion("take the {object}").unwrap();
    let form = parse_logical_form("take({object}, {location})").unwrap();
    let pairs = PairedGenerator::new(&rules, &semantics)
      .generate(start, Some(form), true)
      .count();
    assert_eq!(pairs, 0);
  }

  #[test]
  fn test_missing_placeholders() {
    let (rules, semantics) = tables(
      "$Main = $give | $bring | $what\n$give = give it to {pron}\n$bring = bring the {object}\n$what = what about {object}",
      "give it to {pron} = give(it)\nbring the {object} = bring\nwhat about {object} = UNKNOWN",
    );
    let pairs = render(PairedGenerator::new(&rules, &semantics).generate_from(Symbol::root(), true));
    assert_eq!(pairs, vec![("give it to {pron}".to_string(), Some("give(it)".to_string()))]);
  }

  #[test]
  fn test_expand_all_semantics() {
    let (rules, semantics) = tables(
      "$Main = $vbgo to the $place\n$vbgo = go | walk\n$place = door",
      "$vbgo to the $place = go($place)\nwalk = walk",
    );
    let pairs = render(PairedGenerator::new(&rules, &semantics).expand_all_semantics());
    assert_eq!(
      pairs,
      vec![
        ("go to the door".to_string(), Some("go(door)".to_string())),
        ("walk to the door".to_string(), Some("go(door)".to_string())),
        ("walk".to_string(), Some("walk".to_string())),
      ]
    );
  }

  #[test]
  fn test_unexpanded_rules() {
    let mut rules = RuleTable::new();
    rules.load_rules("$Main = (bring | give) me the {object}", false).unwrap();
    let mut semantics = SemanticsTable::new();
    semantics
      .load_semantics("(bring | give) me the {object} = bring({object})")
      .unwrap();
    let pairs = render(PairedGenerator::new(&rules, &semantics).generate_from(Symbol::root(), true));
    assert_eq!(
      pairs,
      vec![
        ("bring me the {object}".to_string(), Some("bring({object})".to_string())),
        ("give me the {object}".to_string(), Some("bring({object})".to_string())),
      ]
    );
  }

  #[test]
  fn test_branch_cap() {
    let (rules, semantics) = tables("$Main = $x $x\n$x = a | b | c", "$x $x = pair");
    let config = GenerationConfig::default().with_branch_cap(2);
    let pairs = PairedGenerator::new(&rules, &semantics)
      .with_config(config)
      .generate_from(Symbol::root(), true)
      .count();
    assert_eq!(pairs, 4);
  }
}
