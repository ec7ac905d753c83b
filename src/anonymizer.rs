//! Replaces vocabulary mentions in free text with `<category>` markers.
use indexmap::IndexMap;
use regex::{Captures, Regex};

use crate::knowledge::KnowledgeBase;

/// Category whose values keep their own marker even when they're also
/// listed under another category
const ROOM: &str = "room";

/// Rewrites free text before it reaches a parser
pub trait Anonymize {
  fn anonymize(&self, utterance: &str) -> String;
}

/// Swaps every known value for its category marker: `<object>`, `<room>`...
///
/// All values go into one alternation, longest first, so `kitchen table`
/// wins over `kitchen` and a match never stops inside a word.
#[derive(Debug, Clone)]
pub struct Anonymizer {
  kinds: IndexMap<String, String>,
  pattern: Option<Regex>,
}

impl Anonymizer {
  pub fn new(kb: &KnowledgeBase) -> Self {
    let mut kinds: IndexMap<String, String> = IndexMap::new();
    for (category, values) in kb.categories().filter(|(c, _)| *c != ROOM) {
      for value in values {
        kinds.insert(value.clone(), category.to_string());
      }
    }
    for value in kb.values(ROOM).unwrap_or_default() {
      kinds.insert(value.clone(), ROOM.to_string());
    }

    let mut values = kinds.keys().filter(|v| !v.is_empty()).collect::<Vec<_>>();
    values.sort_by_key(|v| std::cmp::Reverse(v.len()));
    let pattern = if values.is_empty() {
      None
    } else {
      let alternation = values.iter().map(|v| regex::escape(v)).collect::<Vec<_>>().join("|");
      // escaped input only, so this can't be malformed
      Regex::new(&format!(r"\b({})\b", alternation)).ok()
    };
    tracing::debug!(values = kinds.len(), "built anonymizer");

    Self { kinds, pattern }
  }

  /// The category a matched value is anonymized to
  pub fn kind_of(&self, value: &str) -> Option<&str> {
    self.kinds.get(value).map(String::as_str)
  }

  fn matches<'t>(&self, utterance: &'t str) -> Vec<regex::Match<'t>> {
    match &self.pattern {
      Some(pattern) => pattern.find_iter(utterance).collect(),
      None => Vec::new(),
    }
  }
}

impl Anonymize for Anonymizer {
  fn anonymize(&self, utterance: &str) -> String {
    let Some(pattern) = &self.pattern else {
      return utterance.to_string();
    };
    pattern
      .replace_all(utterance, |caps: &Captures| match self.kind_of(&caps[0]) {
        Some(kind) => format!("<{}>", kind),
        None => caps[0].to_string(),
      })
      .into_owned()
  }
}

/// Like [`Anonymizer`], but numbers a category's markers in order of
/// appearance when it's mentioned more than once: `<object 1>`, `<object 2>`,
/// and a single `<location>`.
#[derive(Debug, Clone)]
pub struct NumberingAnonymizer {
  inner: Anonymizer,
}

impl NumberingAnonymizer {
  pub fn new(kb: &KnowledgeBase) -> Self {
    Self {
      inner: Anonymizer::new(kb),
    }
  }
}

impl From<Anonymizer> for NumberingAnonymizer {
  fn from(inner: Anonymizer) -> Self {
    Self { inner }
  }
}

impl Anonymize for NumberingAnonymizer {
  fn anonymize(&self, utterance: &str) -> String {
    let matches = self.inner.matches(utterance);

    let mut totals: IndexMap<&str, usize> = IndexMap::new();
    for m in matches.iter() {
      if let Some(kind) = self.inner.kind_of(m.as_str()) {
        *totals.entry(kind).or_default() += 1;
      }
    }

    let mut seen: IndexMap<&str, usize> = IndexMap::new();
    let mut out = String::with_capacity(utterance.len());
    let mut last = 0;
    for m in matches.iter() {
      let Some(kind) = self.inner.kind_of(m.as_str()) else {
        continue;
      };
      out.push_str(&utterance[last..m.start()]);
      if totals.get(kind).copied().unwrap_or_default() > 1 {
        let n = seen.entry(kind).or_default();
        *n += 1;
        out.push_str(&format!("<{} {}>", kind, n));
      } else {
        out.push_str(&format!("<{}>", kind));
      }
      last = m.end();
    }
    out.push_str(&utterance[last..]);
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kb() -> KnowledgeBase {
    KnowledgeBase::new()
      .with_values("object", ["apple", "red cup", "cup"])
      .with_values("location", ["kitchen", "kitchen table", "bedroom"])
      .with_values("room", ["kitchen", "bedroom"])
      .with_values("name", ["Alex"])
  }

  #[test]
  fn test_longest_match_and_rooms() {
    let anonymizer = Anonymizer::new(&kb());
    assert_eq!(
      anonymizer.anonymize("put the red cup on the kitchen table in the kitchen"),
      "put the <object> on the <location> in the <room>"
    );
    assert_eq!(anonymizer.anonymize("tell Alex about the cupboard"), "tell <name> about the cupboard");
  }

  #[test]
  fn test_numbering() {
    let anonymizer = NumberingAnonymizer::new(&kb());
    let once = anonymizer.anonymize("bring the apple and the cup from the kitchen table");
    assert_eq!(once, "bring the <object 1> and the <object 2> from the <location>");
    assert_eq!(anonymizer.anonymize(&once), once);
  }

  #[test]
  fn test_repeated_value_numbered_separately() {
    let anonymizer = NumberingAnonymizer::new(&kb());
    assert_eq!(
      anonymizer.anonymize("cup to cup"),
      "<object 1> to <object 2>"
    );
    assert_eq!(anonymizer.anonymize("go to the bedroom"), "go to the <room>");
  }

  #[test]
  fn test_empty_knowledge_base() {
    let anonymizer = Anonymizer::new(&KnowledgeBase::new());
    assert_eq!(anonymizer.anonymize("go home"), "go home");
    assert_eq!(NumberingAnonymizer::from(anonymizer).anonymize("go home"), "go home");
  }
}
