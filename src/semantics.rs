use indexmap::IndexMap;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::parse_rules::{parse_annotation_line, scrub};
use crate::rules::expand_shorthand;
use crate::tree::Tree;

/// Logical-form templates keyed by the exact (normalized) utterance pattern
/// they annotate.
#[derive(Debug, Clone, Default)]
pub struct SemanticsTable {
  templates: IndexMap<Tree, Tree>,
}

impl SemanticsTable {
  pub fn new() -> Self {
    Default::default()
  }

  /// Parses `<utterance-pattern> = <logical-form>` lines and returns how
  /// many templates were added.
  ///
  /// Both sides may use `(a | b)` shorthand. Expanded logical forms pair up
  /// with expanded utterances in order; a single logical form serves every
  /// utterance expansion.
  pub fn load_semantics(&mut self, text: &str) -> Result<usize> {
    let mut count = 0;
    for (idx, line) in text.lines().enumerate() {
      let cleaned = scrub(line);
      let Some((utterance, semantics)) =
        parse_annotation_line(&cleaned).map_err(|e| Error::syntax(idx + 1, line, e))?
      else {
        continue;
      };

      let utterances = expand_shorthand(&utterance);
      let forms = expand_shorthand(&semantics);
      if forms.len() > utterances.len() {
        return Err(Error::syntax(
          idx + 1,
          line,
          format!(
            "{} logical forms for {} utterance patterns",
            forms.len(),
            utterances.len()
          ),
        ));
      }

      for (i, mut utterance) in utterances.into_iter().enumerate() {
        let mut form = forms.get(i).unwrap_or(&forms[0]).clone();
        utterance.discard_void();
        utterance.normalize();
        form.normalize();

        let available = utterance.placeholders();
        if let Some(missing) = form.placeholders().into_iter().find(|p| !available.contains(p)) {
          return Err(Error::Annotation {
            missing: missing.to_string(),
            rule: format!("{} = {}", utterance, form),
          });
        }

        if self.templates.insert(utterance, form).is_some() {
          tracing::debug!(line = idx + 1, "annotation replaces an earlier one");
        }
        count += 1;
      }
    }
    tracing::debug!(count, "loaded semantics");
    Ok(count)
  }

  pub fn load_semantics_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
    let text = std::fs::read_to_string(path.as_ref())?;
    self.load_semantics(&text)
  }

  pub fn get(&self, utterance: &Tree) -> Option<&Tree> {
    self.templates.get(utterance)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Tree, &Tree)> {
    self.templates.iter()
  }

  pub fn len(&self) -> usize {
    self.templates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.templates.is_empty()
  }
}

impl fmt::Display for SemanticsTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (utterance, semantics) in self.templates.iter() {
      writeln!(f, "{} = {}", utterance, semantics)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parse_rules::parse_expansion;

  #[test]
  fn test_load_semantics() {
    let mut semantics = SemanticsTable::new();
    let count = semantics
      .load_semantics(
        r#"
        # go places
        $vbgo to the {room} = (lambda $1:e . at($1, {room}))
        (bring | give) me the {object} = bring({object})
        this line is a comment without an equals sign
        "#,
      )
      .unwrap();
    assert_eq!(count, 3);

    let mut key = parse_expansion("give me the {object}").unwrap();
    key.normalize();
    assert_eq!(semantics.get(&key).unwrap().to_string(), "bring({object})");
  }

  #[test]
  fn test_paired_choices() {
    let mut semantics = SemanticsTable::new();
    semantics
      .load_semantics("(go | walk) home = (go(home) | walk(home))")
      .unwrap();
    let mut key = parse_expansion("walk home").unwrap();
    key.normalize();
    assert_eq!(semantics.get(&key).unwrap().to_string(), "walk(home)");

    let err = SemanticsTable::new()
      .load_semantics("home = (go(home) | walk(home))")
      .unwrap_err();
    assert!(matches!(err, Error::Syntax { line: 1, .. }));
  }

  #[test]
  fn test_annotation_must_use_utterance_wildcards() {
    let err = SemanticsTable::new()
      .load_semantics("bring me the {object} = bring({object}, {location})")
      .unwrap_err();
    match err {
      Error::Annotation { missing, rule } => {
        assert_eq!(missing, "{location}");
        assert_eq!(rule, "bring me the {object} = bring({object}, {location})");
      }
      other => panic!("unexpected {:?}", other),
    }
  }
}
