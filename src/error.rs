use thiserror::Error;

/// Everything that can go fatally wrong while loading grammars, annotations and
/// vocabulary, or while grounding against a knowledge base.
///
/// Problems that only affect a single generated sentence (annotation drift
/// during paired generation, an input that is outside the compiled grammar,
/// running out of groundings) are not errors: they are logged and skipped, or
/// reported as `None`.
#[derive(Debug, Error)]
pub enum Error {
  #[error("line {line}: {message}\n  {text}")]
  Syntax {
    line: usize,
    text: String,
    message: String,
  },

  #[error("semantics rely on {missing} that doesn't occur in rule: {rule}")]
  Annotation { missing: String, rule: String },

  #[error("unknown attribute `{key}` for category `{category}`")]
  UnknownAttribute { category: String, key: String },

  #[error("no vocabulary for category `{0}`")]
  UnknownCategory(String),

  #[error("no productions for `{0}`")]
  UndefinedRule(String),

  #[error("formal grammar: {0}")]
  Grammar(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl Error {
  pub(crate) fn syntax(line: usize, text: &str, message: impl Into<String>) -> Self {
    Self::Syntax {
      line,
      text: text.to_string(),
      message: message.into(),
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;
