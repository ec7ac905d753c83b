//! The compiled side: formal grammar text, an Earley recognizer, and parse
//! forests turned into syntax trees.
pub mod compile;
pub mod earley;
pub mod forest;
pub mod grammar;
pub mod parse_grammar;
pub mod syntree;

pub use self::compile::{GrammarParser, compile, compile_with_start, grammar_text};
pub use self::grammar::{Grammar, Production, Rule};
pub use self::syntree::{Constituent, SynTree, Word};

/// Anything that maps a free-text utterance to a parse, or to nothing when
/// the text is outside what it understands
pub trait UtteranceParser {
  type Output;

  fn parse(&self, utterance: &str) -> Option<Self::Output>;
}
