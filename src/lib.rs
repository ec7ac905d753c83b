//! Generation, grounding and parsing of GPSR robot commands.
//!
//! One rule table drives everything: [`Generator`] enumerates or samples
//! sentences from it, [`PairedGenerator`] derives their logical forms in
//! lock-step from a [`SemanticsTable`], [`Grounder`] fills wildcards from a
//! [`KnowledgeBase`], and [`compile`] turns the same table into a parser.
#[macro_use]
extern crate lazy_static;

pub mod anonymizer;
pub mod error;
pub mod fallback;
pub mod generator;
pub mod grounding;
pub mod knowledge;
pub mod paired;
pub mod parse_rules;
pub mod parser;
pub mod rules;
pub mod semantics;
pub mod symbol;
pub mod tree;
pub mod utils;

pub use crate::anonymizer::{Anonymize, Anonymizer, NumberingAnonymizer};
pub use crate::error::{Error, Result};
pub use crate::fallback::{AnonymizingParser, Distance, MappingParser, NearestNeighborParser};
pub use crate::generator::{GenerationConfig, Generator, Sentences, Traversal};
pub use crate::grounding::{Assignment, Grounder, apply_assignment, candidate_values};
pub use crate::knowledge::{AttrValue, KnowledgeBase};
pub use crate::paired::{Pair, PairedGenerator, Pairs, format_pairs};
pub use crate::parser::{Grammar, GrammarParser, SynTree, UtteranceParser, compile, compile_with_start};
pub use crate::rules::{RuleTable, expand_shorthand};
pub use crate::semantics::SemanticsTable;
pub use crate::symbol::{ROOT, Symbol, Wildcard};
pub use crate::tree::{Tree, tree_printer};

#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  const GRAMMAR: &str = include_str!("../fixtures/grammar.txt");
  const SEMANTICS: &str = include_str!("../fixtures/semantics.txt");
  const KNOWLEDGE: &str = include_str!("../fixtures/knowledge.txt");

  fn fixtures() -> (RuleTable, SemanticsTable, KnowledgeBase) {
    let mut rules = RuleTable::new();
    rules.load_rules(GRAMMAR, true).unwrap();
    let mut semantics = SemanticsTable::new();
    semantics.load_semantics(SEMANTICS).unwrap();
    let kb: KnowledgeBase = KNOWLEDGE.parse().unwrap();
    (rules, semantics, kb)
  }

  fn sentences(rules: &RuleTable) -> Vec<String> {
    Generator::new(rules)
      .generate_from(Symbol::root())
      .map(|t| tree_printer(&t))
      .collect()
  }

  #[test]
  fn test_kitchen_table_scenario() {
    let mut rules = RuleTable::new();
    rules
      .load_rules("$Main = go to the {location placement 1} and get the {object}", true)
      .unwrap();
    let kb = KnowledgeBase::new()
      .with_values("location", ["kitchen table"])
      .with_values("object", ["apple"]);

    let grounded = rules.with_grounding_rules(&kb).unwrap();
    let generated = sentences(&grounded);
    assert_eq!(generated, vec!["go to the kitchen table and get the apple"]);

    let template = Generator::new(&rules).generate_from(Symbol::root()).next().unwrap();
    let mut grounder = Grounder::new(&kb);
    let first = grounder.ground(&template).unwrap().unwrap();
    let second = grounder.ground(&template).unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(tree_printer(&first), generated[0]);

    let parser = compile(&grounded).unwrap();
    assert!(parser.parse(&generated[0]).is_some());
    assert!(parser.parse("go get the apple").is_none());
  }

  #[test]
  fn test_compiled_parser_covers_generated_sentences() {
    let (rules, _, kb) = fixtures();
    let grounded = rules.with_grounding_rules(&kb).unwrap();
    let parser = compile(&grounded).unwrap();

    let generated = sentences(&grounded);
    assert_eq!(generated.len(), 72);
    for sentence in generated.iter() {
      assert!(!sentence.contains('{'), "unground wildcard in {}", sentence);
      assert!(parser.accepts(sentence), "no parse for {}", sentence);
    }
  }

  #[test]
  fn test_paired_fixtures() {
    let (rules, semantics, kb) = fixtures();
    let pairs = PairedGenerator::new(&rules, &semantics)
      .generate_from(Symbol::root(), true)
      .collect::<Vec<_>>();
    assert_eq!(pairs.len(), 11);

    let rendered = format_pairs(pairs.clone());
    assert!(rendered.contains(
      "give me the {object 1} from the {location placement 1}\nbring({object 1}, {location placement 1}, me)\n"
    ));
    assert!(rendered.contains("navigate to the {location room} please\ngo({location room})\n"));

    let mut rng = StdRng::seed_from_u64(7);
    let mut grounder = Grounder::new(&kb).with_rng(&mut rng);
    for (utterance, semantics) in pairs.iter() {
      let (utterance, semantics) = grounder.ground_pair(utterance, semantics.as_ref()).unwrap().unwrap();
      assert!(!tree_printer(&utterance).contains('{'));
      let semantics = semantics.unwrap();
      assert!(!semantics.has_placeholders(), "{}", semantics);
    }
  }

  #[test]
  fn test_anonymized_and_nearest_neighbor_parsing() {
    let (rules, _, kb) = fixtures();

    let anonymized = compile(&rules.with_anonymized_rules(false)).unwrap();
    let parser = AnonymizingParser::new(anonymized, Anonymizer::new(&kb));
    assert!(parser.parse("bring me the red cup from the kitchen table").is_some());
    assert!(parser.parse("navigate to the bedroom please").is_some());
    assert!(parser.parse("navigate to the bookshelf please").is_none());

    let grounded = rules.with_grounding_rules(&kb).unwrap();
    let neighbors = sentences(&grounded);
    let fallback = NearestNeighborParser::new(compile(&grounded).unwrap(), neighbors).with_threshold(5.0);
    let tree = fallback.parse("bring me the red cup from the kitchen tabel").unwrap();
    assert_eq!(tree.leaves().len(), 9);
    assert!(fallback.parse("what time is it").is_none());
  }

  #[test]
  fn test_shorthand_expansion_is_a_product() {
    let tree = parse_rules::parse_expansion("(a | b | c) x (d | e) (f | (g | h) i)").unwrap();
    let expanded = expand_shorthand(&tree);
    assert_eq!(expanded.len(), 3 * 2 * 3);
    assert!(expanded.iter().all(|t| !t.has_choice()));

    let mut rendered = expanded.iter().map(tree_printer).collect::<Vec<_>>();
    rendered.sort();
    rendered.dedup();
    assert_eq!(rendered.len(), expanded.len());
  }
}
