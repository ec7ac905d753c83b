use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use gpsr_grammar::{GenerationConfig, Generator, GrammarParser, KnowledgeBase, RuleTable, Symbol, compile, tree_printer};

const GRAMMAR_SRC: &str = include_str!("../fixtures/grammar.txt");
const KNOWLEDGE_SRC: &str = include_str!("../fixtures/knowledge.txt");

fn grounded_rules() -> RuleTable {
  let mut rules = RuleTable::new();
  rules.load_rules(GRAMMAR_SRC, true).unwrap();
  let kb: KnowledgeBase = KNOWLEDGE_SRC.parse().unwrap();
  rules.with_grounding_rules(&kb).unwrap()
}

fn enumerate(rules: &RuleTable) -> usize {
  Generator::new(rules).generate_from(Symbol::root()).count()
}

fn sample(rules: &RuleTable, seed: u64) -> usize {
  let mut rng = StdRng::seed_from_u64(seed);
  Generator::new(rules)
    .with_config(GenerationConfig::default().with_branch_cap(1))
    .with_rng(&mut rng)
    .generate_from(Symbol::root())
    .count()
}

fn parse(parser: &GrammarParser, input: &str) -> bool {
  parser.parse(input).is_some()
}

fn criterion_benchmark(c: &mut Criterion) {
  let rules = grounded_rules();
  let parser = compile(&rules).unwrap();
  let sentences = Generator::new(&rules)
    .generate_from(Symbol::root())
    .map(|t| tree_printer(&t))
    .collect::<Vec<_>>();
  let short_input = "go to the kitchen please";
  let long_input = "find Alex in the bedroom and bring them the red cup";

  c.bench_function("enumerate grounded", |b| b.iter(|| enumerate(black_box(&rules))));

  c.bench_function("sample one branch", |b| b.iter(|| sample(black_box(&rules), black_box(7))));

  c.bench_function("compile", |b| b.iter(|| compile(black_box(&rules)).is_ok()));

  c.bench_function("parse short", |b| b.iter(|| parse(black_box(&parser), black_box(short_input))));

  c.bench_function("parse long", |b| b.iter(|| parse(black_box(&parser), black_box(long_input))));

  c.bench_function("parse every generated sentence", |b| {
    b.iter(|| sentences.iter().filter(|s| parse(black_box(&parser), s)).count())
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
