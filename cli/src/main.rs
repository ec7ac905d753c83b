use std::env;
use std::error::Error;
use std::io;
use std::io::Write;
use std::process;

use gpsr_grammar::{
  Anonymizer, AnonymizingParser, GenerationConfig, Generator, Grounder, KnowledgeBase, PairedGenerator,
  RuleTable, SemanticsTable, Symbol, SynTree, UtteranceParser, compile, format_pairs, tree_printer,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::prelude::*;

type Err = Box<dyn Error + 'static>;

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} GRAMMAR... [options]

Without -g, reads sentences from stdin and prints their parse.

Options:
  -h, --help            Print this message
  -k, --knowledge FILE  Vocabulary to ground wildcards with
  -s, --semantics FILE  Logical-form annotations; -g then prints pairs
  -g, --generate N      Print N generated sentences instead of parsing
      --seed N          Sample randomly with this seed (default: enumerate in order)
      --cap N           Explore at most N productions per expansion
      --anonymize       Parse anonymized input (needs -k)",
    prog_name
  )
}

struct Args {
  grammars: Vec<String>,
  knowledge: Option<String>,
  semantics: Option<String>,
  generate: Option<usize>,
  seed: Option<u64>,
  cap: Option<usize>,
  anonymize: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    let mut iter = v.into_iter();
    let Some(prog_name) = iter.next() else {
      return Err(Self::make_error_message("bad argument vector", "gpsr"));
    };

    let mut args = Self {
      grammars: Vec::new(),
      knowledge: None,
      semantics: None,
      generate: None,
      seed: None,
      cap: None,
      anonymize: false,
    };

    fn number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
      value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| format!("{} needs a number", flag))
    }

    while let Some(o) = iter.next() {
      let result: Result<(), String> = match o.as_str() {
        "-h" | "--help" => {
          println!("{}", usage(&prog_name));
          process::exit(0);
        }
        "-k" | "--knowledge" => iter
          .next()
          .map(|f| args.knowledge = Some(f))
          .ok_or_else(|| format!("{} needs a file", o)),
        "-s" | "--semantics" => iter
          .next()
          .map(|f| args.semantics = Some(f))
          .ok_or_else(|| format!("{} needs a file", o)),
        "-g" | "--generate" => number(&o, iter.next()).map(|n| args.generate = Some(n)),
        "--seed" => number(&o, iter.next()).map(|n| args.seed = Some(n)),
        "--cap" => number(&o, iter.next()).map(|n| args.cap = Some(n)),
        "--anonymize" => {
          args.anonymize = true;
          Ok(())
        }
        flag if flag.starts_with('-') => Err(format!("unknown option {}", flag)),
        _ => {
          args.grammars.push(o.clone());
          Ok(())
        }
      };
      result.map_err(|msg| Self::make_error_message(&msg, &prog_name))?;
    }

    if args.grammars.is_empty() {
      return Err(Self::make_error_message("missing grammar file", prog_name));
    }
    if args.anonymize && args.knowledge.is_none() {
      return Err(Self::make_error_message("--anonymize needs -k", prog_name));
    }
    Ok(args)
  }

  fn config(&self) -> GenerationConfig {
    match self.cap {
      Some(cap) => GenerationConfig::default().with_branch_cap(cap),
      None => GenerationConfig::default(),
    }
  }
}

fn load_knowledge(path: &Option<String>) -> Result<Option<KnowledgeBase>, Err> {
  match path {
    Some(path) => Ok(Some(std::fs::read_to_string(path)?.parse()?)),
    None => Ok(None),
  }
}

fn generate(opts: &Args, rules: &RuleTable, kb: Option<&KnowledgeBase>, n: usize) -> Result<(), Err> {
  let mut generation_rng = opts.seed.map(StdRng::seed_from_u64);
  let mut grounding_rng = opts.seed.map(|s| StdRng::seed_from_u64(s.wrapping_add(1)));
  let mut grounder = match (kb, grounding_rng.as_mut()) {
    (Some(kb), Some(rng)) => Some(Grounder::new(kb).with_rng(rng)),
    (Some(kb), None) => Some(Grounder::new(kb)),
    (None, _) => None,
  };

  let mut out = io::stdout().lock();
  if let Some(path) = &opts.semantics {
    let mut semantics = SemanticsTable::new();
    semantics.load_semantics_file(path)?;

    let mut paired = PairedGenerator::new(rules, &semantics).with_config(opts.config());
    if let Some(rng) = generation_rng.as_mut() {
      paired = paired.with_rng(rng);
    }
    let mut pairs = Vec::new();
    for (utterance, semantics) in paired.generate_from(Symbol::root(), true) {
      if pairs.len() == n {
        break;
      }
      match grounder.as_mut() {
        Some(grounder) => {
          if let Some(pair) = grounder.ground_pair(&utterance, semantics.as_ref())? {
            pairs.push(pair);
          }
        }
        None => pairs.push((utterance, semantics)),
      }
    }
    write!(out, "{}", format_pairs(pairs))?;
    return Ok(());
  }

  let mut generator = Generator::new(rules).with_config(opts.config());
  if let Some(rng) = generation_rng.as_mut() {
    generator = generator.with_rng(rng);
  }
  let mut printed = 0;
  for sentence in generator.generate_from(Symbol::root()) {
    if printed == n {
      break;
    }
    let sentence = match grounder.as_mut() {
      Some(grounder) => match grounder.ground(&sentence)? {
        Some(grounded) => grounded,
        None => continue,
      },
      None => sentence,
    };
    writeln!(out, "{}", tree_printer(&sentence))?;
    printed += 1;
  }
  Ok(())
}

fn repl<P>(parser: &P) -> Result<(), Err>
where
  P: UtteranceParser<Output = SynTree<String, String>>,
{
  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    input.clear();
    if io::stdin().read_line(&mut input)? == 0 {
      // ctrl+d
      return Ok(());
    }
    match parser.parse(input.trim()) {
      Some(tree) => println!("{}", tree),
      None => println!("no parse"),
    }
  }
}

fn main() -> Result<(), Err> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
    .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let rules = RuleTable::from_files(&opts.grammars)?;
  let kb = load_knowledge(&opts.knowledge)?;

  if let Some(n) = opts.generate {
    return generate(&opts, &rules, kb.as_ref(), n);
  }

  match kb {
    Some(kb) if opts.anonymize => {
      let parser = compile(&rules.with_anonymized_rules(false))?;
      repl(&AnonymizingParser::new(parser, Anonymizer::new(&kb)))
    }
    Some(kb) => repl(&compile(&rules.with_grounding_rules(&kb)?)?),
    None => repl(&compile(&rules)?),
  }
}
