//! Recursive-descent parsing of the formal grammar text that `compile` emits
//!
//! ```text
//! // comment
//! main -> "go" "to" place ( "now" | ) | "stop" ;
//! place -> "kitchen" ;
//! ```
//!
//! Quoted items are terminals, bare names are nonterminals. Each top-level
//! alternative becomes its own rule, and every parenthesized group becomes
//! an auxiliary rule named `<head>--<n>`.
use super::grammar::{GROUP_SEPARATOR, Production, Rule};
use crate::utils::{ParseResult, needed_char, needed_re, optional_char, regex_static, skip_whitespace_and_comments};

/// Tries to parse a name made of letters, numbers, - and _
fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r"^[a-zA-Z0-9\-_]+");
  needed_re(&NAME, s).map_err(|err| format!("name: {}", err))
}

/// A double-quoted word, with `\"` and `\\` escapes
fn parse_terminal(s: &str) -> ParseResult<'_, String> {
  regex_static!(QUOTED, r#"^"(?:[^"\\]|\\.)*""#);
  let (quoted, s) = needed_re(&QUOTED, s).map_err(|err| format!("terminal: {}", err))?;
  let inner = &quoted[1..quoted.len() - 1];

  let mut word = String::with_capacity(inner.len());
  let mut chars = inner.chars();
  while let Some(c) = chars.next() {
    if c == '\\' {
      if let Some(escaped) = chars.next() {
        word.push(escaped);
      }
    } else {
      word.push(c);
    }
  }
  Ok((word, s))
}

/// State shared while one rule statement is parsed
struct RuleContext<'h> {
  head: &'h str,
  groups: usize,
  /// auxiliary rules for groups, emitted after the statement's own rules
  extra: Vec<Rule>,
}

impl RuleContext<'_> {
  fn fresh_group(&mut self) -> String {
    self.groups += 1;
    format!("{}{}{}", self.head, GROUP_SEPARATOR, self.groups)
  }
}

/// Parses a `|`-separated list of sequences up to (not including) `close`
fn parse_alternatives<'a>(
  ctx: &mut RuleContext<'_>,
  close: char,
  s: &'a str,
) -> ParseResult<'a, Vec<Vec<Production>>> {
  let mut alternatives = vec![Vec::new()];
  let mut rem = s;
  loop {
    rem = skip_whitespace_and_comments(rem);
    if rem.starts_with(close) {
      return Ok((alternatives, rem));
    }
    if let (Some(_), s) = optional_char('|', rem) {
      alternatives.push(Vec::new());
      rem = s;
      continue;
    }

    let (production, s) = parse_production(ctx, rem)?;
    if let Some(current) = alternatives.last_mut() {
      current.push(production);
    }
    rem = s;
  }
}

fn parse_production<'a>(ctx: &mut RuleContext<'_>, s: &'a str) -> ParseResult<'a, Production> {
  if s.starts_with('"') {
    let (word, s) = parse_terminal(s)?;
    return Ok((Production::Terminal(word), s));
  }

  if let (Some(_), s) = optional_char('(', s) {
    let symbol = ctx.fresh_group();
    let (alternatives, s) = parse_alternatives(ctx, ')', s)?;
    let (_, s) = needed_char(')', s)?;
    for productions in alternatives {
      ctx.extra.push(Rule::new(symbol.clone(), productions));
    }
    return Ok((Production::Nonterminal(symbol), s));
  }

  let (name, s) = parse_name(s).map_err(|e| format!("production: {}", e))?;
  Ok((Production::Nonterminal(name.to_string()), s))
}

/// Symbol, arrow, alternatives, terminated by `;`
fn parse_rule(s: &str) -> ParseResult<'_, Vec<Rule>> {
  #![allow(clippy::trivial_regex)]
  regex_static!(ARROW, "^->");

  let (head, s) = parse_name(s).map_err(|e| format!("rule symbol: {}", e))?;
  let s = skip_whitespace_and_comments(s);
  let (_, s) = needed_re(&ARROW, s).map_err(|e| format!("rule arrow: {}", e))?;

  let mut ctx = RuleContext {
    head,
    groups: 0,
    extra: Vec::new(),
  };
  let (alternatives, s) = parse_alternatives(&mut ctx, ';', s).map_err(|e| format!("rule {}: {}", head, e))?;
  let (_, s) = needed_char(';', s)?;

  let mut rules = alternatives
    .into_iter()
    .map(|productions| Rule::new(head, productions))
    .collect::<Vec<_>>();
  rules.append(&mut ctx.extra);
  Ok((rules, s))
}

pub(crate) fn parse_rules(s: &str) -> ParseResult<'_, Vec<Rule>> {
  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace_and_comments(rem);
    if rem.is_empty() {
      return Ok((rules, rem));
    }
    let (mut parsed, s) = parse_rule(rem)?;
    rules.append(&mut parsed);
    rem = s;
  }
}

/// Quotes a word as a terminal, escaping `"` and `\`
pub(crate) fn quote_terminal(s: &str) -> String {
  let mut quoted = String::with_capacity(s.len() + 2);
  quoted.push('"');
  for c in s.chars() {
    if c == '"' || c == '\\' {
      quoted.push('\\');
    }
    quoted.push(c);
  }
  quoted.push('"');
  quoted
}

#[cfg(test)]
mod tests {
  use super::*;

  fn render(rules: &[Rule]) -> Vec<String> {
    rules.iter().map(|r| r.to_string()).collect()
  }

  #[test]
  fn test_alternatives_split() {
    let (rules, rest) = parse_rules(
      r#"
      // greeting
      main -> "hi" name | "hello" ;
      name -> "robot" ;
      "#,
    )
    .unwrap();
    assert!(rest.is_empty());
    assert_eq!(
      render(&rules),
      vec![r#"main -> "hi" name;"#, r#"main -> "hello";"#, r#"name -> "robot";"#]
    );
  }

  #[test]
  fn test_groups_become_rules() {
    let (rules, _) = parse_rules(r#"main -> "go" ( "now" | ( "a" | "b" ) "c" | ) ;"#).unwrap();
    assert_eq!(
      render(&rules),
      vec![
        r#"main -> "go" main--1;"#,
        r#"main--2 -> "a";"#,
        r#"main--2 -> "b";"#,
        r#"main--1 -> "now";"#,
        r#"main--1 -> main--2 "c";"#,
        r#"main--1 ->;"#,
      ]
    );
  }

  #[test]
  fn test_escaped_terminals() {
    let (rules, _) = parse_rules(r#"main -> "say \"hi\"" "a\\b" ;"#).unwrap();
    assert_eq!(
      rules[0].productions,
      vec![
        Production::Terminal(r#"say "hi""#.to_string()),
        Production::Terminal(r"a\b".to_string()),
      ]
    );
    assert_eq!(quote_terminal(r#"say "hi""#), r#""say \"hi\"""#);
  }

  #[test]
  fn test_errors() {
    assert!(parse_rules("main \"x\" ;").is_err());
    assert!(parse_rules("main -> ( \"x\" ;").is_err());
    assert!(parse_rules("main -> \"x\"").is_err());
  }
}
