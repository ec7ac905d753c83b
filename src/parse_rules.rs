//! Simple recursive-descent parsing of grammar rule lines, wildcard specs and
//! logical-form annotations.
//!
//! ```text
//! $Head = go to the {location placement 1} and (get | grab) the {object}
//! bring me the {object} = bring(me, {object})
//! ```
use crate::knowledge::parse_attr_value;
use crate::symbol::{Symbol, Wildcard};
use crate::tree::Tree;
use crate::utils::{ParseResult, needed_char, needed_re, optional_char, optional_re, regex_static, skip_whitespace};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
  Utterance,
  LogicalForm,
}

impl Mode {
  /// Characters that end a sequence instead of starting an item
  fn stops(self, c: char) -> bool {
    match self {
      Self::Utterance => matches!(c, ')' | '|' | '}'),
      Self::LogicalForm => matches!(c, ')' | '|' | '}' | ',' | '"'),
    }
  }
}

/// Lines that are blank or start with `#`, `;` or `//`
pub fn is_comment(line: &str) -> bool {
  let line = line.trim();
  line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with("//")
}

/// Some grammar files carry byte order marks and other junk
pub fn scrub(line: &str) -> String {
  line
    .chars()
    .filter(|c| !c.is_control() || *c == '\t')
    .filter(|c| *c != '\u{feff}')
    .collect::<String>()
    .trim()
    .to_string()
}

/// Parses a `$Head = expansion` line. Returns None for comments.
pub fn parse_rule_line(line: &str) -> Result<Option<(Symbol, Tree)>, String> {
  if is_comment(line) {
    return Ok(None);
  }
  let s = skip_whitespace(line);
  let (head, s) = parse_head(s)?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char('=', s).map_err(|e| format!("rule: {}", e))?;
  let expansion = parse_expansion(s)?;
  Ok(Some((head, expansion)))
}

fn parse_head(s: &str) -> ParseResult<'_, Symbol> {
  match s.chars().next() {
    Some('$') => parse_nonterminal(s),
    Some('{') => parse_wildcard(s).map(|(w, rest)| (Symbol::Wildcard(w), rest)),
    _ => Err(format!("rule head must be $Name or {{wildcard}} at {}", crate::utils::preview(s))),
  }
}

/// Parses the right-hand side of a rule, which must consume the whole input
pub fn parse_expansion(s: &str) -> Result<Tree, String> {
  parse_all(s, Mode::Utterance)
}

/// Parses a logical form such as `(lambda $1:e . at($1, {location}))`
pub fn parse_logical_form(s: &str) -> Result<Tree, String> {
  parse_all(s, Mode::LogicalForm)
}

/// Parses a `<utterance-pattern> = <logical-form>` line. Returns None for
/// comments and lines without a top-level `=`.
pub fn parse_annotation_line(line: &str) -> Result<Option<(Tree, Tree)>, String> {
  if is_comment(line) {
    return Ok(None);
  }
  let Some(split) = find_top_level_eq(line) else {
    return Ok(None);
  };
  let (utterance, semantics) = (&line[..split], &line[split + 1..]);
  let utterance = parse_expansion(utterance).map_err(|e| format!("utterance pattern: {}", e))?;
  if utterance.children().is_empty() {
    return Ok(None);
  }
  let semantics = parse_logical_form(semantics).map_err(|e| format!("logical form: {}", e))?;
  Ok(Some((utterance, semantics)))
}

/// `=` inside a wildcard's `where` clause doesn't count
fn find_top_level_eq(line: &str) -> Option<usize> {
  let mut depth = 0usize;
  for (idx, c) in line.char_indices() {
    match c {
      '{' => depth += 1,
      '}' => depth = depth.saturating_sub(1),
      '=' if depth == 0 => return Some(idx),
      _ => {}
    }
  }
  None
}

fn parse_all(s: &str, mode: Mode) -> Result<Tree, String> {
  let (tree, rest) = parse_alternatives(s, mode)?;
  let rest = skip_whitespace(rest);
  if !rest.is_empty() {
    return Err(format!("unexpected {}", crate::utils::preview(rest)));
  }
  Ok(tree)
}

/// `a b | c d`. A single branch is a plain sequence, several are a choice.
fn parse_alternatives(s: &str, mode: Mode) -> ParseResult<'_, Tree> {
  let mut branches = Vec::new();
  let mut rem = s;
  loop {
    let (items, s) = parse_sequence(rem, mode)?;
    branches.push(Tree::Expression(items));
    let s = skip_whitespace(s);
    if let (Some(_), s) = optional_char('|', s) {
      rem = s;
    } else {
      rem = s;
      break;
    }
  }

  if branches.len() == 1 {
    Ok((branches.remove(0), rem))
  } else {
    Ok((Tree::Choice(branches), rem))
  }
}

fn parse_sequence(s: &str, mode: Mode) -> ParseResult<'_, Vec<Tree>> {
  let mut items = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    match rem.chars().next() {
      None => break,
      Some(c) if mode.stops(c) => break,
      _ => {}
    }
    let (item, s) = match mode {
      Mode::Utterance => parse_item(rem)?,
      Mode::LogicalForm => parse_lf_item(rem)?,
    };
    items.push(item);
    rem = s;
  }
  Ok((items, rem))
}

fn parse_item(s: &str) -> ParseResult<'_, Tree> {
  regex_static!(WORD, r"^[^\s(){}|$]+");

  match s.chars().next() {
    Some('(') => parse_choice(s, Mode::Utterance),
    Some('$') => parse_nonterminal(s).map(|(nt, rest)| (Tree::Leaf(nt), rest)),
    Some('{') => parse_wildcard(s).map(|(w, rest)| (Tree::Leaf(Symbol::Wildcard(w)), rest)),
    _ => {
      let (word, rest) = needed_re(&WORD, s).map_err(|e| format!("word: {}", e))?;
      Ok((Tree::Leaf(Symbol::text(word)), rest))
    }
  }
}

/// `( a | b c )`. Always a choice in an utterance, even with one branch.
fn parse_choice(s: &str, mode: Mode) -> ParseResult<'_, Tree> {
  let (_, s) = needed_char('(', s)?;
  let (tree, s) = parse_alternatives(s, mode)?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char(')', s).map_err(|e| format!("choice: {}", e))?;
  let tree = match tree {
    Tree::Choice(_) => tree,
    single if mode == Mode::Utterance => Tree::Choice(vec![single]),
    single => Tree::Group(Box::new(single)),
  };
  Ok((tree, s))
}

fn parse_nonterminal(s: &str) -> ParseResult<'_, Symbol> {
  regex_static!(NAME, r"^[A-Za-z0-9_]+");
  let (_, s) = needed_char('$', s)?;
  let (name, s) = needed_re(&NAME, s).map_err(|e| format!("nonterminal: {}", e))?;
  Ok((Symbol::nonterminal(name), s))
}

/// `{name[?] [subtype] [id][?] [where k=v [and k=v]*] [meta: ...]}`
fn parse_wildcard(s: &str) -> ParseResult<'_, Wildcard> {
  regex_static!(NAME, r"^[A-Za-z]+");
  regex_static!(ID, r"^[0-9]+");
  regex_static!(KEYWORD, r"^(where\b|meta:)");

  let (_, s) = needed_char('{', s)?;
  let s = skip_whitespace(s);
  let (name, mut rem) = needed_re(&NAME, s).map_err(|e| format!("wildcard name: {}", e))?;
  let mut wildcard = Wildcard::new(name);

  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char('}', rem) {
      rem = s;
      break;
    }
    if let (Some(_), s) = optional_char('?', rem) {
      wildcard.obfuscated = true;
      rem = s;
    } else if let (Some(id), s) = optional_re(&ID, rem) {
      if wildcard.id.is_some() {
        return Err(format!("wildcard {} has two ids", name));
      }
      wildcard.id = Some(id.parse().map_err(|e| format!("wildcard id {}: {}", id, e))?);
      rem = s;
    } else if let (Some(keyword), s) = optional_re(&KEYWORD, rem) {
      if keyword == "where" {
        let (conditions, s) = parse_conditions(s)?;
        wildcard.conditions.extend(conditions);
        rem = s;
      } else {
        let (meta, s) = parse_alternatives(s, Mode::Utterance)?;
        wildcard.metadata = Some(match meta {
          Tree::Expression(items) => items,
          choice => vec![choice],
        });
        rem = s;
      }
    } else if let (Some(subtype), s) = optional_re(&NAME, rem) {
      if wildcard.subtype.is_some() {
        return Err(format!("wildcard {} has two subtypes", name));
      }
      wildcard.subtype = Some(subtype.to_string());
      rem = s;
    } else {
      return Err(format!("bad wildcard {} at {}", name, crate::utils::preview(rem)));
    }
  }

  Ok((wildcard.canonicalize()?, rem))
}

/// `key="value" and key=true`
fn parse_conditions(s: &str) -> ParseResult<'_, Vec<(String, crate::knowledge::AttrValue)>> {
  regex_static!(KEY, r"^[A-Za-z_][A-Za-z0-9_]*");
  regex_static!(AND, r"^and\b");

  let mut conditions = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    let (key, s) = needed_re(&KEY, rem).map_err(|e| format!("condition: {}", e))?;
    let s = skip_whitespace(s);
    let (_, s) = needed_char('=', s)?;
    let s = skip_whitespace(s);
    let (value, s) = parse_attr_value(s)?;
    conditions.push((key.to_ascii_lowercase(), value));

    let s = skip_whitespace(s);
    match optional_re(&AND, s) {
      (Some(_), s) => rem = s,
      (None, s) => return Ok((conditions, s)),
    }
  }
}

fn parse_lf_item(s: &str) -> ParseResult<'_, Tree> {
  regex_static!(LAMBDA, r"^\(\s*lambda\b");
  regex_static!(VARIABLE, r"^\$[0-9]+");
  regex_static!(PREDICATE, r"^[A-Za-z_][A-Za-z0-9_\-]*\(");
  regex_static!(WORD, r#"^[^\s(){}|$,"]+"#);

  if let (Some(_), rest) = optional_re(&LAMBDA, s) {
    return parse_lambda(rest);
  }
  if let (Some(var), rest) = optional_re(&VARIABLE, s) {
    return Ok((Tree::Leaf(Symbol::text(var)), rest));
  }
  if let (Some(head), rest) = optional_re(&PREDICATE, s) {
    return parse_predicate_args(&head[..head.len() - 1], rest);
  }

  match s.chars().next() {
    Some('(') => parse_choice(s, Mode::LogicalForm),
    Some('$') => parse_nonterminal(s).map(|(nt, rest)| (Tree::Leaf(nt), rest)),
    Some('{') => parse_wildcard(s).map(|(w, rest)| (Tree::Leaf(Symbol::Wildcard(w)), rest)),
    Some('"') => {
      let (_, s) = needed_char('"', s)?;
      let (items, s) = parse_sequence(s, Mode::LogicalForm)?;
      let (_, s) = needed_char('"', s).map_err(|e| format!("string constant: {}", e))?;
      Ok((Tree::Constant(Box::new(Tree::Expression(items))), s))
    }
    _ => {
      let (word, rest) = needed_re(&WORD, s).map_err(|e| format!("logical form: {}", e))?;
      Ok((Tree::Leaf(Symbol::text(word)), rest))
    }
  }
}

/// After the opening `name(`: `arg, arg)`
fn parse_predicate_args<'a>(name: &str, s: &'a str) -> ParseResult<'a, Tree> {
  let mut args = Vec::new();
  let mut rem = skip_whitespace(s);
  if let (Some(_), s) = optional_char(')', rem) {
    return Ok((Tree::Predicate(name.to_string(), args), s));
  }
  loop {
    let (arg, s) = parse_alternatives(rem, Mode::LogicalForm)?;
    args.push(arg);
    let s = skip_whitespace(s);
    if let (Some(_), s) = optional_char(',', s) {
      rem = s;
      continue;
    }
    let (_, s) = needed_char(')', s).map_err(|e| format!("predicate {}: {}", name, e))?;
    return Ok((Tree::Predicate(name.to_string(), args), s));
  }
}

/// After the opening `(lambda`: `$1:type . body)`
fn parse_lambda(s: &str) -> ParseResult<'_, Tree> {
  regex_static!(VARIABLE, r"^\$[A-Za-z0-9_]+");
  regex_static!(TYPE, r"^[A-Za-z_][A-Za-z0-9_]*");

  let s = skip_whitespace(s);
  let (var, s) = needed_re(&VARIABLE, s).map_err(|e| format!("lambda variable: {}", e))?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char(':', s)?;
  let s = skip_whitespace(s);
  let (ty, s) = needed_re(&TYPE, s).map_err(|e| format!("lambda type: {}", e))?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char('.', s)?;
  let (body, s) = parse_alternatives(s, Mode::LogicalForm)?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char(')', s).map_err(|e| format!("lambda: {}", e))?;
  Ok((
    Tree::Lambda {
      var: var.to_string(),
      ty: ty.to_string(),
      body: Box::new(body),
    },
    s,
  ))
}
