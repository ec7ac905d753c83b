//! Scanning helpers shared by the hand-written recursive-descent parsers
//! (rule DSL, knowledge base text, compiled formal grammar).
use regex::Regex;

pub(crate) type Infallible<'a, T> = (T, &'a str);
pub(crate) type ParseResult<'a, T> = Result<(T, &'a str), String>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: regex::Regex = regex::Regex::new($pattern).unwrap();
    }
  };
}
pub(crate) use regex_static;

/// Try to consume a regex, returning None if it doesn't match
pub(crate) fn optional_re<'a>(re: &Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => {
      let (_, rest) = s.split_at(m.end());
      (Some(m.as_str()), rest)
    }
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
pub(crate) fn needed_re<'a>(re: &Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", re, preview(s)))
  }
}

/// Try to consume a char, returning None if it doesn't match
pub(crate) fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
pub(crate) fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", c, preview(s)))
  }
}

/// Skips leading whitespace
pub(crate) fn skip_whitespace(s: &str) -> &str {
  s.trim_start()
}

/// Tries to skip 1 or more \s characters and // comments
pub(crate) fn skip_whitespace_and_comments(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"^(\s|//[^\n]*(\n|$))*");
  optional_re(&WHITESPACE_OR_COMMENT, s).1
}

/// The first few characters of some remaining input, for error messages
pub(crate) fn preview(s: &str) -> String {
  if s.is_empty() {
    return "end of input".to_string();
  }
  let cut: String = s.chars().take(24).collect();
  if cut.len() < s.len() {
    format!("`{}...`", cut)
  } else {
    format!("`{}`", cut)
  }
}

/// Takes a list where each element is a set of choices, and returns all the possible sets
/// generated. Will clone the elements.
///
/// ```
/// let v = vec![
///   vec![1],
///   vec![2, 3],
///   vec![4],
///   vec![5, 6, 7],
/// ];
///
/// assert_eq!(gpsr_grammar::utils::combinations(&v), vec![
///   vec![1, 2, 4, 5],
///   vec![1, 3, 4, 5],
///   vec![1, 2, 4, 6],
///   vec![1, 3, 4, 6],
///   vec![1, 2, 4, 7],
///   vec![1, 3, 4, 7],
/// ]);
/// ```
pub fn combinations<T>(list: &[Vec<T>]) -> Vec<Vec<T>>
where
  T: Clone,
{
  if list.is_empty() {
    Vec::new()
  } else if list.len() == 1 {
    list[0].iter().map(|e| vec![e.clone()]).collect()
  } else {
    let (head, tail) = list.split_at(1);
    let head = &head[0];

    combinations(tail)
      .into_iter()
      .flat_map(|subseq| {
        // prepend every element of the head to every possible subseq
        head.iter().map(move |v| {
          let mut newseq = subseq.clone();
          newseq.insert(0, v.clone());
          newseq
        })
      })
      .collect()
  }
}
