use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::utils::{ParseResult, needed_char, needed_re, optional_char, optional_re, regex_static, skip_whitespace};

/// The value of a vocabulary attribute, e.g. `isplacement = true` or
/// `category = "fruit"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrValue {
  Bool(bool),
  Str(String),
}

impl fmt::Display for AttrValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bool(b) => write!(f, "{}", b),
      Self::Str(s) => write!(f, "\"{}\"", s),
    }
  }
}

impl From<bool> for AttrValue {
  fn from(b: bool) -> Self {
    Self::Bool(b)
  }
}

impl From<&str> for AttrValue {
  fn from(s: &str) -> Self {
    Self::Str(s.to_string())
  }
}

/// Parses `"quoted"`, `true`, `false`, or a bare word
pub(crate) fn parse_attr_value(s: &str) -> ParseResult<'_, AttrValue> {
  regex_static!(QUOTED, r#"^"[^"]*""#);
  regex_static!(BARE, r"^[A-Za-z0-9_\-\.]+");

  if let (Some(quoted), rest) = optional_re(&QUOTED, s) {
    return Ok((AttrValue::Str(quoted[1..quoted.len() - 1].to_string()), rest));
  }
  let (word, rest) = needed_re(&BARE, s).map_err(|e| format!("attribute value: {}", e))?;
  let value = match word {
    "true" => AttrValue::Bool(true),
    "false" => AttrValue::Bool(false),
    other => AttrValue::Str(other.to_string()),
  };
  Ok((value, rest))
}

type AttributeTable = HashMap<String, HashMap<String, AttrValue>>;

/// Vocabulary available for grounding: values per category, plus per-value
/// attributes per category.
///
/// Loaded once and read-only while generating. Attribute names are
/// case-insensitive and stored lower-cased.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
  by_name: IndexMap<String, Vec<String>>,
  attributes: HashMap<String, AttributeTable>,
}

impl KnowledgeBase {
  pub fn new() -> Self {
    Default::default()
  }

  /// Adds values to a category, keeping first-seen order and dropping repeats
  pub fn with_values<I, S>(mut self, category: &str, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.add_values(category, values);
    self
  }

  pub fn add_values<I, S>(&mut self, category: &str, values: I)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let entry = self.by_name.entry(category.to_string()).or_default();
    for value in values {
      let value = value.into();
      if !entry.contains(&value) {
        entry.push(value);
      }
    }
  }

  pub fn with_attribute(mut self, category: &str, value: &str, attr: &str, attr_value: impl Into<AttrValue>) -> Self {
    self.set_attribute(category, value, attr, attr_value);
    self
  }

  pub fn set_attribute(&mut self, category: &str, value: &str, attr: &str, attr_value: impl Into<AttrValue>) {
    self
      .attributes
      .entry(category.to_string())
      .or_default()
      .entry(attr.to_ascii_lowercase())
      .or_default()
      .insert(value.to_string(), attr_value.into());
  }

  pub fn values(&self, category: &str) -> Option<&[String]> {
    self.by_name.get(category).map(|v| v.as_slice())
  }

  pub fn categories(&self) -> impl Iterator<Item = (&str, &[String])> {
    self.by_name.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
  }

  pub fn has_attribute(&self, category: &str, attr: &str) -> bool {
    self
      .attributes
      .get(category)
      .is_some_and(|table| table.contains_key(&attr.to_ascii_lowercase()))
  }

  /// Looks up `attr` for one value. `Ok(None)` means the attribute exists for
  /// the category but this value doesn't set it.
  pub fn attribute(&self, category: &str, value: &str, attr: &str) -> Result<Option<&AttrValue>> {
    let table = self
      .attributes
      .get(category)
      .and_then(|table| table.get(&attr.to_ascii_lowercase()))
      .ok_or_else(|| Error::UnknownAttribute {
        category: category.to_string(),
        key: attr.to_string(),
      })?;
    Ok(table.get(value))
  }

  /// Values of `category` whose attribute `attr` equals `expected`. An unset
  /// boolean attribute counts as `false`.
  pub fn satisfies(&self, category: &str, value: &str, attr: &str, expected: &AttrValue) -> Result<bool> {
    Ok(match (self.attribute(category, value, attr)?, expected) {
      (Some(actual), expected) => actual == expected,
      (None, AttrValue::Bool(false)) => true,
      (None, _) => false,
    })
  }
}

/// One vocabulary line: `category: value [attr=val, attr=val]`
fn parse_entry(s: &str) -> ParseResult<'_, (&str, &str, Vec<(&str, AttrValue)>)> {
  regex_static!(CATEGORY, r"^[A-Za-z_][A-Za-z0-9_]*");
  regex_static!(VALUE, r"^[^\[]+");
  regex_static!(ATTR, r"^[A-Za-z_][A-Za-z0-9_]*");

  let (category, s) = needed_re(&CATEGORY, s).map_err(|e| format!("category: {}", e))?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char(':', s)?;
  let s = skip_whitespace(s);
  let (value, s) = needed_re(&VALUE, s).map_err(|e| format!("value: {}", e))?;
  let value = value.trim();
  if value.is_empty() {
    return Err("empty value".into());
  }

  let mut attrs = Vec::new();
  let (open, mut rem) = optional_char('[', s);
  if open.is_some() {
    loop {
      rem = skip_whitespace(rem);
      if let (Some(_), s) = optional_char(']', rem) {
        rem = s;
        break;
      }
      let (attr, s) = needed_re(&ATTR, rem).map_err(|e| format!("attribute: {}", e))?;
      let s = skip_whitespace(s);
      let (_, s) = needed_char('=', s)?;
      let s = skip_whitespace(s);
      let (attr_value, s) = parse_attr_value(s)?;
      attrs.push((attr, attr_value));
      let s = skip_whitespace(s);
      rem = optional_char(',', s).1;
    }
  }

  Ok(((category, value, attrs), rem))
}

impl FromStr for KnowledgeBase {
  type Err = Error;

  /// Parses line-delimited vocabulary:
  ///
  /// ```text
  /// # comment
  /// object: apple [category="fruit", canpour=false]
  /// location: kitchen table [isplacement=true]
  /// ```
  fn from_str(s: &str) -> Result<Self> {
    let mut kb = Self::new();
    for (idx, line) in s.lines().enumerate() {
      let trimmed = line.trim();
      if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
        continue;
      }
      let ((category, value, attrs), rest) = parse_entry(trimmed).map_err(|e| Error::syntax(idx + 1, line, e))?;
      if !rest.trim().is_empty() {
        return Err(Error::syntax(idx + 1, line, "trailing input after attributes"));
      }
      kb.add_values(category, [value]);
      for (attr, attr_value) in attrs {
        kb.set_attribute(category, value, attr, attr_value);
      }
    }
    Ok(kb)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_knowledge_base() {
    let kb: KnowledgeBase = r#"
      # objects
      object: apple [category="fruit", canpour=false]
      object: milk [category=drink, canPour=true]
      object: apple
      location: kitchen table [isplacement=true]
      room: living room
    "#
    .parse()
    .unwrap();

    assert_eq!(kb.values("object").unwrap(), ["apple", "milk"]);
    assert_eq!(kb.values("room").unwrap(), ["living room"]);
    assert_eq!(
      kb.attribute("object", "milk", "CANPOUR").unwrap(),
      Some(&AttrValue::Bool(true))
    );
    assert_eq!(
      kb.attribute("object", "apple", "category").unwrap(),
      Some(&AttrValue::Str("fruit".into()))
    );
    assert!(kb.has_attribute("location", "isPlacement"));
    assert!(kb.values("name").is_none());
  }

  #[test]
  fn test_unknown_attribute() {
    let kb = KnowledgeBase::new().with_values("object", ["apple"]);
    assert!(matches!(
      kb.satisfies("object", "apple", "color", &"red".into()),
      Err(Error::UnknownAttribute { .. })
    ));
  }

  #[test]
  fn test_unset_bool_is_false() {
    let kb = KnowledgeBase::new()
      .with_values("location", ["bed", "kitchen"])
      .with_attribute("location", "kitchen", "isroom", true);
    assert!(kb.satisfies("location", "bed", "isroom", &false.into()).unwrap());
    assert!(!kb.satisfies("location", "bed", "isroom", &true.into()).unwrap());
    assert!(kb.satisfies("location", "kitchen", "isroom", &true.into()).unwrap());
  }

  #[test]
  fn test_malformed_line() {
    let err = "object apple".parse::<KnowledgeBase>().unwrap_err();
    assert!(matches!(err, Error::Syntax { line: 1, .. }));
  }
}
