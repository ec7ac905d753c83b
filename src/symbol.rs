use std::fmt;
use std::hash::{Hash, Hasher};

use crate::knowledge::AttrValue;
use crate::tree::Tree;

/// The GPSR grammars all have this as their root
pub const ROOT: &str = "Main";

/// Wildcard names that can be obfuscated with `?`
const OBFUSCATABLE: [&str; 3] = ["object", "location", "category"];

/// A grammar symbol: literal text, a `$NonTerminal` reference, or a typed
/// `{wildcard}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
  Text(String),
  NonTerminal(String),
  Wildcard(Wildcard),
}

impl Symbol {
  pub fn text(s: impl Into<String>) -> Self {
    Self::Text(s.into())
  }

  pub fn nonterminal(name: impl Into<String>) -> Self {
    Self::NonTerminal(name.into())
  }

  pub fn root() -> Self {
    Self::NonTerminal(ROOT.to_string())
  }

  pub fn is_text(&self) -> bool {
    matches!(self, Self::Text(_))
  }

  pub fn is_nonterminal(&self) -> bool {
    matches!(self, Self::NonTerminal(_))
  }

  /// Nonterminals and wildcards: anything a finished sentence shouldn't contain
  pub fn is_placeholder(&self) -> bool {
    !self.is_text()
  }

  pub fn wildcard(&self) -> Option<&Wildcard> {
    match self {
      Self::Wildcard(w) => Some(w),
      _ => None,
    }
  }

  pub fn is_void(&self) -> bool {
    self.wildcard().is_some_and(Wildcard::is_void)
  }
}

impl From<Wildcard> for Symbol {
  fn from(w: Wildcard) -> Self {
    Self::Wildcard(w)
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Text(s) => write!(f, "{}", s),
      Self::NonTerminal(name) => write!(f, "${}", name),
      Self::Wildcard(w) => write!(f, "{}", w),
    }
  }
}

/// A typed placeholder for an object, location, name, gesture, category...
///
/// Identity is `name`, `subtype`, `id` and `obfuscated`: two occurrences with
/// the same identity are the same slot and must be filled the same way.
/// Conditions and metadata ride along but don't take part in equality.
#[derive(Debug, Clone)]
pub struct Wildcard {
  pub name: String,
  pub subtype: Option<String>,
  pub id: Option<u32>,
  pub obfuscated: bool,
  pub conditions: Vec<(String, AttrValue)>,
  pub metadata: Option<Vec<Tree>>,
}

impl PartialEq for Wildcard {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
      && self.subtype == other.subtype
      && self.id == other.id
      && self.obfuscated == other.obfuscated
  }
}

impl Eq for Wildcard {}

impl Hash for Wildcard {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name.hash(state);
    self.subtype.hash(state);
    self.id.hash(state);
    self.obfuscated.hash(state);
  }
}

impl Wildcard {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      subtype: None,
      id: None,
      obfuscated: false,
      conditions: Vec::new(),
      metadata: None,
    }
  }

  pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
    self.subtype = Some(subtype.into());
    self
  }

  pub fn with_id(mut self, id: u32) -> Self {
    self.id = Some(id);
    self
  }

  pub fn with_obfuscation(mut self) -> Self {
    self.obfuscated = true;
    self
  }

  pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
    self.conditions.push((key.into(), value.into()));
    self
  }

  /// Resolves the shorthand wildcard names (`{kobject}`, `{room}`...) and
  /// pronoun spellings into their canonical form, and checks that only
  /// object, location and category wildcards are obfuscated.
  pub(crate) fn canonicalize(mut self) -> Result<Self, String> {
    let alias: Option<(&'static str, &'static str)> = match self.name.as_str() {
      "kobject" => Some(("object", "known")),
      "aobject" => Some(("object", "alike")),
      "sobject" => Some(("object", "special")),
      "room" => Some(("location", "room")),
      "beacon" => Some(("location", "beacon")),
      "placement" => Some(("location", "placement")),
      _ => None,
    };
    if let Some((name, implied)) = alias {
      if self.subtype.as_deref().is_some_and(|s| s != implied) {
        return Err(format!("{{{}}} can't also have subtype {:?}", self.name, self.subtype));
      }
      self.name = name.to_string();
      self.subtype = Some(implied.to_string());
    }

    if self.name == "pron" {
      self.subtype = match self.subtype.as_deref() {
        None | Some("obj") => None,
        Some("sub") => Some("sub".to_string()),
        Some("pos") | Some("paj") | Some("posadj") => Some("paj".to_string()),
        Some("pab") | Some("pabs") | Some("posabs") => Some("pabs".to_string()),
        Some(other) => return Err(format!("unknown pronoun type {}", other)),
      };
    }

    if self.obfuscated && !OBFUSCATABLE.contains(&self.name.as_str()) {
      return Err(format!("{{{}}} can't be obfuscated", self.name));
    }
    Ok(self)
  }

  /// Referee-only annotations that never show up in a rendered sentence
  pub fn is_void(&self) -> bool {
    self.name == "void"
  }

  pub fn is_pronoun(&self) -> bool {
    self.name == "pron"
  }

  /// The plain `{pron}`, which logical forms leave out by convention
  pub fn is_indeterminate_pronoun(&self) -> bool {
    self.is_pronoun() && self.subtype.is_none() && self.id.is_none()
  }

  /// Identity fields joined with underscores: `location_placement_1`
  pub fn to_snake_case(&self) -> String {
    let mut out = self.name.clone();
    if let Some(subtype) = &self.subtype {
      out.push('_');
      out.push_str(subtype);
    }
    if let Some(id) = self.id {
      out.push_str(&format!("_{}", id));
    }
    if self.obfuscated {
      out.push_str("_obf");
    }
    out
  }

  /// The marker an anonymizer puts in place of a value for this wildcard.
  /// Rooms are disjoint from other locations, so they keep their own marker.
  pub fn anonymized_marker(&self) -> String {
    if self.subtype.as_deref() == Some("room") {
      "<room>".to_string()
    } else {
      format!("<{}>", self.name)
    }
  }

  /// The full rule-file spelling, including conditions and metadata
  pub fn to_spec(&self) -> String {
    let mut out = self.to_string();
    out.pop();
    for (idx, (key, value)) in self.conditions.iter().enumerate() {
      out.push_str(if idx == 0 { " where " } else { " and " });
      out.push_str(&format!("{}={}", key, value));
    }
    if let Some(meta) = self.render_metadata() {
      out.push_str(" meta: ");
      out.push_str(&meta);
    }
    out.push('}');
    out
  }

  pub fn render_metadata(&self) -> Option<String> {
    self.metadata.as_ref().map(|meta| {
      meta
        .iter()
        .map(|t| t.to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    })
  }
}

impl fmt::Display for Wildcard {
  /// The canonical bracket form, `{location placement 1}`
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{{{}", self.name)?;
    if let Some(subtype) = &self.subtype {
      write!(f, " {}", subtype)?;
    }
    if let Some(id) = self.id {
      write!(f, " {}", id)?;
    }
    if self.obfuscated {
      write!(f, "?")?;
    }
    write!(f, "}}")
  }
}
