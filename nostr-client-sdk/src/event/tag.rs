use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schnorr::PubKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
  /// `["p", <pub-key>, <relay-url>]`
  ///
  /// Records a public key involved in the event, e.g. the recipient of a
  /// direct message.
  PubKey,
  /// `["e", <event-id>, <relay-url>, <marker>]`
  ///
  /// References another event.
  Event,
  /// Custom tag
  Custom(String),
}

impl fmt::Display for TagKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::PubKey => write!(f, "p"),
      Self::Event => write!(f, "e"),
      Self::Custom(tag) => write!(f, "{tag}"),
    }
  }
}

impl<S> From<S> for TagKind
where
  S: Into<String>,
{
  fn from(s: S) -> Self {
    let s: String = s.into();
    match s.as_str() {
      "p" => Self::PubKey,
      "e" => Self::Event,
      tag => Self::Custom(tag.to_string()),
    }
  }
}

///
/// A tag is an ordered list of strings; the first element names the tag.
///
/// Tags are stored verbatim so that an event read from a relay hashes to
/// the same id it was signed with, whatever tags it carries.
///
/// ```json
/// ["p", "02c7e1b1e9c175ab2d100baf1d5a66e73ecc044e9f8093d0c965741f26aa3abf76"]
/// ```
///
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag(pub Vec<String>);

impl Tag {
  pub fn new<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
    Self(values.into_iter().map(Into::into).collect())
  }

  pub fn pubkey(pubkey: impl Into<PubKey>) -> Self {
    Self(vec![TagKind::PubKey.to_string(), pubkey.into()])
  }

  pub fn event(event_id: impl Into<String>) -> Self {
    Self(vec![TagKind::Event.to_string(), event_id.into()])
  }

  /// `None` for an empty tag.
  pub fn kind(&self) -> Option<TagKind> {
    self.0.first().map(|name| TagKind::from(name.as_str()))
  }

  /// First value after the tag name.
  pub fn content(&self) -> Option<&str> {
    self.0.get(1).map(String::as_str)
  }

  pub fn as_vec(&self) -> &[String] {
    &self.0
  }
}

/// Every pubkey referenced by a `p` tag, in tag order.
pub fn referenced_pubkeys(tags: &[Tag]) -> Vec<&str> {
  tags
    .iter()
    .filter(|tag| tag.kind() == Some(TagKind::PubKey))
    .filter_map(Tag::content)
    .collect()
}
