use serde::{Deserialize, Serialize};

use crate::event::{id::EventId, kind::EventKind, tag::TagKind, Event, PubKey, Timestamp};

///
/// Filters are data structures that clients send to relays
/// to request events.
/// The attributes of a Filter work as `&&` (in other words, all the conditions set must be present
/// in the event in order to pass the filter).
/// P.S.: a "REQ" communication from the client can have multiple filters. In this case, all filters will be
/// used as `||` operator: anything that matches any of the filters will be sent.
///
/// - ids: a list of events of prefixes
/// - authors: a list of publickeys or prefixes, the pubkey of an event must be one of these
/// - kinds: a list of kind numbers
/// - #e: a list of event ids that are referenced in an "e" tag,
/// - #p: a list of pubkeys that are referenced in an "p" tag,
/// - since: a timestamp. Events must be newer than this to pass
/// - until: a timestamp. Events must be older than this to pass
/// - limit: maximum number of events to be returned in the initial query (it can be ignored afterwards)
///
/// Criteria left as `None` are not sent to the relay at all.
///
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Filter {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ids: Option<Vec<EventId>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub authors: Option<Vec<PubKey>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub kinds: Option<Vec<EventKind>>,
  #[serde(rename = "#e", alias = "e", default, skip_serializing_if = "Option::is_none")]
  pub e: Option<Vec<String>>,
  #[serde(rename = "#p", alias = "p", default, skip_serializing_if = "Option::is_none")]
  pub p: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub since: Option<Timestamp>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub until: Option<Timestamp>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub limit: Option<u64>,
}

impl Filter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn authors(mut self, authors: Vec<PubKey>) -> Self {
    self.authors = Some(authors);
    self
  }

  pub fn kinds(mut self, kinds: Vec<EventKind>) -> Self {
    self.kinds = Some(kinds);
    self
  }

  pub fn pubkey_refs(mut self, pubkeys: Vec<String>) -> Self {
    self.p = Some(pubkeys);
    self
  }

  pub fn limit(mut self, limit: u64) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn as_str(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }

  pub fn from_string(data: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(data)
  }

  /// Local check of an event against this filter, with the relay's
  /// prefix semantics for `ids` and `authors`.
  pub fn matches(&self, event: &Event) -> bool {
    if let Some(ids) = &self.ids {
      if !ids.iter().any(|id| event.id.starts_with(&id.0)) {
        return false;
      }
    }

    if let Some(authors) = &self.authors {
      if !authors.iter().any(|author| event.pubkey.starts_with(author.as_str())) {
        return false;
      }
    }

    if let Some(kinds) = &self.kinds {
      if !kinds.contains(&event.kind) {
        return false;
      }
    }

    if let Some(since) = self.since {
      if event.created_at < since {
        return false;
      }
    }

    if let Some(until) = self.until {
      if event.created_at > until {
        return false;
      }
    }

    if let Some(event_ids) = &self.e {
      if !tag_values_intersect(event, TagKind::Event, event_ids) {
        return false;
      }
    }

    if let Some(pubkeys) = &self.p {
      if !tag_values_intersect(event, TagKind::PubKey, pubkeys) {
        return false;
      }
    }

    true
  }
}

fn tag_values_intersect(event: &Event, kind: TagKind, wanted: &[String]) -> bool {
  event
    .tags
    .iter()
    .filter(|tag| tag.kind().as_ref() == Some(&kind))
    .filter_map(|tag| tag.content())
    .any(|value| wanted.iter().any(|w| w == value))
}
