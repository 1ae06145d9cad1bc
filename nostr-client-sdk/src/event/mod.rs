use std::{
  str::FromStr,
  time::{SystemTime, UNIX_EPOCH},
};

use secp256k1::{schnorr, Secp256k1};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// Event Modules
pub mod id;
pub mod kind;
pub mod tag;

use self::id::EventId;
use self::kind::EventKind;
use self::tag::Tag;
use crate::schnorr::{Keys, SchnorrError};

pub use crate::schnorr::PubKey;
pub type Timestamp = u64;

/// [`Event`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Error serializing or deserializing JSON data
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("Invalid data")]
  InvalidData,
  /// The event could not be signed with the given keys
  #[error(transparent)]
  Signature(#[from] SchnorrError),
}

/// Current Unix time in seconds.
pub fn unix_timestamp() -> Timestamp {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|since_the_epoch| since_the_epoch.as_secs())
    .unwrap_or_default()
}

///
/// Event is the only object that exists in the Nostr protocol.
///
/// Example:
///   ```json
///   {
///     "id": "00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae",
///     "pubkey": "614a695bab54e8dc98946abdb8ec019599ece6dada0c23890977d0fa128081d6",
///     "created_at": 1684589418,
///     "kind": 1,
///     "tags": [],
///     "content": "potato",
///     "sig": "bf073c935f71de50ec72bdb79f75b0bf32f9049305c3b22f97c06422c6f2edc86e0d7e07d7d7222678b238b1daee071be5f6fa653c611971395ec0d1c6407caf"
///   }
///   ```
///
/// `id` and `sig` are filled by [`Event::sign`]; a signed event is not
/// meant to be mutated afterwards, [`Event::verify`] rejects it if it was.
///
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Event {
  /// 32-bytes SHA256 of the serialized event data
  pub id: String,
  /// 32-bytes hex-encoded x-only public key of the event creator
  pub pubkey: PubKey,
  /// Unix timestamp in seconds
  pub created_at: Timestamp,
  /// Kind of event
  pub kind: EventKind,
  /// An array of arrays of strings with more info about the event.
  /// The kind of event will change its tags and contents.
  pub tags: Vec<Tag>,
  /// Arbitrary string. Meaning depends on the kind of the event.
  pub content: String,
  /// 64-bytes hex Schnorr signature of the id field
  pub sig: String,
}

impl Event {
  pub fn new_without_signature(
    pubkey: PubKey,
    created_at: Timestamp,
    kind: EventKind,
    tags: Vec<Tag>,
    content: String,
  ) -> Self {
    Self {
      pubkey,
      created_at,
      kind,
      tags,
      content,
      ..Default::default()
    }
  }

  pub fn compute_id(&self) -> EventId {
    EventId::new(
      &self.pubkey,
      self.created_at,
      self.kind,
      &self.tags,
      &self.content,
    )
  }

  /// Fills `id` and `sig`.
  ///
  /// The keys must belong to `pubkey`, otherwise the event would never verify.
  pub fn sign(&mut self, keys: &Keys) -> Result<(), Error> {
    if keys.public_key_hex() != self.pubkey {
      log::error!("[sign] keys do not match event pubkey {}", self.pubkey);
      return Err(Error::InvalidData);
    }
    let secp = Secp256k1::new();
    self.id = self.compute_id().0;
    let signed = crate::schnorr::sign_schnorr(&secp, &self.id, keys)?;
    self.sig = signed.to_string();
    Ok(())
  }

  pub fn check_event_id(&self) -> bool {
    self.compute_id().0 == self.id
  }

  pub fn check_event_signature(&self) -> bool {
    let secp = Secp256k1::verification_only();
    let sig = match schnorr::Signature::from_str(&self.sig) {
      Ok(signature) => signature,
      Err(_) => return false,
    };

    crate::schnorr::verify_schnorr(&secp, &self.id, &sig, &self.pubkey).unwrap_or(false)
  }

  /// `true` only if the id matches the content and the signature matches
  /// both the id and the author's key. Never fails.
  pub fn verify(&self) -> bool {
    self.check_event_id() && self.check_event_signature()
  }

  /// Deserializes from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    serde_json::from_value(msg).map_err(Error::Json)
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    json!(self)
  }

  /// Deserialize [`Event`] from JSON string
  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    let msg: &str = &msg.into();

    if msg.is_empty() {
      return Err(Error::InvalidData);
    }

    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }

  /// Get [`Event`] in JSON string
  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  fn potato_event() -> Event {
    Event::from_value(
      json!({"content":"potato","created_at":1684589418,"id":"00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae","kind":1,"pubkey":"614a695bab54e8dc98946abdb8ec019599ece6dada0c23890977d0fa128081d6","sig":"bf073c935f71de50ec72bdb79f75b0bf32f9049305c3b22f97c06422c6f2edc86e0d7e07d7d7222678b238b1daee071be5f6fa653c611971395ec0d1c6407caf","tags":[]}),
    ).unwrap()
  }

  fn make_sut() -> (Event, Keys) {
    let keys = Keys::parse(&"11".repeat(32)).unwrap();
    let event = Event::new_without_signature(
      keys.public_key_hex(),
      123,
      EventKind::Text,
      vec![],
      String::from("hello"),
    );
    (event, keys)
  }

  #[test]
  fn test_event_serializes_with_wire_field_names() {
    let event = potato_event();
    let expected = r#"{"id":"00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae","pubkey":"614a695bab54e8dc98946abdb8ec019599ece6dada0c23890977d0fa128081d6","created_at":1684589418,"kind":1,"tags":[],"content":"potato","sig":"bf073c935f71de50ec72bdb79f75b0bf32f9049305c3b22f97c06422c6f2edc86e0d7e07d7d7222678b238b1daee071be5f6fa653c611971395ec0d1c6407caf"}"#;
    assert_eq!(event.as_json(), expected);
    assert_eq!(Event::from_json(expected).unwrap(), event);
  }

  #[test]
  fn test_event_with_missing_field_is_rejected() {
    let result = Event::from_value(json!({"content":"potato","created_at":1,"kind":1,"pubkey":"aa","tags":[]}));
    assert!(result.is_err());
    assert!(matches!(Event::from_json(""), Err(Error::InvalidData)));
  }

  #[test]
  fn check_event_id_and_signature_of_relay_event() {
    let event = potato_event();
    assert!(event.check_event_id());
    assert!(event.check_event_signature());
    assert!(event.verify());
  }

  #[test]
  fn sign_and_verify_hello_event() {
    let (mut event, keys) = make_sut();
    event.sign(&keys).unwrap();

    assert_eq!(event.id, event.compute_id().0);
    assert_eq!(event.sig.len(), 128);
    assert!(event.verify());
    // pure and repeatable
    assert!(event.verify());

    event.content = String::from("hellp");
    assert_eq!(event.verify(), false);
  }

  #[test]
  fn verify_fails_when_any_field_is_mutated_after_signing() {
    let (mut signed, keys) = make_sut();
    signed.tags = vec![Tag::pubkey("someone")];
    signed.sign(&keys).unwrap();

    let mut content = signed.clone();
    content.content = String::from("tampered");
    let mut created_at = signed.clone();
    created_at.created_at += 1;
    let mut tags = signed.clone();
    tags.tags.clear();
    let mut kind = signed.clone();
    kind.kind = EventKind::Metadata;

    for tampered in [content, created_at, tags, kind] {
      assert_eq!(tampered.verify(), false);
    }
    assert!(signed.verify());
  }

  #[test]
  fn verify_is_false_for_malformed_events() {
    let (mut event, keys) = make_sut();
    event.sign(&keys).unwrap();

    let mut bad_sig = event.clone();
    bad_sig.sig = String::from("zz");
    let mut other_author = event.clone();
    other_author.pubkey = Keys::generate().public_key_hex();
    let mut off_curve = event.clone();
    off_curve.pubkey = format!("{:0>64}", "5");

    assert_eq!(bad_sig.verify(), false);
    assert_eq!(other_author.verify(), false);
    assert_eq!(off_curve.verify(), false);
    assert_eq!(Event::default().verify(), false);
  }

  #[test]
  fn sign_refuses_keys_of_another_author() {
    let (mut event, _) = make_sut();
    let result = event.sign(&Keys::generate());
    assert!(matches!(result, Err(Error::InvalidData)));
    assert!(event.sig.is_empty());
  }

  #[test]
  fn sign_with_random_keys() {
    for _ in 0..8 {
      let keys = crate::schnorr::generate_keys();
      let mut event = Event::new_without_signature(
        keys.public_key_hex(),
        unix_timestamp(),
        EventKind::CalendarEvent,
        vec![Tag::new(["d", "slug"])],
        String::from("Lorem ipsum dolor sit amet"),
      );
      event.sign(&keys).unwrap();
      assert!(event.verify());
    }
  }
}
