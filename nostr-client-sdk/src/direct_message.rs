use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
  crypto::{self, decrypt_any, Scheme},
  event::{self, kind::EventKind, tag::Tag, unix_timestamp, Event, PubKey, Timestamp},
  relay::{self, pool::ManagerPool},
  schnorr::{Keys, SchnorrError},
};

/// [`direct_message`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error(transparent)]
  Crypto(#[from] crypto::Error),

  #[error(transparent)]
  Event(#[from] event::Error),

  #[error(transparent)]
  Key(#[from] SchnorrError),

  #[error(transparent)]
  Relay(#[from] relay::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// The event was not signed by its author or was altered afterwards
  #[error("invalid event signature")]
  InvalidSignature,
}

impl Error {
  /// Whether the failure was caused by what the caller handed in.
  pub fn is_client_error(&self) -> bool {
    match self {
      Self::Crypto(err) => err.is_client_error(),
      Self::Key(_) | Self::InvalidSignature => true,
      _ => false,
    }
  }
}

/// How the content of a received direct message is decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecryptRule {
  Exact(Scheme),
  /// Current scheme, falling back to legacy
  Any,
}

impl DecryptRule {
  fn for_kind(kind: EventKind) -> Result<Self, crypto::Error> {
    match kind {
      EventKind::EphemeralDirectMessage => Ok(Self::Exact(Scheme::Ephemeral)),
      EventKind::EncryptedDirectMessage => Ok(Self::Any),
      other => Err(crypto::Error::UnsupportedScheme(other)),
    }
  }
}

///
/// An encrypted direct message ready to be turned into an event.
///
/// The event is always authored and signed by the sender; the recipient is
/// only named in a `p` tag.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectMessage {
  pub scheme: Scheme,
  pub recipient: PubKey,
  /// Ciphertext, in the wire format of `scheme`
  pub content: String,
}

impl DirectMessage {
  pub fn encrypt(
    sender: &Keys,
    recipient_pubkey: &str,
    plaintext: &str,
    scheme: Scheme,
  ) -> Result<Self, Error> {
    let content = scheme.encrypt(sender, recipient_pubkey, plaintext)?;
    Ok(Self {
      scheme,
      recipient: recipient_pubkey.to_string(),
      content,
    })
  }

  /// Signed event carrying this message.
  pub fn to_event(&self, sender: &Keys, created_at: Timestamp) -> Result<Event, Error> {
    let mut event = Event::new_without_signature(
      sender.public_key_hex(),
      created_at,
      self.scheme.kind(),
      vec![Tag::pubkey(self.recipient.clone())],
      self.content.clone(),
    );
    event.sign(sender)?;
    Ok(event)
  }
}

///
/// Encrypts `plaintext` for `recipient_pubkey` and publishes it to every
/// open relay.
///
/// ## Arguments
///
/// * `pool` - where the relay manager is borrowed from
/// * `sender_secret_key` - hex or `nsec` secret key of the author
/// * `recipient_pubkey` - x-only hex public key of the recipient
/// * `plaintext` - message to send
/// * `scheme` - encryption scheme, which also decides the event kind
///
/// Returns the id of the published event.
///
pub async fn publish_direct_message(
  pool: &ManagerPool,
  sender_secret_key: &str,
  recipient_pubkey: &str,
  plaintext: &str,
  scheme: Scheme,
) -> Result<String, Error> {
  let sender = Keys::parse(sender_secret_key)?;
  let event = DirectMessage::encrypt(&sender, recipient_pubkey, plaintext, scheme)?
    .to_event(&sender, unix_timestamp())?;

  let manager = pool.borrow().await;
  let published = match manager.ensure_reachable() {
    Ok(()) => Ok(manager.publish(&event).await),
    Err(err) => Err(err),
  };
  pool.release(manager).await;

  let report = published?;
  info!(
    "Direct message {} ({scheme}) sent to {}/{} relays",
    event.id,
    report.succeeded(),
    report.attempted
  );
  Ok(event.id)
}

///
/// Verifies `event` and decrypts its content with the recipient's key.
///
/// The scheme follows the kind: ephemeral messages use the ephemeral scheme,
/// encrypted direct messages use the current scheme with a legacy fallback.
///
pub fn decrypt_direct_message(event: &Event, recipient: &Keys) -> Result<String, Error> {
  if !event.verify() {
    return Err(Error::InvalidSignature);
  }

  let plaintext = match DecryptRule::for_kind(event.kind)? {
    DecryptRule::Exact(scheme) => scheme.decrypt(recipient, &event.pubkey, &event.content)?,
    DecryptRule::Any => decrypt_any(recipient, &event.pubkey, &event.content)?,
  };
  debug!("Decrypted direct message {}", event.id);
  Ok(plaintext)
}

/// Body of a ticket direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPayload {
  /// Name of the event the ticket is for
  pub event: String,
  /// Holder of the ticket
  pub pubkey: PubKey,
  pub timestamp: Timestamp,
}

impl TicketPayload {
  pub fn new(event_name: &str, pubkey: &str, timestamp: Option<Timestamp>) -> Self {
    Self {
      event: event_name.to_string(),
      pubkey: pubkey.to_string(),
      timestamp: timestamp.unwrap_or_else(unix_timestamp),
    }
  }

  pub fn as_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }

  pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(data)
  }
}

/// Sends a ticket for `event_name` to `recipient_pubkey` as an ephemeral
/// direct message and returns the event id.
pub async fn send_ticket(
  pool: &ManagerPool,
  event_name: &str,
  recipient_pubkey: &str,
  sender_secret_key: &str,
  timestamp: Option<Timestamp>,
) -> Result<String, Error> {
  let payload = TicketPayload::new(event_name, recipient_pubkey, timestamp).as_json()?;
  publish_direct_message(
    pool,
    sender_secret_key,
    recipient_pubkey,
    &payload,
    Scheme::Ephemeral,
  )
  .await
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::{
    client_to_relay_communication::event::ClientToRelayCommEvent,
    config::ClientConfig,
    event::tag::referenced_pubkeys,
    relay::{list::RelayList, stub},
  };

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  fn make_sut() -> (Keys, Keys) {
    (Keys::parse(&"11".repeat(32)).unwrap(), Keys::parse(&"22".repeat(32)).unwrap())
  }

  fn pool_for(urls: Vec<String>) -> ManagerPool {
    let config = ClientConfig {
      connect_timeout: Duration::from_millis(300),
      ..Default::default()
    };
    ManagerPool::new(RelayList::new(urls).unwrap(), &config)
  }

  async fn published_events(relay: &stub::StubRelay, count: usize) -> Vec<Event> {
    for _ in 0..200 {
      if relay.received().len() >= count {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    relay
      .received()
      .iter()
      .map(|frame| ClientToRelayCommEvent::from_json(frame).unwrap().event)
      .collect()
  }

  #[test]
  fn test_event_is_authored_by_the_sender() {
    let (alice, bob) = make_sut();

    for scheme in [Scheme::Legacy, Scheme::Ephemeral, Scheme::Current] {
      let event = DirectMessage::encrypt(&alice, &bob.public_key_hex(), "ping", scheme)
        .unwrap()
        .to_event(&alice, 123)
        .unwrap();

      assert_eq!(event.pubkey, alice.public_key_hex());
      assert_eq!(event.kind, scheme.kind());
      assert_eq!(referenced_pubkeys(&event.tags), vec![bob.public_key_hex()]);
      assert!(event.verify());
      assert_eq!(decrypt_direct_message(&event, &bob).unwrap(), "ping");
    }
  }

  #[test]
  fn test_decrypt_rejects_tampered_and_unsupported_events() {
    let (alice, bob) = make_sut();
    let event = DirectMessage::encrypt(&alice, &bob.public_key_hex(), "ping", Scheme::Current)
      .unwrap()
      .to_event(&alice, 123)
      .unwrap();

    let mut tampered = event.clone();
    tampered.content.push('A');
    let err = decrypt_direct_message(&tampered, &bob).unwrap_err();
    assert!(matches!(err, Error::InvalidSignature));
    assert!(err.is_client_error());

    let mut note =
      Event::new_without_signature(alice.public_key_hex(), 1, EventKind::Text, vec![], event.content);
    note.sign(&alice).unwrap();
    let err = decrypt_direct_message(&note, &bob).unwrap_err();
    assert!(matches!(
      err,
      Error::Crypto(crypto::Error::UnsupportedScheme(EventKind::Text))
    ));
    assert!(err.is_client_error());
  }

  #[test]
  fn test_ephemeral_kind_does_not_fall_back() {
    let (alice, bob) = make_sut();
    let legacy = Scheme::Legacy.encrypt(&alice, &bob.public_key_hex(), "ping").unwrap();
    let mut event = Event::new_without_signature(
      alice.public_key_hex(),
      1,
      EventKind::EphemeralDirectMessage,
      vec![Tag::pubkey(bob.public_key_hex())],
      legacy,
    );
    event.sign(&alice).unwrap();

    assert!(matches!(
      decrypt_direct_message(&event, &bob),
      Err(Error::Crypto(crypto::Error::BadPayload(_)))
    ));
  }

  #[tokio::test]
  async fn test_publish_direct_message() {
    let (alice, bob) = make_sut();
    let relay = stub::silent().await;
    let pool = pool_for(vec![relay.url()]);

    let id = publish_direct_message(
      &pool,
      &alice.secret_key_hex(),
      &bob.public_key_hex(),
      "see you at the show",
      Scheme::Current,
    )
    .await
    .unwrap();

    let events = published_events(&relay, 1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, id);
    assert_eq!(events[0].kind, EventKind::EncryptedDirectMessage);
    assert_eq!(decrypt_direct_message(&events[0], &bob).unwrap(), "see you at the show");
    assert_eq!(pool.idle_count().await, 1);
  }

  #[tokio::test]
  async fn test_send_ticket() {
    let (alice, bob) = make_sut();
    let relay = stub::silent().await;
    let pool = pool_for(vec![relay.url()]);

    let id = send_ticket(&pool, "Fuzzed Night", &bob.public_key_hex(), &alice.secret_key_hex(), Some(1700000000))
      .await
      .unwrap();

    let events = published_events(&relay, 1).await;
    assert_eq!(events[0].id, id);
    assert_eq!(events[0].kind, EventKind::EphemeralDirectMessage);

    let payload = TicketPayload::from_json(&decrypt_direct_message(&events[0], &bob).unwrap()).unwrap();
    assert_eq!(
      payload,
      TicketPayload {
        event: String::from("Fuzzed Night"),
        pubkey: bob.public_key_hex(),
        timestamp: 1700000000,
      }
    );
  }

  #[tokio::test]
  async fn test_publish_without_relays_is_an_error() {
    let (alice, bob) = make_sut();
    let pool = pool_for(vec![stub::refused_url().await]);

    let result =
      publish_direct_message(&pool, &alice.secret_key_hex(), &bob.public_key_hex(), "ping", Scheme::Current).await;
    assert!(matches!(result, Err(Error::Relay(relay::Error::RelaysUnreachable))));

    let result = publish_direct_message(&pool, "not a key", &bob.public_key_hex(), "ping", Scheme::Current).await;
    assert!(result.unwrap_err().is_client_error());
  }

  #[tokio::test]
  async fn test_malformed_recipient_is_a_client_error() {
    let (alice, _) = make_sut();
    let relay = stub::silent().await;
    let pool = pool_for(vec![relay.url()]);

    let err = publish_direct_message(&pool, &alice.secret_key_hex(), "abc", "ping", Scheme::Current)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Crypto(crypto::Error::InvalidKey(_))));
    assert!(err.is_client_error());
    assert!(relay.received().is_empty());
  }
}
