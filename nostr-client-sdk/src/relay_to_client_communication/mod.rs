// internal modules
pub mod eose;
pub mod event;
pub mod notice;

use serde_json::Value;

use self::{eose::RelayToClientCommEose, event::RelayToClientCommEvent, notice::RelayToClientCommNotice};

/// [`RelayToClientCommunication`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Error serializing or deserializing JSON data
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("Invalid data")]
  InvalidData,
}

///
/// Any frame a relay may send that this client understands.
///
///  - `["EVENT", <subscription_id>, <event JSON>]`
///  - `["EOSE", <subscription_id>]`
///  - `["NOTICE", <message>]`
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
  Event(RelayToClientCommEvent),
  Eose(RelayToClientCommEose),
  Notice(RelayToClientCommNotice),
}

impl RelayMessage {
  /// Parses a text frame. Anything that is not a 2 or 3 element array
  /// with a known code is [`Error::InvalidData`].
  pub fn from_json(msg: &str) -> Result<Self, Error> {
    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;
    if !(2..=3).contains(&v.len()) {
      return Err(Error::InvalidData);
    }

    match v[0].as_str() {
      Some("EVENT") => RelayToClientCommEvent::from_value(msg).map(Self::Event),
      Some("EOSE") => RelayToClientCommEose::from_value(msg).map(Self::Eose),
      Some("NOTICE") => RelayToClientCommNotice::from_value(msg).map(Self::Notice),
      _ => Err(Error::InvalidData),
    }
  }
}
