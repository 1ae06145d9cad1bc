//!
//! Everything that talks to relays: single connections, the manager that
//! fans requests out over many of them, and the pool that hands managers
//! out to callers.
//!

use std::time::Duration;

pub mod checker;
pub mod connection;
pub mod list;
pub mod manager;
pub mod pool;

/// [`relay`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Only `ws://` and `wss://` relays are accepted
  #[error("invalid relay url '{0}'")]
  InvalidUrl(String),

  #[error("could not connect to {url}: {reason}")]
  ConnectionFailure { url: String, reason: String },

  #[error("timed out after {0:?}")]
  Timeout(Duration),

  #[error("relay {0} is not connected")]
  NotConnected(String),

  /// Not a single relay could be opened
  #[error("unable to connect to any relay")]
  RelaysUnreachable,

  #[error(transparent)]
  WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

  #[error(transparent)]
  Tls(#[from] native_tls::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
  fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
    Self::WebSocket(Box::new(err))
  }
}
