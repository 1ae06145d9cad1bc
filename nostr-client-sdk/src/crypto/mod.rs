//!
//! End-to-end encryption of direct messages.
//!
//! Every scheme shares the same key agreement: the SHA-256 of the
//! x-coordinate of `ECDH(secret, lift_x(pubkey))`. Both sides derive the same
//! 32 bytes whichever of the two keys is used as the scalar.
//!

use std::{fmt, str::FromStr};

use bitcoin_hashes::{sha256, Hash};
use secp256k1::{ecdh, SecretKey};

use crate::event::kind::EventKind;
use crate::schnorr::{lift_x, Keys, SchnorrError};

pub mod current;
pub mod ephemeral;
pub mod legacy;

/// [`crypto`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// A secret key or peer public key handed in is malformed or off the curve
  #[error(transparent)]
  InvalidKey(#[from] SchnorrError),

  /// Ciphertext is malformed, truncated or was not produced for this key
  #[error("bad payload: {0}")]
  BadPayload(String),

  /// No scheme is defined for this event kind
  #[error("unsupported encryption scheme for kind {0}")]
  UnsupportedScheme(EventKind),

  #[error("unsupported encryption scheme '{0}'")]
  UnsupportedSchemeName(String),

  #[error("encryption failed: {0}")]
  Encryption(String),
}

impl Error {
  /// Whether the failure was caused by what the caller handed in, as opposed
  /// to a fault on our side.
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      Self::InvalidKey(_) | Self::BadPayload(_) | Self::UnsupportedScheme(_) | Self::UnsupportedSchemeName(_)
    )
  }
}

/// Direct message encryption schemes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
  /// AES-256-CBC, `base64(ciphertext)?iv=base64(iv)`
  Legacy,
  /// AES-256-GCM, `base64(nonce || ciphertext || tag)`
  Ephemeral,
  /// XChaCha20-Poly1305, `base64(nonce || ciphertext || tag)`
  #[default]
  Current,
}

impl Scheme {
  /// Kind of the event carrying a message encrypted with this scheme.
  pub fn kind(&self) -> EventKind {
    match self {
      Self::Legacy | Self::Current => EventKind::EncryptedDirectMessage,
      Self::Ephemeral => EventKind::EphemeralDirectMessage,
    }
  }

  pub fn encrypt(&self, sender: &Keys, recipient_pubkey: &str, plaintext: &str) -> Result<String, Error> {
    let key = shared_key(sender.secret_key(), recipient_pubkey)?;
    match self {
      Self::Legacy => legacy::encrypt(&key, plaintext),
      Self::Ephemeral => ephemeral::encrypt(&key, plaintext),
      Self::Current => current::encrypt(&key, plaintext),
    }
  }

  pub fn decrypt(&self, recipient: &Keys, sender_pubkey: &str, payload: &str) -> Result<String, Error> {
    let key = shared_key(recipient.secret_key(), sender_pubkey)?;
    match self {
      Self::Legacy => legacy::decrypt(&key, payload),
      Self::Ephemeral => ephemeral::decrypt(&key, payload),
      Self::Current => current::decrypt(&key, payload),
    }
  }
}

impl fmt::Display for Scheme {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Legacy => write!(f, "legacy"),
      Self::Ephemeral => write!(f, "ephemeral"),
      Self::Current => write!(f, "current"),
    }
  }
}

impl FromStr for Scheme {
  type Err = Error;

  /// Accepts the scheme names as well as the NIP numbers they follow.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "legacy" | "nip04" => Ok(Self::Legacy),
      "ephemeral" | "nip17" => Ok(Self::Ephemeral),
      "current" | "nip44" => Ok(Self::Current),
      other => Err(Error::UnsupportedSchemeName(other.to_string())),
    }
  }
}

///
/// 32-byte symmetric key shared between `secret_key` and `pubkey`.
///
/// ## Arguments
///
/// * `secret_key` - our side of the conversation
/// * `pubkey` - x-only hex public key of the other side
///
pub fn shared_key(secret_key: &SecretKey, pubkey: &str) -> Result<[u8; 32], Error> {
  let point = lift_x(pubkey)?;
  let xy = ecdh::shared_secret_point(&point, secret_key);
  Ok(sha256::Hash::hash(&xy[..32]).into_inner())
}

///
/// Decrypts a payload of unknown scheme.
///
/// The current scheme is tried first. If it fails and the payload carries the
/// legacy `?iv=` marker the legacy scheme is tried; otherwise the first error
/// is returned.
///
pub fn decrypt_any(recipient: &Keys, sender_pubkey: &str, payload: &str) -> Result<String, Error> {
  let key = shared_key(recipient.secret_key(), sender_pubkey)?;
  match current::decrypt(&key, payload) {
    Ok(plaintext) => Ok(plaintext),
    Err(err) if payload.contains(legacy::IV_MARKER) => {
      log::debug!("[decrypt_any] current scheme failed ({err}), trying legacy");
      legacy::decrypt(&key, payload)
    }
    Err(err) => Err(err),
  }
}
