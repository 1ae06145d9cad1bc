//! NIP-19 bech32 entities: `npub`, `nsec` and the `nprofile` TLV encoding.

use bech32::{Bech32, Hrp};

const NPROFILE_HRP: &str = "nprofile";
const NSEC_HRP: &str = "nsec";
const NPUB_HRP: &str = "npub";

const TLV_SPECIAL: u8 = 0;
const TLV_RELAY: u8 = 1;

/// [`nip19`] error
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
  #[error("bech32 encode error: {0}")]
  Bech32Encode(String),
  #[error("bech32 decode error: {0}")]
  Bech32Decode(String),
  #[error("expected prefix `{expected}`, found `{found}`")]
  WrongPrefix { expected: &'static str, found: String },
  #[error("invalid hex key")]
  InvalidHex,
  #[error("truncated TLV entry")]
  TruncatedTlv,
  #[error("nprofile without a 32-byte public key")]
  MissingPublicKey,
}

/// Public key and relay hints carried by an `nprofile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePointer {
  pub pubkey: String,
  pub relays: Vec<String>,
}

fn encode(hrp: &str, data: &[u8]) -> Result<String, Error> {
  let hrp = Hrp::parse(hrp).map_err(|e| Error::Bech32Encode(e.to_string()))?;
  bech32::encode::<Bech32>(hrp, data).map_err(|e| Error::Bech32Encode(e.to_string()))
}

fn decode(expected: &'static str, value: &str) -> Result<Vec<u8>, Error> {
  let (hrp, data) = bech32::decode(value).map_err(|e| Error::Bech32Decode(e.to_string()))?;
  let found = hrp.to_lowercase();
  if found != expected {
    return Err(Error::WrongPrefix { expected, found });
  }
  Ok(data)
}

fn decode_key_hex(key: &str) -> Result<Vec<u8>, Error> {
  match hex::decode(key) {
    Ok(bytes) if bytes.len() == 32 => Ok(bytes),
    _ => Err(Error::InvalidHex),
  }
}

/// Encodes a hex public key and its relay hints as an `nprofile`.
///
/// Relay URLs longer than 255 bytes cannot be expressed in one TLV entry
/// and are skipped.
pub fn nprofile_encode(pubkey: &str, relays: &[String]) -> Result<String, Error> {
  let mut data = vec![TLV_SPECIAL, 32];
  data.extend(decode_key_hex(pubkey)?);
  for relay in relays {
    let bytes = relay.as_bytes();
    if bytes.len() > u8::MAX as usize {
      continue;
    }
    data.extend([TLV_RELAY, bytes.len() as u8]);
    data.extend_from_slice(bytes);
  }
  encode(NPROFILE_HRP, &data)
}

/// Decodes an `nprofile` into its public key and relay hints.
///
/// Unknown TLV types are ignored.
pub fn nprofile_decode(value: &str) -> Result<ProfilePointer, Error> {
  let data = decode(NPROFILE_HRP, value)?;

  let mut pubkey = None;
  let mut relays = vec![];
  let mut rest = data.as_slice();
  while !rest.is_empty() {
    let (kind, len) = match rest {
      [kind, len, ..] => (*kind, *len as usize),
      _ => return Err(Error::TruncatedTlv),
    };
    let value = rest.get(2..2 + len).ok_or(Error::TruncatedTlv)?;
    match kind {
      TLV_SPECIAL if len == 32 => pubkey = Some(hex::encode(value)),
      TLV_RELAY => relays.push(String::from_utf8_lossy(value).into_owned()),
      _ => {}
    }
    rest = &rest[2 + len..];
  }

  Ok(ProfilePointer {
    pubkey: pubkey.ok_or(Error::MissingPublicKey)?,
    relays,
  })
}

pub fn nsec_encode(secret_key_hex: &str) -> Result<String, Error> {
  encode(NSEC_HRP, &decode_key_hex(secret_key_hex)?)
}

/// Converts an `nsec` into the hex secret key it wraps.
pub fn nsec_to_hex(nsec: &str) -> Result<String, Error> {
  let data = decode(NSEC_HRP, nsec)?;
  if data.len() != 32 {
    return Err(Error::InvalidHex);
  }
  Ok(hex::encode(data))
}

pub fn npub_encode(pubkey: &str) -> Result<String, Error> {
  encode(NPUB_HRP, &decode_key_hex(pubkey)?)
}
