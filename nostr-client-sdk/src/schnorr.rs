use std::{fmt, str::FromStr};

use bitcoin_hashes::hex::FromHex;
use secp256k1::{
  schnorr, KeyPair, Message, Parity, PublicKey, Secp256k1, SecretKey, Signing, Verification,
  XOnlyPublicKey,
};

use crate::nip19;

pub type PubKey = String;

/// [`Schnorr`] error
#[derive(thiserror::Error, Debug)]
pub enum SchnorrError {
  /// Secret scalar is zero, not below the group order or not 32 bytes
  #[error("malformed or out-of-range secret key")]
  InvalidKey,

  /// Error related to bitcoin_hashes::hex
  #[error(transparent)]
  SHA256(#[from] bitcoin_hashes::hex::Error),

  /// Error secp256k1
  #[error(transparent)]
  SECP256K1(#[from] secp256k1::Error),

  /// Secret key given as a bech32 string that could not be decoded
  #[error(transparent)]
  Nip19(#[from] nip19::Error),
}

///
/// A secret key together with its x-only public key.
///
/// The secret scalar is always normalized so that its public point has an
/// even y-coordinate (BIP-340). Two scalars `d` and `n - d` therefore end up
/// as the same [`Keys`].
///
#[derive(Clone, PartialEq, Eq)]
pub struct Keys {
  secret_key: SecretKey,
  public_key: XOnlyPublicKey,
}

impl fmt::Debug for Keys {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Keys")
      .field("public_key", &self.public_key.to_string())
      .finish_non_exhaustive()
  }
}

impl Keys {
  pub fn new(secret_key: SecretKey) -> Self {
    let secp = Secp256k1::new();
    let (secret_key, public_key) = normalize_secret_key(&secp, secret_key);
    Self {
      secret_key,
      public_key,
    }
  }

  /// Parses a secret key given either as 64 hex characters or as a bech32 `nsec`.
  pub fn parse(secret: &str) -> Result<Self, SchnorrError> {
    parse_secret_key(secret).map(Self::new)
  }

  pub fn generate() -> Self {
    let secp = Secp256k1::new();
    let (secret_key, _) = secp.generate_keypair(&mut rand::thread_rng());
    Self::new(secret_key)
  }

  pub fn secret_key(&self) -> &SecretKey {
    &self.secret_key
  }

  pub fn public_key(&self) -> XOnlyPublicKey {
    self.public_key
  }

  pub fn public_key_hex(&self) -> PubKey {
    self.public_key.to_string()
  }

  pub fn secret_key_hex(&self) -> String {
    hex::encode(self.secret_key.secret_bytes())
  }

  pub(crate) fn keypair<C: Signing>(&self, secp: &Secp256k1<C>) -> KeyPair {
    KeyPair::from_secret_key(secp, &self.secret_key)
  }
}

/// Negates `secret_key` when its public point has an odd y-coordinate.
fn normalize_secret_key<C: Signing>(
  secp: &Secp256k1<C>,
  secret_key: SecretKey,
) -> (SecretKey, XOnlyPublicKey) {
  let (x_only, parity) = PublicKey::from_secret_key(secp, &secret_key).x_only_public_key();
  if parity == Parity::Odd {
    let negated = secret_key.negate();
    let (x_only, _) = PublicKey::from_secret_key(secp, &negated).x_only_public_key();
    return (negated, x_only);
  }
  (secret_key, x_only)
}

///
/// Parses a secret key from its hex or `nsec` representation.
///
/// Fails with `SchnorrError::InvalidKey` when the scalar is zero or not
/// below the group order.
///
pub fn parse_secret_key(secret: &str) -> Result<SecretKey, SchnorrError> {
  let secret = secret.trim();
  let bytes = if secret.starts_with("nsec1") {
    hex::decode(nip19::nsec_to_hex(secret)?).map_err(|_| SchnorrError::InvalidKey)?
  } else {
    hex::decode(secret).map_err(|_| SchnorrError::InvalidKey)?
  };
  SecretKey::from_slice(&bytes).map_err(|_| SchnorrError::InvalidKey)
}

///
/// Derives the x-only public key (hex) of a secret key.
///
/// ## Examples
///
/// ```
///     use nostr_client_sdk::schnorr::derive_public_key;
///
///     let pubkey = derive_public_key(&"11".repeat(32)).unwrap();
///     assert_eq!(pubkey.len(), 64);
///     assert!(derive_public_key(&"00".repeat(32)).is_err());
/// ```
pub fn derive_public_key(secret_key: &str) -> Result<PubKey, SchnorrError> {
  Keys::parse(secret_key).map(|keys| keys.public_key_hex())
}

///
/// Lifts a hex x-only public key onto the curve using the even-y convention.
///
/// Fails when the hex is malformed or the x-coordinate has no curve point.
///
pub fn lift_x(pubkey: &str) -> Result<PublicKey, SchnorrError> {
  let x_only = XOnlyPublicKey::from_str(pubkey)?;
  Ok(PublicKey::from_x_only_public_key(x_only, Parity::Even))
}

///
/// Signs a Schnorr signature for a determined content.
///
/// An auxiliary random nonce is mixed in, so signing the same message twice
/// yields two different (both valid) signatures.
///
/// ## Arguments
///
/// * `secp` - A Secp256k1 engine to execute signature.
/// * `msg` - A SHA256 hashed message, hex encoded.
/// * `keys` - The keys to sign the message with.
///
/// ## Examples
///
/// ```
///     use nostr_client_sdk::schnorr::*;
///     use secp256k1::Secp256k1;
///     use bitcoin_hashes::{sha256, hex::ToHex, Hash};
///
///     let keys = Keys::generate();
///     let msg = sha256::Hash::hash(b"This is some message").to_hex();
///     let secp = Secp256k1::new();
///     assert!(sign_schnorr(&secp, &msg, &keys).is_ok());
/// ```
pub fn sign_schnorr<C: Signing>(
  secp: &Secp256k1<C>,
  msg: &str,
  keys: &Keys,
) -> Result<schnorr::Signature, SchnorrError> {
  let hash_from_hex = bitcoin_hashes::sha256::Hash::from_hex(msg)?;
  let msg = Message::from_slice(hash_from_hex.as_ref())?;
  let keypair = keys.keypair(secp);
  Ok(secp.sign_schnorr(&msg, &keypair))
}

///
/// Verifies a Schnorr signature for a determined content.
///
/// Returns `Ok(true)` if the signature is valid. Any malformed input
/// (hash, key without curve lift, signature mismatch) is an error.
///
/// ## Arguments
///
/// * `secp` - A Secp256k1 engine to execute verification.
/// * `msg` - A SHA256 hashed message, hex encoded.
/// * `sig` - The schnorr signature to verify.
/// * `pubkey` - The x-only Public Key to verify against.
///
pub fn verify_schnorr<C: Verification>(
  secp: &Secp256k1<C>,
  msg: &str,
  sig: &schnorr::Signature,
  pubkey: &str,
) -> Result<bool, SchnorrError> {
  let hash_from_hex = bitcoin_hashes::sha256::Hash::from_hex(msg)?;
  let msg = Message::from_slice(hash_from_hex.as_ref())?;
  let (x_only_pubkey, _) = lift_x(pubkey)?.x_only_public_key();

  match secp.verify_schnorr(sig, &msg, &x_only_pubkey) {
    Ok(_) => Ok(true),
    Err(err) => {
      log::debug!("[verify_schnorr] {err}");
      Err(SchnorrError::SECP256K1(err))
    }
  }
}

///
/// Generates a random keypair ready to be used with Schnorr signatures.
///
pub fn generate_keys() -> Keys {
  Keys::generate()
}
