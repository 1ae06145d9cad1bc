use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
  aead::{Aead, KeyInit},
  XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use super::Error;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// `base64(nonce || ciphertext || tag)` with XChaCha20-Poly1305 and a random 24-byte nonce.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> Result<String, Error> {
  let cipher = XChaCha20Poly1305::new(key.into());

  let mut nonce = [0u8; NONCE_LEN];
  rand::thread_rng().fill_bytes(&mut nonce);

  let ciphertext = cipher
    .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
    .map_err(|err| Error::Encryption(err.to_string()))?;

  let mut data = nonce.to_vec();
  data.extend(ciphertext);
  Ok(BASE64.encode(data))
}

pub fn decrypt(key: &[u8; 32], payload: &str) -> Result<String, Error> {
  let data = BASE64
    .decode(payload)
    .map_err(|err| Error::BadPayload(err.to_string()))?;
  if data.len() < NONCE_LEN + TAG_LEN {
    return Err(Error::BadPayload(String::from("payload too short")));
  }

  let cipher = XChaCha20Poly1305::new(key.into());
  let (nonce, ciphertext) = data.split_at(NONCE_LEN);
  let plaintext = cipher
    .decrypt(XNonce::from_slice(nonce), ciphertext)
    .map_err(|_| Error::BadPayload(String::from("authentication failed")))?;

  String::from_utf8(plaintext).map_err(|_| Error::BadPayload(String::from("plaintext is not utf-8")))
}
