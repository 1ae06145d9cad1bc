use aes_gcm::{
  aead::{Aead, KeyInit},
  Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use super::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// `base64(nonce || ciphertext || tag)` with AES-256-GCM and a random 12-byte nonce.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> Result<String, Error> {
  let cipher = Aes256Gcm::new_from_slice(key).map_err(|err| Error::Encryption(err.to_string()))?;

  let mut nonce = [0u8; NONCE_LEN];
  rand::thread_rng().fill_bytes(&mut nonce);

  let ciphertext = cipher
    .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
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

  let cipher = Aes256Gcm::new_from_slice(key).map_err(|err| Error::BadPayload(err.to_string()))?;
  let (nonce, ciphertext) = data.split_at(NONCE_LEN);
  let plaintext = cipher
    .decrypt(Nonce::from_slice(nonce), ciphertext)
    .map_err(|_| Error::BadPayload(String::from("authentication failed")))?;

  String::from_utf8(plaintext).map_err(|_| Error::BadPayload(String::from("plaintext is not utf-8")))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  const KEY: [u8; 32] = [9u8; 32];

  #[test]
  fn test_payload_layout() {
    let payload = encrypt(&KEY, "ping").unwrap();
    let data = BASE64.decode(&payload).unwrap();

    assert_eq!(data.len(), NONCE_LEN + 4 + TAG_LEN);
    assert_eq!(decrypt(&KEY, &payload).unwrap(), "ping");
  }

  #[test]
  fn test_tampering_is_detected() {
    let payload = encrypt(&KEY, "ping").unwrap();
    let mut data = BASE64.decode(&payload).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0x01;

    assert!(matches!(decrypt(&KEY, &BASE64.encode(&data)), Err(Error::BadPayload(_))));
    assert!(matches!(decrypt(&[1u8; 32], &payload), Err(Error::BadPayload(_))));
  }

  #[test]
  fn test_short_payload_is_rejected() {
    let result = decrypt(&KEY, &BASE64.encode([0u8; NONCE_LEN]));
    assert!(matches!(result, Err(Error::BadPayload(_))));
  }
}
