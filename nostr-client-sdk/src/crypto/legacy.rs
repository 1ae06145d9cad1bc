use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use super::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Separates the ciphertext from the IV on the wire.
pub const IV_MARKER: &str = "?iv=";

const IV_LEN: usize = 16;

/// `base64(AES-256-CBC(plaintext)) + "?iv=" + base64(iv)` with a random IV.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> Result<String, Error> {
  let mut iv = [0u8; IV_LEN];
  rand::thread_rng().fill_bytes(&mut iv);

  let cipher =
    Aes256CbcEnc::new_from_slices(key, &iv).map_err(|err| Error::Encryption(err.to_string()))?;
  let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

  Ok(format!(
    "{}{IV_MARKER}{}",
    BASE64.encode(ciphertext),
    BASE64.encode(iv)
  ))
}

pub fn decrypt(key: &[u8; 32], payload: &str) -> Result<String, Error> {
  let (ciphertext, iv) = payload
    .split_once(IV_MARKER)
    .ok_or_else(|| Error::BadPayload(String::from("missing iv")))?;

  let ciphertext = BASE64
    .decode(ciphertext)
    .map_err(|err| Error::BadPayload(format!("ciphertext: {err}")))?;
  let iv = BASE64
    .decode(iv)
    .map_err(|err| Error::BadPayload(format!("iv: {err}")))?;
  if iv.len() != IV_LEN {
    return Err(Error::BadPayload(format!("iv must be {IV_LEN} bytes, got {}", iv.len())));
  }

  let cipher =
    Aes256CbcDec::new_from_slices(key, &iv).map_err(|err| Error::BadPayload(err.to_string()))?;
  let plaintext = cipher
    .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
    .map_err(|_| Error::BadPayload(String::from("invalid padding")))?;

  String::from_utf8(plaintext).map_err(|_| Error::BadPayload(String::from("plaintext is not utf-8")))
}
