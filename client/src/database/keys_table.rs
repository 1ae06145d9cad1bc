use std::{fs, path::PathBuf};

use log::{debug, info};
use redb::{Database, ReadableTable, TableDefinition};

use nostr_client_sdk::schnorr::{Keys, SchnorrError};

use super::ClientDatabase;

const TABLE_NAME: &str = "keys";
const KEYS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new(TABLE_NAME);

const SECRET_KEY: &str = "private_key";
const PUBLIC_KEY: &str = "public_key";

/// [`KeysTable`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error(transparent)]
  Database(#[from] redb::Error),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// The stored secret key does not parse or does not match the stored public key
  #[error("stored keys are corrupted: {0}")]
  Corrupted(String),
}

impl From<SchnorrError> for Error {
  fn from(err: SchnorrError) -> Self {
    Self::Corrupted(err.to_string())
  }
}

///
/// The client's own key pair, persisted in a `redb` file.
///
/// The secret key is stored as its 32 raw bytes and the x-only public key
/// next to it, so a mismatch between both is detected on load.
///
pub struct KeysTable {
  db: Database,
}

impl<'a> ClientDatabase<'a> for KeysTable {
  type K = &'a str;
  type V = &'a [u8];

  fn write_to_db(&self, entries: &[(Self::K, Self::V)]) -> super::Result<()> {
    let write_txn = self.db.begin_write()?;
    {
      let mut table = write_txn.open_table(KEYS_TABLE)?;
      for (k, v) in entries {
        table.insert(*k, *v)?;
      }
    }
    write_txn.commit()?;
    Ok(())
  }

  fn remove_from_db(&self, keys: &[Self::K]) -> super::Result<()> {
    let write_txn = self.db.begin_write()?;
    {
      let mut table = write_txn.open_table(KEYS_TABLE)?;
      for k in keys {
        table.remove(*k)?;
      }
    }
    write_txn.commit()?;
    Ok(())
  }
}

impl KeysTable {
  ///
  /// Opens (or creates) `<dir>/keys.redb`.
  ///
  /// ## Arguments
  ///
  /// * `dir` - directory holding the database files, created if missing
  ///
  pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
    let dir = dir.into();
    fs::create_dir_all(&dir)?;
    let db = Database::create(dir.join(format!("{TABLE_NAME}.redb")))?;

    {
      let write_txn = db.begin_write()?;
      write_txn.open_table(KEYS_TABLE)?; // creates the table if it doesn't exist
      write_txn.commit()?;
    }

    Ok(Self { db })
  }

  fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
    let read_txn = self.db.begin_read()?;
    let table = read_txn.open_table(KEYS_TABLE)?;
    let value = table.get(key)?.map(|value| value.value().to_vec());
    Ok(value)
  }

  /// Stored keys, if any.
  pub fn get_client_keys(&self) -> Result<Option<Keys>, Error> {
    let (Some(secret_key), Some(public_key)) = (self.read(SECRET_KEY)?, self.read(PUBLIC_KEY)?) else {
      return Ok(None);
    };

    let keys = Keys::parse(&hex::encode(secret_key))?;
    if keys.public_key().serialize().as_slice() != public_key.as_slice() {
      return Err(Error::Corrupted(String::from("public key does not match the secret key")));
    }
    Ok(Some(keys))
  }

  /// Replaces whatever is stored with `keys`.
  pub fn store_client_keys(&self, keys: &Keys) -> Result<(), Error> {
    let secret_key = keys.secret_key().secret_bytes();
    let public_key = keys.public_key().serialize();
    self.write_to_db(&[(SECRET_KEY, &secret_key[..]), (PUBLIC_KEY, &public_key[..])])?;
    debug!("Stored keys for {}", keys.public_key_hex());
    Ok(())
  }

  pub fn get_or_create_client_keys(&self) -> Result<Keys, Error> {
    if let Some(keys) = self.get_client_keys()? {
      return Ok(keys);
    }

    let keys = Keys::generate();
    self.store_client_keys(&keys)?;
    info!("Generated new client keys {}", keys.public_key_hex());
    Ok(keys)
  }

  /// Forgets the stored keys.
  pub fn clear(&self) -> Result<(), Error> {
    self.remove_from_db(&[SECRET_KEY, PUBLIC_KEY])?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  struct Sut {
    keys_table: KeysTable,
    dir: PathBuf,
  }

  impl Drop for Sut {
    fn drop(&mut self) {
      fs::remove_dir_all(&self.dir).unwrap();
    }
  }

  impl Sut {
    fn new(name: &str) -> Sut {
      let dir = std::env::temp_dir().join(format!("nostr-cli-{name}-{}", std::process::id()));
      let keys_table = KeysTable::new(&dir).unwrap();
      Sut { keys_table, dir }
    }
  }

  #[test]
  fn test_get_or_create_persists_the_keys() {
    let sut = Sut::new("get_or_create");
    assert!(sut.keys_table.get_client_keys().unwrap().is_none());

    let created = sut.keys_table.get_or_create_client_keys().unwrap();
    let loaded = sut.keys_table.get_or_create_client_keys().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(sut.keys_table.get_client_keys().unwrap(), Some(created));
  }

  #[test]
  fn test_store_replaces_and_clear_removes() {
    let sut = Sut::new("store_clear");
    let keys = Keys::parse(&"11".repeat(32)).unwrap();

    sut.keys_table.store_client_keys(&Keys::generate()).unwrap();
    sut.keys_table.store_client_keys(&keys).unwrap();
    assert_eq!(sut.keys_table.get_client_keys().unwrap(), Some(keys));

    sut.keys_table.clear().unwrap();
    assert!(sut.keys_table.get_client_keys().unwrap().is_none());
  }

  #[test]
  fn test_store_writes_both_keys_in_one_transaction() {
    let sut = Sut::new("single_txn");
    let keys = Keys::generate();
    sut.keys_table.store_client_keys(&keys).unwrap();

    assert_eq!(
      sut.keys_table.read(SECRET_KEY).unwrap(),
      Some(keys.secret_key().secret_bytes().to_vec())
    );
    assert_eq!(
      sut.keys_table.read(PUBLIC_KEY).unwrap(),
      Some(keys.public_key().serialize().to_vec())
    );

    sut.keys_table.clear().unwrap();
    assert_eq!(sut.keys_table.read(SECRET_KEY).unwrap(), None);
    assert_eq!(sut.keys_table.read(PUBLIC_KEY).unwrap(), None);
  }

  #[test]
  fn test_mismatched_public_key_is_corrupted() {
    let sut = Sut::new("mismatch");
    sut
      .keys_table
      .write_to_db(&[(SECRET_KEY, &[0x11; 32][..]), (PUBLIC_KEY, &[0x22; 32][..])])
      .unwrap();

    assert!(matches!(
      sut.keys_table.get_client_keys(),
      Err(Error::Corrupted(_))
    ));
  }
}
