use std::result;

pub mod keys_table;

type Result<T> = result::Result<T, redb::Error>;

trait ClientDatabase<'a> {
  type K;
  type V;
  /// Writes every entry in a single transaction.
  fn write_to_db(&self, entries: &[(Self::K, Self::V)]) -> Result<()>;
  fn remove_from_db(&self, keys: &[Self::K]) -> Result<()>;
}
