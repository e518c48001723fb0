//! redb-backed [`KeyValueStore`].
//!
//! One table, `&str -> &[u8]`, in a single database file. Every mutation is
//! its own committed transaction.

use super::{KeyValueStore, StoreError};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// File-backed key-value store.
pub struct RedbStore {
    db: Database,
}

fn backend(err: impl Into<redb::Error>) -> StoreError {
    StoreError::Backend(err.into())
}

impl RedbStore {
    /// Open the database at `path`, creating the file and table if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;
        let txn = db.begin_write().map_err(backend)?;
        {
            txn.open_table(ENTRIES).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(Self { db })
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        // Aborted write transaction: the table always exists inside one.
        let txn = self.db.begin_write().map_err(backend)?;
        let value = {
            let table = txn.open_table(ENTRIES).map_err(backend)?;
            let guard = table.get(key).map_err(backend)?;
            guard.map(|g| g.value().to_vec())
        };
        txn.abort().map_err(backend)?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(backend)?;
            table.insert(key, value).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(backend)?;
            table.remove(key).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(backend)?;
        txn.delete_table(ENTRIES).map_err(backend)?;
        {
            txn.open_table(ENTRIES).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");

        {
            let mut store = RedbStore::open(&path).unwrap();
            store.set("cart", b"lines").unwrap();
            store.set_value("count", &3u32).unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get("cart").unwrap(), Some(b"lines".to_vec()));
        assert_eq!(store.get_value::<u32>("count").unwrap(), Some(3));
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RedbStore::open(dir.path().join("store.redb")).unwrap();

        store.set("a", b"1").unwrap();
        store.set("b", b"2").unwrap();
        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("b").unwrap().is_some());

        store.clear().unwrap();
        assert!(store.get("b").unwrap().is_none());

        store.set("c", b"3").unwrap();
        assert_eq!(store.get("c").unwrap(), Some(b"3".to_vec()));
    }
}
