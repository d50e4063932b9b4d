use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

pub mod file;
pub mod memory;

/// Unprefixed names of every persisted record.
pub mod keys {
    pub const SESSION: &str = "session";
    pub const ADMIN_SESSION: &str = "admin_session";
    pub const USERS: &str = "users";
    pub const ADMIN_LOGS: &str = "admin_logs";
    pub const ADMIN_FAILED_ATTEMPTS: &str = "admin_failed_attempts";
    pub const PENDING_REQUESTS: &str = "pending_requests";
    pub const APPLICATIONS: &str = "applications";
    pub const APPLICATION_LOGS: &str = "application_logs";
    pub const VISITOR_ID: &str = "session_id";
    pub const TEMP_WALLET_ID: &str = "temp_wallet_id";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{key}` was modified by another writer (expected revision {expected}, found {found})")]
    Conflict {
        key: String,
        expected: u64,
        found: u64,
    },
}

/// Raw string key/value storage, the role local storage plays in a browser.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

impl<S: Storage + ?Sized> Storage for &S {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// A collection together with the revision it was read at.
#[derive(Debug)]
pub struct Versioned<T> {
    pub items: Vec<T>,
    revision: u64,
}

impl<T> Versioned<T> {
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Typed access over a [`Storage`] backend.
///
/// Collections are read and written whole. Every save checks the revision
/// counter stored next to the collection, so a writer holding a stale copy
/// gets [`StorageError::Conflict`] instead of silently overwriting newer data.
pub struct Store<S> {
    storage: S,
    prefix: String,
}

impl<S: Storage> Store<S> {
    pub fn new(storage: S, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    fn revision_key(&self, name: &str) -> String {
        format!("{}{name}_rev", self.prefix)
    }

    /// Reads a single record. Corrupt JSON reads as `None`.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StorageError> {
        let key = self.key(name);
        let Some(raw) = self.storage.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(%key, %err, "discarding unreadable record");
                Ok(None)
            }
        }
    }

    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StorageError> {
        let key = self.key(name);
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
            key: key.clone(),
            source,
        })?;
        tracing::debug!(%key, bytes = raw.len(), "writing record");
        self.storage.set(&key, &raw)
    }

    pub fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.storage.remove(&self.key(name))
    }

    fn current_revision(&self, name: &str) -> Result<u64, StorageError> {
        let key = self.revision_key(name);
        Ok(self
            .storage
            .get(&key)?
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0))
    }

    /// Loads a whole collection. Absent or corrupt data reads as empty.
    pub fn load_collection<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Versioned<T>, StorageError> {
        let revision = self.current_revision(name)?;
        let items = self.read::<Vec<T>>(name)?.unwrap_or_default();
        Ok(Versioned { items, revision })
    }

    /// Saves a collection loaded with [`Store::load_collection`], bumping its revision.
    pub fn save_collection<T: Serialize>(
        &self,
        name: &str,
        collection: &mut Versioned<T>,
    ) -> Result<(), StorageError> {
        let found = self.current_revision(name)?;
        if found != collection.revision {
            return Err(StorageError::Conflict {
                key: self.key(name),
                expected: collection.revision,
                found,
            });
        }
        self.write(name, &collection.items)?;
        let next = found + 1;
        self.storage
            .set(&self.revision_key(name), &next.to_string())?;
        collection.revision = next;
        Ok(())
    }

    /// Load, mutate, save. Nothing is written when `f` fails.
    pub fn update_collection<T, R, E>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Vec<T>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<StorageError>,
    {
        let mut collection = self.load_collection(name)?;
        let result = f(&mut collection.items)?;
        self.save_collection(name, &mut collection)?;
        Ok(result)
    }

    /// Appends to a collection that keeps only its newest `capacity` entries.
    pub fn push_bounded<T>(&self, name: &str, entry: T, capacity: usize) -> Result<(), StorageError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.update_collection(name, |items: &mut Vec<T>| {
            items.push(entry);
            if items.len() > capacity {
                let excess = items.len() - capacity;
                items.drain(..excess);
            }
            Ok::<_, StorageError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{memory::InMemoryStorage, *};

    #[test]
    fn keys_are_prefixed() {
        let backend = InMemoryStorage::default();
        let store = Store::new(&backend, "ugarit_");
        store.write(keys::SESSION, &"value").unwrap();
        assert_eq!(
            backend.get("ugarit_session").unwrap().as_deref(),
            Some("\"value\"")
        );
        assert_eq!(store.key(keys::USERS), "ugarit_users");
    }

    #[test]
    fn corrupt_collection_reads_as_empty() {
        let backend = InMemoryStorage::default();
        backend.set("ugarit_users", "[{not json").unwrap();
        let store = Store::new(&backend, "ugarit_");
        let loaded = store.load_collection::<u32>(keys::USERS).unwrap();
        assert!(loaded.items.is_empty());
    }

    #[test]
    fn stale_save_conflicts() {
        let backend = InMemoryStorage::default();
        let store = Store::new(&backend, "ugarit_");

        let mut first = store.load_collection::<u32>(keys::USERS).unwrap();
        let mut second = store.load_collection::<u32>(keys::USERS).unwrap();

        first.items.push(1);
        store.save_collection(keys::USERS, &mut first).unwrap();
        assert_eq!(first.revision(), 1);

        second.items.push(2);
        let err = store.save_collection(keys::USERS, &mut second).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Conflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
        let stored = store.load_collection::<u32>(keys::USERS).unwrap();
        assert_eq!(stored.items, vec![1]);
    }

    #[test]
    fn failed_update_writes_nothing() {
        let backend = InMemoryStorage::default();
        let store = Store::new(&backend, "ugarit_");
        let result: Result<(), StorageError> =
            store.update_collection(keys::USERS, |items: &mut Vec<u32>| {
                items.push(7);
                Err(StorageError::Conflict {
                    key: "forced".to_string(),
                    expected: 0,
                    found: 0,
                })
            });
        assert!(result.is_err());
        assert!(backend.get("ugarit_users").unwrap().is_none());
    }

    #[test]
    fn bounded_collection_keeps_newest() {
        let backend = InMemoryStorage::default();
        let store = Store::new(&backend, "ugarit_");
        for n in 0..15u32 {
            store.push_bounded(keys::ADMIN_FAILED_ATTEMPTS, n, 10).unwrap();
        }
        let stored = store
            .load_collection::<u32>(keys::ADMIN_FAILED_ATTEMPTS)
            .unwrap();
        assert_eq!(stored.items, (5..15).collect::<Vec<_>>());
    }
}
