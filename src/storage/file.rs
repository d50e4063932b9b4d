use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use super::{Storage, StorageError};

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        tracing::debug!(dir = %dir.display(), "opened file storage");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        key: key.to_string(),
        source,
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(key)(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // write-then-rename so readers never observe a half-written file
        let target = self.path(key);
        let staging = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&staging, value).map_err(io_error(key))?;
        fs::rename(&staging, &target).map_err(io_error(key))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(key)(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("data")).unwrap();

        assert!(storage.get("ugarit_users").unwrap().is_none());
        storage.set("ugarit_users", "[]").unwrap();
        assert_eq!(storage.get("ugarit_users").unwrap().as_deref(), Some("[]"));
        assert!(storage.dir().join("ugarit_users.json").exists());

        storage.remove("ugarit_users").unwrap();
        assert!(storage.get("ugarit_users").unwrap().is_none());
        // removing twice is fine
        storage.remove("ugarit_users").unwrap();
    }
}
