//! Synchronous local key-value persistence.
//!
//! In the browser this is `localStorage`. Natively it is a directory with one file per key.
//! Tests use the in-memory backend.

use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("local storage is unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use super::{KeyValueStorage, StorageError};

    #[derive(Clone, Debug)]
    pub struct FileStorage {
        directory: PathBuf,
    }

    impl FileStorage {
        pub fn open(directory: impl AsRef<Path>) -> Result<Self, StorageError> {
            let directory = directory.as_ref().to_path_buf();
            std::fs::create_dir_all(&directory)?;
            Ok(Self { directory })
        }

        /// One file per key. Bytes other than lowercase letters, digits, `_` and `-` are written as `%XX`,
        /// so distinct keys never share a file, even on case-insensitive file systems.
        fn path(&self, key: &str) -> PathBuf {
            let mut file_name = String::with_capacity(key.len());
            for byte in key.bytes() {
                match byte {
                    b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => file_name.push(char::from(byte)),
                    _ => file_name.push_str(&format!("%{byte:02X}")),
                }
            }
            self.directory.join(format!("{file_name}.json"))
        }
    }

    impl KeyValueStorage for FileStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            match std::fs::read_to_string(self.path(key)) {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            // write-then-rename so a crash never leaves a half-written file behind
            let path = self.path(key);
            let temporary = path.with_extension("json.tmp");
            std::fs::write(&temporary, value)?;
            std::fs::rename(&temporary, &path)?;
            Ok(())
        }

        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            match std::fs::remove_file(self.path(key)) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserStorage;

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::{KeyValueStorage, StorageError};

    fn js_error(e: wasm_bindgen::JsValue) -> StorageError {
        StorageError::Unavailable(format!("{e:?}"))
    }

    pub struct BrowserStorage {
        storage: web_sys::Storage,
    }

    impl BrowserStorage {
        pub fn local() -> Result<Self, StorageError> {
            let window = web_sys::window()
                .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?;
            let storage = window
                .local_storage()
                .map_err(js_error)?
                .ok_or_else(|| StorageError::Unavailable("localStorage is disabled".to_string()))?;
            Ok(Self { storage })
        }
    }

    impl KeyValueStorage for BrowserStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.storage.get_item(key).map_err(js_error)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            self.storage.set_item(key, value).map_err(js_error)
        }

        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            self.storage.remove_item(key).map_err(js_error)
        }
    }
}
