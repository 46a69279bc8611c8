//! Visitor Identity
//!
//! A visitor is identified by an opaque token kept in client storage. It is
//! never linked to a vendor account.

use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Storage key under which the visitor token is kept.
pub const VISITOR_ID_KEY: &str = "visitor_id";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `visitor_{unix_millis}_{9 random base-36 chars}`
pub fn generate_visitor_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("visitor_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Key/value storage that outlives a single page, like browser local storage.
pub trait VisitorStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VisitorStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self
            .values
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key inside a directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl VisitorStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.dir.join(key)) {
            Ok(value) => {
                let value = value.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        std::fs::write(self.dir.join(key), value).map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

pub struct VisitorIdentity {
    storage: Arc<dyn VisitorStorage>,
}

impl VisitorIdentity {
    pub fn new(storage: Arc<dyn VisitorStorage>) -> Self {
        Self { storage }
    }

    /// The persisted visitor id, created and stored on first use. When storage
    /// cannot be read or written the id is ephemeral for this call.
    pub fn get_or_create_visitor_id(&self) -> String {
        match self.storage.get(VISITOR_ID_KEY) {
            Ok(Some(existing)) => return existing,
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("Visitor storage unreadable, using ephemeral id: {}", e);
                return generate_visitor_id();
            }
        }

        let visitor_id = generate_visitor_id();
        if let Err(e) = self.storage.set(VISITOR_ID_KEY, &visitor_id) {
            tracing::debug!("Visitor storage unwritable, id will not persist: {}", e);
        }
        visitor_id
    }
}
