use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

use super::{Record, Store, StoreError};

/// A [`Store`] persisted as a single JSON document, rewritten on every change.
///
/// The document maps each label to an object of recorded keys. Writes go to a sibling temporary
/// file first and are renamed over the document, so a crash never leaves it half-written. A
/// change only becomes visible to [`recall`](Store::recall) once it is on disk.
///
/// File access is blocking. On a multi-threaded tokio runtime it is moved off the async workers
/// with [`block_in_place`](tokio::task::block_in_place); on a current-thread runtime it runs in
/// place and stalls that runtime for the duration of the write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading previous records if the document exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let document = if path.exists() {
            match serde_json::from_str::<Value>(&fs::read_to_string(&path)?)? {
                Value::Object(document) => document,
                _ => {
                    return Err(StoreError::Malformed {
                        path: path.display().to_string(),
                    });
                }
            }
        } else {
            Map::new()
        };

        debug!(path = %path.display(), labels = document.len(), "Opened store");

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, document: &Map<String, Value>) -> Result<(), StoreError> {
        let staging = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(document)?;
        blocking(|| {
            fs::write(&staging, bytes)?;
            fs::rename(&staging, &self.path)
        })?;
        Ok(())
    }
}

/// Run blocking file access without starving the async workers, where the runtime allows it.
fn blocking<R>(io: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(io)
        }
        _ => io(),
    }
}

impl Store for JsonFileStore {
    fn update(&self, label: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let mut document = self.document.lock().unwrap_or_else(PoisonError::into_inner);

        let mut staged = document.clone();
        let record = staged
            .entry(label.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !record.is_object() {
            *record = Value::Object(Map::new());
        }
        if let Value::Object(record) = record {
            record.insert(key.to_string(), value);
        }

        self.persist(&staged)?;
        *document = staged;
        Ok(())
    }

    fn recall(&self, label: &str) -> Result<Option<Record>, StoreError> {
        let document = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(document
            .get(label)
            .and_then(Value::as_object)
            .cloned())
    }

    fn forget(&self, label: &str) -> Result<(), StoreError> {
        let mut document = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        if !document.contains_key(label) {
            return Ok(());
        }

        let mut staged = document.clone();
        staged.remove(label);
        self.persist(&staged)?;
        *document = staged;
        Ok(())
    }
}
