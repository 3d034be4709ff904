//! Durable recording of answers, grouped by label.
//!
//! Each label holds a mapping from key to the last value recorded for it.

use serde_json::{Map, Value};

pub use self::error::StoreError;
pub use self::file::JsonFileStore;
pub use self::memory::MemoryStore;

pub mod error;
pub mod file;
pub mod memory;

/// The records of one label, keyed by name.
pub type Record = Map<String, Value>;

pub trait Store: Send + Sync {
    /// Record `value` under `key` for `label`, replacing any previous value.
    fn update(&self, label: &str, key: &str, value: Value) -> Result<(), StoreError>;

    /// Retrieve everything recorded for `label`.
    fn recall(&self, label: &str) -> Result<Option<Record>, StoreError>;

    /// Drop everything recorded for `label`.
    fn forget(&self, label: &str) -> Result<(), StoreError>;
}
