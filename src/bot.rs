use std::fmt;
use std::sync::Arc;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::channel::Sender;
use crate::store::{MemoryStore, Record, Store, StoreError};

/// Something the bot says: plain text, optionally with rich content and a file to attach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Utterance {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Concatenate the non-empty parts, separated by a single space.
    pub fn render(&self) -> String {
        [
            Some(self.text.as_str()),
            self.content.as_deref(),
            self.file.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// What machines need from the bot that owns them.
pub trait Bot: Send + Sync {
    /// Render an utterance to the audience of the bot.
    fn say(&self, utterance: Utterance);

    /// Durably record `value` under `key` for `label`.
    fn update(&self, label: &str, key: &str, value: Value) -> Result<(), StoreError>;

    /// Retrieve what was recorded for `label`.
    fn recall(&self, label: &str) -> Result<Option<Record>, StoreError>;
}

/// A [`Bot`] living in the current process: utterances are pushed into an outbound channel and
/// records go to a [`Store`].
#[derive(Builder)]
pub struct LocalBot {
    mouth: Sender<Utterance>,

    #[builder(default = Arc::new(MemoryStore::new()) as Arc<dyn Store>)]
    store: Arc<dyn Store>,
}

impl fmt::Debug for LocalBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBot")
            .field("mouth", &self.mouth)
            .field("store", &"<Store>")
            .finish()
    }
}

impl Bot for LocalBot {
    fn say(&self, utterance: Utterance) {
        debug!(utterance = %utterance, "Saying");
        if let Err(err) = self.mouth.put(utterance) {
            warn!(error = %err, "Utterance dropped, nobody is listening");
        }
    }

    fn update(&self, label: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.store.update(label, key, value)
    }

    fn recall(&self, label: &str) -> Result<Option<Record>, StoreError> {
        self.store.recall(label)
    }
}
