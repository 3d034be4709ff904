/// Errors raised by [`Store`](super::Store) implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o failed")]
    Io(#[from] std::io::Error),

    #[error("store document is not valid json")]
    Json(#[from] serde_json::Error),

    #[error("store document at {path} is not a mapping")]
    Malformed { path: String },
}
