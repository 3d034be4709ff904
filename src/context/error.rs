//! Error types for settings checks against the shared [`Context`](super::Context).

/// Indicates that a setting required by a [`CheckRule`](super::CheckRule) has no value and no
/// default to fall back on.
#[derive(Debug, thiserror::Error)]
#[error("missing mandatory setting '{key}'")]
pub struct MissingSetting {
    pub key: String,
}

/// Indicates that a setting value was rejected by the validation function of a
/// [`CheckRule`](super::CheckRule).
#[derive(Debug, thiserror::Error)]
#[error("invalid value for setting '{key}'")]
pub struct InvalidSetting {
    pub key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Missing(#[from] MissingSetting),

    #[error(transparent)]
    Invalid(#[from] InvalidSetting),
}
