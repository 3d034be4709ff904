//! Error types for configuring an [`InputRequest`](super::InputRequest) and feeding its machine.

/// Indicates that an input request was configured in a way that can never work.
#[derive(Debug, thiserror::Error)]
pub enum InputConfigError {
    #[error("either a question or some question content is required")]
    MissingQuestion,

    #[error("a mask and a regex cannot be used together")]
    ConflictingFilters,

    #[error("invalid answer filter")]
    Pattern(#[from] PatternError),
}

/// Indicates that a matching primitive was called with unusable arguments.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    EmptyPattern,

    #[error("subject is empty")]
    EmptySubject,

    #[error("pattern does not compile")]
    Expression(#[from] regex::Error),
}

/// Indicates that a candidate answer was handed to a machine that is not listening for one.
#[derive(Debug, thiserror::Error)]
#[error("not listening for input in state {state}")]
pub struct NotListening {
    pub state: String,
}
