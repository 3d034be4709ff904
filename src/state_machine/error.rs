//! Error types for building transition tables and moving between states.

/// Indicates that a [`TransitionTable`](super::TransitionTable) refers to states it does not
/// declare.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("invalid initial state {state}")]
    InvalidInitial { state: String },

    #[error("invalid terminal state {state}")]
    InvalidTerminal { state: String },

    #[error("invalid source state {state}")]
    InvalidSource { state: String },

    #[error("invalid target state {state}")]
    InvalidTarget { state: String },

    #[error("hooks bound to undeclared state {state}")]
    InvalidHookState { state: String },
}

/// Indicates that a machine attempted a transition absent from its table.
#[derive(Debug, thiserror::Error)]
#[error("transition from {from} to {to} is not allowed")]
pub struct TransitionNotAllowed {
    pub from: String,
    pub to: String,
}
