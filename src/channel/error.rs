/// Errors raised when reading from or writing to a [`channel`](super::channel).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChannelError {
    /// Nothing arrived within the allowed wait.
    #[error("channel is empty")]
    Empty,

    /// The other side of the channel is gone and nothing is left to read.
    #[error("channel is closed")]
    Closed,
}
