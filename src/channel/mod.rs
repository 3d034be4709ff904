//! Unidirectional message channels between bot components.
//!
//! A channel carries either payload values or an explicit [`Message::Shutdown`] marker telling
//! the reader to stop consuming. Any number of [`Sender`]s may feed a channel, while reads are
//! serialized so that at most one reader loop consumes it at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use self::error::ChannelError;

pub mod error;

/// A unit of data travelling through a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    Payload(T),
    /// No more input will come, readers should wind down gracefully.
    Shutdown,
}

/// Textual tokens flowing from an external source into input machines.
pub type TokenSender = Sender<String>;
pub type TokenReceiver = Receiver<String>;

/// Create a new channel, returning the sending and receiving halves.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Sender { tx },
        Receiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// The writing half of a channel. Cloning it adds a producer.
#[derive(Debug)]
pub struct Sender<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
}

impl<T> Sender<T> {
    /// Enqueue `value` without blocking.
    pub fn put(&self, value: T) -> Result<(), ChannelError> {
        self.send(Message::Payload(value))
    }

    /// Enqueue the shutdown marker.
    pub fn shutdown(&self) -> Result<(), ChannelError> {
        self.send(Message::Shutdown)
    }

    pub fn send(&self, message: Message<T>) -> Result<(), ChannelError> {
        self.tx.send(message).map_err(|_| ChannelError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// The reading half of a channel.
///
/// Clones share the same queue; each message is delivered to exactly one of them.
#[derive(Debug)]
pub struct Receiver<T> {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Message<T>>>>,
}

impl<T> Receiver<T> {
    /// Dequeue the next message, waiting at most `timeout` for it to arrive.
    ///
    /// Returns [`ChannelError::Empty`] when the wait expires, and [`ChannelError::Closed`] once
    /// every sender is dropped and the queue is drained.
    pub async fn get(&self, timeout: Duration) -> Result<Message<T>, ChannelError> {
        let received = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await;

        match received {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(ChannelError::Closed),
            Err(_) => Err(ChannelError::Empty),
        }
    }

    /// Dequeue the next message if one is immediately available.
    pub fn try_get(&self) -> Result<Message<T>, ChannelError> {
        let mut rx = self.rx.try_lock().map_err(|_| ChannelError::Empty)?;
        rx.try_recv().map_err(|err| match err {
            mpsc::error::TryRecvError::Empty => ChannelError::Empty,
            mpsc::error::TryRecvError::Disconnected => ChannelError::Closed,
        })
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_put_and_get_in_order() {
        let (sender, receiver) = channel();

        sender.put("hello").unwrap();
        sender.put("world").unwrap();

        assert_eq!(receiver.get(WAIT).await, Ok(Message::Payload("hello")));
        assert_eq!(receiver.get(WAIT).await, Ok(Message::Payload("world")));
    }

    #[tokio::test]
    async fn test_get_times_out_when_empty() {
        let (_sender, receiver) = channel::<String>();
        assert_eq!(receiver.get(WAIT).await, Err(ChannelError::Empty));
        assert_eq!(receiver.try_get(), Err(ChannelError::Empty));
    }

    #[tokio::test]
    async fn test_shutdown_marker() {
        let (sender, receiver) = channel::<String>();

        sender.shutdown().unwrap();

        assert_eq!(receiver.get(WAIT).await, Ok(Message::Shutdown));
    }

    #[tokio::test]
    async fn test_closed_after_senders_dropped() {
        let (sender, receiver) = channel();
        let other = sender.clone();

        other.put(1).unwrap();
        drop(sender);
        drop(other);

        assert_eq!(receiver.get(WAIT).await, Ok(Message::Payload(1)));
        assert_eq!(receiver.get(WAIT).await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_put_fails_without_receiver() {
        let (sender, receiver) = channel();
        drop(receiver);

        assert!(sender.is_closed());
        assert_eq!(sender.put(1), Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_delayed_producer() {
        let (sender, receiver) = channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender.put("ping").unwrap();
        });

        let message = receiver.get(Duration::from_secs(2)).await;
        assert_eq!(message, Ok(Message::Payload("ping")));
    }
}
