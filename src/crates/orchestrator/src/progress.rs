//! Progress reporting.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A progress update: what is happening and how far along the run is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    /// 0 to 100.
    pub percent: u8,
}

/// Receives progress updates from a running workflow.
///
/// Implemented for any `Fn(&str, u8)` closure.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, u8) + Send + Sync,
{
    fn report(&self, message: &str, percent: u8) {
        self(message, percent)
    }
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _message: &str, _percent: u8) {}
}

/// Forwards updates over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }

    /// A sink together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, message: &str, percent: u8) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.sender.send(ProgressEvent {
            message: message.to_string(),
            percent: percent.min(100),
        });
    }
}
