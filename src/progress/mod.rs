// Module: Progress
// Fire-and-forget progress notifications; a lost notification is acceptable.

use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

pub trait ProgressSink: Send + Sync {
    fn report(&self, current: usize, total: usize, label: &str, message: &str);
}

/// Writes progress as structured log events.
#[derive(Debug, Default, Clone)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, current: usize, total: usize, label: &str, message: &str) {
        info!(current, total, label, "{}", message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub label: String,
    pub message: String,
}

/// Forwards progress to a channel (e.g. a UI task). Send errors are ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, current: usize, total: usize, label: &str, message: &str) {
        let _ = self.tx.send(ProgressEvent {
            current,
            total,
            label: label.to_string(),
            message: message.to_string(),
        });
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _current: usize, _total: usize, _label: &str, _message: &str) {}
}
