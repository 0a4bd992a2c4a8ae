//! Progress reporting for optimisation runs.
//!
//! Messages are human-readable status lines. Delivery is fire-and-forget and
//! preserves emission order; sinks never block or push back on the run.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::info;

pub trait ProgressSink: Send + Sync {
    fn emit(&self, message: &str);
}

/// Forwards progress lines to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, message: &str) {
        info!(progress = message, "optimisation progress");
    }
}

/// Streams progress lines to a receiver, e.g. a websocket or SSE task.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelProgress {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, message: &str) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(message.to_string());
    }
}

/// Keeps every line in memory and mirrors it to the log.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    messages: Mutex<Vec<String>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages.into_inner()
    }
}

impl ProgressSink for CollectingProgress {
    fn emit(&self, message: &str) {
        TracingProgress.emit(message);
        self.messages.lock().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_progress_keeps_order() {
        let sink = CollectingProgress::new();
        sink.emit("Commencing optimisation");
        sink.emit("Finished");
        assert_eq!(sink.messages(), vec!["Commencing optimisation", "Finished"]);
        assert_eq!(sink.into_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_channel_progress_delivers_in_order() {
        let (sink, mut rx) = ChannelProgress::channel();
        sink.emit("one");
        sink.emit("two");
        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
    }

    #[test]
    fn test_channel_progress_ignores_closed_receiver() {
        let (sink, rx) = ChannelProgress::channel();
        drop(rx);
        sink.emit("nobody listening");
    }
}
