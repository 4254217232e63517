// In crates/notifier/src/lib.rs

use std::sync::Mutex;

use async_trait::async_trait;

pub mod error;
pub mod messages;
pub mod telegram;

// Re-export public types
pub use error::{Error, Result};
pub use telegram::TelegramNotifier;

/// Delivers human-readable status messages to an operator.
///
/// Delivery is best-effort: implementations log their own failures and never
/// surface them to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str);
}

/// Writes messages to the log only. Used when no chat is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) {
        tracing::info!(target: "notifier", "{}", messages::strip_html(message));
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Messages containing `needle`.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.messages().into_iter().filter(|m| m.contains(needle)).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.to_string());
        }
    }
}
