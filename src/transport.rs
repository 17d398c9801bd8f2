//! Chat transport seam.

use async_trait::async_trait;

use crate::error::Result;

/// Text message received from a chat group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: String,
    pub text: String,
    pub group_id: i64,
}

impl InboundMessage {
    pub fn new(sender: &str, text: &str, group_id: i64) -> Self {
        Self {
            sender: sender.to_string(),
            text: text.to_string(),
            group_id,
        }
    }
}

/// Outbound side of a chat connection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, group_id: i64, text: &str) -> Result<()>;
}

/// Transport that records every message instead of sending it.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingTransport {
    sent: std::sync::Mutex<Vec<(i64, String)>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingTransport {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn sent_to(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Make subsequent sends fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, group_id: i64, text: &str) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::Error::Telegram("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push((group_id, text.to_string()));
        Ok(())
    }
}
