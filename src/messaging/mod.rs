//! Outbound messaging to subscribers and admins
//!
//! Workers talk to people through the `Messenger` trait. Failures are
//! reported to the caller, who logs them; no worker loop stops because a
//! message could not be delivered.

pub mod telegram;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::fleet::UserId;

pub use telegram::TelegramMessenger;

/// Chat the message goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl From<UserId> for ChatId {
    fn from(user: UserId) -> Self {
        ChatId(user.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a sent message, needed to edit it later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(String),
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, recipient: ChatId, text: &str) -> Result<MessageId, MessagingError>;

    async fn edit_message(
        &self,
        recipient: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), MessagingError>;
}

/// Messenger that only writes to the log; used when no bot token is configured
#[derive(Debug, Default)]
pub struct LogMessenger {
    next_id: std::sync::atomic::AtomicI64,
}

impl LogMessenger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_message(&self, recipient: ChatId, text: &str) -> Result<MessageId, MessagingError> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        info!("[message {} -> {}] {}", id, recipient, text);
        Ok(MessageId(id))
    }

    async fn edit_message(
        &self,
        recipient: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), MessagingError> {
        info!("[edit {} -> {}] {}", message_id.0, recipient, text);
        Ok(())
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================
