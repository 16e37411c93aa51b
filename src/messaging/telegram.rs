//! Telegram Bot API messenger

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatId, MessageId, Messenger, MessagingError};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct EditMessageRequest<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Clone)]
pub struct TelegramMessenger {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramMessenger {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self, MessagingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MessagingError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.into(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.token,
            method
        )
    }

    async fn call<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, MessagingError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| MessagingError::Http(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| MessagingError::Http(e.without_url().to_string()))?;
        decode_response(status, &body)
    }
}

// ============================================================================
// SBIO: Pure response handling (no I/O)
// ============================================================================

/// Map a Bot API reply to the envelope or an error
///
/// A non-2xx reply that is not a JSON envelope (a proxy's HTML error page)
/// still reports its HTTP status.
fn decode_response<T: DeserializeOwned>(
    status: u16,
    body: &str,
) -> Result<ApiResponse<T>, MessagingError> {
    let success = (200..300).contains(&status);
    let parsed: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) if !success => {
            return Err(MessagingError::Api {
                status,
                message: body.chars().take(200).collect(),
            })
        }
        Err(e) => return Err(MessagingError::Parse(e.to_string())),
    };

    if !success || !parsed.ok {
        return Err(MessagingError::Api {
            status,
            message: parsed
                .description
                .unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    Ok(parsed)
}

/// Telegram rejects an edit whose text equals the current text
fn is_not_modified(err: &MessagingError) -> bool {
    matches!(err, MessagingError::Api { status: 400, message } if message.contains("message is not modified"))
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_message(&self, recipient: ChatId, text: &str) -> Result<MessageId, MessagingError> {
        let body = SendMessageRequest {
            chat_id: recipient.0,
            text,
            disable_web_page_preview: true,
        };
        let response: ApiResponse<SentMessage> = self.call("sendMessage", &body).await?;
        let sent = response
            .result
            .ok_or_else(|| MessagingError::Parse("missing result".to_string()))?;
        debug!("Sent message {} to chat {}", sent.message_id, recipient);
        Ok(MessageId(sent.message_id))
    }

    async fn edit_message(
        &self,
        recipient: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), MessagingError> {
        let body = EditMessageRequest {
            chat_id: recipient.0,
            message_id: message_id.0,
            text,
        };
        match self.call::<_, serde_json::Value>("editMessageText", &body).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
