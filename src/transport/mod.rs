//! Boundary to the chat service.
//!
//! The orchestrator only sees [`ChatTransport`] and the inbound event types
//! here; [`telegram`] implements them over the Telegram Bot API.

pub mod telegram;

#[cfg(test)]
pub mod recording;

use serde::Serialize;
use std::future::Future;

use crate::models::{ChatId, MessageId};

pub use telegram::TelegramClient;

/// One inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Button {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
        }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
        }
    }
}

/// Inline keyboard attached under a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Keyboard {
    pub inline_keyboard: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.inline_keyboard.push(buttons);
        self
    }

    pub fn rows(&self) -> &[Vec<Button>] {
        &self.inline_keyboard
    }

    /// All callback tokens, row by row.
    pub fn callback_tokens(&self) -> Vec<&str> {
        self.inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| b.callback_data.as_deref())
            .collect()
    }
}

/// A text message from a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub chat_id: ChatId,
    /// Equal to `chat_id` in the private chats the bot serves.
    pub sender_id: ChatId,
    pub sender_name: String,
    pub text: String,
}

/// A tap on an inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub chat_id: ChatId,
    /// The message carrying the tapped keyboard.
    pub message_id: MessageId,
    pub callback_id: String,
    pub data: String,
    /// Equal to `chat_id` in the private chats the bot serves.
    pub sender_id: ChatId,
    pub sender_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text(TextMessage),
    Callback(CallbackEvent),
}

impl InboundEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            InboundEvent::Text(m) => m.chat_id,
            InboundEvent::Callback(c) => c.chat_id,
        }
    }

    pub fn sender_name(&self) -> &str {
        match self {
            InboundEvent::Text(m) => &m.sender_name,
            InboundEvent::Callback(c) => &c.sender_name,
        }
    }
}

/// Errors that can occur when talking to the chat service.
#[derive(Debug)]
pub enum TransportError {
    /// Network failure or timeout.
    Http(String),
    /// The service rejected the call.
    Api { code: i32, description: String },
    /// An edit would leave the message unchanged. Treated as success.
    NotModified,
    /// The response could not be decoded.
    Decode(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Http(e) => write!(f, "HTTP error: {}", e),
            TransportError::Api { code, description } => {
                write!(f, "Telegram API error {}: {}", code, description)
            }
            TransportError::NotModified => write!(f, "Message is not modified"),
            TransportError::Decode(e) => write!(f, "Failed to decode response: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

/// Outbound calls on the chat service.
///
/// Every call is bounded and fallible; callers log failures and move on.
pub trait ChatTransport: Send + Sync {
    fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> impl Future<Output = Result<MessageId, TransportError>> + Send;

    fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn edit_message_keyboard(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        keyboard: &Keyboard,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn answer_callback(
        &self,
        callback_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
