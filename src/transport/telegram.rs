//! Telegram Bot API client.
//!
//! Plain HTTPS + JSON against `https://api.telegram.org/bot<token>/<method>`.
//! Every request carries a timeout so a stalled call degrades to an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CallbackEvent, ChatTransport, InboundEvent, Keyboard, TextMessage, TransportError};
use crate::models::{ChatId, MessageId};

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: ChatId,
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

impl Update {
    /// Id of a callback that [`into_event`](Self::into_event) can't turn into
    /// an event because its message is no longer attached. It still has to be
    /// answered to clear the client's loading indicator.
    pub fn orphan_callback_id(&self) -> Option<&str> {
        match &self.callback_query {
            Some(query) if self.message.is_none() && query.message.is_none() => {
                Some(query.id.as_str())
            }
            _ => None,
        }
    }

    /// Converts the update into an inbound event.
    ///
    /// Returns `None` for update kinds the bot doesn't handle (stickers,
    /// callbacks on messages too old to be delivered, ...).
    pub fn into_event(self) -> Option<InboundEvent> {
        if let Some(message) = self.message {
            let text = message.text?;
            let (sender_id, sender_name) = match message.from {
                Some(user) => (user.id, user.first_name),
                None => (message.chat.id, String::new()),
            };
            return Some(InboundEvent::Text(TextMessage {
                chat_id: message.chat.id,
                sender_id,
                sender_name,
                text,
            }));
        }

        let query = self.callback_query?;
        let message = query.message?;
        Some(InboundEvent::Callback(CallbackEvent {
            chat_id: message.chat.id,
            message_id: message.message_id,
            callback_id: query.id,
            data: query.data.unwrap_or_default(),
            sender_id: query.from.id,
            sender_name: query.from.first_name,
        }))
    }
}

#[derive(Serialize)]
struct SendMessageParams<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a Keyboard>,
}

#[derive(Serialize)]
struct EditMessageTextParams<'a> {
    chat_id: ChatId,
    message_id: MessageId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a Keyboard>,
}

#[derive(Serialize)]
struct EditMessageKeyboardParams<'a> {
    chat_id: ChatId,
    message_id: MessageId,
    reply_markup: &'a Keyboard,
}

#[derive(Serialize)]
struct MessageRef {
    chat_id: ChatId,
    message_id: MessageId,
}

#[derive(Serialize)]
struct AnswerCallbackParams<'a> {
    callback_query_id: &'a str,
}

#[derive(Serialize)]
struct GetUpdatesParams {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

/// Maps an unsuccessful API response to a transport error.
fn api_error(code: Option<i32>, description: Option<String>) -> TransportError {
    let description = description.unwrap_or_else(|| "unknown error".to_string());
    if description.contains("message is not modified") {
        return TransportError::NotModified;
    }
    TransportError::Api {
        code: code.unwrap_or(0),
        description,
    }
}

/// HTTP client for one bot.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl TelegramClient {
    /// Creates a client for the bot identified by `token`.
    pub fn new(
        api_url: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            request_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<P, R>(
        &self,
        method: &str,
        params: &P,
        timeout: Duration,
    ) -> Result<R, TransportError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let body: ApiResponse<R> = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        if !body.ok {
            return Err(api_error(body.error_code, body.description));
        }

        body.result
            .ok_or_else(|| TransportError::Decode(format!("{} returned no result", method)))
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, TransportError> {
        let params = GetUpdatesParams {
            offset,
            timeout: poll_timeout.as_secs(),
            allowed_updates: ["message", "callback_query"],
        };
        // The server holds the request for up to the poll timeout.
        self.call("getUpdates", &params, self.request_timeout + poll_timeout)
            .await
    }
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let params = SendMessageParams {
            chat_id,
            text,
            reply_markup: keyboard,
        };
        let message: Message = self
            .call("sendMessage", &params, self.request_timeout)
            .await?;
        Ok(message.message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        let params = EditMessageTextParams {
            chat_id,
            message_id,
            text,
            reply_markup: keyboard,
        };
        self.call::<_, serde_json::Value>("editMessageText", &params, self.request_timeout)
            .await?;
        Ok(())
    }

    async fn edit_message_keyboard(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError> {
        let params = EditMessageKeyboardParams {
            chat_id,
            message_id,
            reply_markup: keyboard,
        };
        self.call::<_, serde_json::Value>("editMessageReplyMarkup", &params, self.request_timeout)
            .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        let params = MessageRef {
            chat_id,
            message_id,
        };
        self.call::<_, bool>("deleteMessage", &params, self.request_timeout)
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        let params = AnswerCallbackParams {
            callback_query_id: callback_id,
        };
        self.call::<_, bool>("answerCallbackQuery", &params, self.request_timeout)
            .await?;
        Ok(())
    }
}
