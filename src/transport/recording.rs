//! In-memory transport that records every outbound call.

use std::collections::HashSet;
use std::sync::Mutex;

use super::{ChatTransport, Keyboard, TransportError};
use crate::models::{ChatId, MessageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    EditText {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    EditKeyboard {
        chat_id: ChatId,
        message_id: MessageId,
        keyboard: Keyboard,
    },
    Delete {
        chat_id: ChatId,
        message_id: MessageId,
    },
    Answer {
        callback_id: String,
    },
}

impl Call {
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            Call::Send { chat_id, .. }
            | Call::EditText { chat_id, .. }
            | Call::EditKeyboard { chat_id, .. }
            | Call::Delete { chat_id, .. } => Some(*chat_id),
            Call::Answer { .. } => None,
        }
    }

    /// Sends and edits: the calls that leave a message in front of the member.
    pub fn is_view_update(&self) -> bool {
        matches!(
            self,
            Call::Send { .. } | Call::EditText { .. } | Call::EditKeyboard { .. }
        )
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    next_message_id: MessageId,
    unreachable: HashSet<ChatId>,
    failing_edits: HashSet<ChatId>,
}

/// Records calls instead of talking to a chat service.
///
/// Successful calls are recorded; failed ones are not.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<State>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().next_message_id = 1000;
        transport
    }

    /// Every call to `chat_id` fails from now on.
    pub fn make_unreachable(&self, chat_id: ChatId) {
        self.state.lock().unwrap().unreachable.insert(chat_id);
    }

    /// Edits in `chat_id` fail (e.g. message too old); sends still work.
    pub fn fail_edits(&self, chat_id: ChatId) {
        self.state.lock().unwrap().failing_edits.insert(chat_id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, chat_id: ChatId) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.chat_id() == Some(chat_id))
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn check(&self, chat_id: ChatId, is_edit: bool) -> Result<(), TransportError> {
        let state = self.state.lock().unwrap();
        if state.unreachable.contains(&chat_id) {
            return Err(TransportError::Api {
                code: 403,
                description: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        if is_edit && state.failing_edits.contains(&chat_id) {
            return Err(TransportError::Api {
                code: 400,
                description: "Bad Request: message to edit not found".to_string(),
            });
        }
        Ok(())
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        self.check(chat_id, false)?;
        let mut state = self.state.lock().unwrap();
        state.next_message_id += 1;
        let message_id = state.next_message_id;
        state.calls.push(Call::Send {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        self.check(chat_id, true)?;
        self.record(Call::EditText {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit_message_keyboard(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError> {
        self.check(chat_id, true)?;
        self.record(Call::EditKeyboard {
            chat_id,
            message_id,
            keyboard: keyboard.clone(),
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        self.check(chat_id, false)?;
        self.record(Call::Delete {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.record(Call::Answer {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }
}
