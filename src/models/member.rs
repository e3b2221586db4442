use serde::{Deserialize, Serialize};

use super::ui_mode::UiMode;
use super::{ChatId, FamilyId, MessageId};

/// A chat participant. The chat id doubles as the user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub chat_id: ChatId,
    pub username: String,
    pub family_id: Option<FamilyId>,
    /// Id of the list message this bot most recently sent or edited for the member.
    pub last_message_id: Option<MessageId>,
    pub mode: UiMode,
}

impl Member {
    pub fn with_last_message(mut self, message_id: MessageId) -> Self {
        self.last_message_id = Some(message_id);
        self
    }
}
