use serde::{Deserialize, Serialize};
use std::fmt;

/// Which keyboard a member sees under their list message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    #[default]
    Normal,
    Edit,
}

impl UiMode {
    pub fn from_edit_flag(edit: bool) -> Self {
        if edit {
            UiMode::Edit
        } else {
            UiMode::Normal
        }
    }

    pub fn is_edit(self) -> bool {
        self == UiMode::Edit
    }

    /// The other mode; the only transition the state machine has.
    pub fn toggled(self) -> Self {
        match self {
            UiMode::Normal => UiMode::Edit,
            UiMode::Edit => UiMode::Normal,
        }
    }
}

impl fmt::Display for UiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiMode::Normal => write!(f, "normal"),
            UiMode::Edit => write!(f, "edit"),
        }
    }
}
