use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FamilyId;

/// The sharing group that owns one shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub id: FamilyId,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
}
