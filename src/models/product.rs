use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FamilyId, ProductId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub family_id: FamilyId,
    pub name: String,
    pub is_bought: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Button label: bought items carry a check mark.
    pub fn label(&self) -> String {
        if self.is_bought {
            format!("✅ {}", self.name)
        } else {
            self.name.clone()
        }
    }
}
