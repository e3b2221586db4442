mod family;
mod member;
mod product;
mod ui_mode;

pub use family::Family;
pub use member::Member;
pub use product::Product;
pub use ui_mode::UiMode;

/// Telegram chat id of a private chat, which is also the member's user id.
pub type ChatId = i64;
/// Telegram message id, unique within one chat.
pub type MessageId = i32;
pub type FamilyId = i64;
pub type ProductId = i64;
