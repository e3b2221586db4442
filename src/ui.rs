//! Message texts and inline keyboards shown to members.

use crate::models::{Product, UiMode};
use crate::router::{
    product_token, BUY, CLEAR_ALL, CONFIRM_CLEAR, CONFIRM_EDIT_PRODUCT, DELETE_PRODUCT,
    EDIT_PRODUCT, REFRESH, TOGGLE_MODE_EDIT,
};
use crate::transport::{Button, Keyboard};

pub const WELCOME: &str = "👋 Hi! I keep one shopping list in sync for your whole family.\n\n\
    🔹 Send /create_family to start a new family, or open an invite link from a family member.\n\
    🔹 Then just send me items separated by commas or new lines.";
pub const FAMILY_CREATED: &str =
    "👪 Family created! Tap the button below to send the invite link to your family:";
pub const JOINED: &str = "🤝 You joined the family! Here is your shared list:";
pub const JOIN_REJECTED: &str = "❌ This invite link is invalid or has expired.";
pub const NO_FAMILY: &str =
    "You are not in a family yet. Send /create_family or open an invite link first.";
pub const FAILURE: &str = "⚠️ Something went wrong, please try again.";
pub const PRODUCT_MISSING: &str = "That item is no longer on the list.";

const INVITATION: &str = "Join my family shopping list! 🛒";

/// Deep link that starts the bot with the invite code.
pub fn invite_link(bot_username: &str, code: &str) -> String {
    format!("https://t.me/{}?start={}", bot_username, code)
}

/// Telegram share dialog pre-filled with the invite link.
pub fn share_url(bot_username: &str, code: &str) -> String {
    format!(
        "https://t.me/share/url?url={}&text={}",
        urlencoding::encode(&invite_link(bot_username, code)),
        urlencoding::encode(INVITATION)
    )
}

pub fn invite_keyboard(bot_username: &str, code: &str) -> Keyboard {
    Keyboard::new().row(vec![Button::url(
        "👪 Send invitation",
        share_url(bot_username, code),
    )])
}

/// Heading of a plain list view.
pub fn list_header(products: &[Product], mode: UiMode) -> String {
    match (mode, products.is_empty()) {
        (_, true) => "🛒 The shopping list is empty. Send me what to buy.".to_string(),
        (UiMode::Edit, false) => "✏️ Edit mode: tap an item to change it.".to_string(),
        (UiMode::Normal, false) => {
            let open = products.iter().filter(|p| !p.is_bought).count();
            format!("🛒 Shopping list ({} to buy):", open)
        }
    }
}

pub fn list_updated(actor: &str) -> String {
    format!("🛒 Shopping list updated ({}):", actor)
}

pub fn toggled_notice(actor: &str, product: &Product) -> String {
    let verb = if product.is_bought {
        "bought"
    } else {
        "put back"
    };
    format!("🛒 List updated: {} {} {}", actor, verb, product.name)
}

pub fn removed_notice(actor: &str, product: &Product) -> String {
    format!("🛒 List updated: {} removed {}", actor, product.name)
}

pub fn cleared_notice(actor: &str) -> String {
    format!("🧹 {} cleared the shopping list.", actor)
}

pub fn product_card(product: &Product) -> String {
    format!("✏️ {}", product.label())
}

pub fn confirm_delete_prompt(product: &Product) -> String {
    format!("🗑 Remove {} from the list?", product.name)
}

/// Keyboard under the list message for the member's current mode.
pub fn list_keyboard(products: &[Product], mode: UiMode) -> Keyboard {
    match mode {
        UiMode::Normal => normal_keyboard(products),
        UiMode::Edit => edit_keyboard(products),
    }
}

fn normal_keyboard(products: &[Product]) -> Keyboard {
    let mut keyboard = products.iter().fold(Keyboard::new(), |kb, product| {
        kb.row(vec![Button::callback(
            product.label(),
            product_token(BUY, product.id),
        )])
    });

    if products.is_empty() {
        return keyboard.row(vec![Button::callback("🔄 Refresh", REFRESH)]);
    }

    keyboard = keyboard.row(vec![
        Button::callback("✏️ Edit", TOGGLE_MODE_EDIT),
        Button::callback("🔄 Refresh", REFRESH),
    ]);
    keyboard.row(vec![Button::callback("🚨 Clear the whole list", CONFIRM_CLEAR)])
}

fn edit_keyboard(products: &[Product]) -> Keyboard {
    products
        .iter()
        .fold(Keyboard::new(), |kb, product| {
            kb.row(vec![Button::callback(
                format!("✏️ {}", product.label()),
                product_token(EDIT_PRODUCT, product.id),
            )])
        })
        .row(vec![Button::callback("✅ Done", TOGGLE_MODE_EDIT)])
}

pub fn confirm_clear_keyboard() -> Keyboard {
    Keyboard::new().row(vec![
        Button::callback("✅ Yes, clear", CLEAR_ALL),
        Button::callback("❌ Cancel", REFRESH),
    ])
}

pub fn product_card_keyboard(product: &Product) -> Keyboard {
    Keyboard::new()
        .row(vec![Button::callback(
            "🗑 Remove",
            product_token(DELETE_PRODUCT, product.id),
        )])
        .row(vec![Button::callback("⬅ Back", REFRESH)])
}

pub fn confirm_delete_keyboard(product: &Product) -> Keyboard {
    Keyboard::new().row(vec![
        Button::callback("✅ Yes, remove", product_token(CONFIRM_EDIT_PRODUCT, product.id)),
        Button::callback("❌ No", product_token(EDIT_PRODUCT, product.id)),
    ])
}
