//! Action router.
//!
//! Inbound payloads are classified against fixed prefix tables; the longest
//! matching prefix wins.

use crate::models::ProductId;
use crate::transport::InboundEvent;

/// Callback data prefixes. Product actions carry the product id right after
/// the prefix (`buy42`).
pub const BUY: &str = "buy";
pub const CONFIRM_EDIT_PRODUCT: &str = "confirm_edit_product";
pub const EDIT_PRODUCT: &str = "edit_product";
pub const DELETE_PRODUCT: &str = "delete_product";
pub const TOGGLE_MODE_EDIT: &str = "toggle_mode_edit";
pub const CONFIRM_CLEAR: &str = "confirm_clear";
pub const CLEAR_ALL: &str = "clear_all";
pub const REFRESH: &str = "refresh";

pub const START: &str = "/start";
pub const START_WITH_INVITE: &str = "/start ";
pub const CREATE_FAMILY: &str = "/create_family";

/// A classified inbound intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Free text: products to add.
    AddProducts(String),
    Start,
    JoinFamily(String),
    CreateFamily,
    ToggleBought(ProductId),
    EditProduct(ProductId),
    DeleteProduct(ProductId),
    ConfirmDeleteProduct(ProductId),
    ToggleEditMode,
    ConfirmClear,
    ClearAll,
    Refresh,
    /// Unrecognised input; handled as a no-op.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Start,
    StartWithInvite,
    CreateFamily,
    Buy,
    ConfirmEditProduct,
    EditProduct,
    DeleteProduct,
    ToggleModeEdit,
    ConfirmClear,
    ClearAll,
    Refresh,
}

const COMMANDS: &[(&str, Kind)] = &[
    (CREATE_FAMILY, Kind::CreateFamily),
    (START_WITH_INVITE, Kind::StartWithInvite),
    (START, Kind::Start),
];

const CALLBACKS: &[(&str, Kind)] = &[
    (CONFIRM_EDIT_PRODUCT, Kind::ConfirmEditProduct),
    (TOGGLE_MODE_EDIT, Kind::ToggleModeEdit),
    (DELETE_PRODUCT, Kind::DeleteProduct),
    (EDIT_PRODUCT, Kind::EditProduct),
    (CONFIRM_CLEAR, Kind::ConfirmClear),
    (CLEAR_ALL, Kind::ClearAll),
    (REFRESH, Kind::Refresh),
    (BUY, Kind::Buy),
];

/// Returns the entry with the longest prefix of `input`, and the rest of the input.
fn longest_match<'a>(table: &[(&str, Kind)], input: &'a str) -> Option<(Kind, &'a str)> {
    table
        .iter()
        .filter(|(prefix, _)| input.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(prefix, kind)| (*kind, &input[prefix.len()..]))
}

fn product_action(rest: &str, build: fn(ProductId) -> Action) -> Action {
    match rest.trim().parse::<ProductId>() {
        Ok(id) => build(id),
        Err(_) => Action::Unknown,
    }
}

/// Classifies the text of a chat message.
///
/// Text that is not a command is a list of products to add.
pub fn classify_text(text: &str) -> Action {
    if !text.starts_with('/') {
        return Action::AddProducts(text.to_string());
    }

    match longest_match(COMMANDS, text) {
        Some((Kind::Start, _)) => Action::Start,
        Some((Kind::StartWithInvite, rest)) => {
            let code = rest.trim();
            if code.is_empty() {
                Action::Start
            } else {
                Action::JoinFamily(code.to_string())
            }
        }
        Some((Kind::CreateFamily, _)) => Action::CreateFamily,
        _ => Action::Unknown,
    }
}

/// Classifies an inline-keyboard callback token.
pub fn classify_callback(data: &str) -> Action {
    match longest_match(CALLBACKS, data) {
        Some((Kind::Buy, rest)) => product_action(rest, Action::ToggleBought),
        Some((Kind::ConfirmEditProduct, rest)) => {
            product_action(rest, Action::ConfirmDeleteProduct)
        }
        Some((Kind::EditProduct, rest)) => product_action(rest, Action::EditProduct),
        Some((Kind::DeleteProduct, rest)) => product_action(rest, Action::DeleteProduct),
        Some((Kind::ToggleModeEdit, _)) => Action::ToggleEditMode,
        Some((Kind::ConfirmClear, _)) => Action::ConfirmClear,
        Some((Kind::ClearAll, _)) => Action::ClearAll,
        Some((Kind::Refresh, _)) => Action::Refresh,
        _ => Action::Unknown,
    }
}

pub fn classify(event: &InboundEvent) -> Action {
    match event {
        InboundEvent::Text(message) => classify_text(&message.text),
        InboundEvent::Callback(callback) => classify_callback(&callback.data),
    }
}

/// Callback data for a product-scoped action.
pub fn product_token(prefix: &str, product_id: ProductId) -> String {
    format!("{}{}", prefix, product_id)
}
