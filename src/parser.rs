//! Free-text shopping list parsing.

/// Splits `text` into product names.
///
/// Commas, semicolons and newlines separate items. Items are trimmed,
/// empties dropped, and each name capitalised ("milk" -> "Milk").
pub fn parse_list(text: &str) -> Vec<String> {
    text.split([',', ';', '\n'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(capitalize)
        .collect()
}

fn capitalize(item: &str) -> String {
    let mut chars = item.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
