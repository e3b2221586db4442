//! Member view tracker: the last list message shown to each member and the
//! keyboard mode they are in.
//!
//! The tracked message id is the cursor that lets a sync round edit a
//! member's existing message instead of posting a new one, so it is only
//! written from explicit send/edit results, never inferred.

use sqlx::SqliteConnection;

use crate::models::{Member, UiMode};

/// Persists `mode` for the member and updates the in-memory copy.
pub async fn set_mode(
    conn: &mut SqliteConnection,
    member: &mut Member,
    mode: UiMode,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET shopping_list_edit_mode = ? WHERE chat_id = ?")
        .bind(mode.is_edit())
        .bind(member.chat_id)
        .execute(&mut *conn)
        .await?;

    member.mode = mode;
    Ok(())
}

/// Batch-persists the tracked message ids of `members`.
pub async fn update_last_message_ids(
    conn: &mut SqliteConnection,
    members: &[Member],
) -> Result<(), sqlx::Error> {
    for member in members {
        sqlx::query("UPDATE users SET last_message_id = ? WHERE chat_id = ?")
            .bind(member.last_message_id)
            .bind(member.chat_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
