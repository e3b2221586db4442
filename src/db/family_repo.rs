//! Family directory: families, their invite codes and member rosters.
//!
//! Every function takes a `&mut SqliteConnection` so callers can run several
//! directory and list operations inside one transaction.

use chrono::Utc;
use rand::distr::{Alphanumeric, SampleString};
use sqlx::SqliteConnection;

use super::{format_timestamp, parse_timestamp};
use crate::models::{ChatId, Family, FamilyId, Member, UiMode};

/// Length of generated invite codes.
pub const INVITE_CODE_LEN: usize = 12;
/// How many fresh codes are tried before giving up on a unique one.
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Errors that can occur in the family directory.
#[derive(Debug)]
pub enum DirectoryError {
    /// Query or connection failure.
    Database(sqlx::Error),
    /// Every generated invite code collided with an existing one.
    CodeExhausted { attempts: usize },
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::Database(e) => write!(f, "Database error: {}", e),
            DirectoryError::CodeExhausted { attempts } => write!(
                f,
                "Could not generate a unique invite code after {} attempts",
                attempts
            ),
        }
    }
}

impl std::error::Error for DirectoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DirectoryError::Database(e) => Some(e),
            DirectoryError::CodeExhausted { .. } => None,
        }
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(e: sqlx::Error) -> Self {
        DirectoryError::Database(e)
    }
}

#[derive(sqlx::FromRow)]
struct FamilyRow {
    id: i64,
    invite_code: String,
    created_at: String,
}

impl From<FamilyRow> for Family {
    fn from(row: FamilyRow) -> Self {
        Family {
            id: row.id,
            invite_code: row.invite_code,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MemberRow {
    chat_id: i64,
    username: String,
    family_id: Option<i64>,
    last_message_id: Option<i32>,
    shopping_list_edit_mode: bool,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            chat_id: row.chat_id,
            username: row.username,
            family_id: row.family_id,
            last_message_id: row.last_message_id,
            mode: UiMode::from_edit_flag(row.shopping_list_edit_mode),
        }
    }
}

/// Summary row for the admin listing.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FamilySummary {
    pub id: i64,
    pub invite_code: String,
    pub member_count: i64,
    pub product_count: i64,
}

/// Generates a random alphanumeric invite code.
pub fn generate_invite_code() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), INVITE_CODE_LEN)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Creates a family and binds the requester to it as its first member.
///
/// Returns the family's invite code.
pub async fn create_family(
    conn: &mut SqliteConnection,
    chat_id: ChatId,
    username: &str,
) -> Result<String, DirectoryError> {
    let created_at = format_timestamp(Utc::now());

    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_invite_code();

        let inserted = sqlx::query("INSERT INTO families (invite_code, created_at) VALUES (?, ?)")
            .bind(&code)
            .bind(&created_at)
            .execute(&mut *conn)
            .await;

        match inserted {
            Ok(result) => {
                let family_id = result.last_insert_rowid();
                upsert_member_family(conn, chat_id, username, family_id).await?;
                tracing::info!("Family {} created by {}", family_id, chat_id);
                return Ok(code);
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("Invite code collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(DirectoryError::CodeExhausted {
        attempts: MAX_CODE_ATTEMPTS,
    })
}

/// Binds the requester to the family owning `code`.
///
/// Returns `false` without touching the member when no family has that code.
/// Codes stay valid after a join; they stop resolving only once rotated.
pub async fn join_family(
    conn: &mut SqliteConnection,
    chat_id: ChatId,
    code: &str,
    username: &str,
) -> Result<bool, sqlx::Error> {
    let family = match find_family_by_code(conn, code.trim()).await? {
        Some(family) => family,
        None => return Ok(false),
    };

    upsert_member_family(conn, chat_id, username, family.id).await?;
    tracing::info!("{} joined family {}", chat_id, family.id);
    Ok(true)
}

/// Records a member on first contact, leaving any family binding alone.
pub async fn ensure_member(
    conn: &mut SqliteConnection,
    chat_id: ChatId,
    username: &str,
) -> Result<Member, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (chat_id, username) VALUES (?, ?)
        ON CONFLICT(chat_id) DO UPDATE SET username = excluded.username
        "#,
    )
    .bind(chat_id)
    .bind(username)
    .execute(&mut *conn)
    .await?;

    get_member(conn, chat_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

/// Point lookup of a member by chat id.
pub async fn get_member(
    conn: &mut SqliteConnection,
    chat_id: ChatId,
) -> Result<Option<Member>, sqlx::Error> {
    let row: Option<MemberRow> = sqlx::query_as("SELECT * FROM users WHERE chat_id = ?")
        .bind(chat_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(Member::from))
}

/// Full roster of a family, used for fan-out.
pub async fn get_members_of(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
) -> Result<Vec<Member>, sqlx::Error> {
    let rows: Vec<MemberRow> =
        sqlx::query_as("SELECT * FROM users WHERE family_id = ? ORDER BY chat_id")
            .bind(family_id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows.into_iter().map(Member::from).collect())
}

pub async fn get_family(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
) -> Result<Option<Family>, sqlx::Error> {
    let row: Option<FamilyRow> = sqlx::query_as("SELECT * FROM families WHERE id = ?")
        .bind(family_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(Family::from))
}

pub async fn find_family_by_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> Result<Option<Family>, sqlx::Error> {
    let row: Option<FamilyRow> = sqlx::query_as("SELECT * FROM families WHERE invite_code = ?")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(Family::from))
}

/// Replaces a family's invite code; the old code stops resolving.
///
/// Returns `None` if the family doesn't exist.
pub async fn rotate_invite_code(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
) -> Result<Option<String>, DirectoryError> {
    if get_family(conn, family_id).await?.is_none() {
        return Ok(None);
    }

    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_invite_code();

        let updated = sqlx::query("UPDATE families SET invite_code = ? WHERE id = ?")
            .bind(&code)
            .bind(family_id)
            .execute(&mut *conn)
            .await;

        match updated {
            Ok(_) => {
                tracing::info!("Invite code rotated for family {}", family_id);
                return Ok(Some(code));
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("Invite code collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(DirectoryError::CodeExhausted {
        attempts: MAX_CODE_ATTEMPTS,
    })
}

pub async fn list_families(conn: &mut SqliteConnection) -> Result<Vec<FamilySummary>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT f.id, f.invite_code,
            (SELECT COUNT(*) FROM users u WHERE u.family_id = f.id) AS member_count,
            (SELECT COUNT(*) FROM shopping_list s WHERE s.family_id = f.id) AS product_count
        FROM families f
        ORDER BY f.id
        "#,
    )
    .fetch_all(&mut *conn)
    .await
}

/// Inserts the member or moves an existing one to `family_id`.
///
/// Data left behind in a previous family is not cleaned up.
async fn upsert_member_family(
    conn: &mut SqliteConnection,
    chat_id: ChatId,
    username: &str,
    family_id: FamilyId,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (chat_id, username, family_id) VALUES (?, ?, ?)
        ON CONFLICT(chat_id) DO UPDATE SET
            family_id = excluded.family_id,
            username = excluded.username
        "#,
    )
    .bind(chat_id)
    .bind(username)
    .bind(family_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
