//! Shopping list store.
//!
//! Products are always scoped by family id, never by the member who added
//! them, so every member of a family sees the same list.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::{format_timestamp, parse_timestamp};
use crate::models::{FamilyId, Product, ProductId};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    family_id: i64,
    product_name: String,
    is_bought: bool,
    created_at: String,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            family_id: row.family_id,
            name: row.product_name,
            is_bought: row.is_bought,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

/// Inserts `names` in order. Duplicate names are allowed.
pub async fn add_products(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
    names: &[String],
) -> Result<Vec<ProductId>, sqlx::Error> {
    add_products_at(conn, family_id, names, Utc::now()).await
}

async fn add_products_at(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
    names: &[String],
    created_at: DateTime<Utc>,
) -> Result<Vec<ProductId>, sqlx::Error> {
    let created_at = format_timestamp(created_at);
    let mut ids = Vec::with_capacity(names.len());

    for name in names {
        let result = sqlx::query(
            "INSERT INTO shopping_list (family_id, product_name, is_bought, created_at) VALUES (?, ?, 0, ?)",
        )
        .bind(family_id)
        .bind(name)
        .bind(&created_at)
        .execute(&mut *conn)
        .await?;
        ids.push(result.last_insert_rowid());
    }

    Ok(ids)
}

/// Inverts the bought flag of one product.
///
/// Returns the product as it is after the toggle, or `None` if the family
/// has no product with that id.
pub async fn toggle_bought(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
    product_id: ProductId,
) -> Result<Option<Product>, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE shopping_list SET is_bought = NOT is_bought WHERE family_id = ? AND id = ?",
    )
    .bind(family_id)
    .bind(product_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    find_product(conn, family_id, product_id).await
}

/// All products of a family: unbought first, then bought; newest first
/// within each group.
pub async fn list_ordered(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
) -> Result<Vec<Product>, sqlx::Error> {
    // Products added in one batch share a timestamp; the id keeps them in
    // reverse insertion order.
    let rows: Vec<ProductRow> = sqlx::query_as(
        r#"
        SELECT * FROM shopping_list
        WHERE family_id = ?
        ORDER BY is_bought ASC, created_at DESC, id DESC
        "#,
    )
    .bind(family_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Product::from).collect())
}

pub async fn find_product(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
    product_id: ProductId,
) -> Result<Option<Product>, sqlx::Error> {
    let row: Option<ProductRow> =
        sqlx::query_as("SELECT * FROM shopping_list WHERE family_id = ? AND id = ?")
            .bind(family_id)
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(Product::from))
}

/// Removes every product of the family. Returns how many were removed.
pub async fn delete_all(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM shopping_list WHERE family_id = ?")
        .bind(family_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Removes one product. Returns the removed product, if it existed.
pub async fn delete_product(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
    product_id: ProductId,
) -> Result<Option<Product>, sqlx::Error> {
    let product = match find_product(conn, family_id, product_id).await? {
        Some(product) => product,
        None => return Ok(None),
    };

    sqlx::query("DELETE FROM shopping_list WHERE family_id = ? AND id = ?")
        .bind(family_id)
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    Ok(Some(product))
}
