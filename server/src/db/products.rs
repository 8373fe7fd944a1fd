//! Product catalog queries
//!
//! The CMS owns rich product content; this table holds only the billable
//! price and the deliverable file keys.

use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::Currency;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub currency: Currency,
    pub file_keys: Vec<String>,
    pub active: bool,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    title: String,
    price: Decimal,
    currency: String,
    file_keys: Vec<String>,
    active: bool,
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Product>, sqlx::Error> {
    let row: Option<ProductRow> = sqlx::query_as(
        "SELECT id, title, price, currency, file_keys, active FROM products WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        let currency = Currency::parse(&r.currency).ok_or_else(|| {
            sqlx::Error::Decode(
                AppError::with_message(ErrorCode::Internal, "corrupt product currency").into(),
            )
        })?;
        Ok(Product {
            id: r.id,
            title: r.title,
            price: r.price,
            currency,
            file_keys: r.file_keys,
            active: r.active,
        })
    })
    .transpose()
}
