//! Database-backed invariants: conditional transitions, issue-once
//! tokens, and bounded concurrent redemption.
//!
//! These need a reachable Postgres; run them explicitly with
//! `DATABASE_URL=... cargo test -- --ignored`.

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use shared::models::{Currency, PaymentChannel};
use sqlx::PgPool;
use uuid::Uuid;

use driftwood_server::db;
use driftwood_server::tokens::AccessMeta;

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for these tests");
    let pool = PgPool::connect(&url).await.expect("connect");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrate");
    pool
}

async fn seed_product(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (id, title, price, currency, file_keys)
         VALUES ($1, $2, $3, 'USD', ARRAY['products/ebook.pdf'])",
    )
    .bind(id)
    .bind(format!("Test Product {id}"))
    .bind(dec!(49.99))
    .execute(pool)
    .await
    .expect("seed product");
    id
}

async fn seed_order(pool: &PgPool, product_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    let number = format!("DW-TEST-{}", &id.to_string()[..8]);
    let order = db::orders::NewOrder {
        id,
        order_number: &number,
        product_id,
        currency: Currency::Usd,
        subtotal: dec!(49.99),
        tax_amount: dec!(3.62),
        total: dec!(53.61),
        payment_channel: PaymentChannel::Mock,
        buyer_email: "buyer@example.com",
        country: "US",
        postal_code: Some("94103"),
        vat_number: None,
        expires_at: None,
        now: Utc::now(),
    };
    db::orders::create(pool, &order).await.expect("seed order");
    id
}

#[tokio::test]
#[ignore]
async fn concurrent_paid_transitions_have_one_winner() {
    let pool = pool().await;
    let product_id = seed_product(&pool).await;
    let order_id = seed_order(&pool, product_id).await;

    let now = Utc::now();
    let reference = format!("cs_{order_id}");
    let (a, b) = tokio::join!(
        db::orders::mark_paid(&pool, order_id, &reference, None, now),
        db::orders::mark_paid(&pool, order_id, &reference, None, now),
    );
    let wins = [a.unwrap(), b.unwrap()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1);

    let order = db::orders::find_by_id(&pool, order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_reference.as_deref(), Some(reference.as_str()));
}

#[tokio::test]
#[ignore]
async fn paid_order_rejects_a_different_reference() {
    let pool = pool().await;
    let product_id = seed_product(&pool).await;
    let order_id = seed_order(&pool, product_id).await;

    let now = Utc::now();
    assert!(db::orders::mark_paid(&pool, order_id, "cs_first", None, now)
        .await
        .unwrap());
    assert!(!db::orders::mark_paid(&pool, order_id, "cs_second", None, now)
        .await
        .unwrap());
}

#[tokio::test]
#[ignore]
async fn expired_order_cannot_become_paid() {
    let pool = pool().await;
    let product_id = seed_product(&pool).await;
    let order_id = seed_order(&pool, product_id).await;

    let now = Utc::now();
    assert!(db::orders::mark_expired(&pool, order_id, now).await.unwrap());
    assert!(!db::orders::mark_paid(&pool, order_id, "cs_late", None, now)
        .await
        .unwrap());
}

#[tokio::test]
#[ignore]
async fn refund_requires_paid_status() {
    let pool = pool().await;
    let product_id = seed_product(&pool).await;
    let order_id = seed_order(&pool, product_id).await;

    let now = Utc::now();
    assert!(!db::orders::mark_refunded(&pool, order_id, now).await.unwrap());
    assert!(db::orders::mark_paid(&pool, order_id, "cs_1", None, now)
        .await
        .unwrap());
    assert!(db::orders::mark_refunded(&pool, order_id, now).await.unwrap());
    assert!(!db::orders::mark_refunded(&pool, order_id, now).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn token_is_issued_at_most_once_per_order() {
    let pool = pool().await;
    let product_id = seed_product(&pool).await;
    let order_id = seed_order(&pool, product_id).await;

    let now = Utc::now();
    let tok_a = format!("tok-a-{order_id}");
    let tok_b = format!("tok-b-{order_id}");
    let first = db::download_tokens::NewDownloadToken {
        id: Uuid::new_v4(),
        order_id,
        token: &tok_a,
        remaining_downloads: 5,
        max_downloads: 5,
        expires_at: now + Duration::hours(24),
        now,
    };
    let second = db::download_tokens::NewDownloadToken {
        id: Uuid::new_v4(),
        order_id,
        token: &tok_b,
        remaining_downloads: 5,
        max_downloads: 5,
        expires_at: now + Duration::hours(24),
        now,
    };

    let (a, b) = tokio::join!(
        db::download_tokens::insert_if_absent(&pool, &first),
        db::download_tokens::insert_if_absent(&pool, &second),
    );
    let inserted = [a.unwrap(), b.unwrap()].iter().filter(|w| **w).count();
    assert_eq!(inserted, 1);

    let row = db::download_tokens::find_by_order(&pool, order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.remaining_downloads, 5);
}

#[tokio::test]
#[ignore]
async fn concurrent_redemptions_never_exceed_the_limit() {
    let pool = pool().await;
    let product_id = seed_product(&pool).await;
    let order_id = seed_order(&pool, product_id).await;

    let now = Utc::now();
    let token_value = format!("tok-{order_id}");
    let token = db::download_tokens::NewDownloadToken {
        id: Uuid::new_v4(),
        order_id,
        token: &token_value,
        remaining_downloads: 3,
        max_downloads: 3,
        expires_at: now + Duration::hours(24),
        now,
    };
    assert!(db::download_tokens::insert_if_absent(&pool, &token)
        .await
        .unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let token_value = token_value.clone();
        handles.push(tokio::spawn(async move {
            db::download_tokens::redeem(&pool, &token_value, Utc::now(), &AccessMeta::default())
                .await
                .unwrap()
        }));
    }
    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 3);

    let row = db::download_tokens::find_by_token(&pool, &token_value)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.remaining_downloads, 0);
}

#[tokio::test]
#[ignore]
async fn expired_token_cannot_be_redeemed() {
    let pool = pool().await;
    let product_id = seed_product(&pool).await;
    let order_id = seed_order(&pool, product_id).await;

    let now = Utc::now();
    let token_value = format!("tok-expired-{order_id}");
    let token = db::download_tokens::NewDownloadToken {
        id: Uuid::new_v4(),
        order_id,
        token: &token_value,
        remaining_downloads: 5,
        max_downloads: 5,
        expires_at: now - Duration::minutes(1),
        now,
    };
    assert!(db::download_tokens::insert_if_absent(&pool, &token)
        .await
        .unwrap());
    assert!(
        !db::download_tokens::redeem(&pool, &token_value, now, &AccessMeta::default())
            .await
            .unwrap()
    );
}

#[tokio::test]
#[ignore]
async fn webhook_event_ids_deduplicate() {
    let pool = pool().await;
    let event_id = format!("evt_{}", Uuid::new_v4());
    let now = Utc::now();

    let (a, b) = tokio::join!(
        db::webhook_events::record(&pool, PaymentChannel::Mock, &event_id, "mock.payment.succeeded", now),
        db::webhook_events::record(&pool, PaymentChannel::Mock, &event_id, "mock.payment.succeeded", now),
    );
    let recorded = [a.unwrap(), b.unwrap()].iter().filter(|w| **w).count();
    assert_eq!(recorded, 1);
}

#[tokio::test]
#[ignore]
async fn released_event_id_accepts_the_redelivery() {
    let pool = pool().await;
    let event_id = format!("evt_{}", Uuid::new_v4());

    // Delivery fails mid-processing: the handler releases the ledger
    // entry so the provider retry is not swallowed as a duplicate.
    assert!(
        db::webhook_events::record(&pool, PaymentChannel::Mock, &event_id, "mock.payment.succeeded", Utc::now())
            .await
            .unwrap()
    );
    db::webhook_events::release(&pool, &event_id).await.unwrap();
    assert!(
        db::webhook_events::record(&pool, PaymentChannel::Mock, &event_id, "mock.payment.succeeded", Utc::now())
            .await
            .unwrap()
    );
}
