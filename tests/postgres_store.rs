//! `PgBookStore` against a live database.
//!
//! Set `LIBRIS_TEST_DATABASE_URL` to a disposable PostgreSQL database to run
//! these; without it each test returns early. The tests share one table, so
//! they run serially behind a mutex.

use std::sync::Arc;

use libris_app::modules::books::{
    error::BookError,
    lending,
    models::{Book, BookStatus},
    store::{BookStore, MemoryBookStore, PgBookStore, SharedStore},
};
use libris_kernel::settings::DatabaseSettings;
use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
};
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;

static SERIAL: Mutex<()> = Mutex::const_new(());

async fn pool() -> Option<PgPool> {
    let url = std::env::var("LIBRIS_TEST_DATABASE_URL").ok()?;
    let settings = DatabaseSettings {
        url,
        connect_retries: 1,
        ..DatabaseSettings::default()
    };
    let pool = libris_db::connect(&settings).await.unwrap();

    let store: SharedStore = Arc::new(MemoryBookStore::new());
    let registry = libris_app::registry(store).unwrap();
    libris_db::migrate(&pool, &registry.collect_migrations())
        .await
        .unwrap();

    sqlx::query("TRUNCATE books").execute(&pool).await.unwrap();
    Some(pool)
}

fn book(serial: &str) -> Book {
    Book::new(serial.to_string(), "T".into(), "A".into())
}

#[tokio::test]
async fn crud_and_transitions() {
    let _guard = SERIAL.lock().await;
    let Some(pool) = pool().await else {
        eprintln!("LIBRIS_TEST_DATABASE_URL not set; skipping");
        return;
    };
    let store = PgBookStore::new(pool);

    for serial in ["000003", "000001", "000002"] {
        store.insert(book(serial)).await.unwrap();
    }
    assert!(matches!(
        store.insert(book("000001")).await,
        Err(BookError::DuplicateKey(_))
    ));

    let listed: Vec<String> = store
        .list(None)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.serial_number)
        .collect();
    assert_eq!(listed, ["000001", "000002", "000003"]);

    let borrowed = lending::borrow(&store, "000002", "654321", OffsetDateTime::now_utc())
        .await
        .unwrap();
    assert_eq!(borrowed.status, BookStatus::Borrowed);
    // The returned record is exactly what TIMESTAMPTZ kept.
    assert_eq!(store.get("000002").await.unwrap(), borrowed);
    assert!(matches!(
        lending::borrow(&store, "000002", "111111", OffsetDateTime::now_utc()).await,
        Err(BookError::Conflict(_))
    ));

    let only_borrowed = store.list(Some(BookStatus::Borrowed)).await.unwrap();
    assert_eq!(only_borrowed.len(), 1);
    assert_eq!(only_borrowed[0].borrower_card_number.as_deref(), Some("654321"));

    let returned = lending::give_back(&store, "000002").await.unwrap();
    assert!(returned.borrowed_at.is_none());
    assert!(matches!(
        lending::give_back(&store, "000002").await,
        Err(BookError::Conflict(_))
    ));

    store.delete("000003").await.unwrap();
    assert!(matches!(
        store.get("000003").await,
        Err(BookError::NotFound(_))
    ));
}

#[tokio::test]
async fn database_rejects_inconsistent_rows() {
    let _guard = SERIAL.lock().await;
    let Some(pool) = pool().await else {
        eprintln!("LIBRIS_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let result = sqlx::query(
        "INSERT INTO books (serial_number, title, author, status, borrower_card_number) \
         VALUES ('000009', 'T', 'A', 'AVAILABLE', '654321')",
    )
    .execute(&pool)
    .await;

    let err = result.unwrap_err();
    let db_err = err.as_database_error().unwrap();
    assert!(db_err.is_check_violation());
    assert_eq!(db_err.constraint(), Some("ck_books_available_fields"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_borrows_have_exactly_one_winner() {
    let _guard = SERIAL.lock().await;
    let Some(pool) = pool().await else {
        eprintln!("LIBRIS_TEST_DATABASE_URL not set; skipping");
        return;
    };
    let store = Arc::new(PgBookStore::new(pool));
    store.insert(book("000001")).await.unwrap();

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let card = format!("{:06}", 300_000 + i);
                lending::borrow(&*store, "000001", &card, OffsetDateTime::now_utc()).await
            })
        })
        .collect();

    let mut winners = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => winners += 1,
            Err(BookError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn malformed_path_serials_are_not_found() {
    let _guard = SERIAL.lock().await;
    let Some(pool) = pool().await else {
        eprintln!("LIBRIS_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let store: SharedStore = Arc::new(PgBookStore::new(pool));
    let registry = libris_app::registry(store).unwrap();
    let app = libris_http::build_router(&registry, &libris_kernel::settings::Settings::default());

    for (method, uri) in [
        (Method::DELETE, "/books/%00"),
        (Method::PATCH, "/books/%00/return"),
        (Method::PATCH, "/books/12345x/return"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}
