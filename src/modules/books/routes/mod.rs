//! HTTP handlers for `/books`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use libris_http::{
    error::AppError,
    extract::{Params, Payload},
};
use time::OffsetDateTime;
use validator::Validate;

use super::error::BookError;
use super::lending;
use super::models::{Book, BorrowRequest, CreateBook, ListParams, SIX_DIGITS};
use super::store::SharedStore;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/{serial_number}", delete(delete_book))
        .route("/{serial_number}/borrow", patch(borrow_book))
        .route("/{serial_number}/return", patch(return_book))
        .with_state(store)
}

/// A serial that cannot exist never reaches the store.
fn known_serial(serial_number: String) -> Result<String, BookError> {
    if SIX_DIGITS.is_match(&serial_number) {
        Ok(serial_number)
    } else {
        Err(BookError::NotFound(serial_number))
    }
}

async fn create_book(
    State(store): State<SharedStore>,
    Payload(payload): Payload<CreateBook>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    payload.validate().map_err(BookError::from)?;

    let book = store.insert(payload.into()).await?;
    tracing::info!(serial_number = %book.serial_number, "book created");

    Ok((StatusCode::CREATED, Json(book)))
}

async fn list_books(
    State(store): State<SharedStore>,
    Params(params): Params<ListParams>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(store.list(params.status).await?))
}

/// Unconditional: a borrowed copy can be deleted too.
async fn delete_book(
    State(store): State<SharedStore>,
    Path(serial_number): Path<String>,
) -> Result<StatusCode, AppError> {
    let serial_number = known_serial(serial_number)?;
    store.delete(&serial_number).await?;
    tracing::info!(%serial_number, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn borrow_book(
    State(store): State<SharedStore>,
    Path(serial_number): Path<String>,
    Payload(payload): Payload<BorrowRequest>,
) -> Result<Json<Book>, AppError> {
    let serial_number = known_serial(serial_number)?;
    payload.validate().map_err(BookError::from)?;

    let book = lending::borrow(
        store.as_ref(),
        &serial_number,
        &payload.borrower_card_number,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(Json(book))
}

async fn return_book(
    State(store): State<SharedStore>,
    Path(serial_number): Path<String>,
) -> Result<Json<Book>, AppError> {
    let serial_number = known_serial(serial_number)?;
    Ok(Json(lending::give_back(store.as_ref(), &serial_number).await?))
}
