//! Borrow/return transitions.
//!
//! Each transition is lock, check, write, commit inside one store
//! transaction. The state check always runs against the locked row, never an
//! earlier unlocked read, so two concurrent borrows of the same copy cannot
//! both observe AVAILABLE.

use time::OffsetDateTime;

use super::error::BookError;
use super::models::Book;
use super::store::BookStore;

/// AVAILABLE -> BORROWED by `card_number`, stamped `at`
pub async fn borrow(
    store: &dyn BookStore,
    serial_number: &str,
    card_number: &str,
    at: OffsetDateTime,
) -> Result<Book, BookError> {
    let mut tx = store.begin().await?;
    let mut book = tx.lock_and_get(serial_number).await?;

    book.check_out(card_number, at)?;
    tx.save(&book).await?;
    tx.commit().await?;

    tracing::info!(serial_number, borrower = card_number, "book borrowed");
    Ok(book)
}

/// BORROWED -> AVAILABLE
pub async fn give_back(store: &dyn BookStore, serial_number: &str) -> Result<Book, BookError> {
    let mut tx = store.begin().await?;
    let mut book = tx.lock_and_get(serial_number).await?;

    book.check_in()?;
    tx.save(&book).await?;
    tx.commit().await?;

    tracing::info!(serial_number, "book returned");
    Ok(book)
}
