//! Persistence for book records.
//!
//! [`BookStore`] covers plain catalog access. Borrow and return go through
//! [`BookStore::begin`]: the returned [`BookTx`] locks a row with
//! [`BookTx::lock_and_get`] and holds that lock until it commits or is
//! dropped. A concurrent transaction on the same row waits, then reads the
//! committed state. Dropping an uncommitted transaction discards its writes.

mod memory;
mod postgres;

pub use memory::MemoryBookStore;
pub use postgres::PgBookStore;

use std::sync::Arc;

use async_trait::async_trait;

use super::error::BookError;
use super::models::{Book, BookStatus};

pub type SharedStore = Arc<dyn BookStore>;

#[async_trait]
pub trait BookStore: Send + Sync {
    /// Fails with `DuplicateKey` if the serial number is taken
    async fn insert(&self, book: Book) -> Result<Book, BookError>;

    async fn get(&self, serial_number: &str) -> Result<Book, BookError>;

    /// Removes the record whatever its status
    async fn delete(&self, serial_number: &str) -> Result<(), BookError>;

    /// All records, optionally filtered, ascending by serial number
    async fn list(&self, status: Option<BookStatus>) -> Result<Vec<Book>, BookError>;

    async fn begin<'a>(&'a self) -> Result<Box<dyn BookTx + 'a>, BookError>;
}

/// A unit of work holding exclusive row locks
#[async_trait]
pub trait BookTx: Send {
    /// Lock the row until commit or drop and return its current state
    async fn lock_and_get(&mut self, serial_number: &str) -> Result<Book, BookError>;

    /// Write a row previously locked by this transaction
    async fn save(&mut self, book: &Book) -> Result<(), BookError>;

    async fn commit(self: Box<Self>) -> Result<(), BookError>;
}
