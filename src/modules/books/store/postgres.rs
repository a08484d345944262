use async_trait::async_trait;
use sqlx::{postgres::PgPool, FromRow, Postgres, Transaction};
use time::OffsetDateTime;

use super::{BookStore, BookTx};
use crate::modules::books::error::BookError;
use crate::modules::books::models::{Book, BookStatus, CK_STATUS};

const INSERT_BOOK: &str = r#"
    INSERT INTO books (serial_number, title, author, status, borrowed_at, borrower_card_number)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING serial_number, title, author, status, borrowed_at, borrower_card_number
"#;

const SELECT_BOOK: &str = r#"
    SELECT serial_number, title, author, status, borrowed_at, borrower_card_number
    FROM books
    WHERE serial_number = $1
"#;

const SELECT_BOOK_FOR_UPDATE: &str = r#"
    SELECT serial_number, title, author, status, borrowed_at, borrower_card_number
    FROM books
    WHERE serial_number = $1
    FOR UPDATE
"#;

const LIST_BOOKS: &str = r#"
    SELECT serial_number, title, author, status, borrowed_at, borrower_card_number
    FROM books
    WHERE $1::text IS NULL OR status = $1
    ORDER BY serial_number
"#;

const UPDATE_LOAN: &str = r#"
    UPDATE books
    SET status = $2, borrowed_at = $3, borrower_card_number = $4
    WHERE serial_number = $1
"#;

const DELETE_BOOK: &str = "DELETE FROM books WHERE serial_number = $1";

#[derive(Debug, FromRow)]
struct BookRow {
    serial_number: String,
    title: String,
    author: String,
    status: String,
    borrowed_at: Option<OffsetDateTime>,
    borrower_card_number: Option<String>,
}

impl TryFrom<BookRow> for Book {
    type Error = BookError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let status: BookStatus = row.status.parse()?;
        let book = Book {
            serial_number: row.serial_number,
            title: row.title,
            author: row.author,
            status,
            borrowed_at: row.borrowed_at,
            borrower_card_number: row.borrower_card_number,
        };
        book.check_invariants()?;
        Ok(book)
    }
}

/// Translate database rejections into domain errors.
fn map_db_error(err: sqlx::Error, serial_number: &str) -> BookError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return BookError::DuplicateKey(serial_number.to_string());
        }
        if db_err.is_check_violation() {
            return BookError::ConstraintViolation(known_constraint(db_err.constraint()));
        }
    }
    BookError::storage(err)
}

/// Only our own constraint names are reported to callers.
fn known_constraint(name: Option<&str>) -> &'static str {
    use crate::modules::books::models::{CK_AVAILABLE_FIELDS, CK_BORROWED_FIELDS};

    match name {
        Some(CK_AVAILABLE_FIELDS) => CK_AVAILABLE_FIELDS,
        Some(CK_BORROWED_FIELDS) => CK_BORROWED_FIELDS,
        Some(CK_STATUS) => CK_STATUS,
        _ => "books",
    }
}

/// PostgreSQL-backed store; row locks are `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PgBookStore {
    pool: PgPool,
}

impl PgBookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    async fn insert(&self, book: Book) -> Result<Book, BookError> {
        book.check_invariants()?;

        let row: BookRow = sqlx::query_as(INSERT_BOOK)
            .bind(&book.serial_number)
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.status.as_str())
            .bind(book.borrowed_at)
            .bind(&book.borrower_card_number)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| map_db_error(err, &book.serial_number))?;

        row.try_into()
    }

    async fn get(&self, serial_number: &str) -> Result<Book, BookError> {
        let row: Option<BookRow> = sqlx::query_as(SELECT_BOOK)
            .bind(serial_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| map_db_error(err, serial_number))?;

        row.ok_or_else(|| BookError::NotFound(serial_number.to_string()))?
            .try_into()
    }

    async fn delete(&self, serial_number: &str) -> Result<(), BookError> {
        let result = sqlx::query(DELETE_BOOK)
            .bind(serial_number)
            .execute(&self.pool)
            .await
            .map_err(|err| map_db_error(err, serial_number))?;

        if result.rows_affected() == 0 {
            return Err(BookError::NotFound(serial_number.to_string()));
        }
        Ok(())
    }

    async fn list(&self, status: Option<BookStatus>) -> Result<Vec<Book>, BookError> {
        let rows: Vec<BookRow> = sqlx::query_as(LIST_BOOKS)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(BookError::storage)?;

        rows.into_iter().map(Book::try_from).collect()
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn BookTx + 'a>, BookError> {
        let tx = self.pool.begin().await.map_err(BookError::storage)?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// Rolls back on drop unless committed.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookTx for PgTx {
    async fn lock_and_get(&mut self, serial_number: &str) -> Result<Book, BookError> {
        let row: Option<BookRow> = sqlx::query_as(SELECT_BOOK_FOR_UPDATE)
            .bind(serial_number)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| map_db_error(err, serial_number))?;

        row.ok_or_else(|| BookError::NotFound(serial_number.to_string()))?
            .try_into()
    }

    async fn save(&mut self, book: &Book) -> Result<(), BookError> {
        book.check_invariants()?;

        let result = sqlx::query(UPDATE_LOAN)
            .bind(&book.serial_number)
            .bind(book.status.as_str())
            .bind(book.borrowed_at)
            .bind(&book.borrower_card_number)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| map_db_error(err, &book.serial_number))?;

        if result.rows_affected() == 0 {
            return Err(BookError::NotFound(book.serial_number.clone()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), BookError> {
        self.tx.commit().await.map_err(BookError::storage)
    }
}
