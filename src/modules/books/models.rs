use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use super::error::BookError;

/// Serial and card numbers are exactly six ASCII digits.
pub static SIX_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{6}$").expect("six-digit pattern compiles"));

pub const CK_STATUS: &str = "ck_books_status";
pub const CK_AVAILABLE_FIELDS: &str = "ck_books_available_fields";
pub const CK_BORROWED_FIELDS: &str = "ck_books_borrowed_fields";

/// Lending state of a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookStatus {
    Available,
    Borrowed,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "AVAILABLE",
            BookStatus::Borrowed => "BORROWED",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = BookError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "AVAILABLE" => Ok(BookStatus::Available),
            "BORROWED" => Ok(BookStatus::Borrowed),
            _ => Err(BookError::ConstraintViolation(CK_STATUS)),
        }
    }
}

/// A catalogued copy. `borrowed_at` and `borrower_card_number` are set
/// exactly when the copy is borrowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub serial_number: String,
    pub title: String,
    pub author: String,
    pub status: BookStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub borrowed_at: Option<OffsetDateTime>,
    pub borrower_card_number: Option<String>,
}

impl Book {
    /// New copies always start on the shelf.
    pub fn new(serial_number: String, title: String, author: String) -> Self {
        Self {
            serial_number,
            title,
            author,
            status: BookStatus::Available,
            borrowed_at: None,
            borrower_card_number: None,
        }
    }

    /// Mirror of the table's CHECK constraints; every write path calls this.
    pub fn check_invariants(&self) -> Result<(), BookError> {
        let has_loan_fields = (self.borrowed_at.is_some(), self.borrower_card_number.is_some());
        match (self.status, has_loan_fields) {
            (BookStatus::Available, (false, false)) => Ok(()),
            (BookStatus::Available, _) => Err(BookError::ConstraintViolation(CK_AVAILABLE_FIELDS)),
            (BookStatus::Borrowed, (true, true)) => Ok(()),
            (BookStatus::Borrowed, _) => Err(BookError::ConstraintViolation(CK_BORROWED_FIELDS)),
        }
    }

    /// AVAILABLE -> BORROWED. `at` is cut to microseconds, the precision a
    /// TIMESTAMPTZ keeps, so the returned record equals the stored one.
    pub fn check_out(&mut self, card_number: &str, at: OffsetDateTime) -> Result<(), BookError> {
        if self.status == BookStatus::Borrowed {
            return Err(BookError::Conflict(format!(
                "Book '{}' is already borrowed.",
                self.serial_number
            )));
        }
        self.status = BookStatus::Borrowed;
        self.borrowed_at = Some(truncate_to_micros(at));
        self.borrower_card_number = Some(card_number.to_string());
        Ok(())
    }

    /// BORROWED -> AVAILABLE
    pub fn check_in(&mut self) -> Result<(), BookError> {
        if self.status == BookStatus::Available {
            return Err(BookError::Conflict(format!(
                "Book '{}' is not currently borrowed.",
                self.serial_number
            )));
        }
        self.status = BookStatus::Available;
        self.borrowed_at = None;
        self.borrower_card_number = None;
        Ok(())
    }
}

fn truncate_to_micros(at: OffsetDateTime) -> OffsetDateTime {
    at - time::Duration::nanoseconds(i64::from(at.nanosecond() % 1_000))
}

/// Request model for cataloguing a new copy.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBook {
    #[validate(regex(path = *SIX_DIGITS, code = "six_digits"))]
    pub serial_number: String,
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(min = 1, max = 200))]
    pub author: String,
}

impl From<CreateBook> for Book {
    fn from(payload: CreateBook) -> Self {
        Book::new(payload.serial_number, payload.title, payload.author)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BorrowRequest {
    #[validate(regex(path = *SIX_DIGITS, code = "six_digits"))]
    pub borrower_card_number: String,
}

/// `GET /books?status=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<BookStatus>,
}
