use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{BookStore, BookTx};
use crate::modules::books::error::BookError;
use crate::modules::books::models::{Book, BookStatus};

/// One record. `lock` is held by a transaction from `lock_and_get` until it
/// ends; `committed` is the last committed value, `None` once deleted.
struct Slot {
    lock: Arc<Mutex<()>>,
    committed: RwLock<Option<Book>>,
}

impl Slot {
    fn new(book: Book) -> Self {
        Self {
            lock: Arc::default(),
            committed: RwLock::new(Some(book)),
        }
    }
}

type Row = Arc<Slot>;

/// In-process store with per-row async locks.
///
/// The ordered map gives serial-number ordering for free. Rows are locked
/// individually so transitions on different books never contend, and plain
/// reads see committed values without waiting on a row lock.
#[derive(Default)]
pub struct MemoryBookStore {
    rows: RwLock<BTreeMap<String, Row>>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn row(&self, serial_number: &str) -> Result<Row, BookError> {
        self.rows
            .read()
            .await
            .get(serial_number)
            .cloned()
            .ok_or_else(|| BookError::NotFound(serial_number.to_string()))
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn insert(&self, book: Book) -> Result<Book, BookError> {
        book.check_invariants()?;

        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.get(&book.serial_number) {
            // A slot emptied by an in-flight delete counts as absent.
            if existing.committed.read().await.is_some() {
                return Err(BookError::DuplicateKey(book.serial_number));
            }
        }
        rows.insert(book.serial_number.clone(), Arc::new(Slot::new(book.clone())));
        Ok(book)
    }

    async fn get(&self, serial_number: &str) -> Result<Book, BookError> {
        let row = self.row(serial_number).await?;
        let current = row.committed.read().await.clone();
        current.ok_or_else(|| BookError::NotFound(serial_number.to_string()))
    }

    async fn delete(&self, serial_number: &str) -> Result<(), BookError> {
        let row = self.row(serial_number).await?;

        // Wait for any transaction holding the row, like a DELETE would.
        let _held = row.lock.lock().await;
        if row.committed.write().await.take().is_none() {
            return Err(BookError::NotFound(serial_number.to_string()));
        }

        let mut rows = self.rows.write().await;
        if rows
            .get(serial_number)
            .is_some_and(|current| Arc::ptr_eq(current, &row))
        {
            rows.remove(serial_number);
        }
        Ok(())
    }

    async fn list(&self, status: Option<BookStatus>) -> Result<Vec<Book>, BookError> {
        let rows: Vec<Row> = self.rows.read().await.values().cloned().collect();

        let mut books = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(book) = row.committed.read().await.clone() {
                if status.map_or(true, |wanted| book.status == wanted) {
                    books.push(book);
                }
            }
        }
        Ok(books)
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn BookTx + 'a>, BookError> {
        Ok(Box::new(MemoryTx {
            store: self,
            locked: HashMap::new(),
        }))
    }
}

struct LockedRow {
    row: Row,
    _guard: OwnedMutexGuard<()>,
    staged: Option<Book>,
}

struct MemoryTx<'a> {
    store: &'a MemoryBookStore,
    locked: HashMap<String, LockedRow>,
}

#[async_trait]
impl BookTx for MemoryTx<'_> {
    async fn lock_and_get(&mut self, serial_number: &str) -> Result<Book, BookError> {
        if let Some(locked) = self.locked.get(serial_number) {
            let current = match &locked.staged {
                Some(staged) => Some(staged.clone()),
                None => locked.row.committed.read().await.clone(),
            };
            return current.ok_or_else(|| BookError::NotFound(serial_number.to_string()));
        }

        let row = self.store.row(serial_number).await?;
        let guard = Arc::clone(&row.lock).lock_owned().await;
        // The row may have been deleted while we waited for the lock.
        let current = row
            .committed
            .read()
            .await
            .clone()
            .ok_or_else(|| BookError::NotFound(serial_number.to_string()))?;

        self.locked.insert(
            serial_number.to_string(),
            LockedRow {
                row,
                _guard: guard,
                staged: None,
            },
        );
        Ok(current)
    }

    async fn save(&mut self, book: &Book) -> Result<(), BookError> {
        book.check_invariants()?;

        let locked = self.locked.get_mut(&book.serial_number).ok_or_else(|| {
            BookError::storage(anyhow::anyhow!(
                "row '{}' saved without being locked",
                book.serial_number
            ))
        })?;
        locked.staged = Some(book.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), BookError> {
        for (_, locked) in self.locked {
            if let Some(book) = locked.staged {
                *locked.row.committed.write().await = Some(book);
            }
        }
        Ok(())
    }
}
