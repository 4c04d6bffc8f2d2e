//! # Store Capabilities
//!
//! The seams between the checkout engine and whatever holds the data.
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────────────────────┐
//! │    CheckoutEngine    │──uses─►│ LedgerStore                          │
//! └──────────────────────┘        │  begin() ──► Box<dyn UnitOfWork>     │
//!                                 │  list_transactions / get_transaction │
//!                                 └──────────────┬───────────────────────┘
//!                                   implemented by│
//!                    ┌────────────────────────────┴─────────────┐
//!                    ▼                                          ▼
//!        TransactionRepository (SQLite)               MemoryStore (tests)
//! ```
//!
//! Implementations are chosen at startup and passed in as trait objects, so
//! the same engine runs against SQLite in production and against the
//! in-memory store in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kasir_core::{NewProduct, PendingDetail, Product, StockSnapshot, Transaction};

use crate::error::DbResult;

/// CRUD over inventory rows.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Gets a product by id.
    async fn get(&self, id: i64) -> DbResult<Option<Product>>;

    /// Lists all products in id order.
    async fn list(&self) -> DbResult<Vec<Product>>;

    /// Validates and inserts a product; the store assigns the id.
    ///
    /// The SQLite store rejects a `category_id` with no matching category
    /// (`DbError::ForeignKeyViolation`). The memory store has no categories
    /// and keeps `category_id` as given.
    async fn create(&self, product: NewProduct) -> DbResult<Product>;

    /// Replaces the fields of an existing product.
    ///
    /// Returns `DbError::NotFound` if the id does not exist. Category
    /// references are checked as in [`InventoryStore::create`].
    async fn update(&self, id: i64, product: NewProduct) -> DbResult<Product>;

    /// Deletes a product. Ledger history is unaffected.
    ///
    /// Returns `DbError::NotFound` if the id does not exist.
    async fn delete(&self, id: i64) -> DbResult<()>;
}

/// One checkout's reads and writes, committed or discarded together.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] discards
/// every write made through it and releases its locks.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Takes the exclusive lock on a product row and reads it.
    ///
    /// Blocks while another unit of work holds the same row. Returns
    /// `Ok(None)` if the row does not exist.
    async fn lock_product(&mut self, id: i64) -> DbResult<Option<StockSnapshot>>;

    /// Decrements stock on a row previously locked by this unit of work.
    async fn deduct_stock(&mut self, id: i64, quantity: i64) -> DbResult<()>;

    /// Inserts the ledger header and returns its assigned id.
    async fn insert_transaction(
        &mut self,
        total_amount: i64,
        created_at: DateTime<Utc>,
    ) -> DbResult<i64>;

    /// Inserts all detail lines for a header in one batch, preserving order.
    async fn insert_details(
        &mut self,
        transaction_id: i64,
        details: &[PendingDetail],
    ) -> DbResult<()>;

    /// Makes every write durable and releases the locks.
    async fn commit(self: Box<Self>) -> DbResult<()>;
}

/// Ledger access: opens checkout units of work and reads completed sales.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a new unit of work.
    async fn begin(&self) -> DbResult<Box<dyn UnitOfWork>>;

    /// All transactions in descending id order, with details populated.
    ///
    /// SQLite assigns ids under the database write lock, so id order is
    /// commit order. The memory store takes the id at header insert; two
    /// checkouts over disjoint rows may commit in the opposite order.
    async fn list_transactions(&self) -> DbResult<Vec<Transaction>>;

    /// One transaction with details, or `None`.
    async fn get_transaction(&self, id: i64) -> DbResult<Option<Transaction>>;
}
