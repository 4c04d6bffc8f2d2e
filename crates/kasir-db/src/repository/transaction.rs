//! # Transaction Repository
//!
//! The durable ledger: checkout units of work and the read paths for
//! completed transactions.
//!
//! ## Checkout Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One checkout = one SQLite transaction                │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │   │                                                                     │
//! │   ├── for each product id (ascending):                                 │
//! │   │     UPDATE products SET stock = stock WHERE id = ?   ← write lock  │
//! │   │     SELECT id, name, price, stock ...                ← locked read │
//! │   │                                                                     │
//! │   ├── UPDATE products SET stock = stock - ? ...          (per line)    │
//! │   ├── INSERT INTO transactions ... RETURNING id                        │
//! │   ├── INSERT INTO transaction_details VALUES (...), (...), ...         │
//! │   │                                                                     │
//! │  COMMIT  (or ROLLBACK when the unit of work is dropped)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite has no `SELECT ... FOR UPDATE`. The no-op write as the first
//! statement makes the transaction take the database write lock before it
//! reads any stock, so no other checkout can change the row between the
//! read and the deduction. The lock is database-wide rather than per row;
//! waits are bounded by `busy_timeout` and surface as `DbError::Busy`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::store::{LedgerStore, UnitOfWork};
use kasir_core::{PendingDetail, StockSnapshot, Transaction, TransactionDetail};

/// Upper bound on ids per `IN (...)` list and rows per batch insert.
///
/// Keeps every statement well under SQLite's bound-parameter limit.
const BATCH_SIZE: usize = 500;

/// Repository for ledger database operations.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

/// Header row as stored (`created_at` in unix milliseconds).
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    total_amount: i64,
    created_at: i64,
}

impl TransactionRow {
    fn into_transaction(self, details: Vec<TransactionDetail>) -> DbResult<Transaction> {
        let created_at = DateTime::from_timestamp_millis(self.created_at).ok_or_else(|| {
            DbError::CorruptRow(format!(
                "transaction {} has invalid created_at {}",
                self.id, self.created_at
            ))
        })?;

        Ok(Transaction {
            id: self.id,
            total_amount: self.total_amount,
            created_at,
            details,
        })
    }
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Opens a checkout unit of work on a pooled connection.
    pub async fn begin_checkout(&self) -> DbResult<SqliteUnitOfWork> {
        let tx = self.pool.begin().await?;
        Ok(SqliteUnitOfWork { tx })
    }

    /// Lists all transactions, most recent first, with details populated.
    ///
    /// Details are fetched in id batches rather than one query per header.
    pub async fn list(&self) -> DbResult<Vec<Transaction>> {
        let headers = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, total_amount, created_at
            FROM transactions
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = headers.iter().map(|h| h.id).collect();
        let mut details = self.details_for(&ids).await?;

        let transactions = headers
            .into_iter()
            .map(|header| {
                let lines = details.remove(&header.id).unwrap_or_default();
                header.into_transaction(lines)
            })
            .collect::<DbResult<Vec<_>>>()?;

        debug!(count = transactions.len(), "Listed transactions");
        Ok(transactions)
    }

    /// Gets one transaction with its details.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Transaction>> {
        let header = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, total_amount, created_at FROM transactions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let details = sqlx::query_as::<_, TransactionDetail>(
            r#"
            SELECT transaction_id, product_id, product_name, quantity, subtotal
            FROM transaction_details
            WHERE transaction_id = ?1
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        header.into_transaction(details).map(Some)
    }

    /// Counts ledger headers (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Details for the given header ids, grouped by header, in insert order.
    async fn details_for(&self, ids: &[i64]) -> DbResult<HashMap<i64, Vec<TransactionDetail>>> {
        let mut grouped: HashMap<i64, Vec<TransactionDetail>> = HashMap::new();

        for chunk in ids.chunks(BATCH_SIZE) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "SELECT transaction_id, product_id, product_name, quantity, subtotal \
                 FROM transaction_details WHERE transaction_id IN (",
            );
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") ORDER BY transaction_id, id");

            let rows = query
                .build_query_as::<TransactionDetail>()
                .fetch_all(&self.pool)
                .await?;

            for row in rows {
                grouped.entry(row.transaction_id).or_default().push(row);
            }
        }

        Ok(grouped)
    }
}

#[async_trait]
impl LedgerStore for TransactionRepository {
    async fn begin(&self) -> DbResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(self.begin_checkout().await?))
    }

    async fn list_transactions(&self) -> DbResult<Vec<Transaction>> {
        self.list().await
    }

    async fn get_transaction(&self, id: i64) -> DbResult<Option<Transaction>> {
        self.get_by_id(id).await
    }
}

// =============================================================================
// SQLite Unit of Work
// =============================================================================

/// A checkout running inside one SQLite transaction.
///
/// Dropping it without [`UnitOfWork::commit`] rolls the transaction back.
#[derive(Debug)]
pub struct SqliteUnitOfWork {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn lock_product(&mut self, id: i64) -> DbResult<Option<StockSnapshot>> {
        // Write first so the lock is held before stock is read.
        let touched = sqlx::query("UPDATE products SET stock = stock WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        if touched == 0 {
            return Ok(None);
        }

        let snapshot = sqlx::query_as::<_, StockSnapshot>(
            "SELECT id, name, price, stock FROM products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(snapshot)
    }

    async fn deduct_stock(&mut self, id: i64, quantity: i64) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - ?2 WHERE id = ?1 AND stock >= ?2",
        )
        .bind(id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::ConstraintViolation {
                message: format!("stock of product {id} cannot cover {quantity}"),
            });
        }

        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        total_amount: i64,
        created_at: DateTime<Utc>,
    ) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (total_amount, created_at)
            VALUES (?1, ?2)
            RETURNING id
            "#,
        )
        .bind(total_amount)
        .bind(created_at.timestamp_millis())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn insert_details(
        &mut self,
        transaction_id: i64,
        details: &[PendingDetail],
    ) -> DbResult<()> {
        for chunk in details.chunks(BATCH_SIZE) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "INSERT INTO transaction_details \
                 (transaction_id, product_id, product_name, quantity, subtotal) ",
            );
            query.push_values(chunk, |mut row, detail| {
                row.push_bind(transaction_id)
                    .push_bind(detail.product_id)
                    .push_bind(detail.product_name.clone())
                    .push_bind(detail.quantity)
                    .push_bind(detail.subtotal.minor());
            });

            query.build().execute(&mut *self.tx).await?;
        }

        debug!(transaction_id, lines = details.len(), "Inserted transaction details");
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use kasir_core::{ledger_timestamp, Money, NewProduct};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for (name, price, stock) in [("Kopi", 10000, 10), ("Teh", 5000, 4)] {
            db.products()
                .create(NewProduct {
                    name: name.to_string(),
                    price,
                    stock,
                    category_id: None,
                })
                .await
                .unwrap();
        }
        db
    }

    fn pending(product_id: i64, name: &str, quantity: i64, subtotal: i64) -> PendingDetail {
        PendingDetail {
            product_id,
            product_name: name.to_string(),
            quantity,
            subtotal: Money::from_minor(subtotal),
            remaining_stock: 0,
        }
    }

    #[tokio::test]
    async fn test_unit_of_work_commit() {
        let db = setup().await;
        let repo = db.transactions();
        let created_at = ledger_timestamp();

        let mut uow = repo.begin_checkout().await.unwrap();
        let snapshot = uow.lock_product(1).await.unwrap().unwrap();
        assert_eq!(snapshot.stock, 10);
        assert_eq!(uow.lock_product(99).await.unwrap(), None);

        uow.deduct_stock(1, 3).await.unwrap();
        let id = uow.insert_transaction(30000, created_at).await.unwrap();
        uow.insert_details(id, &[pending(1, "Kopi", 3, 30000)])
            .await
            .unwrap();
        Box::new(uow).commit().await.unwrap();

        let stored = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.total_amount, 30000);
        assert_eq!(stored.created_at, created_at);
        assert_eq!(stored.details.len(), 1);
        assert_eq!(stored.details[0].product_name, "Kopi");

        let product = db.products().get_by_id(1).await.unwrap().unwrap();
        assert_eq!(product.stock, 7);
    }

    #[tokio::test]
    async fn test_unit_of_work_drop_rolls_back() {
        let db = setup().await;
        let repo = db.transactions();

        {
            let mut uow = repo.begin_checkout().await.unwrap();
            uow.lock_product(2).await.unwrap();
            uow.deduct_stock(2, 4).await.unwrap();
            uow.insert_transaction(20000, ledger_timestamp()).await.unwrap();
        }

        assert_eq!(repo.count().await.unwrap(), 0);
        let product = db.products().get_by_id(2).await.unwrap().unwrap();
        assert_eq!(product.stock, 4);
    }

    #[tokio::test]
    async fn test_deduct_stock_refuses_negative() {
        let db = setup().await;
        let mut uow = db.transactions().begin_checkout().await.unwrap();
        uow.lock_product(2).await.unwrap();

        let err = uow.deduct_stock(2, 5).await.unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    async fn test_list_most_recent_first_with_details() {
        let db = setup().await;
        let repo = db.transactions();

        for quantity in 1..=3 {
            let mut uow = repo.begin_checkout().await.unwrap();
            uow.lock_product(1).await.unwrap();
            uow.lock_product(2).await.unwrap();
            uow.deduct_stock(1, quantity).await.unwrap();
            uow.deduct_stock(2, 1).await.unwrap();
            let total = quantity * 10000 + 5000;
            let id = uow.insert_transaction(total, ledger_timestamp()).await.unwrap();
            uow.insert_details(
                id,
                &[
                    pending(1, "Kopi", quantity, quantity * 10000),
                    pending(2, "Teh", 1, 5000),
                ],
            )
            .await
            .unwrap();
            Box::new(uow).commit().await.unwrap();
        }

        let listed = repo.list().await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        for transaction in &listed {
            assert_eq!(transaction.details.len(), 2);
            assert_eq!(transaction.details[0].product_id, 1);
            assert_eq!(transaction.details[1].product_id, 2);
            assert_eq!(transaction.details_total(), transaction.total_amount);
            assert!(transaction.details.iter().all(|d| d.transaction_id == transaction.id));
        }
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let db = setup().await;
        assert!(db.transactions().list().await.unwrap().is_empty());
        assert_eq!(db.transactions().get_by_id(1).await.unwrap(), None);
    }
}
