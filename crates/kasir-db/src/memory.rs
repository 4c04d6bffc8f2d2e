//! # In-Memory Store
//!
//! An [`InventoryStore`] and [`LedgerStore`] that keeps everything in process.
//! Used by tests and by the concurrency suite, where it provides true
//! row-level locks.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Arena (RwLock)                                                         │
//! │                                                                         │
//! │   index: BTreeMap<id, slot>        slots: Vec<Option<Row>>              │
//! │   ┌────┬──────┐                    ┌───────┬───────┬───────┬──────┐     │
//! │   │ 1  │  0   │──────────────────► │ Row 1 │ Row 3 │ None  │ ...  │     │
//! │   │ 3  │  1   │──────────────────► │       │       │ (free)│      │     │
//! │   └────┴──────┘                    └───┬───┴───────┴───────┴──────┘     │
//! │                                        │                                │
//! │                              Arc<Mutex<Option<Product>>>                │
//! │                              one async mutex per row                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking Rules
//! - The arena lock is only held long enough to clone a row handle; it is
//!   never held while waiting on a row mutex.
//! - A unit of work holds owned row guards until commit or drop.
//! - Deleting a row takes its mutex first, so it waits for any checkout
//!   holding that row, then marks the row gone before unlinking it.
//! - Writes made through a unit of work are buffered and applied at commit
//!   while the row guards are still held; dropping discards them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::store::{InventoryStore, LedgerStore, UnitOfWork};
use kasir_core::{NewProduct, PendingDetail, Product, StockSnapshot, Transaction, TransactionDetail};

/// A product row; `None` once deleted.
type Row = Arc<Mutex<Option<Product>>>;

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Option<Row>>,
    index: BTreeMap<i64, usize>,
    free: Vec<usize>,
    next_id: i64,
}

impl Arena {
    fn row(&self, id: i64) -> Option<Row> {
        let slot = *self.index.get(&id)?;
        self.slots.get(slot).and_then(|row| row.clone())
    }

    fn insert(&mut self, row: Row, id: i64) {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(row);
                slot
            }
            None => {
                self.slots.push(Some(row));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
    }

    fn remove(&mut self, id: i64) {
        if let Some(slot) = self.index.remove(&id) {
            self.slots[slot] = None;
            self.free.push(slot);
        }
    }

    fn rows(&self) -> Vec<Row> {
        self.index
            .values()
            .filter_map(|slot| self.slots.get(*slot).and_then(|row| row.clone()))
            .collect()
    }
}

#[derive(Debug)]
struct Shared {
    arena: RwLock<Arena>,
    ledger: RwLock<BTreeMap<i64, Transaction>>,
    next_transaction_id: AtomicI64,
    lock_timeout: Option<Duration>,
}

/// In-process inventory and ledger.
///
/// Cloning shares the same data.
///
/// ## Usage
/// ```rust,ignore
/// let store = Arc::new(MemoryStore::new());
/// store.create(NewProduct { name: "Kopi".into(), price: 10000, stock: 10, category_id: None }).await?;
/// let engine = CheckoutEngine::new(store.clone(), CheckoutConfig::default());
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store. Row lock waits are unbounded.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an empty store whose row lock waits give up after `timeout`
    /// with `DbError::Busy`.
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self::build(Some(timeout))
    }

    fn build(lock_timeout: Option<Duration>) -> Self {
        MemoryStore {
            shared: Arc::new(Shared {
                arena: RwLock::new(Arena {
                    next_id: 1,
                    ..Arena::default()
                }),
                ledger: RwLock::new(BTreeMap::new()),
                next_transaction_id: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }

    /// Opens a checkout unit of work.
    pub fn begin_checkout(&self) -> MemoryUnitOfWork {
        MemoryUnitOfWork {
            shared: Arc::clone(&self.shared),
            locked: BTreeMap::new(),
            deducted: BTreeMap::new(),
            header: None,
            details: Vec::new(),
        }
    }

    /// Number of committed transactions.
    pub async fn transaction_count(&self) -> usize {
        self.shared.ledger.read().await.len()
    }

    async fn row(&self, id: i64) -> Option<Row> {
        self.shared.arena.read().await.row(id)
    }
}

/// Waits for a row mutex, bounded by the store's lock timeout.
async fn lock_row(row: Row, id: i64, timeout: Option<Duration>) -> DbResult<OwnedMutexGuard<Option<Product>>> {
    match timeout {
        None => Ok(row.lock_owned().await),
        Some(limit) => tokio::time::timeout(limit, row.lock_owned())
            .await
            .map_err(|_| DbError::Busy(format!("lock wait on product {id} timed out"))),
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn get(&self, id: i64) -> DbResult<Option<Product>> {
        let Some(row) = self.row(id).await else {
            return Ok(None);
        };
        let product = row.lock().await.clone();
        Ok(product)
    }

    async fn list(&self) -> DbResult<Vec<Product>> {
        let rows = self.shared.arena.read().await.rows();

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(product) = row.lock().await.clone() {
                products.push(product);
            }
        }
        Ok(products)
    }

    async fn create(&self, product: NewProduct) -> DbResult<Product> {
        product.validate()?;

        let mut arena = self.shared.arena.write().await;
        let id = arena.next_id;
        arena.next_id += 1;

        let created = product.into_product(id);
        arena.insert(Arc::new(Mutex::new(Some(created.clone()))), id);

        debug!(id, name = %created.name, "Inserted product in memory");
        Ok(created)
    }

    async fn update(&self, id: i64, product: NewProduct) -> DbResult<Product> {
        product.validate()?;

        let row = self
            .row(id)
            .await
            .ok_or_else(|| DbError::not_found("Product", id))?;
        let mut guard = lock_row(row, id, self.shared.lock_timeout).await?;

        // Deleted while we waited.
        if guard.is_none() {
            return Err(DbError::not_found("Product", id));
        }

        let updated = product.into_product(id);
        *guard = Some(updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> DbResult<()> {
        let row = self
            .row(id)
            .await
            .ok_or_else(|| DbError::not_found("Product", id))?;
        let mut guard = lock_row(row, id, self.shared.lock_timeout).await?;

        if guard.take().is_none() {
            return Err(DbError::not_found("Product", id));
        }
        self.shared.arena.write().await.remove(id);

        debug!(id, "Deleted product from memory");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> DbResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(self.begin_checkout()))
    }

    async fn list_transactions(&self) -> DbResult<Vec<Transaction>> {
        let ledger = self.shared.ledger.read().await;
        Ok(ledger.values().rev().cloned().collect())
    }

    async fn get_transaction(&self, id: i64) -> DbResult<Option<Transaction>> {
        Ok(self.shared.ledger.read().await.get(&id).cloned())
    }
}

// =============================================================================
// Memory Unit of Work
// =============================================================================

/// A checkout against [`MemoryStore`], holding its row locks until commit or
/// drop.
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    locked: BTreeMap<i64, OwnedMutexGuard<Option<Product>>>,
    deducted: BTreeMap<i64, i64>,
    header: Option<(i64, i64, DateTime<Utc>)>,
    details: Vec<TransactionDetail>,
}

impl std::fmt::Debug for MemoryUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryUnitOfWork")
            .field("locked", &self.locked.keys().collect::<Vec<_>>())
            .field("deducted", &self.deducted)
            .field("header", &self.header)
            .finish()
    }
}

impl MemoryUnitOfWork {
    /// Stock as this unit of work sees it (committed minus pending).
    fn visible_stock(&self, id: i64) -> Option<(&Product, i64)> {
        let product = self.locked.get(&id)?.as_ref()?;
        let pending = self.deducted.get(&id).copied().unwrap_or(0);
        Some((product, product.stock - pending))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_product(&mut self, id: i64) -> DbResult<Option<StockSnapshot>> {
        if !self.locked.contains_key(&id) {
            let row = self.shared.arena.read().await.row(id);
            let Some(row) = row else {
                return Ok(None);
            };
            let guard = lock_row(row, id, self.shared.lock_timeout).await?;
            self.locked.insert(id, guard);
        }

        Ok(self.visible_stock(id).map(|(product, stock)| StockSnapshot {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
            stock,
        }))
    }

    async fn deduct_stock(&mut self, id: i64, quantity: i64) -> DbResult<()> {
        let (_, available) = self
            .visible_stock(id)
            .ok_or_else(|| DbError::Internal(format!("product {id} is not locked")))?;

        if available < quantity {
            return Err(DbError::ConstraintViolation {
                message: format!("stock of product {id} cannot cover {quantity}"),
            });
        }

        *self.deducted.entry(id).or_insert(0) += quantity;
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        total_amount: i64,
        created_at: DateTime<Utc>,
    ) -> DbResult<i64> {
        // Taken before commit; ids of rolled-back work are not reused.
        let id = self.shared.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        self.header = Some((id, total_amount, created_at));
        Ok(id)
    }

    async fn insert_details(
        &mut self,
        transaction_id: i64,
        details: &[PendingDetail],
    ) -> DbResult<()> {
        match self.header {
            Some((id, _, _)) if id == transaction_id => {}
            _ => return Err(DbError::not_found("Transaction", transaction_id)),
        }

        self.details
            .extend(details.iter().map(|d| d.to_detail(transaction_id)));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let MemoryUnitOfWork {
            shared,
            mut locked,
            deducted,
            header,
            details,
        } = *self;

        let (id, total_amount, created_at) = header
            .ok_or_else(|| DbError::Internal("commit without a transaction header".to_string()))?;

        for (product_id, quantity) in &deducted {
            if let Some(product) = locked.get_mut(product_id).and_then(|guard| guard.as_mut()) {
                product.stock -= quantity;
            }
        }

        let transaction = Transaction {
            id,
            total_amount,
            created_at,
            details,
        };
        shared.ledger.write().await.insert(id, transaction);

        debug!(transaction_id = id, rows = locked.len(), "Committed in memory");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kasir_core::{ledger_timestamp, Money};

    fn new_product(name: &str, price: i64, stock: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            price,
            stock,
            category_id: None,
        }
    }

    fn pending(product_id: i64, quantity: i64, subtotal: i64) -> PendingDetail {
        PendingDetail {
            product_id,
            product_name: "Kopi".to_string(),
            quantity,
            subtotal: Money::from_minor(subtotal),
            remaining_stock: 0,
        }
    }

    #[tokio::test]
    async fn test_crud_and_slot_reuse() {
        let store = MemoryStore::new();
        let a = store.create(new_product("A", 100, 1)).await.unwrap();
        let b = store.create(new_product("B", 200, 2)).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        store.delete(a.id).await.unwrap();
        assert_eq!(store.get(a.id).await.unwrap(), None);
        assert!(matches!(store.delete(a.id).await, Err(DbError::NotFound { .. })));

        // Freed slot is reused, ids are not
        let c = store.create(new_product("C", 300, 3)).await.unwrap();
        assert_eq!(c.id, 3);
        assert_eq!(store.shared.arena.read().await.slots.len(), 2);

        let listed: Vec<i64> = store.list().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(listed, vec![2, 3]);

        let updated = store.update(b.id, new_product("B2", 250, 5)).await.unwrap();
        assert_eq!(store.get(b.id).await.unwrap(), Some(updated));
        assert!(matches!(
            store.update(a.id, new_product("A", 1, 1)).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_validates() {
        let store = MemoryStore::new();
        let result = store.create(new_product("", 100, 1)).await;
        assert!(matches!(result, Err(DbError::InvalidInput(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_applies_buffered_writes() {
        let store = MemoryStore::new();
        store.create(new_product("Kopi", 10000, 10)).await.unwrap();

        let mut uow = store.begin_checkout();
        assert_eq!(uow.lock_product(1).await.unwrap().unwrap().stock, 10);
        uow.deduct_stock(1, 3).await.unwrap();
        // Pending deduction is visible to the same unit of work
        assert_eq!(uow.lock_product(1).await.unwrap().unwrap().stock, 7);

        let id = uow.insert_transaction(30000, ledger_timestamp()).await.unwrap();
        uow.insert_details(id, &[pending(1, 3, 30000)]).await.unwrap();
        Box::new(uow).commit().await.unwrap();

        assert_eq!(store.get(1).await.unwrap().unwrap().stock, 7);
        let stored = store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(stored.details.len(), 1);
        assert_eq!(stored.details[0].transaction_id, id);
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = MemoryStore::new();
        store.create(new_product("Kopi", 10000, 10)).await.unwrap();

        {
            let mut uow = store.begin_checkout();
            uow.lock_product(1).await.unwrap();
            uow.deduct_stock(1, 10).await.unwrap();
            uow.insert_transaction(100000, ledger_timestamp()).await.unwrap();
        }

        assert_eq!(store.get(1).await.unwrap().unwrap().stock, 10);
        assert_eq!(store.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_deduct_requires_lock_and_stock() {
        let store = MemoryStore::new();
        store.create(new_product("Kopi", 10000, 2)).await.unwrap();

        let mut uow = store.begin_checkout();
        assert!(matches!(uow.deduct_stock(1, 1).await, Err(DbError::Internal(_))));

        uow.lock_product(1).await.unwrap();
        assert!(matches!(
            uow.deduct_stock(1, 3).await,
            Err(DbError::ConstraintViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_lock_wait_times_out() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(20));
        store.create(new_product("Kopi", 10000, 2)).await.unwrap();

        let mut holder = store.begin_checkout();
        holder.lock_product(1).await.unwrap();

        let mut waiter = store.begin_checkout();
        let err = waiter.lock_product(1).await.unwrap_err();
        assert!(err.is_transient());

        drop(holder);
        assert!(waiter.lock_product(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_waits_for_row_lock() {
        let store = MemoryStore::new();
        store.create(new_product("Kopi", 10000, 2)).await.unwrap();

        let mut uow = store.begin_checkout();
        uow.lock_product(1).await.unwrap();

        let deleter = {
            let store = store.clone();
            tokio::spawn(async move { store.delete(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!deleter.is_finished());

        drop(uow);
        deleter.await.unwrap().unwrap();
        assert_eq!(store.get(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_transactions_most_recent_first() {
        let store = MemoryStore::new();
        store.create(new_product("Kopi", 10000, 10)).await.unwrap();

        for _ in 0..3 {
            let mut uow = store.begin_checkout();
            uow.lock_product(1).await.unwrap();
            uow.deduct_stock(1, 1).await.unwrap();
            let id = uow.insert_transaction(10000, ledger_timestamp()).await.unwrap();
            uow.insert_details(id, &[pending(1, 1, 10000)]).await.unwrap();
            Box::new(uow).commit().await.unwrap();
        }

        let ids: Vec<i64> = store
            .list_transactions()
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_list_orders_by_id_not_commit_time() {
        let store = MemoryStore::new();
        store.create(new_product("Kopi", 10000, 5)).await.unwrap();
        store.create(new_product("Teh", 5000, 5)).await.unwrap();

        let mut first = store.begin_checkout();
        first.lock_product(1).await.unwrap();
        let first_id = first.insert_transaction(10000, ledger_timestamp()).await.unwrap();

        let mut second = store.begin_checkout();
        second.lock_product(2).await.unwrap();
        let second_id = second.insert_transaction(5000, ledger_timestamp()).await.unwrap();

        Box::new(second).commit().await.unwrap();
        Box::new(first).commit().await.unwrap();

        let ids: Vec<i64> = store
            .list_transactions()
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![second_id, first_id]);
        assert!(second_id > first_id);
    }

    #[tokio::test]
    async fn test_category_id_kept_as_given() {
        let store = MemoryStore::new();
        let mut input = new_product("Kopi", 10000, 5);
        input.category_id = Some(999);

        let created = store.create(input.clone()).await.unwrap();
        assert_eq!(created.category_id, Some(999));

        input.category_id = Some(1000);
        let updated = store.update(created.id, input).await.unwrap();
        assert_eq!(store.get(created.id).await.unwrap(), Some(updated));
        assert_eq!(store.get(created.id).await.unwrap().unwrap().category_id, Some(1000));
    }
}
