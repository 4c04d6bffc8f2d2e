//! Checkout behavior under concurrency, against both the file-backed SQLite
//! store and the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use kasir_core::{CheckoutItem, CoreError, NewProduct};
use kasir_db::{
    CheckoutConfig, CheckoutEngine, CheckoutError, Database, DbConfig, InventoryStore,
    LedgerStore, MemoryStore, UnitOfWork,
};
use tempfile::TempDir;

fn product(name: &str, price: i64, stock: i64) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        price,
        stock,
        category_id: None,
    }
}

async fn seed(store: &dyn InventoryStore, products: &[(&str, i64, i64)]) {
    for (name, price, stock) in products {
        store.create(product(name, *price, *stock)).await.unwrap();
    }
}

async fn sqlite_db(dir: &TempDir) -> Database {
    let config = DbConfig::new(dir.path().join("kasir.db"))
        .max_connections(8)
        .busy_timeout(Duration::from_secs(5));
    Database::new(config).await.unwrap()
}

fn patient_config() -> CheckoutConfig {
    CheckoutConfig::default()
        .max_retries(20)
        .retry_backoff(Duration::from_millis(5))
        .timeout(Duration::from_secs(30))
}

/// Fires `carts` concurrently and returns each outcome.
async fn run_concurrently(
    engine: &CheckoutEngine,
    carts: Vec<Vec<CheckoutItem>>,
) -> Vec<Result<kasir_core::Transaction, CheckoutError>> {
    let handles: Vec<_> = carts
        .into_iter()
        .map(|cart| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.checkout(&cart).await })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }
    outcomes
}

/// Asserts the outcome mix of an oversubscribed product and returns the
/// number of successful checkouts.
fn count_successes(outcomes: &[Result<kasir_core::Transaction, CheckoutError>]) -> i64 {
    let mut successes = 0;
    for outcome in outcomes {
        match outcome {
            Ok(tx) => {
                assert_eq!(tx.details_total(), tx.total_amount);
                successes += 1;
            }
            Err(CheckoutError::Rejected(CoreError::InsufficientStock { .. })) => {}
            Err(other) => panic!("unexpected checkout failure: {other}"),
        }
    }
    successes
}

// =============================================================================
// Scenarios (SQLite)
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_checkout_scenarios() {
    let dir = TempDir::new().unwrap();
    let db = sqlite_db(&dir).await;
    seed(&db.products(), &[("Kopi", 10000, 10), ("Teh", 5000, 2)]).await;
    let engine = CheckoutEngine::new(Arc::new(db.transactions()), CheckoutConfig::default());

    // Single line
    let tx = engine.checkout(&[CheckoutItem::new(1, 3)]).await.unwrap();
    assert_eq!(tx.total_amount, 30000);
    assert_eq!(tx.details[0].subtotal, 30000);
    assert_eq!(db.products().get_by_id(1).await.unwrap().unwrap().stock, 7);

    // Duplicate lines behave like one consolidated line
    let tx = engine
        .checkout(&[CheckoutItem::new(1, 3), CheckoutItem::new(1, 4)])
        .await
        .unwrap();
    assert_eq!(tx.total_amount, 70000);
    assert_eq!(tx.details.len(), 1);
    assert_eq!(db.products().get_by_id(1).await.unwrap().unwrap().stock, 0);

    // Not enough stock leaves the row untouched
    let err = engine.checkout(&[CheckoutItem::new(2, 5)]).await.unwrap_err();
    assert_eq!(
        err.as_rejection(),
        Some(&CoreError::InsufficientStock {
            id: 2,
            name: "Teh".to_string(),
            requested: 5,
            available: 2,
        })
    );
    assert_eq!(db.products().get_by_id(2).await.unwrap().unwrap().stock, 2);

    // Empty cart
    let err = engine.checkout(&[]).await.unwrap_err();
    assert_eq!(err.as_rejection(), Some(&CoreError::EmptyCart));

    // Read paths see exactly the two committed sales, newest first
    let listed = engine.list_transactions().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].id > listed[1].id);
    assert_eq!(engine.get_transaction(listed[1].id).await.unwrap(), listed[1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_history_survives_product_changes() {
    let dir = TempDir::new().unwrap();
    let db = sqlite_db(&dir).await;
    seed(&db.products(), &[("Kopi", 10000, 10)]).await;
    let engine = CheckoutEngine::new(Arc::new(db.transactions()), CheckoutConfig::default());

    let tx = engine.checkout(&[CheckoutItem::new(1, 2)]).await.unwrap();

    db.products()
        .update(1, product("Kopi Premium", 99000, 8))
        .await
        .unwrap();
    db.products().delete(1).await.unwrap();

    let stored = engine.get_transaction(tx.id).await.unwrap();
    assert_eq!(stored.details[0].product_name, "Kopi");
    assert_eq!(stored.details[0].subtotal, 20000);
    assert_eq!(stored, tx);
}

// =============================================================================
// Concurrency (SQLite)
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_overlapping_checkouts_never_oversell() {
    let dir = TempDir::new().unwrap();
    let db = sqlite_db(&dir).await;
    seed(&db.products(), &[("Kopi", 10000, 10), ("Teh", 5000, 100)]).await;
    let engine = CheckoutEngine::new(Arc::new(db.transactions()), patient_config());

    let carts = (0..25)
        .map(|i| {
            if i % 2 == 0 {
                vec![CheckoutItem::new(1, 1), CheckoutItem::new(2, 1)]
            } else {
                vec![CheckoutItem::new(2, 1), CheckoutItem::new(1, 1)]
            }
        })
        .collect();
    let outcomes = run_concurrently(&engine, carts).await;
    let successes = count_successes(&outcomes);

    assert_eq!(successes, 10);
    assert_eq!(db.products().get_by_id(1).await.unwrap().unwrap().stock, 0);
    assert_eq!(db.products().get_by_id(2).await.unwrap().unwrap().stock, 90);
    assert_eq!(db.transactions().count().await.unwrap(), successes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_disjoint_checkouts_both_succeed() {
    let dir = TempDir::new().unwrap();
    let db = sqlite_db(&dir).await;
    seed(&db.products(), &[("Kopi", 10000, 5), ("Teh", 5000, 5)]).await;
    let engine = CheckoutEngine::new(Arc::new(db.transactions()), patient_config());

    let outcomes = run_concurrently(
        &engine,
        vec![vec![CheckoutItem::new(1, 5)], vec![CheckoutItem::new(2, 5)]],
    )
    .await;

    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(db.products().get_by_id(1).await.unwrap().unwrap().stock, 0);
    assert_eq!(db.products().get_by_id(2).await.unwrap().unwrap().stock, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_lock_contention_surfaces_as_busy() {
    let dir = TempDir::new().unwrap();
    let config = DbConfig::new(dir.path().join("kasir.db"))
        .max_connections(4)
        .busy_timeout(Duration::ZERO);
    let db = Database::new(config).await.unwrap();
    seed(&db.products(), &[("Kopi", 10000, 5)]).await;
    let engine = CheckoutEngine::new(
        Arc::new(db.transactions()),
        CheckoutConfig::default()
            .max_retries(1)
            .retry_backoff(Duration::from_millis(1)),
    );

    // Hold the database write lock as if another checkout were mid-flight.
    let mut holder = db.transactions().begin_checkout().await.unwrap();
    holder.lock_product(1).await.unwrap();

    let err = engine.checkout(&[CheckoutItem::new(1, 1)]).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Busy { attempts: 2 }), "got {err:?}");
    assert!(!err.is_client_error());

    drop(holder);
    assert_eq!(db.products().get_by_id(1).await.unwrap().unwrap().stock, 5);
    assert_eq!(db.transactions().count().await.unwrap(), 0);
}

// =============================================================================
// Concurrency (memory store)
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_overlapping_checkouts_never_oversell() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("Kopi", 10000, 7), ("Teh", 5000, 7)]).await;
    let engine = CheckoutEngine::new(store.clone(), patient_config());

    // Opposite input orders must not deadlock
    let carts = (0..40)
        .map(|i| {
            if i % 2 == 0 {
                vec![CheckoutItem::new(1, 1), CheckoutItem::new(2, 1)]
            } else {
                vec![CheckoutItem::new(2, 1), CheckoutItem::new(1, 1)]
            }
        })
        .collect();
    let outcomes = tokio::time::timeout(Duration::from_secs(10), run_concurrently(&engine, carts))
        .await
        .unwrap();
    let successes = count_successes(&outcomes);

    assert_eq!(successes, 7);
    assert_eq!(store.get(1).await.unwrap().unwrap().stock, 0);
    assert_eq!(store.get(2).await.unwrap().unwrap().stock, 0);
    assert_eq!(store.transaction_count().await as i64, successes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_disjoint_checkouts_do_not_wait_on_each_other() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("Kopi", 10000, 5), ("Teh", 5000, 5)]).await;
    let engine = CheckoutEngine::new(store.clone(), patient_config());

    // Hold product 1 as if another checkout were mid-flight.
    let mut holder = store.begin_checkout();
    holder.lock_product(1).await.unwrap();

    let tx = tokio::time::timeout(
        Duration::from_secs(2),
        engine.checkout(&[CheckoutItem::new(2, 2)]),
    )
    .await
    .expect("disjoint checkout blocked on an unrelated row")
    .unwrap();
    assert_eq!(tx.total_amount, 10000);

    // A checkout that needs product 1 waits for the holder.
    let waiting = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.checkout(&[CheckoutItem::new(1, 1)]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiting.is_finished());

    drop(holder);
    let tx = waiting.await.unwrap().unwrap();
    assert_eq!(tx.details[0].product_id, 1);
    assert_eq!(store.get(1).await.unwrap().unwrap().stock, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_lock_timeout_surfaces_as_busy() {
    let store = Arc::new(MemoryStore::with_lock_timeout(Duration::from_millis(10)));
    seed(store.as_ref(), &[("Kopi", 10000, 5)]).await;
    let engine = CheckoutEngine::new(
        store.clone(),
        CheckoutConfig::default()
            .max_retries(2)
            .retry_backoff(Duration::from_millis(1)),
    );

    let mut holder = store.begin_checkout();
    holder.lock_product(1).await.unwrap();

    let err = engine.checkout(&[CheckoutItem::new(1, 1)]).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Busy { attempts: 3 }));
    assert!(!err.is_client_error());

    drop(holder);
    assert_eq!(store.get(1).await.unwrap().unwrap().stock, 5);
    assert!(store.list_transactions().await.unwrap().is_empty());
}
