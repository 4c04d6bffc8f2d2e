//! # Checkout Engine
//!
//! Turns a cart into one committed ledger entry, atomically deducting stock.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          checkout(items)                                │
//! │                                                                         │
//! │  CheckoutPlan::new(items)      ← EmptyCart / InvalidQuantity, no I/O    │
//! │       │  lines consolidated by id, ascending                            │
//! │       ▼                                                                 │
//! │  ┌─ attempt ─────────────────────────────────────────────────────────┐  │
//! │  │ store.begin()                                                     │  │
//! │  │ for line in plan:  lock_product → settle → deduct_stock           │  │
//! │  │ insert_transaction(total) → id                                    │  │
//! │  │ insert_details(id, lines)                                         │  │
//! │  │ commit                                                            │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │       │                                                                 │
//! │       ├── Ok ───────────────────────────► Transaction                   │
//! │       ├── rejection (not found, stock) ─► CheckoutError::Rejected        │
//! │       ├── transient (busy, pool) ───────► backoff, same plan again      │
//! │       │                                   (max_retries, then Busy)      │
//! │       └── deadline reached ─────────────► CheckoutError::Busy           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every attempt locks rows in the same ascending id order, so two checkouts
//! can never wait on each other in a cycle. A failed or abandoned attempt
//! drops its unit of work, which rolls back everything it wrote.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{CheckoutError, DbError, DbResult};
use crate::store::{LedgerStore, UnitOfWork};
use kasir_core::{ledger_timestamp, CheckoutItem, CheckoutPlan, CoreError, LedgerDraft, Transaction};

// =============================================================================
// Configuration
// =============================================================================

/// Retry and timeout policy for checkouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Extra attempts after the first when the store reports contention.
    /// Default: 3
    pub max_retries: u32,

    /// Base delay between attempts; attempt `n` waits `n × retry_backoff`.
    /// Default: 25 ms
    pub retry_backoff: Duration,

    /// Deadline for a whole `checkout` call, retries included.
    /// Default: 10 seconds
    pub timeout: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        CheckoutConfig {
            max_retries: 3,
            retry_backoff: Duration::from_millis(25),
            timeout: Duration::from_secs(10),
        }
    }
}

impl CheckoutConfig {
    /// Sets the retry count.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the backoff step.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the per-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Runs checkouts against an injected [`LedgerStore`].
///
/// Holds no mutable state of its own; all coordination happens in the
/// store's locks, so one engine can be shared freely across tasks.
#[derive(Clone)]
pub struct CheckoutEngine {
    store: Arc<dyn LedgerStore>,
    config: CheckoutConfig,
}

impl std::fmt::Debug for CheckoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CheckoutEngine {
    /// Creates an engine over the given ledger store.
    pub fn new(store: Arc<dyn LedgerStore>, config: CheckoutConfig) -> Self {
        CheckoutEngine { store, config }
    }

    /// Returns the active policy.
    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Checks out a cart using the configured timeout.
    pub async fn checkout(&self, items: &[CheckoutItem]) -> Result<Transaction, CheckoutError> {
        self.checkout_with_timeout(items, self.config.timeout).await
    }

    /// Checks out a cart, giving up with `CheckoutError::Busy` once
    /// `timeout` has elapsed.
    ///
    /// ## Returns
    /// * `Ok(Transaction)` - Committed, with id, timestamp and details
    /// * `Err(CheckoutError::Rejected)` - Bad input, unknown item or not enough stock
    /// * `Err(CheckoutError::Busy)` - Contention outlasted retries or the deadline
    /// * `Err(CheckoutError::Store)` - Any other store failure
    ///
    /// On every error the store is left as it was.
    pub async fn checkout_with_timeout(
        &self,
        items: &[CheckoutItem],
        timeout: Duration,
    ) -> Result<Transaction, CheckoutError> {
        // Validation happens before the store is touched.
        let plan = CheckoutPlan::new(items)?;

        let span = info_span!(
            "checkout",
            checkout_id = %Uuid::new_v4(),
            lines = plan.len()
        );
        self.run_with_retries(&plan, Instant::now() + timeout)
            .instrument(span)
            .await
    }

    /// All committed transactions, most recent first.
    pub async fn list_transactions(&self) -> DbResult<Vec<Transaction>> {
        self.store.list_transactions().await
    }

    /// One committed transaction.
    ///
    /// Returns `DbError::NotFound` if no transaction has that id.
    pub async fn get_transaction(&self, id: i64) -> DbResult<Transaction> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| DbError::not_found("Transaction", id))
    }

    async fn run_with_retries(
        &self,
        plan: &CheckoutPlan,
        deadline: Instant,
    ) -> Result<Transaction, CheckoutError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.attempt(plan, deadline).await {
                Ok(transaction) => {
                    info!(
                        transaction_id = transaction.id,
                        total_amount = transaction.total_amount,
                        attempt,
                        "Checkout committed"
                    );
                    return Ok(transaction);
                }
                Err(AttemptError::Store(err)) if err.is_transient() => {
                    if attempt > self.config.max_retries {
                        warn!(attempt, error = %err, "Checkout retries exhausted");
                        return Err(CheckoutError::Busy { attempts: attempt });
                    }

                    let backoff = self.config.retry_backoff * attempt;
                    if Instant::now() + backoff >= deadline {
                        warn!(attempt, error = %err, "No time left to retry checkout");
                        return Err(CheckoutError::Busy { attempts: attempt });
                    }

                    warn!(attempt, error = %err, ?backoff, "Checkout contended, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(AttemptError::DeadlineReached) => {
                    warn!(attempt, "Checkout deadline reached, attempt rolled back");
                    return Err(CheckoutError::Busy { attempts: attempt });
                }
                Err(AttemptError::Rejected(core)) => {
                    debug!(error = %core, "Checkout rejected");
                    return Err(CheckoutError::Rejected(core));
                }
                Err(AttemptError::Store(err)) => {
                    warn!(error = %err, "Checkout failed");
                    return Err(err.into());
                }
            }
        }
    }

    /// One pass over the plan inside a single unit of work.
    ///
    /// The deadline covers everything up to commit. Once commit has started
    /// it runs to completion, so a sale is never reported as failed after it
    /// became durable.
    async fn attempt(
        &self,
        plan: &CheckoutPlan,
        deadline: Instant,
    ) -> Result<Transaction, AttemptError> {
        let staged = tokio::time::timeout_at(deadline, self.stage(plan))
            .await
            .map_err(|_| AttemptError::DeadlineReached)??;

        staged.uow.commit().await?;
        Ok(staged.draft.into_transaction(staged.id, staged.created_at))
    }

    /// Locks, checks and writes everything short of commit.
    ///
    /// The unit of work is dropped (rolled back) on every early return.
    async fn stage(&self, plan: &CheckoutPlan) -> Result<Staged, AttemptError> {
        let mut uow: Box<dyn UnitOfWork> = self.store.begin().await?;
        let mut draft = LedgerDraft::new();

        for line in plan.lines() {
            let snapshot = uow
                .lock_product(line.product_id)
                .await?
                .ok_or(CoreError::ItemNotFound {
                    id: line.product_id,
                })?;

            let pending = line.settle(&snapshot)?;
            uow.deduct_stock(line.product_id, line.quantity).await?;
            debug!(
                product_id = line.product_id,
                quantity = line.quantity,
                remaining = pending.remaining_stock,
                "Line settled"
            );
            draft.push(pending)?;
        }

        let created_at = ledger_timestamp();
        let id = uow
            .insert_transaction(draft.total().minor(), created_at)
            .await?;
        uow.insert_details(id, draft.details()).await?;

        Ok(Staged {
            uow,
            draft,
            id,
            created_at,
        })
    }
}

/// A unit of work with every write done, waiting for commit.
struct Staged {
    uow: Box<dyn UnitOfWork>,
    draft: LedgerDraft,
    id: i64,
    created_at: DateTime<Utc>,
}

/// Outcome of a single attempt, before retry policy is applied.
#[derive(Debug)]
enum AttemptError {
    Rejected(CoreError),
    Store(DbError),
    DeadlineReached,
}

impl From<CoreError> for AttemptError {
    fn from(err: CoreError) -> Self {
        AttemptError::Rejected(err)
    }
}

impl From<DbError> for AttemptError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::InvalidInput(core) => AttemptError::Rejected(core),
            other => AttemptError::Store(other),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
