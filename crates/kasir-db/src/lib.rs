//! # kasir-db: Store Layer and Checkout Engine for Kasir POS
//!
//! This crate provides storage and the checkout unit of work for Kasir POS.
//! It uses SQLite for durable storage with sqlx for async operations, and
//! ships an in-memory store with the same capabilities.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasir POS Data Flow                              │
//! │                                                                         │
//! │  Request layer (POST /checkout, GET /transactions, ...)                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kasir-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────────┐   ┌───────────────┐   ┌───────────────┐   │   │
//! │  │   │ CheckoutEngine │──►│  LedgerStore  │   │ InventoryStore│   │   │
//! │  │   │ (checkout.rs)  │   │  (store.rs)   │   │  (store.rs)   │   │   │
//! │  │   │ retry, timeout │   └───────┬───────┘   └───────┬───────┘   │   │
//! │  │   └────────────────┘           │                   │           │   │
//! │  │                    ┌───────────┴──────┬────────────┘           │   │
//! │  │                    ▼                  ▼                        │   │
//! │  │        Repositories (SQLite)    MemoryStore (memory.rs)        │   │
//! │  │        Database (pool.rs)                                      │   │
//! │  │        Migrations (embedded)                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and checkout error types
//! - [`store`] - Store capability traits
//! - [`repository`] - SQLite repository implementations
//! - [`memory`] - In-memory store
//! - [`checkout`] - Checkout engine
//! - [`config`] - Environment configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kasir_db::{AppConfig, CheckoutEngine, Database};
//! use kasir_core::CheckoutItem;
//!
//! let config = AppConfig::from_env()?;
//! let db = Database::new(config.database).await?;
//!
//! let engine = CheckoutEngine::new(Arc::new(db.transactions()), config.checkout);
//! let tx = engine.checkout(&[CheckoutItem::new(1, 3)]).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod config;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use checkout::{CheckoutConfig, CheckoutEngine};
pub use config::{AppConfig, ConfigError};
pub use error::{CheckoutError, DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{Database, DbConfig};
pub use store::{InventoryStore, LedgerStore, UnitOfWork};

// Repository re-exports for convenience
pub use repository::category::CategoryRepository;
pub use repository::product::ProductRepository;
pub use repository::report::ReportRepository;
pub use repository::transaction::{SqliteUnitOfWork, TransactionRepository};
