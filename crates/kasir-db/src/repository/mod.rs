//! # Repository Module
//!
//! SQLite repository implementations for Kasir POS.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CheckoutEngine ──► LedgerStore ──► TransactionRepository               │
//! │                                          │ SqliteUnitOfWork             │
//! │  product admin  ──► InventoryStore ──► ProductRepository                │
//! │                                          │                              │
//! │  category admin ───────────────────► CategoryRepository                │
//! │  reports        ───────────────────► ReportRepository                  │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                                    SQLite Database                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Product CRUD, the durable inventory store
//! - [`CategoryRepository`](category::CategoryRepository) - Category CRUD
//! - [`TransactionRepository`](transaction::TransactionRepository) - Checkout units of work and ledger reads
//! - [`ReportRepository`](report::ReportRepository) - Sales summaries

pub mod category;
pub mod product;
pub mod report;
pub mod transaction;
