//! # kasir-core: Pure Checkout Logic for Kasir POS
//!
//! This crate holds everything about a checkout that can be decided without
//! touching the database: what the cart means, in which order rows must be
//! locked, whether a locked row can satisfy a line, and what the ledger
//! record will contain.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasir POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Request Layer (HTTP, not part of this repo)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Checkout(items)                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             kasir-db: CheckoutEngine + stores                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ plan / settle / draft                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kasir-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ checkout  │  │ validation│  │   │
//! │  │   │  Product  │  │   Money   │  │   Plan    │  │   rules   │  │   │
//! │  │   │Transaction│  │           │  │  Draft    │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Category, Transaction, etc.)
//! - [`money`] - Money type with checked integer arithmetic
//! - [`checkout`] - Consolidation, lock ordering, line settlement
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules
//!
//! ## Example Usage
//!
//! ```rust
//! use kasir_core::checkout::CheckoutPlan;
//! use kasir_core::CheckoutItem;
//!
//! let plan = CheckoutPlan::new(&[
//!     CheckoutItem::new(2, 1),
//!     CheckoutItem::new(1, 3),
//!     CheckoutItem::new(1, 4),
//! ])
//! .unwrap();
//!
//! // One line per product, ascending ids
//! let ids: Vec<i64> = plan.lines().iter().map(|l| l.product_id).collect();
//! assert_eq!(ids, vec![1, 2]);
//! assert_eq!(plan.lines()[0].quantity, 7);
//! ```

pub mod checkout;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use checkout::{CheckoutPlan, ConsolidatedLine, LedgerDraft, PendingDetail};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a product or category name.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum length of a category description.
pub const MAX_DESCRIPTION_LEN: usize = 1000;
