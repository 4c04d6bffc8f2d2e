//! # Checkout Planning
//!
//! The pure half of a checkout. The store layer drives the unit of work; this
//! module decides everything that does not need the database.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Checkout Flow                                     │
//! │                                                                         │
//! │  [{1,3}, {2,1}, {1,4}]                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CheckoutPlan::new ──► EmptyCart / InvalidQuantity (no store access)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  lines() = [{1,7}, {2,1}]   one per id, ascending id order             │
//! │       │                                                                 │
//! │       ▼  for each line, inside the unit of work:                       │
//! │  lock row ──► ConsolidatedLine::settle(row) ──► InsufficientStock?      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerDraft::push ──► running total                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  header + details written, commit                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lock Ordering
//! Every caller locks rows in ascending product id. Two checkouts that share
//! products therefore always meet at the lowest shared id first, and neither
//! can hold a row the other is waiting on while itself waiting.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CheckoutItem, StockSnapshot, Transaction, TransactionDetail};
use crate::validation::validate_quantity;

// =============================================================================
// Consolidation
// =============================================================================

/// One distinct product of a cart with its summed quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidatedLine {
    pub product_id: i64,
    pub quantity: i64,
}

impl ConsolidatedLine {
    /// Checks a locked row against this line and prices it.
    ///
    /// ## Returns
    /// * `Ok(PendingDetail)` - row has enough stock; subtotal uses the row price
    /// * `Err(CoreError::InsufficientStock)` - stock on hand is below the line quantity
    /// * `Err(CoreError::AmountOverflow)` - price × quantity does not fit in i64
    pub fn settle(&self, row: &StockSnapshot) -> CoreResult<PendingDetail> {
        if row.stock < self.quantity {
            return Err(CoreError::InsufficientStock {
                id: self.product_id,
                name: row.name.clone(),
                requested: self.quantity,
                available: row.stock,
            });
        }

        let subtotal = Money::from_minor(row.price)
            .checked_mul_quantity(self.quantity)
            .ok_or(CoreError::AmountOverflow { context: "subtotal" })?;

        Ok(PendingDetail {
            product_id: self.product_id,
            product_name: row.name.clone(),
            quantity: self.quantity,
            subtotal,
            remaining_stock: row.stock - self.quantity,
        })
    }
}

/// A validated, consolidated and ordered checkout request.
///
/// Building a plan never touches the store, so input errors are reported
/// before any lock is taken. The same plan is reused unchanged when a unit
/// of work is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    lines: Vec<ConsolidatedLine>,
}

impl CheckoutPlan {
    /// Validates and consolidates checkout lines.
    ///
    /// ## Errors
    /// * `EmptyCart` - no lines
    /// * `InvalidQuantity` - first line (in request order) with quantity <= 0
    /// * `AmountOverflow` - summed quantity for a product exceeds i64
    pub fn new(items: &[CheckoutItem]) -> CoreResult<Self> {
        if items.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        let mut merged: BTreeMap<i64, i64> = BTreeMap::new();
        for item in items {
            validate_quantity(item.quantity).map_err(|_| CoreError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            })?;

            let entry = merged.entry(item.product_id).or_insert(0);
            *entry = entry
                .checked_add(item.quantity)
                .ok_or(CoreError::AmountOverflow {
                    context: "consolidated quantity",
                })?;
        }

        // BTreeMap iterates in ascending key order: this is the lock order.
        let lines = merged
            .into_iter()
            .map(|(product_id, quantity)| ConsolidatedLine {
                product_id,
                quantity,
            })
            .collect();

        Ok(CheckoutPlan { lines })
    }

    /// Lines in lock order (ascending product id).
    #[inline]
    pub fn lines(&self) -> &[ConsolidatedLine] {
        &self.lines
    }

    /// Product ids in lock order.
    pub fn product_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.lines.iter().map(|l| l.product_id)
    }

    /// Number of distinct products.
    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false for a constructed plan.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

// =============================================================================
// Ledger Draft
// =============================================================================

/// A priced line waiting to be written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDetail {
    pub product_id: i64,
    /// Name snapshot taken from the locked row.
    pub product_name: String,
    pub quantity: i64,
    pub subtotal: Money,
    /// Stock on hand after this line is deducted.
    pub remaining_stock: i64,
}

impl PendingDetail {
    /// Builds the stored detail once the header id is known.
    pub fn to_detail(&self, transaction_id: i64) -> TransactionDetail {
        TransactionDetail {
            transaction_id,
            product_id: self.product_id,
            product_name: self.product_name.clone(),
            quantity: self.quantity,
            subtotal: self.subtotal.minor(),
        }
    }
}

/// Accumulates settled lines and the running total of a checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerDraft {
    details: Vec<PendingDetail>,
    total: Money,
}

impl LedgerDraft {
    /// Creates an empty draft.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a settled line to the running total.
    pub fn push(&mut self, detail: PendingDetail) -> CoreResult<()> {
        self.total = self
            .total
            .checked_add(detail.subtotal)
            .ok_or(CoreError::AmountOverflow {
                context: "total amount",
            })?;
        self.details.push(detail);
        Ok(())
    }

    /// Running total.
    #[inline]
    pub fn total(&self) -> Money {
        self.total
    }

    /// Lines in the order they were settled.
    #[inline]
    pub fn details(&self) -> &[PendingDetail] {
        &self.details
    }

    /// Assembles the finished record after the header insert.
    pub fn into_transaction(self, id: i64, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            total_amount: self.total.minor(),
            created_at,
            details: self.details.iter().map(|d| d.to_detail(id)).collect(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
