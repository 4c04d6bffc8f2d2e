//! # Domain Types
//!
//! Core domain types used throughout Kasir POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Category     │   │     Product     │   │    Transaction      │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id             │◄─ │  category_id?   │   │  id                 │   │
//! │  │  name           │   │  id             │   │  total_amount       │   │
//! │  │  description    │   │  name           │   │  created_at         │   │
//! │  └─────────────────┘   │  price          │   │  details ──────┐    │   │
//! │                        │  stock          │   └────────────────┼────┘   │
//! │                        └────────▲────────┘                    │        │
//! │                                 │ product_id (weak, by id)    ▼        │
//! │                        ┌────────┴────────────────────────────────────┐ │
//! │                        │  TransactionDetail                          │ │
//! │                        │  product_name (snapshot), quantity, subtotal│ │
//! │                        └─────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! A detail copies the product name and computes its subtotal from the price
//! at checkout time. Renaming, repricing or deleting a product later never
//! changes a recorded sale.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::validation::{
    validate_description, validate_name, validate_price, validate_stock,
};

// =============================================================================
// Category
// =============================================================================

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// Fields for creating or replacing a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl NewCategory {
    /// Validates all fields.
    pub fn validate(&self) -> CoreResult<()> {
        validate_name(&self.name)?;
        validate_description(&self.description)?;
        Ok(())
    }
}

// =============================================================================
// Product
// =============================================================================

/// A stock item available for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Store-assigned identifier, stable for the life of the row.
    pub id: i64,

    /// Display name, copied into transaction details at checkout.
    pub name: String,

    /// Unit price in the smallest currency unit.
    pub price: i64,

    /// Quantity on hand. Never negative.
    pub stock: i64,

    /// Optional category, resolved by id lookup.
    pub category_id: Option<i64>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_minor(self.price)
    }

    /// Checks if the quantity on hand covers `quantity`.
    #[inline]
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }
}

/// Fields for creating or replacing a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub price: i64,
    pub stock: i64,
    #[serde(default)]
    pub category_id: Option<i64>,
}

impl NewProduct {
    /// Validates all fields.
    ///
    /// ## Rules
    /// - name: required, at most [`crate::MAX_NAME_LEN`] characters
    /// - price: >= 0
    /// - stock: >= 0
    pub fn validate(&self) -> CoreResult<()> {
        validate_name(&self.name)?;
        validate_price(self.price)?;
        validate_stock(self.stock)?;
        Ok(())
    }

    /// Builds the stored product once an id has been assigned.
    pub fn into_product(self, id: i64) -> Product {
        Product {
            id,
            name: self.name.trim().to_string(),
            price: self.price,
            stock: self.stock,
            category_id: self.category_id,
        }
    }
}

/// A product with its category resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductWithCategory {
    pub product: Product,
    pub category: Option<Category>,
}

// =============================================================================
// Checkout Input
// =============================================================================

/// One line of a checkout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutItem {
    pub product_id: i64,
    pub quantity: i64,
}

impl CheckoutItem {
    /// Creates a checkout line.
    #[inline]
    pub const fn new(product_id: i64, quantity: i64) -> Self {
        CheckoutItem {
            product_id,
            quantity,
        }
    }
}

/// What a locked inventory row shows the checkout engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockSnapshot {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub stock: i64,
}

impl From<&Product> for StockSnapshot {
    fn from(product: &Product) -> Self {
        StockSnapshot {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
            stock: product.stock,
        }
    }
}

// =============================================================================
// Transaction (Ledger)
// =============================================================================

/// A completed sale. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transaction {
    pub id: i64,
    pub total_amount: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub details: Vec<TransactionDetail>,
}

impl Transaction {
    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_minor(self.total_amount)
    }

    /// Sum of the detail subtotals. Equal to `total_amount` for every
    /// transaction the checkout engine produces.
    pub fn details_total(&self) -> i64 {
        self.details.iter().map(|d| d.subtotal).sum()
    }
}

/// A line of a completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransactionDetail {
    pub transaction_id: i64,
    pub product_id: i64,
    /// Product name at time of sale (frozen).
    pub product_name: String,
    pub quantity: i64,
    /// Unit price at time of sale × quantity.
    pub subtotal: i64,
}

/// Returns "now" at the precision the ledger stores (milliseconds), so the
/// value handed back by checkout equals the value read back later.
pub fn ledger_timestamp() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

// =============================================================================
// Reports
// =============================================================================

/// Best selling product within a report range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BestSellingProduct {
    pub name: String,
    pub quantity_sold: i64,
}

/// Sales summary for a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesReport {
    pub total_revenue: i64,
    pub total_transactions: i64,
    pub best_selling_product: Option<BestSellingProduct>,
}

/// Half-open UTC range `[start, end)` for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportRange {
    /// The whole UTC day containing `date`.
    ///
    /// Fails with `InvalidDateRange` when the day after `date` is not
    /// representable (`NaiveDate::MAX`).
    pub fn for_day(date: NaiveDate) -> CoreResult<Self> {
        let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = start
            .checked_add_signed(Duration::days(1))
            .ok_or_else(|| CoreError::InvalidDateRange {
                start: date.to_string(),
                end: date.to_string(),
            })?;
        Ok(ReportRange { start, end })
    }

    /// From the start of `start` through the end of `end` (inclusive days).
    pub fn for_dates(start: NaiveDate, end: NaiveDate) -> CoreResult<Self> {
        if start > end {
            return Err(CoreError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(ReportRange {
            start: ReportRange::for_day(start)?.start,
            end: ReportRange::for_day(end)?.end,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
