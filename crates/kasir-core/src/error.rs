//! # Error Types
//!
//! Domain-specific error types for kasir-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kasir-core errors (this file)                                         │
//! │  ├── CoreError        - Cart rejections and business rule failures     │
//! │  └── ValidationError  - Field-level input validation failures          │
//! │                                                                         │
//! │  kasir-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── CheckoutError    - What the request layer sees from a checkout    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CheckoutError → Request Layer     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, name, quantities)
//! 3. Errors are enum variants, never String - callers match on the variant
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Input errors (`EmptyCart`, `InvalidQuantity`) are raised before the store
/// is touched. Business errors (`ItemNotFound`, `InsufficientStock`) are raised
/// in the middle of a unit of work and abort it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The checkout request had no lines.
    #[error("Transaction items cannot be empty")]
    EmptyCart,

    /// A checkout line asked for zero or a negative quantity.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: i64, quantity: i64 },

    /// Product id does not exist in inventory.
    #[error("Product id {id} not found")]
    ItemNotFound { id: i64 },

    /// Insufficient stock to complete the checkout.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout [{id: 1, qty: 5}]
    ///      │
    ///      ▼
    /// Lock row 1: stock=2
    ///      │
    ///      ▼
    /// InsufficientStock { id: 1, name: "Indomie", requested: 5, available: 2 }
    ///      │
    ///      ▼
    /// Caller shows: "Only 2 Indomie in stock"
    /// ```
    #[error("Insufficient stock for {name} (id {id}): available {available}, requested {requested}")]
    InsufficientStock {
        id: i64,
        name: String,
        requested: i64,
        available: i64,
    },

    /// A quantity or amount does not fit in 64 bits.
    #[error("Amount overflow while computing {context}")]
    AmountOverflow { context: &'static str },

    /// Report range ends before it starts.
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
