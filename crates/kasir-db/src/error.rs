//! # Database Error Types
//!
//! Error types for database operations and for the checkout engine.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← classified by ErrorKind / SQLite result code  │
//! │       │                                                                 │
//! │       ├── is_transient() ──► CheckoutEngine retries the same plan       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CheckoutError ← Rejected(CoreError) | Busy | Store(DbError)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Request layer picks a transport status                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use kasir_core::CoreError;
use sqlx::error::ErrorKind;
use thiserror::Error;

/// SQLite primary result codes that mean "another connection holds the lock".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Product refers to a category id that does not exist
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK or NOT NULL constraint violation.
    ///
    /// ## When This Occurs
    /// - A write would make stock or price negative
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Input rejected before reaching the database.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] CoreError),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Lock wait gave up (SQLite BUSY/LOCKED, or a row lock wait timeout).
    #[error("Database busy: {0}")]
    Busy(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether retrying the same unit of work may succeed.
    ///
    /// Only lock contention and pool exhaustion qualify. Constraint
    /// violations and connection failures are reported as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound      → DbError::NotFound
/// Database, UniqueViolation     → DbError::UniqueViolation
/// Database, ForeignKeyViolation → DbError::ForeignKeyViolation
/// Database, Check/NotNull       → DbError::ConstraintViolation
/// Database, code BUSY/LOCKED    → DbError::Busy (transient)
/// sqlx::Error::PoolTimedOut     → DbError::PoolExhausted (transient)
/// Other                         → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();

                // Extended result codes carry the primary code in the low byte.
                let primary_code = db_err
                    .code()
                    .and_then(|c| c.parse::<i32>().ok())
                    .map(|c| c & 0xff);
                if matches!(primary_code, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
                    return DbError::Busy(message);
                }

                match db_err.kind() {
                    ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        field: db_err.constraint().unwrap_or("unknown").to_string(),
                        value: "unknown".to_string(),
                    },
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message },
                    ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                        DbError::ConstraintViolation { message }
                    }
                    _ => DbError::QueryFailed(message),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Checkout Error
// =============================================================================

/// Everything a checkout can fail with.
///
/// ## Mapping Guide (for a request layer)
/// ```text
/// Rejected(EmptyCart | InvalidQuantity)  → bad request
/// Rejected(ItemNotFound)                 → not found
/// Rejected(InsufficientStock)            → conflict
/// Busy                                   → service unavailable, retry later
/// Store                                  → internal error
/// ```
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Input or business rule rejection. Nothing was written.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// Lock contention or deadline did not clear within the retry budget.
    #[error("Checkout busy after {attempts} attempt(s), try again")]
    Busy { attempts: u32 },

    /// Non-transient store failure. Nothing was written.
    #[error("Store error: {0}")]
    Store(DbError),
}

impl From<DbError> for CheckoutError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::InvalidInput(core) => CheckoutError::Rejected(core),
            other => CheckoutError::Store(other),
        }
    }
}

impl CheckoutError {
    /// Whether the caller can fix the request (cart contents) and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(self, CheckoutError::Rejected(_))
    }

    /// Returns the domain rejection, if any.
    pub fn as_rejection(&self) -> Option<&CoreError> {
        match self {
            CheckoutError::Rejected(core) => Some(core),
            _ => None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Busy("database is locked".to_string()).is_transient());
        assert!(DbError::PoolExhausted.is_transient());
        assert!(!DbError::not_found("Product", 1).is_transient());
        assert!(!DbError::ConnectionFailed("gone".to_string()).is_transient());
    }

    #[test]
    fn test_pool_errors_map() {
        assert!(matches!(DbError::from(sqlx::Error::PoolTimedOut), DbError::PoolExhausted));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::ConnectionFailed(_)
        ));
    }

    #[test]
    fn test_checkout_error_from_db_error() {
        let err: CheckoutError = DbError::InvalidInput(CoreError::EmptyCart).into();
        assert!(err.is_client_error());
        assert_eq!(err.as_rejection(), Some(&CoreError::EmptyCart));

        let err: CheckoutError = DbError::Internal("boom".to_string()).into();
        assert!(!err.is_client_error());
        assert!(matches!(err, CheckoutError::Store(DbError::Internal(_))));
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(
            DbError::not_found("Transaction", 7).to_string(),
            "Transaction not found: 7"
        );
    }
}
