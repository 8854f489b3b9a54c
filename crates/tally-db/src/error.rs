//! # Scan History Errors
//!
//! Everything the local history store can fail with. `tally-lookup` wraps
//! these in `LookupError::Database`; the CLI prints them through anyhow.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error                              DbError                       │
//! │  ───────────                              ───────                       │
//! │  Database("... constraint failed")  ───►  ConstraintViolation           │
//! │  Database("database is locked")     ───►  Busy                          │
//! │  PoolTimedOut                       ───►  Busy                          │
//! │  PoolClosed                         ───►  Closed                        │
//! │  anything else                      ───►  Query                         │
//! │                                                                         │
//! │  MigrateError                       ───►  Migration                     │
//! │  connect failure (Database::new)    ───►  Open { location, reason }     │
//! │  unreadable stored row              ───►  CorruptRow { id, reason }     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// The history file could not be opened or created.
    #[error("Cannot open scan history at {location}: {reason}")]
    Open { location: String, reason: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A CHECK or NOT NULL constraint of `scanned_products` rejected the row.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Another writer held the file past the busy timeout, or no pooled
    /// connection became free in time.
    #[error("Scan history is busy: {0}")]
    Busy(String),

    #[error("Scan history is closed")]
    Closed,

    /// A stored row could not be turned back into a domain record.
    #[error("Corrupt row {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    #[error("Query failed: {0}")]
    Query(String),
}

impl DbError {
    pub(crate) fn open(location: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        DbError::Open {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Worth retrying once the other writer is done.
    pub fn is_busy(&self) -> bool {
        matches!(self, DbError::Busy(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("constraint failed") {
                    DbError::ConstraintViolation(msg.to_string())
                } else if msg.contains("database is locked") {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::Query(msg.to_string())
                }
            }
            sqlx::Error::PoolTimedOut => DbError::Busy("no free connection".to_string()),
            sqlx::Error::PoolClosed => DbError::Closed,
            other => DbError::Query(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_busy());

        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Closed));
        assert!(!err.is_busy());
    }

    #[test]
    fn test_other_errors_are_query_failures() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::Query(_)));
    }

    #[test]
    fn test_open_error_names_the_location() {
        let err = DbError::open("/var/lib/tally/tally.db", "permission denied");
        assert_eq!(
            err.to_string(),
            "Cannot open scan history at /var/lib/tally/tally.db: permission denied"
        );
    }
}
