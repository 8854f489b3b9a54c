//! # Scan History Database
//!
//! Opens the SQLite file behind the local scan history and hands out
//! repositories over one shared pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig::new(path)            DbConfig::in_memory()                   │
//! │    Location::File                 Location::Memory                      │
//! │    parent dir created             one connection, never recycled        │
//! │    WAL + synchronous=NORMAL       (the data lives in that connection)   │
//! │    busy_timeout for writers                                             │
//! │         │                                │                              │
//! │         └───────────────┬────────────────┘                              │
//! │                         ▼                                               │
//! │              Database::new ── migrations ── products()                  │
//! │                                                                         │
//! │  Readers: scan (find_by_barcode), history                               │
//! │  Writers: confirm (insert), clear (delete_all)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The history is append-only and small, so a handful of connections is
//! plenty. WAL keeps a `history` listing from blocking a `confirm`.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::product::ProductRepository;

const FILE_CONNECTIONS: u32 = 4;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// Where the history lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    /// Private to one `Database`; gone when it is closed.
    Memory,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Memory => f.write_str(":memory:"),
        }
    }
}

/// How to open the scan history.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tally/tally.db")
///     .busy_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: Location,
    pub max_connections: u32,
    /// How long a statement waits on a lock held by another process.
    pub busy_timeout: Duration,
}

impl DbConfig {
    /// A history file at `path`. The file and its parent directory are
    /// created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            location: Location::File(path.into()),
            max_connections: FILE_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// A throwaway history for tests.
    pub fn in_memory() -> Self {
        DbConfig {
            location: Location::Memory,
            max_connections: 1,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = match &self.location {
            Location::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
            Location::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::open(&self.location, e))?,
        };
        Ok(options.busy_timeout(self.busy_timeout))
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT);

        match self.location {
            Location::File(_) => options.min_connections(0),
            // Recycling the only connection would drop every row.
            Location::Memory => options
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the open scan history. Clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    location: Location,
}

impl Database {
    /// Opens the history described by `config` and applies pending
    /// migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(location = %config.location, "Opening scan history");

        if let Location::File(path) = &config.location {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DbError::open(&config.location, e))?;
            }
        }

        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::open(&config.location, e))?;
        debug!(
            max_connections = config.max_connections,
            busy_timeout = ?config.busy_timeout,
            "Pool ready"
        );

        let db = Database {
            pool,
            location: config.location,
        };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub async fn close(&self) {
        info!(location = %self.location, "Closing scan history");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
