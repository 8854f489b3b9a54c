//! # Embedded Schema
//!
//! The `scanned_products` schema ships inside the binary. Files live in the
//! workspace `migrations/sqlite/` directory as `NNN_description.sql`; add a
//! new file for every change instead of editing an applied one.

use sqlx::migrate::Migrator;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Brings the history schema up to date. Safe to call on every start.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    debug!(known = MIGRATOR.migrations.len(), "Applying history schema");
    MIGRATOR.run(pool).await?;
    info!("History schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_schema_is_embedded() {
        let first = MIGRATOR
            .migrations
            .iter()
            .min_by_key(|m| m.version)
            .unwrap();
        assert_eq!(first.version, 1);
        assert!(first.sql.contains("scanned_products"));
    }
}
