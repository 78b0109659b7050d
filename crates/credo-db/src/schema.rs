//! Schema definitions and migration runner for SurrealDB.
//!
//! UUIDs are stored as record ids (strings). Uniqueness of usernames
//! and emails is enforced by two separately named indexes so that a
//! violated constraint can be attributed to the right field.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::connection::StoreClient;
use crate::error::DbError;

/// Unique index guarding `user.username`.
pub const USERNAME_INDEX: &str = "idx_user_username";
/// Unique index guarding `user.email`.
pub const EMAIL_INDEX: &str = "idx_user_email";

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

#[derive(Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "users",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: user accounts
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD username ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD refresh_token ON TABLE user TYPE option<string>;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_username ON TABLE user \
    COLUMNS username UNIQUE;
DEFINE INDEX idx_user_email ON TABLE user \
    COLUMNS email UNIQUE;
";

/// Apply every migration newer than the recorded schema version.
///
/// Safe to call on every startup; already applied versions are skipped.
pub async fn run_migrations<C: Connection>(store: &StoreClient<C>) -> Result<(), DbError> {
    let op = store.begin_operation()?;
    let db = op.client();

    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("tracking table: {e}")))?;

    let applied = schema_version(db).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        info!(version = applied, "Schema is up to date");
        return Ok(());
    }

    for migration in pending {
        apply(db, migration).await?;
    }
    Ok(())
}

/// Highest recorded migration version, 0 on a fresh database.
async fn schema_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db.query("SELECT version FROM _migration").await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.iter().map(|r| r.version).max().unwrap_or(0))
}

async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    let Migration { version, name, sql } = *migration;
    let failed = |stage: &str, e: surrealdb::Error| {
        DbError::Migration(format!("v{version} ({name}) {stage}: {e}"))
    };

    info!(version, name, "Applying migration");

    db.query(sql)
        .await?
        .check()
        .map_err(|e| failed("schema", e))?;
    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", version))
        .bind(("name", name))
        .await?
        .check()
        .map_err(|e| failed("bookkeeping", e))?;

    info!(version, "Migration applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn unique_indexes_are_declared() {
        assert!(SCHEMA_V1.contains(&format!("DEFINE INDEX {USERNAME_INDEX}")));
        assert!(SCHEMA_V1.contains(&format!("DEFINE INDEX {EMAIL_INDEX}")));
    }
}
