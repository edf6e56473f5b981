use super::{Migration, MIGRATIONS};
use crate::errors::{checksum_mismatch, from_rusqlite, migration_error, Result};
use rusqlite::{params, Connection, OptionalExtension};

const SCHEMA_VERSION_DDL: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY,
    migration_id TEXT NOT NULL UNIQUE,
    applied_at INTEGER NOT NULL,
    checksum TEXT NOT NULL
)";

/// Bring the database up to the latest schema.
///
/// Applied migrations are skipped after their recorded checksum is compared
/// with the embedded SQL; each pending one runs in its own transaction.
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute(SCHEMA_VERSION_DDL, []).map_err(from_rusqlite)?;
    for migration in MIGRATIONS {
        match recorded_checksum(conn, migration.id)? {
            Some(recorded) if recorded != migration.checksum() => {
                return Err(checksum_mismatch(
                    migration.id,
                    &recorded,
                    &migration.checksum(),
                ));
            }
            Some(_) => {}
            None => apply(conn, migration)?,
        }
    }
    Ok(())
}

/// Ids of applied migrations, in application order
pub fn applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT migration_id FROM schema_version ORDER BY id")
        .map_err(from_rusqlite)?;
    let ids = stmt
        .query_map([], |row| row.get(0))
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(from_rusqlite)?;
    Ok(ids)
}

fn recorded_checksum(conn: &Connection, id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT checksum FROM schema_version WHERE migration_id = ?1",
        [id],
        |row| row.get(0),
    )
    .optional()
    .map_err(from_rusqlite)
}

fn apply(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn.transaction().map_err(from_rusqlite)?;
    tx.execute_batch(migration.sql)
        .map_err(|e| migration_error(migration.id, &e.to_string()))?;
    tx.execute(
        "INSERT INTO schema_version (migration_id, applied_at, checksum) VALUES (?1, ?2, ?3)",
        params![
            migration.id,
            chrono::Utc::now().timestamp(),
            migration.checksum()
        ],
    )
    .map_err(from_rusqlite)?;
    tx.commit().map_err(from_rusqlite)?;
    tracing::debug!(migration_id = migration.id, "migration applied");
    Ok(())
}
