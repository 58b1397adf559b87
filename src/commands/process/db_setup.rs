use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::now_utc_string;

pub(crate) const DB_SCHEMA_VERSION: &str = "0.1.0";

pub(crate) fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub(crate) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS extractions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          run_id TEXT NOT NULL,
          source_path TEXT NOT NULL,
          keyword TEXT NOT NULL,
          extracted_id TEXT NOT NULL,
          page_index INTEGER NOT NULL,
          matched_at TEXT NOT NULL,
          source_modified_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_extractions_run ON extractions(run_id);
        CREATE INDEX IF NOT EXISTS idx_extractions_keyword ON extractions(keyword);
        CREATE INDEX IF NOT EXISTS idx_extractions_source ON extractions(source_path);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}
