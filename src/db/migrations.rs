//! Database migrations

use rusqlite::Connection;

use super::DbResult;

/// Ordered list of (version, name, sql)
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "initial_schema",
    include_str!("migrations/001_initial_schema.sql"),
)];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> DbResult<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
    "#,
        [],
    )?;

    for (version, name, sql) in MIGRATIONS {
        let applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?",
            [version],
            |row| row.get(0),
        )?;

        if !applied {
            tracing::info!("Running migration {}: {}", version, name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_migrations (version, name) VALUES (?, ?)",
                rusqlite::params![version, name],
            )?;
            tracing::info!("Applied migration {}: {}", version, name);
        }
    }

    Ok(())
}

/// Highest migration version known to this build
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|(v, _, _)| *v).unwrap_or(0)
}
