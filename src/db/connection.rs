//! Database connection management

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbResult<T> = Result<T, DbError>;

pub const DB_FILE_NAME: &str = "coach-server.db";

/// Initialize the database connection pool and run migrations
pub fn init_database(data_dir: PathBuf) -> DbResult<DbPool> {
    std::fs::create_dir_all(&data_dir)?;
    open_pool(&data_dir.join(DB_FILE_NAME), 10)
}

/// Open a pool on an explicit database file and bring its schema up to date
pub fn open_pool(db_path: &Path, max_size: u32) -> DbResult<DbPool> {
    tracing::info!("Initializing database at {:?}", db_path);

    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
        "#,
        )?;
        Ok(())
    });

    let pool = Pool::builder().max_size(max_size).build(manager)?;

    {
        let conn = pool.get()?;
        super::migrations::run_migrations(&conn)?;
    }

    Ok(pool)
}
