use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::PathBuf;
use tracing::info;

use crate::error::Error;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Initialize database with connection pool and run migrations
pub fn init_db(db_path: Option<PathBuf>) -> Result<DbPool> {
    let path = db_path.unwrap_or_else(|| {
        let mut path = dirs::data_local_dir().expect("Cannot determine data directory");
        path.push("ipamd");
        std::fs::create_dir_all(&path).expect("Cannot create data directory");
        path.push("ipamd.db");
        path
    });

    info!("Initializing database at: {:?}", path);

    // foreign_keys is per-connection in SQLite; every pooled connection
    // needs it for cascade deletes to hold. busy_timeout lets writers
    // queue behind each other instead of failing fast.
    let manager = SqliteConnectionManager::file(&path)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
    let pool = Pool::builder()
        .max_size(10)
        .build(manager)
        .context("Failed to create connection pool")?;

    // Run migrations
    let conn = pool.get().context("Failed to get database connection")?;
    run_migrations(&conn)?;

    info!("Database initialized successfully");
    Ok(pool)
}

pub(crate) fn run_migrations(conn: &Connection) -> Result<()> {
    // Enable foreign keys so subnet deletion cascades to its pool
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .context("Failed to enable foreign keys")?;

    // Run migration files in order
    let migrations = [
        include_str!("../../migrations/001_subnets.sql"),
        include_str!("../../migrations/002_ip_addresses.sql"),
        include_str!("../../migrations/003_customers.sql"),
    ];

    for (i, migration) in migrations.iter().enumerate() {
        info!("Running migration {}", i + 1);
        conn.execute_batch(migration)
            .with_context(|| format!("Failed to run migration {}", i + 1))?;
    }

    Ok(())
}

/// Begin a write-locking transaction on a pooled connection. Taking the
/// write lock up front serializes check-then-write sequences across
/// connections: a racing writer waits, then re-reads committed state.
pub fn write_tx(conn: &Connection) -> std::result::Result<Transaction<'_>, Error> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate).map_err(Into::into)
}

/// Helper for async database operations (spawn_blocking wrapper)
pub async fn execute_async<F, T>(pool: &DbPool, f: F) -> std::result::Result<T, Error>
where
    F: FnOnce(&Connection) -> std::result::Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        f(&conn)
    })
    .await
    .map_err(|e| Error::Storage(format!("task join error: {}", e)))?
}

#[cfg(test)]
pub(crate) fn open_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory database");
    run_migrations(&conn).expect("migrations");
    conn
}
