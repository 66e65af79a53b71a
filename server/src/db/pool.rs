use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use tracing::{error, info};

use crate::error::StoreError;

/// Create a SQLite connection pool with WAL mode.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
    let connect = async {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok::<_, sqlx::Error>(pool)
    };

    match connect.await {
        Ok(pool) => {
            info!("database connected: {}", database_url);
            Ok(pool)
        }
        Err(source) => {
            error!(%database_url, error = %source, "database connection failed");
            Err(StoreError::Connection {
                url: database_url.to_string(),
                source,
            })
        }
    }
}

/// Close the pool, waiting for checked-out connections to be returned.
pub async fn close(pool: &SqlitePool) {
    pool.close().await;
    info!("database connection closed");
}
