//! SQLite pool setup for the alert state database.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};

const CREATE_ALERT_RECORDS: &str = "CREATE TABLE IF NOT EXISTS alert_records (
    fingerprint   TEXT PRIMARY KEY NOT NULL,
    start_bucket  INTEGER NOT NULL,
    end_bucket    INTEGER NOT NULL,
    first_sent_ts TEXT NOT NULL,
    last_sent_ts  TEXT NOT NULL,
    send_count    INTEGER NOT NULL
)";

const CREATE_LAST_SENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_alert_records_last_sent ON alert_records (last_sent_ts)";

/// Open (creating if needed) the state database and ensure the schema exists.
///
/// The pool holds a single long-lived connection: one poll loop owns the
/// state, and `sqlite::memory:` databases only live as long as their
/// connection.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .synchronous(SqliteSynchronous::Full);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::query(CREATE_ALERT_RECORDS).execute(&pool).await?;
    sqlx::query(CREATE_LAST_SENT_INDEX).execute(&pool).await?;

    Ok(pool)
}
