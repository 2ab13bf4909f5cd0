//! Database repository for alert state persistence.
//!
//! All SQLite read/write logic for [`AlertRecord`] rows lives here. Each
//! write runs in its own transaction, so a crash leaves either the old
//! record set or the new one, never a mix. The [`AlertStateStore`]
//! calls [`AlertRepository::load_all`] on startup and
//! [`AlertRepository::replace`] after every delivered alert.
//!
//! [`AlertStateStore`]: crate::alerts::state::AlertStateStore

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::alerts::fingerprint::Fingerprint;

/// Dedup state for one alerted episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub fingerprint: Fingerprint,
    pub first_sent_ts: DateTime<Utc>,
    pub last_sent_ts: DateTime<Utc>,
    pub send_count: u32,
}

/// Repository for reading and writing alert records to SQLite.
#[derive(Clone)]
pub struct AlertRepository {
    pool: SqlitePool,
}

/// Fixed-width RFC 3339, so string comparison in SQL orders by time.
fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_db_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn record_from_row(row: &SqliteRow) -> Option<AlertRecord> {
    let start_bucket: i64 = row.try_get("start_bucket").ok()?;
    let end_bucket: i64 = row.try_get("end_bucket").ok()?;
    let first_sent: String = row.try_get("first_sent_ts").ok()?;
    let last_sent: String = row.try_get("last_sent_ts").ok()?;
    let send_count: i64 = row.try_get("send_count").ok()?;

    Some(AlertRecord {
        fingerprint: Fingerprint {
            start_bucket,
            end_bucket,
        },
        first_sent_ts: parse_db_timestamp(&first_sent)?,
        last_sent_ts: parse_db_timestamp(&last_sent)?,
        send_count: u32::try_from(send_count).ok()?,
    })
}

/// Decode rows, skipping any that no longer parse. A skipped row is dedup
/// state lost, so each one is logged.
fn records_from_rows(rows: Vec<SqliteRow>) -> Vec<AlertRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        match record_from_row(row) {
            Some(record) => records.push(record),
            None => {
                let key: String = row.try_get("fingerprint").unwrap_or_default();
                tracing::warn!("Skipping unreadable alert record '{}'", key);
            }
        }
    }
    records
}

impl AlertRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every stored record, oldest alert first.
    pub async fn load_all(&self) -> Result<Vec<AlertRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT fingerprint, start_bucket, end_bucket, first_sent_ts, last_sent_ts, send_count
             FROM alert_records
             ORDER BY last_sent_ts ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records_from_rows(rows))
    }

    /// Delete `superseded` fingerprints and upsert `record`, in one transaction.
    pub async fn replace(
        &self,
        superseded: &[Fingerprint],
        record: &AlertRecord,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for fingerprint in superseded {
            if *fingerprint == record.fingerprint {
                continue;
            }
            sqlx::query("DELETE FROM alert_records WHERE fingerprint = ?")
                .bind(fingerprint.key())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO alert_records
             (fingerprint, start_bucket, end_bucket, first_sent_ts, last_sent_ts, send_count)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(fingerprint) DO UPDATE SET
                last_sent_ts = excluded.last_sent_ts,
                send_count = excluded.send_count",
        )
        .bind(record.fingerprint.key())
        .bind(record.fingerprint.start_bucket)
        .bind(record.fingerprint.end_bucket)
        .bind(to_db_timestamp(record.first_sent_ts))
        .bind(to_db_timestamp(record.last_sent_ts))
        .bind(i64::from(record.send_count))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete records whose last alert is older than `cutoff`.
    /// Returns the number of rows deleted.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM alert_records WHERE last_sent_ts < ?")
            .bind(to_db_timestamp(cutoff))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Most recently alerted records first. `limit` is clamped to 100.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<AlertRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT fingerprint, start_bucket, end_bucket, first_sent_ts, last_sent_ts, send_count
             FROM alert_records
             ORDER BY last_sent_ts DESC
             LIMIT ?",
        )
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await?;

        Ok(records_from_rows(rows))
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM alert_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("cnt").unwrap_or(0))
    }
}
