//! Samples repository - the append-only telemetry time series

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use srcadmin_core::{Error, Result, Sample};
use uuid::Uuid;

/// Repository for telemetry samples
pub struct SamplesRepository {
    pool: SqlitePool,
}

impl SamplesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one sample row. The `id` field of the input is ignored.
    pub async fn insert(&self, sample: &Sample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO samples
                (instance_id, timestamp, cpu_percent, ram_mb, tick_rate,
                 players, net_in_kbps, net_out_kbps)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.instance_id.to_string())
        .bind(sample.timestamp)
        .bind(sample.cpu_percent)
        .bind(sample.ram_mb)
        .bind(sample.tick_rate)
        .bind(sample.players)
        .bind(sample.net_in_kbps)
        .bind(sample.net_out_kbps)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        Ok(())
    }

    /// Samples for `instance_id` with `timestamp >= since`, ascending.
    pub async fn history(
        &self,
        instance_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Sample>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM samples
            WHERE instance_id = ? AND timestamp >= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(instance_id.to_string())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        rows.iter().map(row_to_sample).collect()
    }

    /// Trim the series, keeping the newest `keep_per_instance` rows per instance.
    pub async fn cleanup(&self, keep_per_instance: usize) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM samples
            WHERE id NOT IN (
                SELECT id FROM (
                    SELECT id, ROW_NUMBER() OVER (PARTITION BY instance_id ORDER BY id DESC) as rn
                    FROM samples
                ) WHERE rn <= ?
            )
            "#,
        )
        .bind(keep_per_instance as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

fn row_to_sample(row: &SqliteRow) -> Result<Sample> {
    let instance_id: String = row.get("instance_id");

    Ok(Sample {
        id: row.get("id"),
        instance_id: Uuid::parse_str(&instance_id).map_err(|e| Error::Db(e.to_string()))?,
        timestamp: row.get::<DateTime<Utc>, _>("timestamp"),
        cpu_percent: row.get("cpu_percent"),
        ram_mb: row.get("ram_mb"),
        tick_rate: row.get("tick_rate"),
        players: row.get("players"),
        net_in_kbps: row.get("net_in_kbps"),
        net_out_kbps: row.get("net_out_kbps"),
    })
}
