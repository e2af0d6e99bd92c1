//! Benchmark-aggregates repository

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use srcadmin_core::{BenchmarkResult, Error, Result};
use uuid::Uuid;

/// Repository for benchmark aggregates
pub struct BenchmarksRepository {
    pool: SqlitePool,
}

impl BenchmarksRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an aggregate, assigning a fresh id when the given one is nil.
    pub async fn insert(&self, result: &BenchmarkResult) -> Result<Uuid> {
        let id = if result.id.is_nil() {
            Uuid::new_v4()
        } else {
            result.id
        };

        sqlx::query(
            r#"
            INSERT INTO benchmarks
                (id, instance_id, bot_count, avg_tickrate, min_tickrate,
                 avg_frametime, cpu_usage, ram_usage, duration_sec, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(result.instance_id.to_string())
        .bind(result.bot_count as i64)
        .bind(result.avg_tickrate)
        .bind(result.min_tickrate)
        .bind(result.avg_frametime)
        .bind(result.cpu_usage)
        .bind(result.ram_usage)
        .bind(result.duration_sec as i64)
        .bind(result.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        Ok(id)
    }

    pub async fn list_by_instance(&self, instance_id: Uuid) -> Result<Vec<BenchmarkResult>> {
        let rows = sqlx::query(
            "SELECT * FROM benchmarks WHERE instance_id = ? ORDER BY created_at DESC",
        )
        .bind(instance_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        rows.iter().map(row_to_result).collect()
    }
}

fn row_to_result(row: &SqliteRow) -> Result<BenchmarkResult> {
    let id: String = row.get("id");
    let instance_id: String = row.get("instance_id");

    Ok(BenchmarkResult {
        id: Uuid::parse_str(&id).map_err(|e| Error::Db(e.to_string()))?,
        instance_id: Uuid::parse_str(&instance_id).map_err(|e| Error::Db(e.to_string()))?,
        bot_count: row.get::<i64, _>("bot_count") as u32,
        avg_tickrate: row.get("avg_tickrate"),
        min_tickrate: row.get("min_tickrate"),
        avg_frametime: row.get("avg_frametime"),
        cpu_usage: row.get("cpu_usage"),
        ram_usage: row.get("ram_usage"),
        duration_sec: row.get::<i64, _>("duration_sec") as u32,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use crate::testutil::{insert_instance, open_db};
    use chrono::Utc;
    use srcadmin_core::BenchmarkResult;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_insert_and_list() {
        let (db, _dir) = open_db().await;
        let instance_id = insert_instance(&db).await;

        let result = BenchmarkResult {
            id: Uuid::nil(),
            instance_id,
            bot_count: 10,
            avg_tickrate: 63.4,
            min_tickrate: 58.0,
            avg_frametime: 0.0,
            cpu_usage: 42.0,
            ram_usage: 3072.0,
            duration_sec: 10,
            created_at: Utc::now(),
        };

        let id = db.benchmarks().insert(&result).await.unwrap();
        assert!(!id.is_nil());

        let results = db.benchmarks().list_by_instance(instance_id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].bot_count, 10);
        assert_eq!(results[0].avg_frametime, 0.0);
    }
}
