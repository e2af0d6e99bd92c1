//! Scheduled-tasks repository

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use srcadmin_core::{Error, Result, Task};
use uuid::Uuid;

/// Repository for scheduled tasks
pub struct TasksRepository {
    pool: SqlitePool,
}

impl TasksRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a task, assigning a fresh id when the given one is nil.
    pub async fn insert(&self, task: &Task) -> Result<Uuid> {
        let id = if task.id.is_nil() {
            Uuid::new_v4()
        } else {
            task.id
        };

        sqlx::query(
            r#"
            INSERT INTO tasks
                (id, instance_id, cron_expr, action, payload, enabled,
                 last_run, next_run, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(task.instance_id.to_string())
        .bind(&task.cron_expr)
        .bind(task.action.as_str())
        .bind(&task.payload)
        .bind(task.enabled)
        .bind(task.last_run)
        .bind(task.next_run)
        .bind(task.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        row.map(|r| row_to_task(&r)).transpose()
    }

    pub async fn list_enabled(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE enabled = 1")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        rows.iter().map(row_to_task).collect()
    }

    pub async fn list_by_instance(&self, instance_id: Uuid) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE instance_id = ? ORDER BY created_at DESC",
        )
        .bind(instance_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        rows.iter().map(row_to_task).collect()
    }

    /// Record a dispatch: last-run and the freshly computed next-run.
    pub async fn update_run_times(
        &self,
        id: Uuid,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE tasks SET last_run = ?, next_run = ? WHERE id = ?")
            .bind(last_run)
            .bind(next_run)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        Ok(())
    }
}

fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let id: String = row.get("id");
    let instance_id: String = row.get("instance_id");
    let action: String = row.get("action");

    Ok(Task {
        id: Uuid::parse_str(&id).map_err(|e| Error::Db(e.to_string()))?,
        instance_id: Uuid::parse_str(&instance_id).map_err(|e| Error::Db(e.to_string()))?,
        cron_expr: row.get("cron_expr"),
        action: action.parse()?,
        payload: row.get("payload"),
        enabled: row.get("enabled"),
        last_run: row.get::<Option<DateTime<Utc>>, _>("last_run"),
        next_run: row.get::<Option<DateTime<Utc>>, _>("next_run"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}
