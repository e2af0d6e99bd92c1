//! Instances repository

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use srcadmin_core::{Error, Instance, InstanceStatus, Result};
use std::path::PathBuf;
use uuid::Uuid;

/// Repository for instance rows
pub struct InstancesRepository {
    pool: SqlitePool,
}

impl InstancesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an instance, assigning a fresh id when the given one is nil.
    /// Returns the row id.
    pub async fn insert(&self, inst: &Instance) -> Result<Uuid> {
        let id = if inst.id.is_nil() {
            Uuid::new_v4()
        } else {
            inst.id
        };

        sqlx::query(
            r#"
            INSERT INTO instances
                (id, name, install_path, port, max_players, game_mode, current_map,
                 launch_args, rcon_password, auto_restart, auto_start, status,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&inst.name)
        .bind(inst.install_path.to_string_lossy().to_string())
        .bind(inst.port as i64)
        .bind(inst.max_players as i64)
        .bind(&inst.game_mode)
        .bind(&inst.current_map)
        .bind(&inst.launch_args)
        .bind(&inst.rcon_password)
        .bind(inst.auto_restart)
        .bind(inst.auto_start)
        .bind(inst.status.as_str())
        .bind(inst.created_at)
        .bind(inst.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Instance>> {
        let row = sqlx::query("SELECT * FROM instances WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        row.map(|r| row_to_instance(&r)).transpose()
    }

    /// Stored status only, without materializing the whole row.
    pub async fn get_status(&self, id: Uuid) -> Result<Option<InstanceStatus>> {
        let row = sqlx::query("SELECT status FROM instances WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        match row {
            Some(r) => {
                let status: String = r.get("status");
                Ok(Some(status.parse()?))
            }
            None => Ok(None),
        }
    }

    pub async fn list_all(&self) -> Result<Vec<Instance>> {
        let rows = sqlx::query("SELECT * FROM instances ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        rows.iter().map(row_to_instance).collect()
    }

    pub async fn list_auto_start(&self) -> Result<Vec<Instance>> {
        let rows = sqlx::query("SELECT * FROM instances WHERE auto_start = 1 ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        rows.iter().map(row_to_instance).collect()
    }

    pub async fn update(&self, inst: &Instance) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE instances SET
                name = ?, install_path = ?, port = ?, max_players = ?, game_mode = ?,
                current_map = ?, launch_args = ?, rcon_password = ?, auto_restart = ?,
                auto_start = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&inst.name)
        .bind(inst.install_path.to_string_lossy().to_string())
        .bind(inst.port as i64)
        .bind(inst.max_players as i64)
        .bind(&inst.game_mode)
        .bind(&inst.current_map)
        .bind(&inst.launch_args)
        .bind(&inst.rcon_password)
        .bind(inst.auto_restart)
        .bind(inst.auto_start)
        .bind(inst.status.as_str())
        .bind(Utc::now())
        .bind(inst.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        Ok(())
    }

    /// Status write-through from the manager.
    pub async fn update_status(&self, id: Uuid, status: InstanceStatus) -> Result<()> {
        sqlx::query("UPDATE instances SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM instances WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        Ok(())
    }
}

fn row_to_instance(row: &SqliteRow) -> Result<Instance> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let install_path: String = row.get("install_path");

    Ok(Instance {
        id: Uuid::parse_str(&id).map_err(|e| Error::Db(e.to_string()))?,
        name: row.get("name"),
        install_path: PathBuf::from(install_path),
        port: row.get::<i64, _>("port") as u16,
        max_players: row.get::<i64, _>("max_players") as u32,
        game_mode: row.get("game_mode"),
        current_map: row.get("current_map"),
        launch_args: row.get("launch_args"),
        rcon_password: row.get("rcon_password"),
        auto_restart: row.get("auto_restart"),
        auto_start: row.get("auto_start"),
        status: status.parse()?,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}
