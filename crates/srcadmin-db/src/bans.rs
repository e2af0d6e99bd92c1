//! Ban-list repository

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use srcadmin_core::{BanEntry, Error, Result};
use uuid::Uuid;

/// Repository for the instance-scoped ban list
pub struct BansRepository {
    pool: SqlitePool,
}

impl BansRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a ban, assigning a fresh id when the given one is nil.
    pub async fn insert(&self, ban: &BanEntry) -> Result<Uuid> {
        let id = if ban.id.is_nil() { Uuid::new_v4() } else { ban.id };

        sqlx::query(
            r#"
            INSERT INTO bans
                (id, instance_id, steam_id, ip_address, reason,
                 expires_at, is_permanent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(ban.instance_id.to_string())
        .bind(&ban.steam_id)
        .bind(&ban.ip_address)
        .bind(&ban.reason)
        .bind(ban.expires_at)
        .bind(ban.is_permanent)
        .bind(ban.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        Ok(id)
    }

    pub async fn list_by_instance(&self, instance_id: Uuid) -> Result<Vec<BanEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM bans WHERE instance_id = ? ORDER BY created_at DESC",
        )
        .bind(instance_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Db(e.to_string()))?;

        rows.iter().map(row_to_ban).collect()
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM bans WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        Ok(())
    }
}

fn row_to_ban(row: &SqliteRow) -> Result<BanEntry> {
    let id: String = row.get("id");
    let instance_id: String = row.get("instance_id");

    Ok(BanEntry {
        id: Uuid::parse_str(&id).map_err(|e| Error::Db(e.to_string()))?,
        instance_id: Uuid::parse_str(&instance_id).map_err(|e| Error::Db(e.to_string()))?,
        steam_id: row.get("steam_id"),
        ip_address: row.get("ip_address"),
        reason: row.get("reason"),
        expires_at: row.get::<Option<DateTime<Utc>>, _>("expires_at"),
        is_permanent: row.get("is_permanent"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use crate::testutil::{insert_instance, open_db};
    use chrono::Utc;
    use srcadmin_core::BanEntry;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_insert_list_delete() {
        let (db, _dir) = open_db().await;
        let instance_id = insert_instance(&db).await;

        let ban = BanEntry {
            id: Uuid::nil(),
            instance_id,
            steam_id: "STEAM_1:0:12345".to_string(),
            ip_address: "203.0.113.7".to_string(),
            reason: "griefing".to_string(),
            expires_at: None,
            is_permanent: true,
            created_at: Utc::now(),
        };

        let id = db.bans().insert(&ban).await.unwrap();

        let bans = db.bans().list_by_instance(instance_id).await.unwrap();
        assert_eq!(bans.len(), 1);
        assert!(bans[0].is_permanent);
        assert!(bans[0].expires_at.is_none());

        db.bans().delete(id).await.unwrap();
        assert!(db.bans().list_by_instance(instance_id).await.unwrap().is_empty());
    }
}
