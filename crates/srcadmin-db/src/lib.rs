//! srcadmin persistence - SQLite store
//!
//! One `Database` handle wraps a small connection pool; per-table
//! repositories expose the operations the supervision core needs. Uuids are
//! stored as TEXT, timestamps as RFC 3339 TEXT via sqlx's chrono support.

pub mod bans;
pub mod benchmarks;
pub mod instances;
pub mod samples;
pub mod schema;
pub mod tasks;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use srcadmin_core::{Error, Result};
use std::path::Path;
use tracing::info;

pub use bans::BansRepository;
pub use benchmarks::BenchmarksRepository;
pub use instances::InstancesRepository;
pub use samples::SamplesRepository;
pub use tasks::TasksRepository;

/// Database connection and operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `path` and apply the schema.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Db(e.to_string()))?;
        }

        info!("opening database at {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        // Database holds the admin secrets; owner-only on unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
                tracing::warn!("failed to set database file permissions: {}", e);
            }
        }

        sqlx::query(schema::SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::Db(e.to_string()))?;

        info!("database initialized");
        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn instances(&self) -> InstancesRepository {
        InstancesRepository::new(self.pool.clone())
    }

    pub fn tasks(&self) -> TasksRepository {
        TasksRepository::new(self.pool.clone())
    }

    pub fn samples(&self) -> SamplesRepository {
        SamplesRepository::new(self.pool.clone())
    }

    pub fn benchmarks(&self) -> BenchmarksRepository {
        BenchmarksRepository::new(self.pool.clone())
    }

    pub fn bans(&self) -> BansRepository {
        BansRepository::new(self.pool.clone())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::Database;
    use srcadmin_core::Instance;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use uuid::Uuid;

    // Return TempDir to keep it alive during the test
    pub async fn open_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        (db, dir)
    }

    pub async fn insert_instance(db: &Database) -> Uuid {
        let inst = Instance::new("test-server", PathBuf::from("/srv/test"), 27015);
        db.instances().insert(&inst).await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::open_db;

    #[tokio::test]
    async fn test_database_creation() {
        let (db, dir) = open_db().await;
        assert!(dir.path().join("test.db").exists());
        db.close().await;
    }
}
