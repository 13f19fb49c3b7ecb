use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::config::settings::MIN_RECORD_CAP;
use crate::retrieval::RecordStore;
use crate::{RagError, Result};


pub mod models;
pub mod queries;

pub use models::{DEFAULT_ROLE, NewUser, User, UserUpdate, validate_user_id};
pub use queries::UserQueries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
    record_cap: u32,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(|e| {
                RagError::StoreUnavailable(format!(
                    "Failed to create database connection pool: {}",
                    e
                ))
            })?;

        let database = Self {
            pool,
            record_cap: MIN_RECORD_CAP,
        };
        database.run_migrations().await?;

        Ok(database)
    }

    /// Cap applied by [`RecordStore::fetch_all_records`]
    #[inline]
    #[must_use]
    pub fn with_record_cap(mut self, record_cap: u32) -> Self {
        self.record_cap = record_cap.max(MIN_RECORD_CAP);
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        new_user.validate()?;
        UserQueries::create(&self.pool, new_user)
            .await
            .map_err(store_error)
    }

    pub async fn get_user(&self, id: &str) -> Result<User> {
        validate_user_id(id)?;
        UserQueries::get_by_id(&self.pool, id.trim())
            .await
            .map_err(store_error)?
            .ok_or_else(|| RagError::NotFound(format!("User {} not found", id)))
    }

    pub async fn list_users(&self, limit: u32) -> Result<Vec<User>> {
        UserQueries::list(&self.pool, limit)
            .await
            .map_err(store_error)
    }

    pub async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User> {
        validate_user_id(id)?;
        update.validate()?;
        UserQueries::update(&self.pool, id.trim(), update)
            .await
            .map_err(store_error)?
            .ok_or_else(|| RagError::NotFound(format!("User {} not found", id)))
    }

    pub async fn delete_user(&self, id: &str) -> Result<()> {
        validate_user_id(id)?;
        let deleted = UserQueries::delete(&self.pool, id.trim())
            .await
            .map_err(store_error)?;

        if deleted {
            info!("Deleted user {}", id);
            Ok(())
        } else {
            Err(RagError::NotFound(format!("User {} not found", id)))
        }
    }

    pub async fn count_users(&self) -> Result<i64> {
        UserQueries::count(&self.pool).await.map_err(store_error)
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn fetch_all_records(&self) -> Result<Vec<User>> {
        let users = self.list_users(self.record_cap).await?;
        debug!("Fetched {} records from SQLite", users.len());
        Ok(users)
    }
}

fn store_error(error: anyhow::Error) -> RagError {
    RagError::StoreUnavailable(format!("{:#}", error))
}
