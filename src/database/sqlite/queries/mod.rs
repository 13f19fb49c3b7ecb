#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, email, role, bio, created_date, updated_date";

pub struct UserQueries;

impl UserQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_user: NewUser) -> Result<User> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO users (id, name, email, role, bio, created_date, updated_date) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.role)
        .bind(&new_user.bio)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

        debug!("Created user {}", id);

        Self::get_by_id(pool, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created user"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by id")?;

        Ok(user)
    }

    /// Records in creation order, at most `limit` of them
    #[inline]
    pub async fn list(pool: &SqlitePool, limit: u32) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_date ASC, rowid ASC LIMIT ?",
            USER_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

        Ok(users)
    }

    #[inline]
    pub async fn update(pool: &SqlitePool, id: &str, update: UserUpdate) -> Result<Option<User>> {
        if update.is_empty() {
            return Self::get_by_id(pool, id).await;
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE users SET ");
        let mut fields = builder.separated(", ");

        if let Some(name) = update.name {
            fields.push("name = ").push_bind_unseparated(name);
        }
        if let Some(email) = update.email {
            fields.push("email = ").push_bind_unseparated(email);
        }
        if let Some(role) = update.role {
            fields.push("role = ").push_bind_unseparated(role);
        }
        if let Some(bio) = update.bio {
            fields.push("bio = ").push_bind_unseparated(bio);
        }
        fields
            .push("updated_date = ")
            .push_bind_unseparated(Utc::now().naive_utc());

        builder.push(" WHERE id = ").push_bind(id.to_string());

        let rows_affected = builder
            .build()
            .execute(pool)
            .await
            .context("Failed to update user")?
            .rows_affected();

        if rows_affected == 0 {
            return Ok(None);
        }

        Self::get_by_id(pool, id).await
    }

    /// Returns `true` when a row was removed
    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let rows_affected = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete user")?
            .rows_affected();

        Ok(rows_affected == 1)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
            .context("Failed to count users")?;

        Ok(count)
    }
}
