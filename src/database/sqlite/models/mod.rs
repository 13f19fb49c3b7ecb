#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::{RagError, Result};

/// Role assigned when a record is created without one
pub const DEFAULT_ROLE: &str = "user";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("email pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub bio: Option<String>,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: String,
    pub bio: Option<String>,
}

/// Partial update; only fields that are `Some` are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub bio: Option<String>,
}

impl NewUser {
    #[inline]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role: DEFAULT_ROLE.to_string(),
            bio: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }

    #[inline]
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        validate_role(&self.role)
    }
}

impl UserUpdate {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.role.is_none() && self.bio.is_none()
    }

    #[inline]
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(role) = &self.role {
            validate_role(role)?;
        }
        Ok(())
    }
}

impl User {
    #[inline]
    pub fn bio_or_placeholder(&self) -> &str {
        self.bio.as_deref().unwrap_or("N/A")
    }
}

/// Check that `id` is a well-formed record identifier
#[inline]
pub fn validate_user_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim())
        .map_err(|_| RagError::Validation(format!("Invalid user id: {}", id)))
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RagError::Validation("Name cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    match EMAIL_PATTERN.is_match(email) {
        Ok(true) => Ok(()),
        Ok(false) => Err(RagError::Validation(format!(
            "Invalid email address: {}",
            email
        ))),
        Err(e) => Err(RagError::Validation(format!(
            "Could not validate email address {}: {}",
            email, e
        ))),
    }
}

fn validate_role(role: &str) -> Result<()> {
    if role.trim().is_empty() {
        return Err(RagError::Validation("Role cannot be empty".to_string()));
    }
    Ok(())
}
