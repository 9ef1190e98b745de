//! Users and the trust/earnings ledger fields.
//!
//! `trusted`, `completed_count`, and `earnings` are only ever mutated by the
//! ledger's credit operation (`crate::ledger`), never directly by API
//! handlers.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::Store;
use crate::error::{CoreError, CoreResult, ParseEnumError};

/// Functional role of a user. Managers and admins may resolve disputes;
/// roles are an explicit attribute, never inferred from a display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Worker,
    Poster,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::Poster => "poster",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    /// True for roles allowed to work the manager queue.
    pub fn is_manager(&self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" => Ok(Role::Worker),
            "poster" => Ok(Role::Poster),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub lga: String,
    pub neighbourhood: String,
    pub trusted: bool,
    pub completed_count: i64,
    /// Lifetime earnings in kobo.
    pub earnings: i64,
    pub created_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    #[serde(default)]
    pub lga: String,
    #[serde(default)]
    pub neighbourhood: String,
}

/// Wallet summary for a user.
#[derive(Debug, Serialize)]
pub struct Wallet {
    /// Lifetime earnings in kobo.
    pub balance: i64,
    pub completed_count: i64,
    pub trusted: bool,
    /// Tasks this user completed that still await poster confirmation.
    pub pending_confirmations: i64,
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get("role")?;
    let role = role_str.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        role,
        lga: row.get("lga")?,
        neighbourhood: row.get("neighbourhood")?,
        trusted: row.get("trusted")?,
        completed_count: row.get("completed_count")?,
        earnings: row.get("earnings")?,
        created_at: row.get("created_at")?,
    })
}

const SELECT_USER: &str = r#"
    SELECT id, name, email, phone, role, lga, neighbourhood,
           trusted, completed_count, earnings, created_at
    FROM users
"#;

impl Store {
    /// Register a new user. Email and phone are globally unique.
    pub async fn create_user(&self, new: NewUser) -> CoreResult<User> {
        if new.name.trim().is_empty() {
            return Err(CoreError::Validation("Name is required".to_string()));
        }
        if new.email.trim().is_empty() || new.phone.trim().is_empty() {
            return Err(CoreError::Validation(
                "Email and phone are required".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            email: new.email.trim().to_lowercase(),
            phone: new.phone.trim().to_string(),
            role: new.role,
            lga: new.lga,
            neighbourhood: new.neighbourhood,
            trusted: false,
            completed_count: 0,
            earnings: 0,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            r#"
            INSERT INTO users (id, name, email, phone, role, lga, neighbourhood,
                               trusted, completed_count, earnings, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, 0, ?8)
            "#,
            params![
                user.id,
                user.name,
                user.email,
                user.phone,
                user.role.as_str(),
                user.lga,
                user.neighbourhood,
                user.created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(CoreError::Conflict(
                    "Email or phone already registered".to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn user_by_id(&self, id: &str) -> CoreResult<User> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("{SELECT_USER} WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound("User".to_string()))
    }

    pub async fn user_by_email(&self, email: &str) -> CoreResult<User> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("{SELECT_USER} WHERE email = ?1"),
            params![email.trim().to_lowercase()],
            user_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound("User".to_string()))
    }

    /// All users holding a role. Used to fan dispute notifications out to
    /// the manager queue.
    pub async fn users_by_role(&self, role: Role) -> CoreResult<Vec<User>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("{SELECT_USER} WHERE role = ?1"))?;
        let users = stmt
            .query_map(params![role.as_str()], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub async fn wallet(&self, user_id: &str) -> CoreResult<Wallet> {
        let conn = self.conn.lock().await;
        let wallet = conn
            .query_row(
                r#"
                SELECT earnings, completed_count, trusted,
                       (SELECT COUNT(*) FROM tasks
                        WHERE worker_id = ?1 AND status = 'completed') AS pending
                FROM users WHERE id = ?1
                "#,
                params![user_id],
                |row| {
                    Ok(Wallet {
                        balance: row.get(0)?,
                        completed_count: row.get(1)?,
                        trusted: row.get(2)?,
                        pending_confirmations: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| CoreError::NotFound("User".to_string()))?;
        Ok(wallet)
    }
}
