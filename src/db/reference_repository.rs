//! Reference data repository
//!
//! Users and schools are consumed here only as the actor source for login
//! and the join targets for the backfill pass.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::parse_db_timestamp;
use crate::models::{School, User};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    school_id: String,
    email: String,
    full_name: String,
    role: String,
    password_hash: String,
    active: i64,
    created_at: String,
}

pub struct ReferenceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReferenceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, school_id, email, full_name, role, password_hash, active, created_at \
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch user by email")?;

        Ok(row.map(row_to_user))
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, school_id, email, full_name, role, password_hash, active, created_at \
             FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch user by id")?;

        Ok(row.map(row_to_user))
    }

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, school_id, email, full_name, role, password_hash, active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(user.school_id.to_string())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.role)
        .bind(&user.password_hash)
        .bind(user.active as i64)
        .bind(user.created_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to insert user")?;

        Ok(())
    }

    pub async fn insert_school(&self, school: &School) -> Result<()> {
        sqlx::query(
            "INSERT INTO schools (id, name, phone, address, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(school.id.to_string())
        .bind(&school.name)
        .bind(school.phone.as_deref())
        .bind(school.address.as_deref())
        .bind(school.created_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to insert school")?;

        Ok(())
    }

    pub async fn get_school(&self, id: Uuid) -> Result<Option<School>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, String)>(
            "SELECT id, name, phone, address, created_at FROM schools WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch school")?;

        Ok(row.map(|(id, name, phone, address, created_at)| School {
            id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
            name,
            phone,
            address,
            created_at: parse_db_timestamp(&created_at),
        }))
    }
}

fn row_to_user(row: UserRow) -> User {
    User {
        id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::nil()),
        school_id: Uuid::parse_str(&row.school_id).unwrap_or_else(|_| Uuid::nil()),
        email: row.email,
        full_name: row.full_name,
        role: row.role,
        password_hash: row.password_hash,
        active: row.active != 0,
        created_at: parse_db_timestamp(&row.created_at),
    }
}
