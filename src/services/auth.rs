//! Authentication service
//!
//! Password hashing and credential checks. Token handling lives in
//! `middleware::auth`; this service only answers "is this password right
//! for this user".

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sqlx::SqlitePool;

use crate::db::ReferenceRepository;
use crate::models::User;

pub struct AuthService;

impl AuthService {
    /// Hash a password with Argon2id and a fresh random salt
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Look up the user and check credentials. Returns `None` for unknown
    /// emails, inactive accounts, and wrong passwords alike.
    pub async fn authenticate(
        pool: &SqlitePool,
        email: &str,
        password: &str,
    ) -> Result<Option<User>> {
        let repo = ReferenceRepository::new(pool);
        let Some(user) = repo.get_user_by_email(email).await? else {
            return Ok(None);
        };
        if !user.active {
            return Ok(None);
        }
        if Self::verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}
