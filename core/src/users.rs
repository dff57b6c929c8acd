//! User accounts and password handling.
//!
//! Passwords are stored as argon2 PHC strings. Hashing is CPU-bound; async
//! callers should run [`hash_password`] and [`verify_password`] on a blocking
//! thread.

use crate::error::{DomainError, Result};
use crate::ids::UserId;
use crate::BoxFuture;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shortest accepted password, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Access level carried by a user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular shopper
    #[default]
    Customer,
    /// Shop operator
    Admin,
}

impl Role {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }

    /// Whether this role may use admin endpoints.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::validation(format!("Unknown role: {other}"))),
        }
    }
}

/// Public user profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    /// User identifier
    pub id: UserId,
    /// Normalized email
    pub email: String,
    /// Display name
    pub name: String,
    /// Access level
    pub role: Role,
    /// Store credit
    pub wallet_balance_cents: i64,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Clone, Deserialize)]
pub struct Registration {
    /// Email address
    pub email: String,
    /// Display name
    pub name: String,
    /// Plaintext password
    pub password: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Registration {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] for a malformed email, blank name
    /// or short password.
    pub fn validate(mut self) -> Result<Self> {
        self.email = normalize_email(&self.email)?;
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(DomainError::validation("Name must not be empty"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(DomainError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        Ok(self)
    }
}

/// Trim, lower-case and sanity-check an email address.
///
/// # Errors
///
/// Returns [`DomainError::Validation`] when the address is not of the form
/// `local@domain.tld`.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.contains('@')
            && domain
                .split_once('.')
                .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
            && !domain.ends_with('.')
            && !email.chars().any(char::is_whitespace)
    });
    if valid {
        Ok(email)
    } else {
        Err(DomainError::validation("Email address is invalid"))
    }
}

/// Hash a password into an argon2 PHC string.
///
/// # Errors
///
/// Returns [`DomainError::Database`] if the hasher fails, which only happens
/// on misconfigured parameters.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DomainError::database(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC string.
///
/// A malformed stored hash is treated as a mismatch.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// A stored user with its password hash, used only for login.
#[derive(Clone)]
pub struct StoredCredentials {
    /// Profile
    pub user: User,
    /// argon2 PHC string
    pub password_hash: String,
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// User storage.
pub trait UserRepository: Send + Sync {
    /// Insert a user with an already-hashed password.
    ///
    /// # Errors
    ///
    /// - `Conflict`: email already registered
    /// - `Database`: storage failure
    fn create_user(
        &self,
        email: String,
        name: String,
        password_hash: String,
    ) -> BoxFuture<'_, Result<User>>;

    /// Look up credentials by normalized email.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn find_credentials(&self, email: String)
    -> BoxFuture<'_, Result<Option<StoredCredentials>>>;

    /// Fetch a profile.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such user
    /// - `Database`: storage failure
    fn get_user(&self, id: UserId) -> BoxFuture<'_, Result<User>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(email: &str, name: &str, password: &str) -> Registration {
        Registration {
            email: email.to_string(),
            name: name.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn email_is_normalized() {
        assert_eq!(
            normalize_email("  Jane.Doe@Example.COM "),
            Ok("jane.doe@example.com".to_string())
        );
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for email in ["", "jane", "@example.com", "jane@", "jane@example", "a b@c.d", "a@b@c.d"] {
            assert!(normalize_email(email).is_err(), "{email} should be rejected");
        }
    }

    #[test]
    fn registration_rules() {
        assert!(registration("a@b.co", "Ann", "longenough").validate().is_ok());
        assert!(registration("a@b.co", "  ", "longenough").validate().is_err());
        assert!(registration("a@b.co", "Ann", "short").validate().is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse");
        assert!(hash.is_ok());
        let hash = hash.unwrap_or_default();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn registration_debug_redacts_password() {
        let debug = format!("{:?}", registration("a@b.co", "Ann", "hunter2hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("root".parse::<Role>().is_err());
    }
}
