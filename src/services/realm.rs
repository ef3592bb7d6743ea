use std::collections::HashMap;
use std::path::Path;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{AppError, Result};
use crate::models::principal::Principal;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;

/// The message shown for any failed sign in, whatever the cause.
pub const SIGN_IN_FAILED: &str =
    "Either the user name was not recognized or the password did not match. Please try again.";

/// A user entry of the realm file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmUser {
    /// The user name, typically an email address.
    pub username: String,
    /// The Argon2 PHC hash of the password.
    pub password_hash: String,
    /// The container roles (groups) of the user.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Whether the user may sign in.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// The container's user realm: a JSON list of [`RealmUser`]s.
#[derive(Debug, Clone, Default)]
pub struct FileRealm {
    users: HashMap<String, RealmUser>,
}

impl FileRealm {
    /// Creates a realm from a list of users.
    pub fn from_users(users: Vec<RealmUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|user| (user.username.clone(), user))
                .collect(),
        }
    }

    /// Loads the realm from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::Internal(format!("Cannot read realm file {}: {}", path.display(), e))
        })?;
        let users: Vec<RealmUser> = sonic_rs::from_slice(&bytes).map_err(|e| {
            AppError::Internal(format!("Invalid realm file {}: {}", path.display(), e))
        })?;

        tracing::info!("✅ Realm loaded with {} users", users.len());
        Ok(Self::from_users(users))
    }

    /// The number of users in the realm.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Checks a user name and password against the realm.
    ///
    /// # Errors
    ///
    /// `AppError::Authentication` when the user is unknown, inactive or the
    /// password does not match.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Principal> {
        tracing::debug!("🔐 Authenticating user: {}", username);

        let user = self
            .users
            .get(username)
            .filter(|user| user.is_active)
            .ok_or_else(|| AppError::Authentication(SIGN_IN_FAILED.to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Authentication(SIGN_IN_FAILED.to_string()));
        }

        tracing::info!("✅ User authenticated: {}", username);
        Ok(Principal::new(user.username.clone(), user.roles.iter().cloned()))
    }
}

/// Hashes a password using Argon2id.
///
/// # Arguments
///
/// * `password` - The password to hash.
///
/// # Returns
///
/// A `Result` containing the PHC hash string.
pub fn hash_password(password: &str) -> Result<String> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    tracing::debug!("Password hashed successfully with Argon2");
    Ok(password_hash)
}

/// Verifies a password against a PHC hash. The hash carries its own parameters.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let mut password_bytes = password.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;
    let result = Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok();

    password_bytes.zeroize();
    Ok(result)
}
