use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::cipher::CipherSuite;
use crate::error::{AppError, Result};
use crate::models::identifier::{RecordKey, SessionIdentifier};

/// The role granted to the record fabricated when the directory is down.
pub const API_ROLE: &str = "API";

/// The directory's historical record lifetime: `i32::MAX` milliseconds (~24.8 days).
pub fn default_max_age() -> Duration {
    Duration::milliseconds(i64::from(i32::MAX))
}

/// A single sign-on session as held by the session directory.
///
/// ⚠️ `encrypted_secret` is the password ENCRYPTED under the key derived from
/// the session identifier. Use [`SessionRecord::password`] to read it.
///
/// API sessions are keyed by their consumer key instead and carry no password.
///
/// Two records are equal when they belong to the same principal, whatever
/// their identifiers.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSessionRecord")]
pub struct SessionRecord {
    #[serde(rename = "uuid")]
    key: RecordKey,
    #[serde(rename = "userName")]
    principal_name: String,
    #[serde(rename = "password", skip_serializing_if = "Option::is_none")]
    encrypted_secret: Option<String>,
    #[serde(rename = "remoteAddr", skip_serializing_if = "Option::is_none")]
    remote_address: Option<String>,
    #[serde(rename = "groups")]
    roles: BTreeSet<String>,
    #[serde(rename = "dateExpiration", skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// The record as it arrives over the wire, before its invariants are checked.
#[derive(Deserialize)]
struct RawSessionRecord {
    uuid: RecordKey,
    #[serde(rename = "userName")]
    user_name: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(rename = "remoteAddr", default)]
    remote_addr: Option<String>,
    #[serde(default)]
    groups: Option<Vec<String>>,
    #[serde(rename = "dateExpiration", default)]
    date_expiration: Option<DateTime<Utc>>,
}

impl TryFrom<RawSessionRecord> for SessionRecord {
    type Error = String;

    fn try_from(raw: RawSessionRecord) -> std::result::Result<Self, Self::Error> {
        let principal_name = raw
            .user_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| "session record without userName".to_string())?;

        if raw.uuid.as_str().trim().is_empty() {
            return Err("session record without uuid".to_string());
        }

        let mut record = SessionRecord {
            key: raw.uuid,
            principal_name,
            encrypted_secret: raw.password.filter(|p| !p.is_empty()),
            remote_address: raw.remote_addr,
            roles: BTreeSet::new(),
            expires_at: raw.date_expiration,
        };
        for role in raw.groups.unwrap_or_default() {
            record.add_group(&role);
        }
        Ok(record)
    }
}

impl SessionRecord {
    /// Creates a session for `principal_name` with a fresh identifier.
    ///
    /// The password, when given, is encrypted immediately under the key
    /// derived from the new identifier. The record expires `max_age` from now.
    pub fn new(
        principal_name: &str,
        password: Option<&str>,
        suite: &CipherSuite,
        max_age: Duration,
    ) -> Result<Self> {
        if principal_name.trim().is_empty() {
            return Err(AppError::Validation(
                "Principal name cannot be empty".to_string(),
            ));
        }

        let expires_at = Utc::now().checked_add_signed(max_age).ok_or_else(|| {
            AppError::Validation("Session max age is out of range".to_string())
        })?;

        let identifier = SessionIdentifier::generate();
        let encrypted_secret = match password {
            Some(password) => Some(suite.encrypt(identifier.key_seed(), password)?),
            None => None,
        };

        Ok(Self {
            key: RecordKey::Session(identifier),
            principal_name: principal_name.to_string(),
            encrypted_secret,
            remote_address: None,
            roles: BTreeSet::new(),
            expires_at: Some(expires_at),
        })
    }

    /// Creates the API session of `consumer_key`, acting as `principal_name`.
    /// It has no password and no expiry.
    pub fn consumer(consumer_key: &str, principal_name: &str) -> Result<Self> {
        if consumer_key.trim().is_empty() || principal_name.trim().is_empty() {
            return Err(AppError::Validation(
                "Consumer key and principal name cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            key: RecordKey::ConsumerKey(consumer_key.to_string()),
            principal_name: principal_name.to_string(),
            encrypted_secret: None,
            remote_address: None,
            roles: BTreeSet::new(),
            expires_at: None,
        })
    }

    /// The permissive record handed out for an API consumer key while the
    /// directory is unreachable: keyed and named by the consumer key, no
    /// password, no expiry, role `API`.
    pub fn api_fallback(consumer_key: &str) -> Self {
        let mut roles = BTreeSet::new();
        roles.insert(API_ROLE.to_string());
        Self {
            key: RecordKey::ConsumerKey(consumer_key.to_string()),
            principal_name: consumer_key.to_string(),
            encrypted_secret: None,
            remote_address: None,
            roles,
            expires_at: None,
        }
    }

    /// Adds the given roles.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for role in roles {
            self.add_group(role.as_ref());
        }
        self
    }

    /// Records the address of the client that opened the session.
    pub fn with_remote_address(mut self, remote_address: Option<String>) -> Self {
        self.remote_address = remote_address;
        self
    }

    /// Overrides the expiry timestamp.
    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// The browser session identifier. `None` for API sessions.
    pub fn identifier(&self) -> Option<&SessionIdentifier> {
        self.key.session()
    }

    pub fn principal_name(&self) -> &str {
        &self.principal_name
    }

    pub fn encrypted_secret(&self) -> Option<&str> {
        self.encrypted_secret.as_deref()
    }

    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Decrypts the password on demand.
    ///
    /// Returns `None` when the session carries no password (API sessions) or
    /// when it cannot be decrypted with this session's key.
    pub fn password(&self, suite: &CipherSuite) -> Option<Zeroizing<String>> {
        let encrypted = self.encrypted_secret.as_deref()?;
        let Some(key_seed) = self.key.key_seed() else {
            tracing::error!(
                "❌ Password for {} is not keyed by a session identifier",
                self.principal_name
            );
            return None;
        };
        match suite.decrypt(key_seed, encrypted) {
            Ok(password) => Some(password),
            Err(e) => {
                tracing::error!(
                    "❌ Failed to decode password for {}: {}",
                    self.principal_name,
                    e
                );
                None
            }
        }
    }

    /// Whether this session holds `role`. Exact match only.
    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Adds a role. Empty and duplicate roles are ignored.
    pub fn add_group(&mut self, role: &str) {
        let role = role.trim();
        if !role.is_empty() {
            self.roles.insert(role.to_string());
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl PartialEq for SessionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.principal_name == other.principal_name
    }
}

impl Eq for SessionRecord {}

impl Hash for SessionRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.principal_name.hash(state);
    }
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("key", &self.key)
            .field("principal_name", &self.principal_name)
            .field("encrypted_secret", &self.encrypted_secret.as_ref().map(|_| "<redacted>"))
            .field("remote_address", &self.remote_address)
            .field("roles", &self.roles)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl fmt::Display for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key, f)
    }
}
