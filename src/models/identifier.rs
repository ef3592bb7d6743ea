use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::cipher::KEY_SIZE;

/// The length of a canonical hyphenated UUID.
pub const IDENTIFIER_LEN: usize = 36;

/// Raised when a string is not a canonical hyphenated UUID.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid session identifier: expected a 36 character UUID")]
pub struct InvalidIdentifier;

/// A session identifier: the `JSESSIONSSO` cookie value and the key material
/// for the session password.
///
/// Always held in canonical hyphenated form, so the last 16 characters are
/// ASCII and usable as an AES-128 key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionIdentifier(String);

impl SessionIdentifier {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Parses an identifier, accepting only the 36 character hyphenated form.
    pub fn parse(value: &str) -> Result<Self, InvalidIdentifier> {
        let value = value.trim();
        if value.len() != IDENTIFIER_LEN {
            return Err(InvalidIdentifier);
        }
        Uuid::try_parse(value).map_err(|_| InvalidIdentifier)?;
        Ok(Self(value.to_string()))
    }

    /// The key seed for the session password: the last 16 characters.
    pub fn key_seed(&self) -> &str {
        &self.0[self.0.len() - KEY_SIZE..]
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionIdentifier {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionIdentifier {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionIdentifier> for String {
    fn from(value: SessionIdentifier) -> Self {
        value.0
    }
}

/// The `uuid` of a directory record.
///
/// Browser sessions carry a [`SessionIdentifier`]. API sessions carry the
/// caller's `oauth_consumer_key`, which may take any form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordKey {
    Session(SessionIdentifier),
    ConsumerKey(String),
}

impl RecordKey {
    pub fn as_str(&self) -> &str {
        match self {
            RecordKey::Session(identifier) => identifier.as_str(),
            RecordKey::ConsumerKey(key) => key,
        }
    }

    /// The browser session identifier, if this is one.
    pub fn session(&self) -> Option<&SessionIdentifier> {
        match self {
            RecordKey::Session(identifier) => Some(identifier),
            RecordKey::ConsumerKey(_) => None,
        }
    }

    /// The key seed for a session password. Consumer keys have none.
    pub fn key_seed(&self) -> Option<&str> {
        self.session().map(SessionIdentifier::key_seed)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SessionIdentifier> for RecordKey {
    fn from(identifier: SessionIdentifier) -> Self {
        RecordKey::Session(identifier)
    }
}

impl From<String> for RecordKey {
    fn from(value: String) -> Self {
        match SessionIdentifier::parse(&value) {
            Ok(identifier) => RecordKey::Session(identifier),
            Err(_) => RecordKey::ConsumerKey(value),
        }
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        match key {
            RecordKey::Session(identifier) => identifier.into(),
            RecordKey::ConsumerKey(key) => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_identifiers_are_canonical() {
        let id = SessionIdentifier::generate();
        assert_eq!(id.as_str().len(), IDENTIFIER_LEN);
        assert_eq!(SessionIdentifier::parse(id.as_str()), Ok(id.clone()));
        assert_ne!(id, SessionIdentifier::generate());
    }

    #[test]
    fn key_seed_is_the_last_sixteen_characters() {
        let id = SessionIdentifier::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.key_seed(), "716-446655440000");
        assert_eq!(id.key_seed().len(), KEY_SIZE);
    }

    #[test]
    fn rejects_non_canonical_values() {
        assert!(SessionIdentifier::parse("").is_err());
        assert!(SessionIdentifier::parse("abc123").is_err());
        assert!(SessionIdentifier::parse("550e8400e29b41d4a716446655440000").is_err());
        assert!(SessionIdentifier::parse("zz0e8400-e29b-41d4-a716-446655440000").is_err());
    }

    #[test]
    fn deserialization_validates() {
        let ok: SessionIdentifier =
            sonic_rs::from_str(r#""550e8400-e29b-41d4-a716-446655440000""#).unwrap();
        assert_eq!(ok.as_str(), "550e8400-e29b-41d4-a716-446655440000");
        assert!(sonic_rs::from_str::<SessionIdentifier>(r#""nope""#).is_err());
    }

    #[test]
    fn record_keys_accept_consumer_keys() {
        let session: RecordKey =
            sonic_rs::from_str(r#""550e8400-e29b-41d4-a716-446655440000""#).unwrap();
        assert_eq!(session.key_seed(), Some("716-446655440000"));
        assert!(session.session().is_some());

        let consumer: RecordKey = sonic_rs::from_str(r#""abc123""#).unwrap();
        assert_eq!(consumer, RecordKey::ConsumerKey("abc123".to_string()));
        assert_eq!(consumer.key_seed(), None);
        assert_eq!(sonic_rs::to_string(&consumer).unwrap(), r#""abc123""#);
    }
}
