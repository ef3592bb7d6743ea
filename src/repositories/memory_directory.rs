use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::crypto::cipher::CipherSuite;
use crate::models::identifier::{RecordKey, SessionIdentifier};
use crate::models::session::SessionRecord;
use crate::repositories::directory::{DirectoryError, SessionDirectory};

/// An in-process session directory.
///
/// Stands in for the remote directory when none is configured, and backs the
/// test suites. Browser sessions are keyed by identifier, API sessions by
/// consumer key.
#[derive(Clone)]
pub struct MemoryDirectory {
    suite: CipherSuite,
    max_age: Duration,
    sessions: Arc<RwLock<HashMap<SessionIdentifier, SessionRecord>>>,
    consumers: Arc<RwLock<HashMap<String, SessionRecord>>>,
    last_seen: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl MemoryDirectory {
    /// Creates an empty directory encrypting passwords with `suite`.
    pub fn new(suite: CipherSuite, max_age: Duration) -> Self {
        Self {
            suite,
            max_age,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            consumers: Arc::new(RwLock::new(HashMap::new())),
            last_seen: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers an API consumer key for `principal_name` with `roles`.
    pub async fn register_consumer<I, S>(
        &self,
        consumer_key: &str,
        principal_name: &str,
        roles: I,
    ) -> crate::error::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let record = SessionRecord::consumer(consumer_key, principal_name)?.with_roles(roles);
        self.insert(record).await;
        tracing::debug!("🔑 Consumer key registered for {}", principal_name);
        Ok(())
    }

    /// Stores a record as-is, next to the others of its kind.
    pub async fn insert(&self, record: SessionRecord) {
        match record.key().clone() {
            RecordKey::Session(identifier) => {
                self.sessions.write().await.insert(identifier, record);
            }
            RecordKey::ConsumerKey(consumer_key) => {
                self.consumers.write().await.insert(consumer_key, record);
            }
        }
    }

    /// When `principal_name` was last seen.
    pub async fn last_seen(&self, principal_name: &str) -> Option<DateTime<Utc>> {
        self.last_seen.read().await.get(principal_name).copied()
    }

    /// The number of browser sessions currently held.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionDirectory for MemoryDirectory {
    async fn find_by_cookie(
        &self,
        identifier: &SessionIdentifier,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        let record = self.sessions.read().await.get(identifier).cloned();

        match record {
            Some(record) if record.is_expired() => {
                tracing::debug!("⌛ Session expired for {}", record.principal_name());
                self.sessions.write().await.remove(identifier);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn find_by_consumer_key(
        &self,
        consumer_key: &str,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        Ok(self
            .consumers
            .read()
            .await
            .get(consumer_key)
            .filter(|record| record.is_valid())
            .cloned())
    }

    async fn create(
        &self,
        principal_name: &str,
        password: &str,
        remote_address: Option<&str>,
    ) -> Result<SessionIdentifier, DirectoryError> {
        let record = SessionRecord::new(principal_name, Some(password), &self.suite, self.max_age)
            .map_err(|e| DirectoryError::Rejected(e.to_string()))?
            .with_remote_address(remote_address.map(str::to_string));
        let identifier = record
            .identifier()
            .cloned()
            .ok_or_else(|| DirectoryError::Rejected("session without identifier".to_string()))?;

        let mut sessions = self.sessions.write().await;
        // One browser session per owner.
        sessions.retain(|_, existing| existing != &record);
        sessions.insert(identifier.clone(), record);

        Ok(identifier)
    }

    async fn refresh(&self, record: &SessionRecord) -> Result<(), DirectoryError> {
        self.insert(record.clone()).await;
        Ok(())
    }

    async fn clear(&self, identifier: &SessionIdentifier) -> Result<(), DirectoryError> {
        self.sessions.write().await.remove(identifier);
        Ok(())
    }

    async fn touch_last_seen(&self, principal_name: &str) -> Result<(), DirectoryError> {
        self.last_seen
            .write()
            .await
            .insert(principal_name.to_string(), Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::default_max_age;

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new(CipherSuite::Sealed, default_max_age())
    }

    #[tokio::test]
    async fn created_sessions_resolve_with_their_password() {
        let dir = directory();
        let id = dir.create("jesse@example.org", "hunter2", Some("10.0.0.7")).await.unwrap();

        let record = dir.find_by_cookie(&id).await.unwrap().unwrap();
        assert_eq!(record.principal_name(), "jesse@example.org");
        assert_eq!(record.remote_address(), Some("10.0.0.7"));
        assert_eq!(record.password(&CipherSuite::Sealed).unwrap().as_str(), "hunter2");
    }

    #[tokio::test]
    async fn a_new_session_replaces_the_owner_previous_one() {
        let dir = directory();
        let first = dir.create("jesse@example.org", "hunter2", None).await.unwrap();
        let second = dir.create("jesse@example.org", "hunter2", None).await.unwrap();

        assert_ne!(first, second);
        assert!(dir.find_by_cookie(&first).await.unwrap().is_none());
        assert!(dir.find_by_cookie(&second).await.unwrap().is_some());
        assert_eq!(dir.session_count().await, 1);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = directory();
        let id = dir.create("jesse@example.org", "hunter2", None).await.unwrap();
        dir.clear(&id).await.unwrap();
        dir.clear(&id).await.unwrap();
        dir.clear(&SessionIdentifier::generate()).await.unwrap();
        assert!(dir.find_by_cookie(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_not_found() {
        let dir = directory();
        let record = SessionRecord::new("jesse@example.org", Some("x"), &CipherSuite::Sealed, default_max_age())
            .unwrap()
            .with_expiry(Some(Utc::now() - Duration::seconds(5)));
        let id = record.identifier().unwrap().clone();
        dir.insert(record).await;

        assert!(dir.find_by_cookie(&id).await.unwrap().is_none());
        assert_eq!(dir.session_count().await, 0);
    }

    #[tokio::test]
    async fn consumer_keys_carry_roles() {
        let dir = directory();
        dir.register_consumer("abc123", "app@example.org", ["API"]).await.unwrap();

        let record = dir.find_by_consumer_key("abc123").await.unwrap().unwrap();
        assert!(record.is_in_role("API"));
        assert_eq!(record.key().as_str(), "abc123");
        assert_eq!(dir.session_count().await, 0);
        assert!(dir.find_by_consumer_key("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_records_last_seen() {
        let dir = directory();
        assert!(dir.last_seen("jesse@example.org").await.is_none());
        dir.touch_last_seen("jesse@example.org").await.unwrap();
        assert!(dir.last_seen("jesse@example.org").await.is_some());
    }

    #[tokio::test]
    async fn invalid_principals_are_rejected() {
        let dir = directory();
        assert!(matches!(
            dir.create("  ", "hunter2", None).await,
            Err(DirectoryError::Rejected(_))
        ));
    }
}
