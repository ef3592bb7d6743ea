use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::identifier::SessionIdentifier;
use crate::models::session::SessionRecord;

/// Errors raised while talking to the session directory.
///
/// "Not found" is never an error: lookups return `Ok(None)` for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory could not be reached, timed out or answered with a
    /// server error.
    #[error("Session directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered with a body that could not be decoded.
    #[error("Invalid directory response: {0}")]
    Decode(String),

    /// The directory URL could not be built.
    #[error("Invalid directory URL: {0}")]
    InvalidUrl(String),

    /// The directory refused the request as invalid.
    #[error("Directory request rejected: {0}")]
    Rejected(String),
}

/// What to do with an API request when the directory cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutagePolicy {
    /// Let the caller through as a fabricated `API` record. The route's role
    /// check still applies to it.
    #[default]
    FailOpen,
    /// Reject the caller.
    FailClosed,
}

impl OutagePolicy {
    /// Parses a policy name as found in configuration.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "open" => Some(OutagePolicy::FailOpen),
            "fail-closed" | "closed" => Some(OutagePolicy::FailClosed),
            _ => None,
        }
    }
}

/// The remote service holding the authoritative session records.
///
/// Every call is a single network round trip with a short timeout and no
/// retry.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Finds the browser session for a `JSESSIONSSO` cookie value.
    async fn find_by_cookie(
        &self,
        identifier: &SessionIdentifier,
    ) -> Result<Option<SessionRecord>, DirectoryError>;

    /// Finds the API session for an `oauth_consumer_key`.
    async fn find_by_consumer_key(
        &self,
        consumer_key: &str,
    ) -> Result<Option<SessionRecord>, DirectoryError>;

    /// Registers a new browser session and returns its identifier.
    async fn create(
        &self,
        principal_name: &str,
        password: &str,
        remote_address: Option<&str>,
    ) -> Result<SessionIdentifier, DirectoryError>;

    /// Pushes an updated record (roles, expiry) back to the directory.
    async fn refresh(&self, record: &SessionRecord) -> Result<(), DirectoryError>;

    /// Removes a session. Clearing an unknown session succeeds.
    async fn clear(&self, identifier: &SessionIdentifier) -> Result<(), DirectoryError>;

    /// Updates the principal's last-seen timestamp.
    async fn touch_last_seen(&self, principal_name: &str) -> Result<(), DirectoryError>;
}

/// Fires `touch_last_seen` on a detached task.
///
/// The caller never waits for it and never sees its failure.
pub fn touch_in_background(directory: Arc<dyn SessionDirectory>, principal_name: String) {
    tokio::spawn(async move {
        match directory.touch_last_seen(&principal_name).await {
            Ok(()) => tracing::debug!("👣 Last seen updated for {}", principal_name),
            Err(e) => tracing::warn!("⚠️  Failed to update last seen for {}: {}", principal_name, e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_names() {
        assert_eq!(OutagePolicy::parse("fail-open"), Some(OutagePolicy::FailOpen));
        assert_eq!(OutagePolicy::parse("Fail-Closed"), Some(OutagePolicy::FailClosed));
        assert_eq!(OutagePolicy::parse("maybe"), None);
        assert_eq!(OutagePolicy::default(), OutagePolicy::FailOpen);
    }
}
