use std::time::Duration;

use async_trait::async_trait;
use http::{header, StatusCode};
use reqwest::{Client, Response, Url};
use serde::Serialize;

use crate::models::identifier::SessionIdentifier;
use crate::models::session::SessionRecord;
use crate::repositories::directory::{DirectoryError, OutagePolicy, SessionDirectory};

/// The REST context root of the session directory on its host.
pub const CONTEXT_ROOT: &str = "/am/rest/sso";

/// The payload for `POST add`.
#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    #[serde(rename = "userName")]
    user_name: &'a str,
    password: &'a str,
    #[serde(rename = "remoteAddr", skip_serializing_if = "Option::is_none")]
    remote_addr: Option<&'a str>,
}

/// A session directory reached over REST.
///
/// Routes, relative to `{host}/am/rest/sso`:
/// `GET user/{uuid}`, `GET oauth/{key}`, `POST add`, `PUT set`,
/// `DELETE clear/{uuid}` and `GET touch/{userName}`.
#[derive(Clone)]
pub struct RestDirectoryClient {
    http: Client,
    base: Url,
    consumer_key_outage: OutagePolicy,
}

impl RestDirectoryClient {
    /// Creates a client for the directory on `host`.
    ///
    /// A host given without a scheme is reached over HTTPS. `timeout` bounds
    /// connecting, twice `timeout` the whole exchange.
    pub fn new(
        host: &str,
        timeout: Duration,
        consumer_key_outage: OutagePolicy,
    ) -> Result<Self, DirectoryError> {
        let base = Url::parse(&Self::base_url(host))
            .map_err(|e| DirectoryError::InvalidUrl(format!("{}: {}", host, e)))?;

        if base.cannot_be_a_base() {
            return Err(DirectoryError::InvalidUrl(host.to_string()));
        }

        let http = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout.saturating_mul(2))
            .build()
            .map_err(|e| DirectoryError::Unavailable(format!("HTTP client: {}", e)))?;

        tracing::info!("✅ Session directory client targets {}", base);

        Ok(Self {
            http,
            base,
            consumer_key_outage,
        })
    }

    /// Builds the directory base URL for `host`.
    pub fn base_url(host: &str) -> String {
        let host = host.trim().trim_end_matches('/');
        if host.to_ascii_lowercase().starts_with("http") {
            format!("{}{}", host, CONTEXT_ROOT)
        } else {
            format!("https://{}{}", host, CONTEXT_ROOT)
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DirectoryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_record(&self, url: Url) -> Result<Option<SessionRecord>, DirectoryError> {
        tracing::debug!("🔎 Directory lookup: {}", url.path());

        let response = self.http.get(url).send().await.map_err(unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            status if status.is_success() => {}
            status => return Err(unexpected_status(status)),
        }

        let body = response.bytes().await.map_err(unavailable)?;
        let trimmed = body.trim_ascii();
        if trimmed.is_empty() || trimmed == b"null" {
            return Ok(None);
        }

        sonic_rs::from_slice::<SessionRecord>(trimmed)
            .map(Some)
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SessionDirectory for RestDirectoryClient {
    async fn find_by_cookie(
        &self,
        identifier: &SessionIdentifier,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        let url = self.endpoint(&["user", identifier.as_str()])?;
        self.fetch_record(url).await
    }

    async fn find_by_consumer_key(
        &self,
        consumer_key: &str,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        let url = self.endpoint(&["oauth", consumer_key])?;

        match self.fetch_record(url).await {
            Err(DirectoryError::Unavailable(reason))
                if self.consumer_key_outage == OutagePolicy::FailOpen =>
            {
                tracing::warn!(
                    "⚠️  Session directory unavailable ({}), admitting consumer key {} as {}",
                    reason,
                    consumer_key,
                    crate::models::session::API_ROLE
                );
                Ok(Some(SessionRecord::api_fallback(consumer_key)))
            }
            other => other,
        }
    }

    async fn create(
        &self,
        principal_name: &str,
        password: &str,
        remote_address: Option<&str>,
    ) -> Result<SessionIdentifier, DirectoryError> {
        let url = self.endpoint(&["add"])?;
        let body = sonic_rs::to_string(&CreateSessionRequest {
            user_name: principal_name,
            password,
            remote_addr: remote_address,
        })
        .map_err(|e| DirectoryError::Decode(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(unavailable)?;
        let response = require_success(response)?;

        let text = response.text().await.map_err(unavailable)?;
        let identifier = SessionIdentifier::parse(text.trim().trim_matches('"'))
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;

        tracing::info!("✅ Directory session created for {}", principal_name);
        Ok(identifier)
    }

    async fn refresh(&self, record: &SessionRecord) -> Result<(), DirectoryError> {
        let url = self.endpoint(&["set"])?;
        let body = sonic_rs::to_string(record).map_err(|e| DirectoryError::Decode(e.to_string()))?;

        let response = self
            .http
            .put(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(unavailable)?;
        require_success(response)?;

        tracing::debug!("✅ Directory session refreshed: {}", record);
        Ok(())
    }

    async fn clear(&self, identifier: &SessionIdentifier) -> Result<(), DirectoryError> {
        let url = self.endpoint(&["clear", identifier.as_str()])?;
        let response = self.http.delete(url).send().await.map_err(unavailable)?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Directory session already gone: {}", identifier);
            return Ok(());
        }
        require_success(response)?;

        tracing::info!("✅ Directory session cleared: {}", identifier);
        Ok(())
    }

    async fn touch_last_seen(&self, principal_name: &str) -> Result<(), DirectoryError> {
        let url = self.endpoint(&["touch", principal_name])?;
        let response = self.http.get(url).send().await.map_err(unavailable)?;
        require_success(response)?;
        Ok(())
    }
}

fn unavailable(e: reqwest::Error) -> DirectoryError {
    DirectoryError::Unavailable(e.to_string())
}

fn unexpected_status(status: StatusCode) -> DirectoryError {
    DirectoryError::Unavailable(format!("directory answered {}", status))
}

fn require_success(response: Response) -> Result<Response, DirectoryError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(unexpected_status(response.status()))
    }
}
