use std::collections::{BTreeSet, HashMap};

use axum::http::{header, HeaderMap};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::principal::Principal;
use crate::models::session::SessionRecord;

/// The header parameter naming the calling application.
pub const CONSUMER_KEY_PARAM: &str = "oauth_consumer_key";

/// The authentication scheme reported for consumer-key callers.
pub const CLIENT_CERT_SCHEME: &str = "CLIENT_CERT";

// Signatures may carry percent escapes and consumer keys dashes.
static PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\w+)\s*=\s*"([-%\w.]+)""#).expect("OAuth parameter regex is valid")
});

/// Parses an `Authorization` header value into its OAuth parameters.
///
/// The value is a comma separated list of `key="value"` pairs, optionally
/// preceded by the `OAuth` scheme. Unrecognized tokens are skipped and values
/// are percent-decoded.
///
/// # Arguments
///
/// * `authorization` - The raw header value.
///
/// # Returns
///
/// A map from parameter name to decoded value. Never fails.
pub fn parse_authorization(authorization: &str) -> HashMap<String, String> {
    authorization
        .split(',')
        .filter_map(|token| PARAM.captures(token))
        .map(|captures| {
            let value = &captures[2];
            let decoded = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            (captures[1].to_string(), decoded)
        })
        .collect()
}

/// Reads the consumer key from the request's `Authorization` header.
pub fn consumer_key(headers: &HeaderMap) -> Option<String> {
    let authorization = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    parse_authorization(authorization).remove(CONSUMER_KEY_PARAM)
}

/// Whether the request reached us over TLS, directly or through a proxy.
pub fn is_secure_request(uri: &axum::http::Uri, headers: &HeaderMap) -> bool {
    if uri.scheme_str() == Some("https") {
        return true;
    }
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// The request-scoped identity of an API caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSecurityContext {
    principal_name: String,
    roles: BTreeSet<String>,
    secure: bool,
    scheme: &'static str,
}

impl OAuthSecurityContext {
    /// Builds the context for a directory record found by consumer key.
    pub fn from_record(record: &SessionRecord, secure: bool) -> Self {
        Self {
            principal_name: record.principal_name().to_string(),
            roles: record.roles().clone(),
            secure,
            scheme: CLIENT_CERT_SCHEME,
        }
    }

    /// The caller, named after its consumer key or user name.
    pub fn user_principal(&self) -> Principal {
        Principal::new(self.principal_name.clone(), self.roles.iter().cloned())
    }

    pub fn principal_name(&self) -> &str {
        &self.principal_name
    }

    pub fn is_user_in_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn authentication_scheme(&self) -> &'static str {
        self.scheme
    }
}
