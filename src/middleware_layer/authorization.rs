use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use tower_cookies::Cookies;

use crate::error::AppError;
use crate::middleware_layer::oauth::{self, OAuthSecurityContext};
use crate::models::principal::Principal;
use crate::models::session::{SessionRecord, API_ROLE};
use crate::repositories::directory::{DirectoryError, OutagePolicy, SessionDirectory};
use crate::services::container::Container;

/// Declarative access metadata of a resource class or method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub deny_all: bool,
    pub permit_all: bool,
    pub roles_allowed: Option<Vec<String>>,
}

impl Annotations {
    /// Nobody may call the resource.
    pub fn deny_all() -> Self {
        Self {
            deny_all: true,
            ..Self::default()
        }
    }

    /// Anybody may call the resource.
    pub fn permit_all() -> Self {
        Self {
            permit_all: true,
            ..Self::default()
        }
    }

    /// Callers holding any of `roles` may call the resource.
    pub fn roles_allowed<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles_allowed: Some(roles.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// A routed resource method and the metadata attached to it and its class.
#[derive(Debug, Clone, Default)]
pub struct ResourceInfo {
    pub name: String,
    pub class: Annotations,
    pub method: Annotations,
}

impl ResourceInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn class(mut self, annotations: Annotations) -> Self {
        self.class = annotations;
        self
    }

    pub fn method(mut self, annotations: Annotations) -> Self {
        self.method = annotations;
        self
    }
}

/// What a resource demands of its callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationRequirement {
    DenyAll,
    RolesAllowed(BTreeSet<String>),
    Unrestricted,
}

impl AuthorizationRequirement {
    /// Resolves the metadata of `resource`, most specific first:
    /// method deny-all, method roles, method permit-all, class roles.
    pub fn resolve(resource: &ResourceInfo) -> Self {
        let method = &resource.method;

        if method.deny_all {
            return AuthorizationRequirement::DenyAll;
        }
        if let Some(roles) = &method.roles_allowed {
            return AuthorizationRequirement::RolesAllowed(roles.iter().cloned().collect());
        }
        if method.permit_all {
            return AuthorizationRequirement::Unrestricted;
        }
        match &resource.class.roles_allowed {
            Some(roles) => AuthorizationRequirement::RolesAllowed(roles.iter().cloned().collect()),
            None => AuthorizationRequirement::Unrestricted,
        }
    }
}

/// Attaches authorization filters to routes while the router is built.
#[derive(Clone)]
pub struct AuthorizationFeature {
    directory: Option<Arc<dyn SessionDirectory>>,
    container: Option<Arc<dyn Container>>,
    outage: OutagePolicy,
}

impl AuthorizationFeature {
    /// Creates a new `AuthorizationFeature`.
    ///
    /// # Arguments
    ///
    /// * `directory` - The session directory, if one is reachable.
    /// * `outage` - What to do when it is not.
    pub fn new(directory: Option<Arc<dyn SessionDirectory>>, outage: OutagePolicy) -> Self {
        Self {
            directory,
            container: None,
            outage,
        }
    }

    /// Lets callers without a consumer key authorize with their container login.
    pub fn with_container(mut self, container: Arc<dyn Container>) -> Self {
        self.container = Some(container);
        self
    }

    /// Picks the filter for `resource`. `None` leaves the route open.
    pub fn configure(&self, resource: &ResourceInfo) -> Option<AuthorizationFilter> {
        match AuthorizationRequirement::resolve(resource) {
            AuthorizationRequirement::DenyAll => {
                tracing::debug!("🔒 {} denies all callers", resource.name);
                Some(AuthorizationFilter::DenyAll)
            }
            AuthorizationRequirement::RolesAllowed(roles) => {
                tracing::debug!("🔒 {} requires one of {:?}", resource.name, roles);
                Some(AuthorizationFilter::OAuth(OAuthFilter {
                    directory: self.directory.clone(),
                    container: self.container.clone(),
                    roles_allowed: Arc::new(roles),
                    outage: self.outage,
                }))
            }
            AuthorizationRequirement::Unrestricted => {
                tracing::debug!("🔓 {} is unrestricted", resource.name);
                None
            }
        }
    }

    /// Wraps `route` with the filter `resource` calls for.
    pub fn secure<S>(&self, resource: &ResourceInfo, route: MethodRouter<S>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        match self.configure(resource) {
            Some(filter) => route.route_layer(middleware::from_fn_with_state(filter, authorize)),
            None => route,
        }
    }
}

/// A per-route request filter.
#[derive(Clone)]
pub enum AuthorizationFilter {
    /// Rejects every request.
    DenyAll,
    /// Admits callers holding one of the configured roles.
    OAuth(OAuthFilter),
}

/// Resolves the caller from its consumer key, or its container login, and
/// checks its roles.
#[derive(Clone)]
pub struct OAuthFilter {
    directory: Option<Arc<dyn SessionDirectory>>,
    container: Option<Arc<dyn Container>>,
    roles_allowed: Arc<BTreeSet<String>>,
    outage: OutagePolicy,
}

/// The outcome of checking a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Allow,
    Deny,
}

/// What a consumer key lookup settled on.
enum Consumer {
    Resolved(SessionRecord),
    Unknown,
    Rejected,
}

impl OAuthFilter {
    pub fn roles_allowed(&self) -> &BTreeSet<String> {
        &self.roles_allowed
    }

    fn on_outage(&self, consumer_key: &str, reason: &str) -> Consumer {
        match self.outage {
            OutagePolicy::FailOpen => {
                tracing::warn!(
                    "⚠️  {}; treating consumer key {} as {}",
                    reason,
                    consumer_key,
                    API_ROLE
                );
                Consumer::Resolved(SessionRecord::api_fallback(consumer_key))
            }
            OutagePolicy::FailClosed => {
                tracing::error!("❌ {}; rejecting request", reason);
                Consumer::Rejected
            }
        }
    }

    async fn resolve_consumer(&self, consumer_key: &str) -> Consumer {
        let Some(directory) = &self.directory else {
            return self.on_outage(consumer_key, "Session directory is not configured");
        };

        match directory.find_by_consumer_key(consumer_key).await {
            Ok(Some(record)) => Consumer::Resolved(record),
            Ok(None) => {
                tracing::debug!("Unknown consumer key");
                Consumer::Unknown
            }
            Err(DirectoryError::Unavailable(reason)) => self.on_outage(consumer_key, &reason),
            Err(e) => {
                tracing::error!("❌ Consumer key lookup failed: {}; rejecting request", e);
                Consumer::Rejected
            }
        }
    }

    async fn container_principal(&self, cookies: Option<Cookies>) -> Option<Principal> {
        let container = self.container.as_ref()?;
        container.remote_user(&cookies?).await
    }

    async fn check(&self, request: &mut Request<Body>) -> Verdict {
        if let Some(consumer_key) = oauth::consumer_key(request.headers()) {
            match self.resolve_consumer(&consumer_key).await {
                Consumer::Resolved(record) => {
                    let secure = oauth::is_secure_request(request.uri(), request.headers());
                    let context = OAuthSecurityContext::from_record(&record, secure);
                    tracing::debug!("🔑 Consumer key resolved to {}", context.principal_name());
                    request.extensions_mut().insert(context.user_principal());
                    request.extensions_mut().insert(context);
                }
                Consumer::Unknown => {}
                Consumer::Rejected => return Verdict::Deny,
            }
        }

        let has_caller = request.extensions().get::<OAuthSecurityContext>().is_some()
            || request.extensions().get::<Principal>().is_some();
        if !has_caller {
            let cookies = request.extensions().get::<Cookies>().cloned();
            if let Some(principal) = self.container_principal(cookies).await {
                tracing::debug!("👤 Container login of {}", principal.name);
                request.extensions_mut().insert(principal);
            }
        }

        let extensions = request.extensions();
        let in_role = |role: &String| match extensions.get::<OAuthSecurityContext>() {
            Some(context) => context.is_user_in_role(role),
            None => extensions
                .get::<Principal>()
                .is_some_and(|principal| principal.is_user_in_role(role)),
        };

        if self.roles_allowed.iter().any(in_role) {
            Verdict::Allow
        } else {
            tracing::warn!("⛔ Caller holds none of {:?}", self.roles_allowed);
            Verdict::Deny
        }
    }
}

/// The middleware enforcing an [`AuthorizationFilter`].
///
/// # Arguments
///
/// * `filter` - The filter picked for the route.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The downstream response, or `403 Forbidden`.
pub async fn authorize(
    State(filter): State<AuthorizationFilter>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let verdict = match &filter {
        AuthorizationFilter::DenyAll => {
            tracing::warn!("⛔ Request to a deny-all resource: {}", request.uri().path());
            Verdict::Deny
        }
        AuthorizationFilter::OAuth(oauth) => oauth.check(&mut request).await,
    };

    match verdict {
        Verdict::Allow => next.run(request).await,
        Verdict::Deny => AppError::Forbidden.into_response(),
    }
}
