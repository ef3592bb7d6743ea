use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::middleware_layer::authorization::AuthorizationFeature;
use crate::middleware_layer::auto_login::AutoLoginFilter;
use crate::repositories::directory::SessionDirectory;
use crate::repositories::memory_directory::MemoryDirectory;
use crate::repositories::rest_directory::RestDirectoryClient;
use crate::services::container::{Container, RealmContainer};
use crate::services::login_sessions::{LoginSessionStore, MemoryLoginSessions, RedisLoginSessions};
use crate::services::realm::FileRealm;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The session directory.
    pub directory: Arc<dyn SessionDirectory>,
    /// The container's own login mechanism.
    pub container: Arc<dyn Container>,
    /// The filter in front of browser pages.
    pub auto_login: AutoLoginFilter,
    /// Attaches authorization filters to API routes.
    pub authorization: AuthorizationFeature,
}

impl AppState {
    /// Wires the filters around a directory and a container.
    pub fn new(
        config: Config,
        directory: Arc<dyn SessionDirectory>,
        container: Arc<dyn Container>,
    ) -> Self {
        let auto_login = AutoLoginFilter::new(directory.clone(), container.clone(), config.cipher)
            .with_required_role(config.required_role.clone())
            .with_sign_in_page(config.sign_in_page.clone())
            .with_excluded_prefixes(config.excluded_prefixes.clone());

        let authorization = AuthorizationFeature::new(Some(directory.clone()), config.outage_policy)
            .with_container(container.clone());

        Self {
            config,
            directory,
            container,
            auto_login,
            authorization,
        }
    }

    /// Creates a new `AppState` from the configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let directory: Arc<dyn SessionDirectory> = match &config.sso_host {
            Some(host) => Arc::new(RestDirectoryClient::new(
                host,
                config.sso_timeout,
                config.outage_policy,
            )?),
            None => {
                tracing::warn!("⚠️  SSO_HOST not set, using an in-process session directory");
                Arc::new(MemoryDirectory::new(config.cipher, config.session_max_age))
            }
        };

        let realm = if config.realm_file.exists() {
            FileRealm::load(&config.realm_file)?
        } else {
            tracing::warn!(
                "⚠️  Realm file {} not found, nobody can sign in",
                config.realm_file.display()
            );
            FileRealm::default()
        };

        let sessions: Arc<dyn LoginSessionStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisLoginSessions::connect(url).await?),
            None => {
                tracing::info!("✅ Login sessions kept in memory");
                Arc::new(MemoryLoginSessions::new())
            }
        };

        let container: Arc<dyn Container> = Arc::new(RealmContainer::new(
            Arc::new(realm),
            sessions,
            config.session_duration_days,
            config.is_production,
        ));
        tracing::info!("✅ Container realm initialized");

        Ok(Self::new(config.clone(), directory, container))
    }
}
