// ============================================================================
// finsync Library
// ============================================================================
//
// Client-side synchronization core for a personal-finance REST API: a typed
// remote client, a query cache with in-flight de-duplication, optimistic
// mutations with rollback, and read views for a UI.
//
// ============================================================================

pub mod api;
pub mod cache;
pub mod connection;
pub mod core;
pub mod hooks;
pub mod mutation;
pub mod notify;
pub mod prelude;

// Re-export main types for convenience
pub use core::{ApiError, Result};

pub use api::{ApiClient, ReqwestTransport, Transport};
pub use cache::{CacheKey, KeyFilter, NotReady, QueryCache};
pub use connection::{ClientConfig, Session};
pub use hooks::{Queries, TransactionFeed};
pub use mutation::{BulkDeleteReport, MutationController, RuleUpdate};
pub use notify::{Disposition, ErrorPolicy, Notification, Notifier, TracingNotifier};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Level, event};

// ============================================================================
// High-level Client API
// ============================================================================

/// Entry point wiring session, remote client, cache, reads and mutations.
///
/// One `FinanceClient` owns one cache. Dropping the client (or calling
/// [`FinanceClient::logout`]) discards everything cached.
///
/// # Examples
///
/// ```ignore
/// use finsync::{ClientConfig, FinanceClient};
/// use finsync::core::NewAccount;
///
/// let client = FinanceClient::connect(ClientConfig::from_url("http://localhost:8000/api/v1")?)?;
/// client.session().set_token("token");
///
/// let accounts = client.queries().accounts().await?;
/// let created = client
///     .mutations()
///     .create_account(NewAccount {
///         name: "SBI".into(),
///         bank_type: "savings".into(),
///         currency: "INR".into(),
///         balance: 0.0,
///     })
///     .await?;
/// ```
pub struct FinanceClient {
    config: ClientConfig,
    session: Arc<Session>,
    api: Arc<ApiClient>,
    cache: Arc<QueryCache>,
    queries: Queries,
    mutations: MutationController,
    notifier: Arc<dyn Notifier>,
    policy: ErrorPolicy,
}

impl FinanceClient {
    /// Connect over HTTP with [`ReqwestTransport`].
    pub fn connect(config: ClientConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|message| ApiError::invalid_input("config", message))?;
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client on a custom transport (tests, non-HTTP backends).
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config
            .validate()
            .map_err(|message| ApiError::invalid_input("config", message))?;

        let session = Arc::new(Session::new());
        let api = Arc::new(ApiClient::new(&config, transport, session.clone()));
        let cache = QueryCache::new(&config);
        let queries = Queries::new(cache.clone(), api.clone());
        let mutations = MutationController::new(cache.clone(), api.clone());

        let client = Self {
            config,
            session,
            api,
            cache,
            queries,
            mutations,
            notifier: Arc::new(TracingNotifier),
            policy: ErrorPolicy::new(),
        };
        client.install_session_guard();
        Ok(client)
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.mutations = self.mutations.with_notifier(notifier.clone());
        self.notifier = notifier;
        self.install_session_guard();
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.mutations = self.mutations.with_error_policy(policy.clone());
        self.policy = policy;
        self.install_session_guard();
        self
    }

    /// Any 401 ends the session: cached data belongs to the expired user.
    fn install_session_guard(&self) {
        let cache = Arc::downgrade(&self.cache);
        let session = Arc::downgrade(&self.session);
        let notifier = self.notifier.clone();
        let policy = self.policy.clone();

        self.api.set_unauthorized_hook(Arc::new(move |err: &ApiError| {
            event!(Level::WARN, error = %err, "session expired");
            if let Some(cache) = cache.upgrade() {
                cache.clear();
            }
            if let Some(session) = session.upgrade() {
                session.clear();
            }
            if let Some(notification) = policy.classify("session", err) {
                notifier.notify(notification);
            }
        }));
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn queries(&self) -> &Queries {
        &self.queries
    }

    pub fn mutations(&self) -> &MutationController {
        &self.mutations
    }

    pub fn transaction_feed(&self) -> TransactionFeed {
        TransactionFeed::new(self.queries.clone())
    }

    /// Periodically drop idle entries. Must be called inside a tokio runtime.
    pub fn start_gc(&self) -> JoinHandle<()> {
        self.cache.spawn_gc(self.config.gc_time)
    }

    pub fn logout(&self) {
        self.session.clear();
        self.cache.clear();
        event!(Level::INFO, "logged out");
    }
}
