mod storage;

pub use storage::CredentialsStoreMode;
pub use storage::FileTokenStorage;
pub use storage::MemoryTokenStorage;
pub use storage::StoredAuth;
pub use storage::TokenStorage;
pub use storage::create_token_storage;

use chrono::Utc;
use std::io;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tracing::info;
use tracing::warn;

use crate::client::ApiClient;
use crate::client::SessionEvent;
use crate::config::Config;
use crate::error::LmsErr;
use crate::error::Result;
use crate::models::RegisterRequest;
use crate::models::User;
use crate::models::UserUpdate;

/// Snapshot of the session as consumers observe it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    /// True iff `user` is present and the last verification or refresh
    /// succeeded.
    pub is_authenticated: bool,
    /// True while `check_status`, `login`, or `register` is in flight.
    pub loading: bool,
    /// Message from the most recent failed operation; cleared at the start
    /// of a new attempt or via [`SessionManager::clear_error`].
    pub error: Option<String>,
}

/// Single authority for "is the caller logged in, and as whom".
///
/// Constructed explicitly (one instance per process) and injected into
/// consumers; each instance owns its state and its token store, so tests
/// can build a fresh manager over an in-memory store. Session-mutating
/// operations are serialized through a single-slot guard: a second call
/// while one is running fails fast with [`LmsErr::OperationInFlight`]
/// instead of interleaving writes.
#[derive(Debug)]
pub struct SessionManager {
    client: Arc<ApiClient>,
    storage: Arc<dyn TokenStorage>,
    state: RwLock<SessionState>,
    op_gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(config: &Config) -> Self {
        let storage = create_token_storage(config.home.clone(), config.store_mode);
        Self::with_storage(config, storage)
    }

    /// Builds a manager over a caller-provided store. Used by tests and by
    /// consumers embedding their own persistence.
    pub fn with_storage(config: &Config, storage: Arc<dyn TokenStorage>) -> Self {
        let client = Arc::new(ApiClient::new(config, storage.clone()));
        Self {
            client,
            storage,
            state: RwLock::new(SessionState::default()),
            op_gate: Mutex::new(()),
        }
    }

    /// Convenience constructor returning an `Arc` wrapper.
    pub fn shared(config: &Config) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// The underlying HTTP client, for callers issuing resource requests
    /// that should share this session's credentials.
    pub fn api(&self) -> Arc<ApiClient> {
        self.client.clone()
    }

    /// Receiver for session-invalidation signals. The hosting shell
    /// subscribes and routes to its login surface when one arrives.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.client.subscribe()
    }

    /// Current session snapshot (clone).
    pub fn state(&self) -> SessionState {
        self.state.read().ok().map(|state| state.clone()).unwrap_or_default()
    }

    pub fn clear_error(&self) {
        self.with_state(|state| state.error = None);
    }

    /// Startup probe: decides whether persisted credentials still identify a
    /// user. With no stored token pair it resolves locally, performing zero
    /// network calls. Every failure inside the verification chain resolves
    /// to a clean logged-out state rather than an error.
    pub async fn check_status(&self) -> Result<()> {
        let _op = self.op_gate.try_lock().map_err(|_| LmsErr::OperationInFlight)?;
        let _loading = self.begin_loading();

        let auth = match self.storage.load() {
            Ok(Some(auth)) if auth.has_token_pair() => auth,
            Ok(None) => {
                self.set_unauthenticated();
                return Ok(());
            }
            // Half a token pair, or an unreadable store: purge and start clean.
            Ok(Some(_)) | Err(_) => {
                self.purge_and_reset();
                return Ok(());
            }
        };

        if self.client.verify_token(&auth.access_token).await {
            self.adopt_profile().await;
            return Ok(());
        }

        match self.client.refresh_access_token(Some(&auth.access_token)).await {
            Ok(_) => self.adopt_profile().await,
            Err(err) => {
                // The store has already been purged by the refresh routine.
                info!("startup token refresh failed: {err}");
                self.set_unauthenticated();
            }
        }
        Ok(())
    }

    /// Exchanges credentials for a token pair, persists it, and loads the
    /// profile. Does not retry. A profile fetch that fails after a token was
    /// obtained leaves the session logged out: a token without a resolvable
    /// identity is useless.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let _op = self.op_gate.try_lock().map_err(|_| LmsErr::OperationInFlight)?;
        self.with_state(|state| state.error = None);
        let _loading = self.begin_loading();

        let tokens = match self.client.obtain_token(username, password).await {
            Ok(tokens) => tokens,
            Err(err) => {
                self.with_state(|state| state.error = Some(err.to_string()));
                return Err(err);
            }
        };

        let stored = StoredAuth {
            access_token: tokens.access,
            refresh_token: tokens.refresh,
            user: None,
            last_refresh: Some(Utc::now()),
        };
        if let Err(err) = self.storage.save(&stored) {
            self.with_state(|state| state.error = Some(err.to_string()));
            return Err(err.into());
        }

        match self.client.current_user().await {
            Ok(user) => {
                self.adopt_user(user.clone());
                Ok(user)
            }
            Err(err) => {
                warn!("profile fetch after login failed: {err}");
                self.purge_and_reset();
                let err = LmsErr::ProfileUnavailable;
                self.with_state(|state| state.error = Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Creates an account. No token side effects: the caller still has to
    /// log in afterwards. On failure the server's error payload is passed
    /// through verbatim.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let _op = self.op_gate.try_lock().map_err(|_| LmsErr::OperationInFlight)?;
        self.with_state(|state| state.error = None);
        let _loading = self.begin_loading();

        match self.client.register(request).await {
            Ok(user) => Ok(user),
            Err(err) => {
                self.with_state(|state| state.error = Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Purges the token pair and the cached user in one operation and resets
    /// the in-memory state. No network call. Returns `Ok(true)` if stored
    /// credentials were present and removed.
    pub fn logout(&self) -> io::Result<bool> {
        let removed = self.storage.delete();
        self.with_state(|state| {
            state.user = None;
            state.is_authenticated = false;
            state.error = None;
        });
        removed
    }

    /// Updates the current user's profile. The server's returned record
    /// replaces the local `user` wholesale; nothing is merged client-side.
    pub async fn update_user(&self, patch: &UserUpdate) -> Result<User> {
        let _op = self.op_gate.try_lock().map_err(|_| LmsErr::OperationInFlight)?;
        let Some(current) = self.state().user else {
            return Err(LmsErr::NoUserLoaded);
        };

        match self.client.update_user(current.id, patch).await {
            Ok(user) => {
                self.cache_user(&user);
                self.with_state(|state| state.user = Some(user.clone()));
                Ok(user)
            }
            Err(err) => {
                self.with_state(|state| state.error = Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn adopt_profile(&self) {
        match self.client.current_user().await {
            Ok(user) => self.adopt_user(user),
            Err(err) => {
                // An access token without a reachable profile is invalid.
                warn!("profile fetch failed: {err}");
                self.purge_and_reset();
            }
        }
    }

    fn adopt_user(&self, user: User) {
        self.cache_user(&user);
        self.with_state(|state| {
            state.user = Some(user);
            state.is_authenticated = true;
        });
    }

    /// Mirrors the freshly fetched profile into the store for display-only
    /// reuse. Failures are logged and ignored: the cache is not a source of
    /// truth.
    fn cache_user(&self, user: &User) {
        let cached = match self.storage.load() {
            Ok(Some(mut auth)) => {
                auth.user = Some(user.clone());
                self.storage.save(&auth)
            }
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = cached {
            warn!("failed to cache user record: {err}");
        }
    }

    fn purge_and_reset(&self) {
        if let Err(err) = self.storage.delete() {
            warn!("failed to purge stored credentials: {err}");
        }
        self.set_unauthenticated();
    }

    fn set_unauthenticated(&self) {
        self.with_state(|state| {
            state.user = None;
            state.is_authenticated = false;
        });
    }

    fn with_state(&self, f: impl FnOnce(&mut SessionState)) {
        if let Ok(mut state) = self.state.write() {
            f(&mut state);
        }
    }

    fn begin_loading(&self) -> LoadingGuard<'_> {
        self.with_state(|state| state.loading = true);
        LoadingGuard { state: &self.state }
    }
}

/// Clears the loading flag on every exit path, including early returns.
struct LoadingGuard<'a> {
    state: &'a RwLock<SessionState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.write() {
            state.loading = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use pretty_assertions::assert_eq;

    fn offline_manager() -> (SessionManager, Arc<MemoryTokenStorage>) {
        // Port 9 is discard; nothing in these tests may touch the network.
        let config = Config::new("http://127.0.0.1:9", std::env::temp_dir())
            .map(|config| config.with_store_mode(CredentialsStoreMode::Memory))
            .unwrap_or_else(|err| panic!("config should build: {err}"));
        let storage = Arc::new(MemoryTokenStorage::default());
        let manager = SessionManager::with_storage(&config, storage.clone());
        (manager, storage)
    }

    #[tokio::test]
    async fn check_status_with_half_a_token_pair_purges_locally() {
        let (manager, storage) = offline_manager();
        storage
            .save(&StoredAuth { access_token: "only-access".to_string(), ..Default::default() })
            .unwrap_or_else(|err| panic!("seed store: {err}"));

        manager.check_status().await.unwrap_or_else(|err| panic!("check_status: {err}"));

        assert_eq!(storage.load().ok().flatten(), None, "orphan token should be purged");
        let state = manager.state();
        assert!(!state.is_authenticated);
        assert_eq!(state.user, None);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn update_user_without_a_loaded_user_is_a_local_failure() {
        let (manager, _storage) = offline_manager();
        let patch = UserUpdate { email: Some("new@x.com".to_string()), ..Default::default() };
        assert!(matches!(manager.update_user(&patch).await, Err(LmsErr::NoUserLoaded)));
    }

    #[tokio::test]
    async fn clear_error_resets_only_the_error() {
        let (manager, _storage) = offline_manager();
        manager.with_state(|state| {
            state.error = Some("boom".to_string());
            state.user = Some(User {
                id: 1,
                username: "alice".to_string(),
                email: "alice@x.com".to_string(),
                role: Role::Student,
                mobile_no: None,
            });
            state.is_authenticated = true;
        });

        manager.clear_error();

        let state = manager.state();
        assert_eq!(state.error, None);
        assert!(state.is_authenticated);
        assert!(state.user.is_some());
    }

    #[tokio::test]
    async fn loading_guard_clears_flag_on_drop() {
        let (manager, _storage) = offline_manager();
        {
            let _guard = manager.begin_loading();
            assert!(manager.state().loading);
        }
        assert!(!manager.state().loading);
    }
}
