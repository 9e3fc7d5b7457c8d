use std::sync::Arc;
use std::time::Duration;

use crate::client::{HttpIdentityClient, IdentityApi, IdentityConfig};
use crate::error::Error;
use crate::guard::{Decision, GuardState, RouteGuard, RoutePolicy};
use crate::manager::SessionManager;
use crate::onboarding::Onboarding;
use crate::store::SessionStore;
use crate::types::{Role, Session, SessionSnapshot};

/// Top-level gate configuration: identity endpoints, route policy, and the
/// refresh gate bound.
pub struct GateConfig {
    pub(crate) identity: IdentityConfig,
    pub(crate) policy: RoutePolicy,
    pub(crate) refresh_timeout: Duration,
}

impl GateConfig {
    #[must_use]
    pub fn new(identity: IdentityConfig) -> Self {
        Self {
            identity,
            policy: RoutePolicy::default(),
            refresh_timeout: Duration::from_secs(10),
        }
    }

    /// Create config from environment variables (see
    /// [`IdentityConfig::from_env`] for the variable list).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required vars are missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(IdentityConfig::from_env()?))
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RoutePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }
}

/// The surface the UI layer consumes.
///
/// Wires [`SessionManager`], [`Onboarding`], and [`RouteGuard`] together.
/// Call [`initialize`](Gate::initialize) once at process start and await it
/// before trusting any [`decide`](Gate::decide) result.
pub struct Gate<C, S> {
    manager: SessionManager<C, S>,
    onboarding: Arc<Onboarding<S>>,
    guard: RouteGuard,
}

impl<S: SessionStore> Gate<HttpIdentityClient, S> {
    /// Build a gate backed by the HTTP identity client.
    #[must_use]
    pub fn from_config(config: GateConfig, store: S) -> Self {
        Self::new(
            HttpIdentityClient::new(config.identity),
            store,
            config.policy,
        )
        .with_refresh_timeout(config.refresh_timeout)
    }
}

impl<C: IdentityApi, S: SessionStore> Gate<C, S> {
    #[must_use]
    pub fn new(client: C, store: S, policy: RoutePolicy) -> Self {
        let store = Arc::new(store);
        let onboarding = Arc::new(Onboarding::new(store.clone()));
        let manager = SessionManager::new(Arc::new(client), store, onboarding.clone());
        Self {
            manager,
            onboarding,
            guard: RouteGuard::new(policy),
        }
    }

    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.manager = self.manager.with_refresh_timeout(timeout);
        self
    }

    /// Rehydrate the session from the store. Must be awaited before any
    /// real routing decision.
    pub async fn initialize(&self) {
        self.manager.initialize().await;
    }

    /// Current session state (status + session), as one consistent view.
    #[must_use]
    pub fn session_state(&self) -> SessionSnapshot {
        self.manager.snapshot()
    }

    /// See [`SessionManager::login`].
    pub async fn login(&self, email: &str, password: &str, role: Role) -> Result<Session, Error> {
        self.manager.login(email, password, role).await
    }

    /// See [`SessionManager::logout`].
    pub async fn logout(&self) {
        self.manager.logout().await;
    }

    /// See [`SessionManager::refresh_access_token`].
    pub async fn refresh(&self) -> Result<String, Error> {
        self.manager.refresh_access_token().await
    }

    /// Whether the current user needs no (further) onboarding.
    ///
    /// Providers never do; a seeker's completion flag is looked up; with no
    /// session the answer is `false`.
    #[must_use]
    pub fn check_onboarding(&self) -> bool {
        match self.manager.snapshot().session {
            Some(session) => match session.role {
                Role::Provider => true,
                Role::Seeker => self.onboarding.is_completed(&session.user_id),
            },
            None => false,
        }
    }

    /// Mark the current user's onboarding completed, optionally with the
    /// profile the flow assembled.
    ///
    /// # Errors
    ///
    /// [`Error::SessionExpired`] if no session is active; storage errors
    /// pass through.
    pub fn mark_onboarding_completed(
        &self,
        profile: Option<serde_json::Value>,
    ) -> Result<(), Error> {
        let user_id = self.manager.current_user().ok_or(Error::SessionExpired)?;
        self.onboarding.complete(&user_id, profile)
    }

    /// The current user's saved profile, if any.
    #[must_use]
    pub fn profile(&self) -> Option<serde_json::Value> {
        let user_id = self.manager.current_user()?;
        self.onboarding.profile(&user_id)
    }

    /// Save the current user's profile without changing completion state.
    ///
    /// # Errors
    ///
    /// [`Error::SessionExpired`] if no session is active.
    pub fn save_profile(&self, profile: serde_json::Value) -> Result<(), Error> {
        let user_id = self.manager.current_user().ok_or(Error::SessionExpired)?;
        self.onboarding.save_profile(&user_id, profile)
    }

    /// Authorize or redirect a navigation attempt. Pure per call; evaluated
    /// fresh on every navigation.
    #[must_use]
    pub fn decide(&self, path: &str, required_role: Option<Role>) -> Decision {
        let snapshot = self.manager.snapshot();
        self.guard
            .decide(&snapshot, path, required_role, |user_id| {
                self.onboarding.is_completed(user_id)
            })
    }

    /// Guard classification of the current session.
    #[must_use]
    pub fn guard_state(&self) -> GuardState {
        let snapshot = self.manager.snapshot();
        self.guard.classify(&snapshot, |user_id| {
            self.onboarding.is_completed(user_id)
        })
    }

    /// Where to land after a successful login, given the preserved return
    /// path (if any) and its declared role.
    #[must_use]
    pub fn post_login_target(
        &self,
        return_to: Option<&str>,
        required_role: Option<Role>,
    ) -> String {
        let snapshot = self.manager.snapshot();
        self.guard
            .post_login_target(&snapshot, return_to, required_role, |user_id| {
                self.onboarding.is_completed(user_id)
            })
    }
}
