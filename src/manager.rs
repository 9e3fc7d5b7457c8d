use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::client::IdentityApi;
use crate::error::Error;
use crate::onboarding::Onboarding;
use crate::store::SessionStore;
use crate::types::{GateStatus, Role, Session, SessionSnapshot, UserId};

const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct ManagerState {
    status: GateStatus,
    session: Option<Session>,
    /// Bumped on every successful token rotation. Lets a caller that waited
    /// on the refresh gate detect that someone else already refreshed.
    refresh_epoch: u64,
}

/// Owner of the in-memory session.
///
/// The manager is the only component that talks to the identity service; the
/// store and onboarding state never do network I/O. It reconciles the
/// in-memory session with the [`SessionStore`] on login, logout, refresh,
/// and process start.
pub struct SessionManager<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    onboarding: Arc<Onboarding<S>>,
    state: Mutex<ManagerState>,
    /// Serializes token refresh: at most one wire request per session, no
    /// matter how many callers detect expiry at once.
    refresh_gate: tokio::sync::Mutex<()>,
    refresh_timeout: Duration,
}

impl<C: IdentityApi, S: SessionStore> SessionManager<C, S> {
    #[must_use]
    pub fn new(client: Arc<C>, store: Arc<S>, onboarding: Arc<Onboarding<S>>) -> Self {
        Self {
            client,
            store,
            onboarding,
            state: Mutex::new(ManagerState {
                status: GateStatus::Loading,
                session: None,
                refresh_epoch: 0,
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    /// Bound on how long a refresh call may hold the refresh gate before it
    /// is surfaced as `ServiceUnavailable` (default 10s).
    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Rehydrate the session from the store.
    ///
    /// Must complete before any routing decision is trusted; until then
    /// [`snapshot`](Self::snapshot) reports `Loading` and the guard emits
    /// `Pending`. A corrupt persisted record is logged, cleared, and treated
    /// as "no session". Always ends `Ready`.
    pub async fn initialize(&self) {
        let restored = match self.store.load() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "persisted session unreadable, starting unauthenticated");
                if let Err(e) = self.store.clear() {
                    tracing::warn!(error = %e, "failed to clear corrupt session record");
                }
                None
            }
        };

        let mut state = self.lock();
        state.session = restored;
        state.status = GateStatus::Ready;
    }

    /// Authenticate against the identity service.
    ///
    /// The caller-supplied `role` is authoritative for routing; the service
    /// is not asked to confirm it. On success the session is persisted and
    /// published, and the profile document is fetched best-effort (its
    /// failure never fails the login).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentials`] on a rejected login (no session is
    /// created and the store is untouched), [`Error::ServiceUnavailable`] on
    /// transport/5xx failures.
    pub async fn login(&self, email: &str, password: &str, role: Role) -> Result<Session, Error> {
        let response = self.client.login(email, password).await?;

        let session = Session {
            user_id: response.user_id,
            email: email.to_owned(),
            role,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        };

        // Persisting is best-effort relative to the remote login having
        // already succeeded; a store failure leaves a working in-memory
        // session for this process lifetime.
        if let Err(e) = self.store.save(&session) {
            tracing::warn!(error = %e, "failed to persist session");
        }

        {
            let mut state = self.lock();
            state.session = Some(session.clone());
            state.status = GateStatus::Ready;
        }
        tracing::info!(user_id = %session.user_id, role = %session.role, "login successful");

        match self.client.fetch_profile(&session.access_token).await {
            Ok(profile) => {
                if let Err(e) = self.onboarding.save_profile(&session.user_id, profile) {
                    tracing::warn!(error = %e, "failed to store fetched profile");
                }
            }
            Err(e) => tracing::warn!(error = %e, "profile fetch failed after login"),
        }

        Ok(session)
    }

    /// End the session.
    ///
    /// The remote revoke is best-effort (failure is logged and swallowed);
    /// local clearing is unconditional and cannot be blocked by the network.
    /// Safe to call with no active session.
    pub async fn logout(&self) {
        let session = self.lock().session.clone();

        let Some(session) = session else {
            return;
        };

        if let Err(e) = self
            .client
            .revoke(&session.access_token, &session.refresh_token)
            .await
        {
            tracing::warn!(error = %e, "token revocation failed during logout");
        }

        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear persisted session");
        }
        self.lock().session = None;
        self.onboarding.forget(&session.user_id);
        tracing::info!(user_id = %session.user_id, "logout complete");
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Concurrent callers collapse onto one wire request: whoever holds the
    /// refresh gate does the exchange, and waiters that observe a bumped
    /// epoch return the already-rotated token. A rejected refresh forces
    /// [`logout`](Self::logout) before the error propagates, so no caller
    /// can observe a session holding a token that is known dead.
    ///
    /// # Errors
    ///
    /// [`Error::SessionExpired`] if there is no session or the service
    /// rejected the refresh token; [`Error::ServiceUnavailable`] on
    /// transport failure or when the exchange exceeds the refresh timeout
    /// (the gate is released either way).
    pub async fn refresh_access_token(&self) -> Result<String, Error> {
        let epoch_before = self.lock().refresh_epoch;

        let _gate = self.refresh_gate.lock().await;

        let refresh_token = {
            let state = self.lock();
            if state.refresh_epoch != epoch_before {
                // Someone else refreshed while we waited for the gate.
                return state
                    .session
                    .as_ref()
                    .map(|s| s.access_token.clone())
                    .ok_or(Error::SessionExpired);
            }
            state
                .session
                .as_ref()
                .map(|s| s.refresh_token.clone())
                .ok_or(Error::SessionExpired)?
        };

        let response =
            match tokio::time::timeout(self.refresh_timeout, self.client.refresh(&refresh_token))
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(Error::SessionExpired)) => {
                    tracing::warn!("refresh token rejected, forcing logout");
                    self.logout().await;
                    return Err(Error::SessionExpired);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(Error::ServiceUnavailable {
                        operation: "refresh",
                        status: None,
                        detail: format!("no response within {:?}", self.refresh_timeout),
                    });
                }
            };

        let rotated = {
            let mut state = self.lock();
            let Some(session) = state.session.as_mut() else {
                // Logged out underneath us while the exchange was in flight.
                return Err(Error::SessionExpired);
            };
            session.access_token = response.access_token.clone();
            if let Some(refresh_token) = response.refresh_token {
                session.refresh_token = refresh_token;
            }
            state.refresh_epoch += 1;
            state.session.clone()
        };

        if let Some(session) = rotated
            && let Err(e) = self.store.save(&session)
        {
            tracing::warn!(error = %e, "failed to persist rotated tokens");
        }

        Ok(response.access_token)
    }

    /// Point-in-time view for the route guard and UI.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            status: state.status,
            session: state.session.clone(),
        }
    }

    /// The current access token, if a session is active.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.access_token.clone())
    }

    /// The current user, if a session is active.
    #[must_use]
    pub fn current_user(&self) -> Option<UserId> {
        self.lock().session.as_ref().map(|s| s.user_id.clone())
    }
}
