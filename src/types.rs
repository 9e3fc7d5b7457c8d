use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;

/// Account role, selected by the caller at login.
///
/// A closed set: `RouteGuard` matches it exhaustively, so a new role fails to
/// compile rather than silently falling through a string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Must complete onboarding once before reaching the dashboard.
    Seeker,
    /// Never routed into onboarding.
    Provider,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seeker => "seeker",
            Self::Provider => "provider",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seeker" => Ok(Self::Seeker),
            "provider" => Ok(Self::Provider),
            other => Err(Error::Config(format!("unknown role: {other}"))),
        }
    }
}

/// Identity-service user identifier (opaque string).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The authenticated identity and token pair currently active for one user.
///
/// At most one session is current at a time; absence means unauthenticated.
/// Created by a successful login or by rehydration from the store at process
/// start, destroyed by logout or an unrecoverable refresh failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    /// Caller-supplied at login; authoritative for routing. The identity
    /// service is not asked to confirm it.
    pub role: Role,
    pub access_token: String,
    pub refresh_token: String,
}

/// Per-user onboarding completion and saved profile.
///
/// The profile blob is opaque to this crate; the onboarding flow owns its
/// shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnboardingRecord {
    pub completed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,
}

impl OnboardingRecord {
    /// A record marked completed now.
    #[must_use]
    pub fn completed_now(profile: Option<serde_json::Value>) -> Self {
        Self {
            completed: true,
            completed_at: Some(OffsetDateTime::now_utc()),
            profile,
        }
    }
}

/// Whether the manager has finished rehydrating from the store.
///
/// `RouteGuard` emits no real decision while `Loading`; callers must await
/// [`SessionManager::initialize`](crate::SessionManager::initialize) first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Loading,
    Ready,
}

/// Point-in-time view of the manager state, consumed by `RouteGuard`.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: GateStatus,
    pub session: Option<Session>,
}

impl SessionSnapshot {
    /// Snapshot taken before `initialize()` has finished.
    #[must_use]
    pub fn loading() -> Self {
        Self {
            status: GateStatus::Loading,
            session: None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.status, GateStatus::Ready) && self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        Session {
            user_id: UserId::from("u-1"),
            email: "a@b.com".into(),
            role: Role::Seeker,
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
        }
    }

    #[test]
    fn role_parses_lowercase() {
        assert_eq!("seeker".parse::<Role>().unwrap(), Role::Seeker);
        assert_eq!("provider".parse::<Role>().unwrap(), Role::Provider);
        assert!("admin".parse::<Role>().is_err());
        assert!("Seeker".parse::<Role>().is_err());
    }

    #[test]
    fn role_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Provider).unwrap(), "\"provider\"");
        let parsed: Role = serde_json::from_str("\"seeker\"").unwrap();
        assert_eq!(parsed, Role::Seeker);
    }

    #[test]
    fn session_serde_roundtrip() {
        let session = sample_session();
        let json = serde_json::to_string(&session).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }

    #[test]
    fn onboarding_record_defaults_incomplete() {
        let record = OnboardingRecord::default();
        assert!(!record.completed);
        assert!(record.completed_at.is_none());
        assert!(record.profile.is_none());
    }

    #[test]
    fn completed_now_stamps_time() {
        let record = OnboardingRecord::completed_now(None);
        assert!(record.completed);
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn loading_snapshot_is_not_authenticated() {
        let snap = SessionSnapshot::loading();
        assert!(!snap.is_authenticated());
    }
}
