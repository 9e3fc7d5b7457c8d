/// Failure taxonomy for the session gate.
///
/// `SessionExpired` is resolved internally by [`SessionManager`](crate::SessionManager):
/// a forced logout happens before the error reaches the caller, so the only
/// thing left to handle is "session is gone, redirect to login".
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The identity service rejected the credentials. Recoverable: the user
    /// re-enters them.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Transport failure or 5xx from the identity service. Transient.
    #[error("identity service unavailable during {operation}: {detail}")]
    ServiceUnavailable {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// The refresh token is dead. Terminal: the manager has already forced
    /// logout by the time this propagates.
    #[error("session expired")]
    SessionExpired,

    /// A persisted record failed to deserialize. Callers treat this as
    /// "no session" and log it.
    #[error("persisted state corrupt: {0}")]
    StorageCorrupt(String),

    /// I/O failure in the session store.
    #[error("storage error: {0}")]
    Storage(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Transport-level reqwest failure, tagged with the operation that hit it.
    pub(crate) fn transport(operation: &'static str, e: &reqwest::Error) -> Self {
        Self::ServiceUnavailable {
            operation,
            status: e.status().map(|s| s.as_u16()),
            detail: e.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
