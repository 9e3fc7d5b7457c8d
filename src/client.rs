use std::future::Future;

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::types::UserId;

/// Identity service endpoint configuration.
///
/// Required fields are constructor parameters; everything else defaults and
/// can be overridden by chaining.
///
/// ```rust,ignore
/// use trailhead_auth::IdentityConfig;
///
/// let config = IdentityConfig::new("https://api.trailhead.example".parse()?);
/// let config = config.with_login_url("https://sso.example.com/login".parse()?);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct IdentityConfig {
    pub(crate) login_url: Url,
    pub(crate) refresh_url: Url,
    pub(crate) logout_url: Url,
    pub(crate) profile_url: Url,
}

impl IdentityConfig {
    /// Build endpoint URLs from an API base URL.
    ///
    /// Defaults: `{base}/auth/login`, `{base}/auth/refresh`,
    /// `{base}/auth/logout`, `{base}/user/profile`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL cannot be a base
    /// (e.g. `mailto:`).
    pub fn from_base(base: &Url) -> Result<Self, Error> {
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| Error::Config(format!("invalid base URL: {e}")))
        };
        Ok(Self {
            login_url: join("auth/login")?,
            refresh_url: join("auth/refresh")?,
            logout_url: join("auth/logout")?,
            profile_url: join("user/profile")?,
        })
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `TRAILHEAD_API_URL`: identity API base URL
    ///
    /// # Optional env vars
    /// - `TRAILHEAD_LOGIN_URL`, `TRAILHEAD_REFRESH_URL`,
    ///   `TRAILHEAD_LOGOUT_URL`, `TRAILHEAD_PROFILE_URL`: per-endpoint
    ///   overrides
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required var is missing or a URL is
    /// invalid.
    pub fn from_env() -> Result<Self, Error> {
        let base_str = std::env::var("TRAILHEAD_API_URL")
            .map_err(|_| Error::Config("TRAILHEAD_API_URL is required".into()))?;
        let base: Url = base_str
            .parse()
            .map_err(|e| Error::Config(format!("TRAILHEAD_API_URL: {e}")))?;

        let mut config = Self::from_base(&base)?;

        for (var, slot) in [
            ("TRAILHEAD_LOGIN_URL", &mut config.login_url),
            ("TRAILHEAD_REFRESH_URL", &mut config.refresh_url),
            ("TRAILHEAD_LOGOUT_URL", &mut config.logout_url),
            ("TRAILHEAD_PROFILE_URL", &mut config.profile_url),
        ] {
            if let Ok(url_str) = std::env::var(var) {
                *slot = url_str
                    .parse()
                    .map_err(|e| Error::Config(format!("{var}: {e}")))?;
            }
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_login_url(mut self, url: Url) -> Self {
        self.login_url = url;
        self
    }

    #[must_use]
    pub fn with_refresh_url(mut self, url: Url) -> Self {
        self.refresh_url = url;
        self
    }

    #[must_use]
    pub fn with_logout_url(mut self, url: Url) -> Self {
        self.logout_url = url;
        self
    }

    #[must_use]
    pub fn with_profile_url(mut self, url: Url) -> Self {
        self.profile_url = url;
        self
    }
}

/// Successful login payload from the identity service.
///
/// `user_id` tolerates the field-name drift seen across service versions.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(alias = "userId", alias = "id")]
    pub user_id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Successful refresh payload. The refresh token only rotates when the
/// service says so.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Access to the remote identity service.
///
/// [`SessionManager`](crate::SessionManager) is the only consumer; nothing
/// else in the crate does network I/O. Tests substitute their own
/// implementation.
pub trait IdentityApi: Send + Sync + 'static {
    /// Exchange credentials for tokens.
    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<LoginResponse, Error>> + Send;

    /// Exchange a refresh token for a new access token.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshResponse, Error>> + Send;

    /// Revoke a refresh token. Best-effort; callers swallow failures.
    fn revoke(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Fetch the user's profile document. Best-effort after login.
    fn fetch_profile(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<serde_json::Value, Error>> + Send;
}

/// reqwest-backed [`IdentityApi`] implementation.
pub struct HttpIdentityClient {
    config: IdentityConfig,
    http: reqwest::Client,
}

impl HttpIdentityClient {
    #[must_use]
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    async fn unavailable(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Error {
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Error::ServiceUnavailable {
            operation,
            status: Some(status),
            detail,
        }
    }
}

impl IdentityApi for HttpIdentityClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, Error> {
        let params = [("username", username), ("password", password)];

        let response = self
            .http
            .post(self.config.login_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::transport("login", &e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<LoginResponse>()
                .await
                .map_err(|e| Error::transport("login", &e));
        }
        // 401/403/422 mean the credentials were rejected, not that the
        // service is down.
        if matches!(status.as_u16(), 400 | 401 | 403 | 422) {
            return Err(Error::InvalidCredentials);
        }
        Err(Self::unavailable("login", response).await)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, Error> {
        let body = serde_json::json!({ "refresh_token": refresh_token });

        let response = self
            .http
            .post(self.config.refresh_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport("refresh", &e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<RefreshResponse>()
                .await
                .map_err(|e| Error::transport("refresh", &e));
        }
        // A rejected refresh token is terminal for the session.
        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::SessionExpired);
        }
        Err(Self::unavailable("refresh", response).await)
    }

    async fn revoke(&self, access_token: &str, refresh_token: &str) -> Result<(), Error> {
        let body = serde_json::json!({ "refresh_token": refresh_token });

        let response = self
            .http
            .post(self.config.logout_url.clone())
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport("logout", &e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::unavailable("logout", response).await)
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<serde_json::Value, Error> {
        let response = self
            .http
            .get(self.config.profile_url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::transport("profile fetch", &e))?;

        if response.status().is_success() {
            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| Error::transport("profile fetch", &e))
        } else {
            Err(Self::unavailable("profile fetch", response).await)
        }
    }
}
