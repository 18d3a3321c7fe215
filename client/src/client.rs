use chrono::Utc;
use reqwest::Method;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::auth::StoredAuth;
use crate::auth::TokenStorage;
use crate::config::Config;
use crate::default_client::create_client;
use crate::error::LOGIN_FAILED_MESSAGE;
use crate::error::LmsErr;
use crate::error::RefreshTokenError;
use crate::error::Result;
use crate::models::RefreshRequest;
use crate::models::RefreshResponse;
use crate::models::RegisterRequest;
use crate::models::TokenRequest;
use crate::models::TokenResponse;
use crate::models::User;
use crate::models::UserListOrOne;
use crate::models::UserUpdate;
use crate::models::VerifyRequest;
use crate::util::parse_error_detail;
use crate::util::try_parse_error_message;

const REGISTRATION_FAILED_MESSAGE: &str = "Registration failed. Please try again.";

/// Broadcast when stored credentials are purged because token recovery
/// failed for good. The hosting shell decides how to react (typically by
/// routing to its login surface); the library performs no navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Invalidated { reason: String },
}

/// Thin wrapper over the backend REST contract. Attaches the stored bearer
/// token to outgoing requests and recovers at most once per request from an
/// expired access token.
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<dyn TokenStorage>,
    /// Serializes refresh attempts so concurrent 401s share one refresh call.
    refresh_gate: Mutex<()>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl ApiClient {
    pub fn new(config: &Config, storage: Arc<dyn TokenStorage>) -> Self {
        let (events_tx, _) = broadcast::channel(16);
        Self {
            http: create_client(),
            base_url: config.base_url.clone(),
            storage,
            refresh_gate: Mutex::new(()),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn access_token(&self) -> Option<String> {
        self.storage
            .load()
            .ok()
            .flatten()
            .filter(|auth| !auth.access_token.is_empty())
            .map(|auth| auth.access_token)
    }

    /// Exchanges credentials for a token pair via `POST /token/`. Does not
    /// persist anything; the session manager owns the write.
    pub async fn obtain_token(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(self.endpoint("/token/"))
            .json(&TokenRequest { username, password })
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            let message =
                parse_error_detail(&body).unwrap_or_else(|| LOGIN_FAILED_MESSAGE.to_string());
            Err(LmsErr::Credentials(message))
        }
    }

    /// Asks the backend whether `token` is still valid. Transport failures
    /// count as "not valid": the caller falls through to the refresh branch
    /// either way.
    pub async fn verify_token(&self, token: &str) -> bool {
        let outcome = self
            .http
            .post(self.endpoint("/token/verify/"))
            .json(&VerifyRequest { token })
            .send()
            .await;
        match outcome {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!("token verification request failed: {err}");
                false
            }
        }
    }

    /// Mints a new access token from the stored refresh token and persists
    /// it. Any failure purges the stored credentials and broadcasts
    /// [`SessionEvent::Invalidated`] exactly once.
    ///
    /// `stale_access` is the access token the caller just saw rejected; if a
    /// concurrent refresh already replaced it while this task waited on the
    /// gate, the stored token is reused instead of minting another one.
    pub(crate) async fn refresh_access_token(
        &self,
        stale_access: Option<&str>,
    ) -> std::result::Result<String, RefreshTokenError> {
        let _gate = self.refresh_gate.lock().await;

        let stored = match self.storage.load() {
            Ok(stored) => stored,
            Err(err) => return Err(self.invalidate(RefreshTokenError::Transient(err))),
        };
        if let Some(auth) = &stored
            && !auth.access_token.is_empty()
            && stale_access.is_some_and(|stale| stale != auth.access_token)
        {
            return Ok(auth.access_token.clone());
        }

        let auth = stored.filter(|auth| !auth.refresh_token.is_empty());
        let Some(auth) = auth else {
            return Err(self.invalidate(RefreshTokenError::Permanent(
                "No refresh token found".to_string(),
            )));
        };

        match self.try_refresh(auth).await {
            Ok(access) => Ok(access),
            Err(err) => Err(self.invalidate(err)),
        }
    }

    async fn try_refresh(
        &self,
        mut auth: StoredAuth,
    ) -> std::result::Result<String, RefreshTokenError> {
        info!("Refreshing token");
        let response = self
            .http
            .post(self.endpoint("/token/refresh/"))
            .json(&RefreshRequest { refresh: &auth.refresh_token })
            .send()
            .await
            .map_err(|err| RefreshTokenError::Transient(io::Error::other(err)))?;

        let status = response.status();
        if status.is_success() {
            let refreshed = response
                .json::<RefreshResponse>()
                .await
                .map_err(|err| RefreshTokenError::Transient(io::Error::other(err)))?;
            auth.access_token = refreshed.access.clone();
            if let Some(refresh) = refreshed.refresh {
                auth.refresh_token = refresh;
            }
            auth.last_refresh = Some(Utc::now());
            self.storage.save(&auth).map_err(RefreshTokenError::Transient)?;
            Ok(refreshed.access)
        } else {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                Err(RefreshTokenError::Permanent(try_parse_error_message(&body)))
            } else {
                Err(RefreshTokenError::other_with_message(format!(
                    "Failed to refresh token: {status}: {}",
                    try_parse_error_message(&body)
                )))
            }
        }
    }

    fn invalidate(&self, err: RefreshTokenError) -> RefreshTokenError {
        error!("Failed to refresh token: {err}");
        if let Err(purge_err) = self.storage.delete() {
            warn!("failed to purge stored credentials: {purge_err}");
        }
        let _ = self.events_tx.send(SessionEvent::Invalidated { reason: err.to_string() });
        err
    }

    /// Issues an authorized request; on a 401, refreshes once and re-issues
    /// the original request with the new token. A 401 on the retried request
    /// propagates without another refresh.
    async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let access = self.access_token();
        let response = self.issue(method.clone(), path, body, access.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let status = response.status();
        let rejection = response.text().await.unwrap_or_default();
        match self.refresh_access_token(access.as_deref()).await {
            Ok(fresh) => self.issue(method, path, body, Some(&fresh)).await,
            // Credentials are gone; surface the original rejection.
            Err(_) => Err(LmsErr::UnexpectedStatus(status, try_parse_error_message(&rejection))),
        }
    }

    async fn issue(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.request(method, self.endpoint(path));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn deserialize_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(LmsErr::UnexpectedStatus(status, try_parse_error_message(&body)))
        }
    }

    /// Creates an account via `POST /user/auth/`. No token side effects.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let body = serde_json::to_value(request)?;
        let response = self.send_authorized(Method::POST, "/user/auth/", Some(&body)).await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            // Validation payloads pass through verbatim so callers can
            // surface per-field errors.
            let body = response.text().await.unwrap_or_default();
            let message = if body.is_empty() {
                REGISTRATION_FAILED_MESSAGE.to_string()
            } else {
                body
            };
            Err(LmsErr::Registration(message))
        }
    }

    /// Fetches the caller's profile from `GET /user/auth/`. Admins receive
    /// the full user list; their own record is the first element.
    pub async fn current_user(&self) -> Result<User> {
        let response = self.send_authorized(Method::GET, "/user/auth/", None).await?;
        let reply: UserListOrOne = Self::deserialize_response(response).await?;
        reply.into_current().ok_or_else(|| {
            LmsErr::UnexpectedStatus(StatusCode::OK, "profile reply contained no users".to_string())
        })
    }

    pub async fn update_user(&self, id: i64, patch: &UserUpdate) -> Result<User> {
        let body = serde_json::to_value(patch)?;
        let response = self
            .send_authorized(Method::PUT, &format!("/user/auth/{id}/"), Some(&body))
            .await?;
        Self::deserialize_response(response).await
    }
}
