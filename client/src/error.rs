use reqwest::StatusCode;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LmsErr>;

pub(crate) const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your credentials.";
pub(crate) const PROFILE_FETCH_FAILED_MESSAGE: &str = "Failed to fetch user data";

#[derive(Error, Debug)]
pub enum LmsErr {
    /// Backend rejected the credential exchange. Carries the backend's
    /// `detail` message, or a generic fallback when none was provided.
    #[error("{0}")]
    Credentials(String),

    /// Backend rejected a registration. Carries the server's error payload
    /// verbatim (typically a JSON map of per-field validation messages).
    #[error("{0}")]
    Registration(String),

    /// A token pair was obtained but the profile endpoint could not be
    /// resolved, so no identity could be established.
    #[error("{PROFILE_FETCH_FAILED_MESSAGE}")]
    ProfileUnavailable,

    /// Unexpected HTTP status code.
    #[error("unexpected status {0}: {1}")]
    UnexpectedStatus(StatusCode, String),

    /// A session-mutating operation was called while another one was still
    /// running; the caller should wait for it to settle and retry.
    #[error("another session operation is already in flight")]
    OperationInFlight,

    /// `update_user` was called with no user loaded. No network call is made.
    #[error("no user is currently loaded")]
    NoUserLoaded,

    // -----------------------------------------------------------------
    // Automatic conversions for common external error types
    // -----------------------------------------------------------------
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failure modes of the token-refresh protocol, split the same way the
/// caller must react: permanent failures kill the session, transient ones
/// do not prove anything about the credentials.
#[derive(Debug, Error)]
pub enum RefreshTokenError {
    /// The refresh token itself is dead (missing, expired, or revoked).
    /// Stored credentials have already been purged when this is returned.
    #[error("{0}")]
    Permanent(String),

    #[error(transparent)]
    Transient(#[from] io::Error),
}

impl RefreshTokenError {
    pub(crate) fn other_with_message(message: impl Into<String>) -> Self {
        Self::Transient(io::Error::other(message.into()))
    }
}
