//! Root of the `lms-client` library: token-based session handling for the
//! LMS REST backend.
//!
//! The [`SessionManager`] owns the authentication state and its
//! transitions; the [`ApiClient`] attaches bearer credentials to outgoing
//! requests and recovers once per request from an expired access token.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod auth;
pub mod client;
pub mod config;
pub(crate) mod default_client;
pub mod error;
pub mod models;
pub(crate) mod util;

// Re-export the common surface for consumers.
pub use auth::CredentialsStoreMode;
pub use auth::SessionManager;
pub use auth::SessionState;
pub use auth::StoredAuth;
pub use auth::TokenStorage;
pub use auth::create_token_storage;
pub use client::ApiClient;
pub use client::SessionEvent;
pub use config::Config;
pub use config::DEFAULT_BASE_URL;
pub use error::LmsErr;
pub use error::RefreshTokenError;
pub use error::Result;
pub use models::RegisterRequest;
pub use models::Role;
pub use models::User;
pub use models::UserUpdate;
