use tracing::warn;

/// Shared HTTP client factory so every outbound request carries the same
/// identifying `User-Agent`.
pub(crate) fn create_client() -> reqwest::Client {
    let user_agent = format!("lms_client/{}", env!("CARGO_PKG_VERSION"));
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|err| {
            warn!("failed to build configured HTTP client, falling back to defaults: {err}");
            reqwest::Client::new()
        })
}
