use tracing::debug;

/// Pulls the human-readable message out of a backend error body.
///
/// The backend reports most failures as `{"detail": "..."}`; validation
/// errors come back as field maps and are passed through verbatim.
pub(crate) fn parse_error_detail(text: &str) -> Option<String> {
    let json = serde_json::from_str::<serde_json::Value>(text).ok()?;
    json.get("detail")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

pub(crate) fn try_parse_error_message(text: &str) -> String {
    debug!("Parsing server error response: {}", text);
    if let Some(detail) = parse_error_detail(text) {
        return detail;
    }
    if text.is_empty() {
        return "Unknown error".to_string();
    }
    text.to_string()
}
