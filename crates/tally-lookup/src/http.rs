//! Shared plumbing for the reqwest-backed clients.

use reqwest::StatusCode;
use serde_json::Number;
use std::time::Duration;
use url::Url;

use tally_core::Money;

use crate::error::{LookupError, Result};

/// User agent sent to every source. Open*Facts asks clients to identify
/// themselves.
pub(crate) const USER_AGENT: &str = concat!("Tally/", env!("CARGO_PKG_VERSION"));

/// Builds a client with the per-request timeout as a transport-level bound.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .gzip(true)
        .build()
        .map_err(|e| LookupError::InvalidConfig(format!("HTTP client: {}", e)))
}

/// Appends path segments to `base`, percent-encoding each one.
///
/// `endpoint("https://x.org/api", &["product", "123.json"])`
/// → `https://x.org/api/product/123.json`
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| LookupError::InvalidUrl(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Maps a non-success status to an error. 404 is left to the caller.
pub(crate) fn status_error(source_name: &str, status: StatusCode) -> LookupError {
    LookupError::HttpStatus {
        source_name: source_name.to_string(),
        status: status.as_u16(),
    }
}

/// Converts a JSON number into money through its decimal text, so the
/// amount never passes through float arithmetic. Negative and
/// exponent-form values are rejected.
pub(crate) fn money_from_json(number: &Number) -> Option<Money> {
    Money::parse_decimal(&number.to_string()).ok()
}
