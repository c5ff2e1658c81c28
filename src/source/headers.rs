use std::collections::BTreeMap;

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, USER_AGENT,
};

use crate::error::{Error, Result};

/// Desktop Chrome user agent the upstream site accepts without challenge
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Accept header for the JSON API
pub const ACCEPT_JSON: &str = "application/json, text/plain, */*";

/// Accept header for the HTML page
pub const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Build browser-like headers for an upstream request
///
/// Accept-Encoding is left to the HTTP client so that it only advertises
/// encodings it can decode.
///
/// # Arguments
///
/// * `user_agent` - User agent string
/// * `accept` - Accept header matching the expected payload type
///
/// # Examples
///
/// ```
/// use flashfeed::source::headers::{build_browser_headers, ACCEPT_JSON, DESKTOP_USER_AGENT};
///
/// let headers = build_browser_headers(DESKTOP_USER_AGENT, ACCEPT_JSON).unwrap();
/// assert!(headers.contains_key("user-agent"));
/// ```
pub fn build_browser_headers(user_agent: &str, accept: &'static str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|e| Error::config(format!("Invalid user agent: {e}")))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static(accept));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    Ok(headers)
}

/// Merge configured extra headers into `headers`, overriding existing entries
pub fn apply_extra_headers(
    headers: &mut HeaderMap,
    extra: &BTreeMap<String, String>,
) -> Result<()> {
    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::config(format!("Invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::config(format!("Invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }

    Ok(())
}
