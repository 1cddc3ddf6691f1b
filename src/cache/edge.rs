//! Edge Tier - HTTP Caching Directives
//!
//! Results that cross an HTTP boundary carry caching headers so CDNs and
//! browsers can serve repeats without reaching this process:
//!
//! ```text
//! Cache-Control: public, s-maxage=<N>, max-age=<N/2>, stale-while-revalidate=<M>
//! Vary: Accept-Encoding
//! ETag: "<16 hex digits of the payload hash>"
//! ```
//!
//! A request whose `If-None-Match` already names the current ETag gets a
//! `304 Not Modified` with the same headers and no body.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, VARY};
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::entry::content_hash;
use crate::error::{Error, Result};

/// Edge caching windows, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpCacheOptions {
    /// Shared-cache freshness window; browsers get half of it
    pub s_maxage_secs: u64,
    /// How long a stale response may be served while revalidating
    pub stale_while_revalidate_secs: u64,
}

impl Default for HttpCacheOptions {
    fn default() -> Self {
        Self {
            s_maxage_secs: 300,
            stale_while_revalidate_secs: 600,
        }
    }
}

impl HttpCacheOptions {
    /// `Cache-Control` header value
    pub fn cache_control(&self) -> String {
        format!(
            "public, s-maxage={}, max-age={}, stale-while-revalidate={}",
            self.s_maxage_secs,
            self.s_maxage_secs / 2,
            self.stale_while_revalidate_secs
        )
    }
}

/// Strong ETag derived from the serialized payload
pub fn etag_for(body: &[u8]) -> String {
    format!("\"{:016x}\"", content_hash(body))
}

/// Whether an `If-None-Match` header value matches the given ETag.
///
/// Handles `*`, comma-separated lists and weak (`W/`) validators.
pub fn if_none_match_matches(header: &str, etag: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

/// Serialize a value to JSON and wrap it in a response carrying the
/// edge caching headers.
pub fn with_http_caching<T: Serialize + ?Sized>(
    value: &T,
    options: &HttpCacheOptions,
    if_none_match: Option<&str>,
) -> Result<Response<Full<Bytes>>> {
    let body = serde_json::to_vec(value)?;
    let etag = etag_for(&body);

    let not_modified = if_none_match.is_some_and(|header| if_none_match_matches(header, &etag));

    let builder = Response::builder()
        .header(CACHE_CONTROL, options.cache_control())
        .header(VARY, "Accept-Encoding")
        .header(ETAG, &etag);

    let response = if not_modified {
        builder
            .status(StatusCode::NOT_MODIFIED)
            .body(Full::new(Bytes::new()))
    } else {
        builder
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
    };

    response.map_err(|e| Error::Internal(e.to_string()))
}
