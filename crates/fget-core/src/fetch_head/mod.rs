//! HTTP HEAD / metadata probing.
//!
//! Uses the curl crate (libcurl) to fetch response headers and confirm
//! `Content-Length`, `Accept-Ranges: bytes`, and capture ETag/Last-Modified
//! for resume safety.

mod parse;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::str;

use crate::transport::TransportOptions;

/// Result of a HEAD request: key headers needed for segmented download and resume.
#[derive(Debug, Clone)]
pub struct HeadResult {
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// True if server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    /// `ETag` value if present (used for resume validation).
    pub etag: Option<String>,
    /// `Last-Modified` value if present (used for resume validation).
    pub last_modified: Option<String>,
    /// `Content-Disposition` value if present (filename hint).
    pub content_disposition: Option<String>,
}

/// Performs a HEAD request and returns parsed metadata.
///
/// Follows redirects. Applies `transport` (proxy/TLS/timeouts) before the
/// request. Runs synchronously on the calling thread. Some servers reject
/// HEAD outright (405/501) for paths they'll happily serve GET on; when that
/// happens this falls back to a single-byte ranged GET (`Range: bytes=0-0`)
/// and reads the same metadata off that response instead.
pub fn probe(
    url: &str,
    custom_headers: &HashMap<String, String>,
    transport: &TransportOptions,
) -> Result<HeadResult> {
    let (code, headers) = request(url, custom_headers, transport, true)?;
    if (200..300).contains(&code) {
        return parse::parse_headers(&headers);
    }

    let (code, headers) = request(url, custom_headers, transport, false)?;
    if !(200..300).contains(&code) {
        anyhow::bail!("GET {} returned HTTP {} (HEAD also rejected)", url, code);
    }

    parse::parse_headers(&headers)
}

/// Issues either a HEAD (`head == true`) or a single-byte ranged GET
/// (`Range: bytes=0-0`, used as a HEAD fallback) and collects the response
/// status and header lines. The GET body itself is discarded; only headers
/// are needed here.
fn request(
    url: &str,
    custom_headers: &HashMap<String, String>,
    transport: &TransportOptions,
    head: bool,
) -> Result<(u32, Vec<String>)> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    if head {
        easy.nobody(true)?;
    } else {
        easy.range("0-0")?;
    }
    easy.follow_location(true)?;
    transport.apply(&mut easy)?;

    let mut list = curl::easy::List::new();
    for (k, v) in custom_headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if !custom_headers.is_empty() {
        easy.http_headers(list)?;
    }

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.write_function(|data| data.len())?;
        let label = if head { "HEAD" } else { "GET" };
        transfer
            .perform()
            .with_context(|| format!("{} request failed", label))?;
    }

    let code = easy.response_code().context("no response code")?;
    Ok((code, headers))
}
