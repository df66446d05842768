//! Wire format for stored entries: an ASCII version prefix followed by a
//! msgpack-encoded payload. Legacy prefixes are recognized but always decode
//! to a miss; this build only ever writes the current version.

use std::collections::HashMap;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::{BadHeader, BadVersion};
use crate::key::vary_matches;

pub const CURRENT_VERSION: u8 = 4;

/// Header values are stored as raw bytes; HTTP header values are not
/// guaranteed to be valid UTF-8 and the wire format must round-trip them
/// exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredHeader {
    pub name: String,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Vec<StoredHeader>,
    /// HTTP version the response was originally received at, as the integer
    /// coding used by the grounding crate's streaming manager (9/10/11/2/3).
    pub version: u16,
    /// Whether the stored body is still subject to a `Content-Encoding`
    /// (gzip, br, ...) this crate never decodes; callers re-serving the
    /// bytes must honor whatever `Content-Encoding` header comes back with
    /// `to_header_map` rather than assume an identity body.
    pub decode_content: bool,
}

/// Maps an `http::Version` to its wire integer. Falls back to HTTP/1.1 for
/// any version this build doesn't otherwise recognize.
pub fn version_to_u16(version: http::Version) -> u16 {
    match version {
        http::Version::HTTP_09 => 9,
        http::Version::HTTP_10 => 10,
        http::Version::HTTP_2 => 2,
        http::Version::HTTP_3 => 3,
        _ => 11,
    }
}

/// Inverse of [`version_to_u16`]. Unrecognized codes are a [`BadVersion`],
/// not a panic: a stored entry from a future build could carry one.
pub fn version_from_u16(code: u16) -> Result<http::Version, BadVersion> {
    match code {
        9 => Ok(http::Version::HTTP_09),
        10 => Ok(http::Version::HTTP_10),
        11 => Ok(http::Version::HTTP_11),
        2 => Ok(http::Version::HTTP_2),
        3 => Ok(http::Version::HTTP_3),
        other => Err(BadVersion(other.to_string())),
    }
}

impl ResponseMetadata {
    /// Rebuilds a `HeaderMap` from the stored headers, skipping (and
    /// logging) any name or value that no longer parses as a valid `http`
    /// header -- this can only happen via disk corruption or a foreign
    /// writer, since this crate itself never stores an invalid one.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for h in &self.headers {
            let name = http::header::HeaderName::from_bytes(h.name.as_bytes());
            let value = http::header::HeaderValue::from_bytes(&h.value);
            match (name, value) {
                (Ok(name), Ok(value)) => {
                    map.append(name, value);
                }
                _ => {
                    let err = BadHeader(h.name.clone());
                    log::debug!("dropping unparsable stored header: {err}");
                }
            }
        }
        map
    }

    pub fn from_parts(
        status: http::StatusCode,
        version: http::Version,
        decode_content: bool,
        headers: &HeaderMap,
    ) -> Self {
        ResponseMetadata {
            status: status.as_u16(),
            reason: status.canonical_reason().map(|s| s.to_string()),
            headers: headers
                .iter()
                .map(|(k, v)| StoredHeader { name: k.as_str().to_string(), value: v.as_bytes().to_vec() })
                .collect(),
            version: version_to_u16(version),
            decode_content,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub metadata: ResponseMetadata,
    pub vary_map: HashMap<String, String>,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

/// Encodes an entry as `cc=<version>,<msgpack payload>`.
pub fn encode(entry: &CachedEntry) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    let payload = rmp_serde::to_vec(entry)?;
    let mut out = format!("cc={CURRENT_VERSION},").into_bytes();
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parses the `cc=<version>,` prefix and msgpack payload, without checking
/// Vary. `None` on any malformed input or unrecognized/legacy version;
/// never panics on attacker- or disk-corruption-controlled bytes.
pub(crate) fn decode_entry_unchecked(bytes: &[u8]) -> Option<CachedEntry> {
    let text_prefix_end = bytes.iter().position(|&b| b == b',')?;
    let prefix = std::str::from_utf8(&bytes[..text_prefix_end]).ok()?;
    let version_str = prefix.strip_prefix("cc=")?;
    let version: u8 = version_str.parse().ok()?;
    if version != CURRENT_VERSION {
        // Versions 0-3 are legacy and intentionally unsupported: miss, not error.
        let err = BadVersion(version.to_string());
        log::debug!("stored entry has an unsupported wire version: {err}");
        return None;
    }
    let payload = &bytes[text_prefix_end + 1..];
    rmp_serde::from_slice(payload).ok()
}

/// Decodes a stored byte string for `request_headers`, returning `None` on
/// any malformed input, an unrecognized/legacy version, or a Vary mismatch.
pub fn decode(bytes: &[u8], request_headers: &HeaderMap) -> Option<CachedEntry> {
    let entry = decode_entry_unchecked(bytes)?;
    if !vary_matches(&entry.vary_map, request_headers) {
        return None;
    }
    Some(entry)
}
