//! Content-Type header parsing.

use std::collections::HashMap;

/// A parsed `type/subtype; key=value` header.
///
/// The media type and parameter names are lowercased; parameter values keep
/// their case with surrounding quotes removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub essence: String,
    pub params: HashMap<String, String>,
}

impl MediaType {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Parse a Content-Type header value.
///
/// Returns `None` when the essence is not of the form `type/subtype`.
/// Malformed parameters (no `=`) are ignored.
pub fn parse_media_type(header: &str) -> Option<MediaType> {
    let mut parts = header.split(';');
    let essence = parts.next()?.trim().to_ascii_lowercase();

    let (ty, subtype) = essence.split_once('/')?;
    if ty.is_empty() || subtype.is_empty() || subtype.contains('/') {
        return None;
    }

    let params = parts
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_ascii_lowercase(),
                v.trim().trim_matches('"').to_string(),
            )
        })
        .filter(|(k, _)| !k.is_empty())
        .collect();

    Some(MediaType { essence, params })
}
