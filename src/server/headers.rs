//! Header-map extraction for the echo surface.
//!
//! HTTP/2 and HTTP/3 header names arrive lowercase; the HTTPBin echo
//! format presents them title-cased (`user-agent` -> `User-Agent`).
//! Repeated names merge with `"; "`.

use std::collections::BTreeMap;

use crate::server::request::RequestDescriptor;

/// Uppercase the first letter after each `-`.
pub fn normalize_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Build the echo header map from a descriptor's raw header strings.
/// Pseudo-headers are skipped; HTTP/1.1 names are kept as sent.
pub fn extract_headers(req: &RequestDescriptor) -> BTreeMap<String, String> {
    let normalize = req.http_version == "h2" || req.http_version == "h3";
    let mut map: BTreeMap<String, String> = BTreeMap::new();

    for header in &req.headers {
        if header.starts_with(':') {
            continue;
        }
        let Some((name, value)) = header.split_once(':') else {
            continue;
        };
        let name = if normalize {
            normalize_header_name(name.trim())
        } else {
            name.trim().to_string()
        };
        let value = value.trim().to_string();
        map.entry(name)
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    map
}

/// Cookie pairs from the extracted header map's `Cookie` entry.
pub fn extract_cookies(req: &RequestDescriptor) -> BTreeMap<String, String> {
    let headers = extract_headers(req);
    let mut cookies = BTreeMap::new();
    if let Some(cookie_header) = headers.get("Cookie") {
        for part in cookie_header.split("; ") {
            if let Some((name, value)) = part.split_once('=') {
                cookies.insert(name.to_string(), value.to_string());
            }
        }
    }
    cookies
}
