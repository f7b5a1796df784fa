//! JA4H HTTP client fingerprint.
//!
//! Derived from the request method, HTTP version and the decoded header
//! list (`"Name: Value"` strings). Cookie and Referer headers are
//! excluded from the header count and name hash; cookie values feed a
//! separate hash of their own.

use super::sha256_trunc;

fn method_prefix(method: &str) -> String {
    let lower = method.to_ascii_lowercase();
    lower.chars().take(2).collect()
}

fn version_code(http_version: &str) -> &'static str {
    match http_version.to_ascii_lowercase().as_str() {
        "http/0.9" | "0.9" => "09",
        "http/1.0" | "1.0" => "10",
        "http/1.1" | "1.1" | "http/1" => "11",
        "http/2" | "http/2.0" | "h2" | "2" | "2.0" => "2",
        "http/3" | "http/3.0" | "h3" | "3" | "3.0" => "3",
        _ => "00",
    }
}

fn header_name(header: &str) -> Option<String> {
    let name = header.split(':').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_ascii_lowercase())
    }
}

fn is_cookie(header: &str) -> bool {
    header.to_ascii_lowercase().starts_with("cookie:")
}

fn is_referer(header: &str) -> bool {
    let lower = header.to_ascii_lowercase();
    lower.starts_with("referer:") || lower.starts_with("referrer:")
}

fn cookie_value(header: &str) -> Option<String> {
    header
        .split_once(':')
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Sorted lowercase header names, Cookie/Referer excluded.
fn sorted_names(headers: &[String]) -> Vec<String> {
    let mut names: Vec<String> = headers
        .iter()
        .filter(|h| !is_cookie(h) && !is_referer(h))
        .filter_map(|h| header_name(h))
        .collect();
    names.sort();
    names
}

/// Sorted full Cookie header values.
fn sorted_cookies(headers: &[String]) -> Vec<String> {
    let mut cookies: Vec<String> = headers
        .iter()
        .filter(|h| is_cookie(h))
        .filter_map(|h| cookie_value(h))
        .collect();
    cookies.sort();
    cookies
}

fn header_count(headers: &[String]) -> usize {
    headers
        .iter()
        .filter(|h| !is_cookie(h) && !is_referer(h))
        .count()
        .min(99)
}

/// JA4H, hashed mode: `<m2><v2><hc>_<hhash>_<chash>`.
pub fn ja4h(method: &str, http_version: &str, headers: &[String]) -> String {
    let names = sorted_names(headers);
    let cookies = sorted_cookies(headers);

    let header_hash = sha256_trunc(&names.join(","));
    let cookie_hash = sha256_trunc(&cookies.join(";"));

    format!(
        "{}{}{:02}_{}_{}",
        method_prefix(method),
        version_code(http_version),
        header_count(headers),
        header_hash,
        cookie_hash
    )
}

/// JA4H, raw mode: the hashes replaced by the literal sorted lists,
/// `none` standing in for an empty list.
pub fn ja4h_r(method: &str, http_version: &str, headers: &[String]) -> String {
    let names = sorted_names(headers);
    let cookies = sorted_cookies(headers);

    let header_list = if names.is_empty() {
        "none".to_string()
    } else {
        names.join(",")
    };
    let cookie_list = if cookies.is_empty() {
        "none".to_string()
    } else {
        cookies.join(";")
    };

    format!(
        "{}{}{:02}_{}_{}",
        method_prefix(method),
        version_code(http_version),
        names.len().min(99),
        header_list,
        cookie_list
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::sha256_trunc;

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn trivial_get_over_h2() {
        let hs = headers(&["user-agent: x", "accept: */*"]);
        let fp = ja4h("GET", "HTTP/2", &hs);
        assert!(fp.starts_with("ge202_"));
        let parts: Vec<&str> = fp.split('_').collect();
        assert_eq!(parts[1], sha256_trunc("accept,user-agent"));
        assert_eq!(parts[2], "000000000000");
    }

    #[test]
    fn cookie_and_referer_are_excluded_from_count_and_names() {
        let hs = headers(&[
            "accept: */*",
            "cookie: a=1",
            "referer: https://example.com",
            "user-agent: x",
        ]);
        let fp = ja4h("POST", "HTTP/1.1", &hs);
        assert!(fp.starts_with("po1102_"));
        let parts: Vec<&str> = fp.split('_').collect();
        assert_eq!(parts[1], sha256_trunc("accept,user-agent"));
        assert_eq!(parts[2], sha256_trunc("a=1"));
    }

    #[test]
    fn cookies_are_sorted_before_hashing() {
        let a = headers(&["cookie: b=2", "cookie: a=1"]);
        let b = headers(&["cookie: a=1", "cookie: b=2"]);
        assert_eq!(ja4h("GET", "h2", &a), ja4h("GET", "h2", &b));
        let raw = ja4h_r("GET", "h2", &a);
        assert!(raw.ends_with("_a=1;b=2"), "raw was {}", raw);
    }

    #[test]
    fn raw_mode_uses_none_for_empty_lists() {
        let fp = ja4h_r("GET", "h3", &[]);
        assert_eq!(fp, "ge300_none_none");
    }

    #[test]
    fn unknown_version_is_00() {
        assert!(ja4h("GET", "gopher", &[]).starts_with("ge0000_"));
    }
}
