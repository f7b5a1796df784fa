//! JA4 TLS client fingerprint (hashed and raw variants).
//!
//! The three parts mix sorted and wire-ordered lists deliberately:
//! part B ciphers and part C extensions are sorted, part C signature
//! algorithms stay in wire order.

use super::clienthello::{is_grease, ClientHello};
use super::sha256_trunc;

/// Extension ids excluded from the JA4 extension count and part C.
const EXT_SNI: u16 = 0x0000;
const EXT_ALPN: u16 = 0x0010;
const EXT_PADDING: u16 = 0x0015;

fn tls_version_code(negotiated_version: &str) -> &str {
    match negotiated_version {
        "769" => "10",
        "770" => "11",
        "771" => "12",
        "772" => "13",
        other => other,
    }
}

fn sni_mode(hello: &ClientHello) -> char {
    match hello.sni.as_deref() {
        Some(name) if !name.is_empty() => {
            if name.parse::<std::net::IpAddr>().is_ok() {
                'i'
            } else {
                'd'
            }
        }
        _ => 'd',
    }
}

fn first_alpn(hello: &ClientHello) -> String {
    let Some(alpn) = hello.alpn_protocols.first() else {
        return "00".to_string();
    };
    match alpn.to_ascii_lowercase().as_str() {
        "h2" | "2" => "h2".to_string(),
        "h3" => "h3".to_string(),
        "http/1.1" | "1.1" | "http/1.0" | "1.0" | "http/0.9" | "0.9" => "h1".to_string(),
        _ => {
            let chars: Vec<char> = alpn.chars().collect();
            match chars.len() {
                0 => "00".to_string(),
                1 => format!("{}{}", chars[0], chars[0]),
                n => format!("{}{}", chars[0], chars[n - 1]),
            }
        }
    }
}

/// Part A: protocol marker, TLS version, SNI mode, capped cipher and
/// extension counts, first-ALPN code.
fn ja4_a(hello: &ClientHello, negotiated_version: &str) -> String {
    let num_ciphers = hello
        .cipher_suites
        .iter()
        .filter(|&&c| !is_grease(c))
        .count()
        .min(99);
    let num_extensions = hello
        .extensions
        .iter()
        .filter(|e| !e.grease && e.id != EXT_SNI && e.id != EXT_ALPN)
        .count()
        .min(99);

    format!(
        "t{}{}{:02}{:02}{}",
        tls_version_code(negotiated_version),
        sni_mode(hello),
        num_ciphers,
        num_extensions,
        first_alpn(hello)
    )
}

/// Part B raw: non-GREASE cipher ids as 4-hex-digit lowercase, sorted
/// ascending, comma-joined.
fn ja4_b_raw(hello: &ClientHello) -> String {
    let mut ciphers: Vec<String> = hello
        .cipher_suites
        .iter()
        .filter(|&&c| !is_grease(c))
        .map(|c| format!("{:04x}", c))
        .collect();
    ciphers.sort();
    ciphers.join(",")
}

/// Part C raw: sorted extension ids (minus GREASE, SNI, ALPN, padding),
/// then `_` and the signature algorithms in wire order.
fn ja4_c_raw(hello: &ClientHello) -> String {
    let mut extensions: Vec<String> = hello
        .extensions
        .iter()
        .filter(|e| {
            !e.grease && e.id != EXT_SNI && e.id != EXT_ALPN && e.id != EXT_PADDING
        })
        .map(|e| format!("{:04x}", e.id))
        .collect();
    extensions.sort();

    let sigalgs: Vec<String> = hello
        .signature_algorithms
        .iter()
        .filter(|&&a| !is_grease(a))
        .map(|a| format!("{:04x}", a))
        .collect();

    let mut out = extensions.join(",");
    if !sigalgs.is_empty() {
        out.push('_');
        out.push_str(&sigalgs.join(","));
    }
    out
}

/// JA4 with hashed parts B and C.
pub fn ja4(hello: &ClientHello, negotiated_version: &str) -> String {
    format!(
        "{}_{}_{}",
        ja4_a(hello, negotiated_version),
        sha256_trunc(&ja4_b_raw(hello)),
        sha256_trunc(&ja4_c_raw(hello))
    )
}

/// JA4 raw mode: parts B and C as their literal lists.
pub fn ja4_r(hello: &ClientHello, negotiated_version: &str) -> String {
    format!(
        "{}_{}_{}",
        ja4_a(hello, negotiated_version),
        ja4_b_raw(hello),
        ja4_c_raw(hello)
    )
}
