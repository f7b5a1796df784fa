//! JA3 and PeetPrint TLS fingerprints.
//!
//! Both are built from ordered ClientHello fields. JA3 drops GREASE
//! values entirely; PeetPrint keeps their positions, rendered as the
//! literal `GREASE` token.

use super::clienthello::{is_grease, ClientHello};
use super::md5_hex;

fn join_decimal(values: impl Iterator<Item = u16>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

fn join_decimal_grease(values: &[u16]) -> String {
    values
        .iter()
        .map(|&v| {
            if is_grease(v) {
                "GREASE".to_string()
            } else {
                v.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// JA3 string and its MD5 hash.
///
/// `<ver>,<ciphers>,<extensions>,<groups>,<ec_point_formats>` with each
/// list dash-joined in wire order and GREASE omitted.
pub fn ja3(hello: &ClientHello) -> (String, String) {
    let ciphers = join_decimal(hello.cipher_suites.iter().copied().filter(|v| !is_grease(*v)));
    let extensions = join_decimal(
        hello
            .extensions
            .iter()
            .filter(|e| !e.grease)
            .map(|e| e.id),
    );
    let groups = join_decimal(
        hello
            .supported_groups
            .iter()
            .copied()
            .filter(|v| !is_grease(*v)),
    );
    let points = hello
        .ec_point_formats
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("-");

    let fp = format!(
        "{},{},{},{},{}",
        hello.handshake_version, ciphers, extensions, groups, points
    );
    let hash = md5_hex(&fp);
    (fp, hash)
}

/// PeetPrint string and its MD5 hash.
///
/// `<groups>|<alpns>|<sigalgs>|<extension_ids>` — every field keeps the
/// exact wire order, GREASE positions included.
pub fn peetprint(hello: &ClientHello) -> (String, String) {
    let groups = join_decimal_grease(&hello.supported_groups);
    let alpns = hello.alpn_protocols.join("-");
    let sigalgs = join_decimal_grease(&hello.signature_algorithms);
    let extensions = join_decimal_grease(&hello.extension_ids());

    let fp = format!("{}|{}|{}|{}", groups, alpns, sigalgs, extensions);
    let hash = md5_hex(&fp);
    (fp, hash)
}
