//! TLS and HTTP fingerprint derivation.
//!
//! The dissector turns raw ClientHello bytes into an ordered, typed
//! structure; the kernel modules turn that structure (and captured HTTP
//! state) into the externally observable fingerprint strings.

pub mod akamai;
pub mod clienthello;
pub mod ja3;
pub mod ja4;
pub mod ja4h;

pub use akamai::akamai_fingerprint;
pub use clienthello::{dissect, is_grease, ClientHello};
pub use ja3::{ja3, peetprint};
pub use ja4::{ja4, ja4_r};
pub use ja4h::{ja4h, ja4h_r};

/// MD5 of a string as 32 lowercase hex chars.
pub(crate) fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// First 12 lowercase hex chars of SHA-256, or the all-zero sentinel for
/// empty input (the JA4 family convention).
pub(crate) fn sha256_trunc(input: &str) -> String {
    use sha2::{Digest, Sha256};
    if input.is_empty() {
        return "000000000000".to_string();
    }
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
