//! # echoprint
//!
//! TLS/HTTP fingerprinting echo service.
//!
//! Terminates TLS, dissects the ClientHello as it arrived on the wire,
//! derives the JA3/JA4/JA4H/PeetPrint/Akamai fingerprint family, and
//! serves an HTTPBin-style surface over HTTP/1.1, HTTP/2 and (through
//! an external QUIC stack) HTTP/3 so that client libraries can see how
//! they look to a server.

// Core modules
pub mod analytics;
pub mod config;
pub mod error;

// Dissector and fingerprint kernel
pub mod fingerprint;

// Protocol engines
pub mod transport;

// Routing and the HTTPBin surface
pub mod server;

// Re-exports for convenient access
pub use config::Config;
pub use error::{Error, Result};
pub use fingerprint::{akamai_fingerprint, dissect, ja3, ja4, ja4_r, ja4h, ja4h_r, peetprint};
pub use server::request::{FingerprintBlock, RequestDescriptor, ResponseDirective};
pub use server::AppState;
