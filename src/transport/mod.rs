//! Protocol engines and TLS plumbing.

pub mod h1;
pub mod h2;
pub mod h3;
pub mod tls;
