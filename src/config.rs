//! Server configuration.
//!
//! A single JSON document with recognised options; anything missing falls
//! back to a default. Parse failures are fatal at startup.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Runtime configuration, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port the TLS listener binds to.
    pub tls_port: String,
    /// Port the plain-HTTP redirect listener binds to.
    pub http_port: String,
    /// Bind address for both listeners.
    pub host: String,
    /// PEM certificate chain.
    pub cert_file: String,
    /// PEM private key.
    pub key_file: String,
    /// Absolute URL that plain-HTTP requests are redirected to.
    pub http_redirect: String,
    /// Write a record per request to the document store.
    pub log_to_db: bool,
    pub mongo_url: String,
    pub mongo_database: String,
    pub mongo_collection: String,
    /// Record client IPs (without the port) in analytics documents.
    pub mongo_log_ips: bool,
    /// Packet-capture interface name; empty disables capture. The capture
    /// pipeline itself is an external collaborator.
    pub device: String,
    /// Header name whose presence marks a request as an admin request and
    /// triggers permissive CORS headers on the response.
    pub cors_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tls_port: "443".to_string(),
            http_port: "80".to_string(),
            host: "0.0.0.0".to_string(),
            cert_file: String::new(),
            key_file: String::new(),
            http_redirect: "https://localhost".to_string(),
            log_to_db: false,
            mongo_url: String::new(),
            mongo_database: String::new(),
            mongo_collection: String::new(),
            mongo_log_ips: false,
            device: String::new(),
            cors_key: String::new(),
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("invalid JSON in {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Refuse to start on a configuration that cannot possibly serve.
    pub fn validate(&self) -> Result<()> {
        if self.cert_file.is_empty() || self.key_file.is_empty() {
            return Err(Error::config("cert_file and key_file are required"));
        }
        if self.tls_port.parse::<u16>().is_err() {
            return Err(Error::config(format!("invalid tls_port {:?}", self.tls_port)));
        }
        if self.http_port.parse::<u16>().is_err() {
            return Err(Error::config(format!("invalid http_port {:?}", self.http_port)));
        }
        if self.log_to_db && self.mongo_url.is_empty() {
            return Err(Error::config("log_to_db requires mongo_url"));
        }
        Ok(())
    }

    /// Socket address of the TLS listener.
    pub fn tls_addr(&self) -> String {
        format!("{}:{}", self.host, self.tls_port)
    }

    /// Socket address of the plain-HTTP redirect listener.
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    /// Whether the analytics sink should be connected at startup.
    pub fn analytics_enabled(&self) -> bool {
        !self.mongo_url.is_empty()
    }
}
