//! HTTP/3 adapter.
//!
//! The QUIC transport itself — UDP socket handling, connection state,
//! stream events, and the WebSocket upgrade on `/ws` — lives in the
//! external quiche-based stack. This module is the thin surface between
//! that stack and the shared response pipeline: it converts a delivered
//! request into a [`RequestDescriptor`] carrying the session's
//! fingerprint block, runs the router, and renders the directive back
//! into a header list and body for the QUIC side to emit.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use quiche::h3::NameValue;
use tracing::warn;

use crate::fingerprint::{ja4h, ja4h_r};
use crate::server::request::{
    resolve_directive, FingerprintBlock, RequestDescriptor, ResolvedResponse,
};
use crate::server::{
    admin_headers, content_encoding_for_path, generate_request_id, is_admin_request, AppState,
    ALT_SVC,
};

/// The path reserved for the external stack's WebSocket echo.
pub const WEBSOCKET_PATH: &str = "/ws";

/// A rendered HTTP/3 response, ready for the QUIC stack to serialize.
#[derive(Debug, Clone)]
pub struct H3Response {
    pub status: u16,
    /// `(name, value)` pairs in emission order, `:status` first.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Requests the adapter must not answer itself.
pub fn is_websocket_request(path: &str) -> bool {
    path == WEBSOCKET_PATH
}

/// Convert a QUIC-delivered header list plus body into the shared
/// request descriptor. The fingerprint block comes from the session's
/// TLS 1.3 ClientHello, dissected at connection establishment.
pub fn descriptor_from_request<H: NameValue>(
    headers: &[H],
    body: Vec<u8>,
    ip: String,
    tls: FingerprintBlock,
) -> RequestDescriptor {
    let mut method = String::new();
    let mut path = String::new();
    let mut user_agent = String::new();
    let mut header_strings = Vec::with_capacity(headers.len());

    for header in headers {
        let name = String::from_utf8_lossy(header.name()).into_owned();
        let value = String::from_utf8_lossy(header.value()).into_owned();
        match name.as_str() {
            ":method" => method = value.clone(),
            ":path" => path = value.clone(),
            "user-agent" => user_agent = value.clone(),
            _ => {}
        }
        header_strings.push(format!("{}: {}", name, value));
    }

    let mut tls = tls;
    tls.ja4h = ja4h(&method, "h3", &header_strings);
    tls.ja4h_r = ja4h_r(&method, "h3", &header_strings);

    RequestDescriptor {
        ip,
        http_version: "h3".to_string(),
        method,
        path,
        user_agent,
        headers: header_strings,
        body,
        tls,
        http1: None,
        http2: None,
    }
}

/// Run the shared router for an HTTP/3 request and render the response
/// with the same tracking headers the other engines emit.
pub async fn respond(descriptor: RequestDescriptor, state: Arc<AppState>) -> H3Response {
    let started = Instant::now();
    let request_id = generate_request_id();

    state.log_request(&descriptor);

    let routed = AssertUnwindSafe(crate::server::router::route(&descriptor, &state))
        .catch_unwind()
        .await;
    let mut resolved = match routed {
        Ok(directive) => resolve_directive(directive, descriptor.path_only()),
        Err(_) => {
            warn!(path = %descriptor.path, "handler panicked");
            ResolvedResponse {
                status: 500,
                content_type: "text/plain".to_string(),
                body: Vec::new(),
                extra_headers: Vec::new(),
            }
        }
    };

    let admin = is_admin_request(&state.config, &descriptor.method, &descriptor.headers);

    let mut headers: Vec<(String, String)> = vec![
        (":status".to_string(), resolved.status.to_string()),
        ("server".to_string(), "TrackMe".to_string()),
        ("content-length".to_string(), resolved.body.len().to_string()),
        ("content-type".to_string(), resolved.content_type.clone()),
        ("x-request-id".to_string(), request_id),
        (
            "x-response-time".to_string(),
            started.elapsed().as_millis().to_string(),
        ),
    ];
    headers.append(&mut resolved.extra_headers);
    if let Some(encoding) = content_encoding_for_path(descriptor.path_only()) {
        headers.push(("content-encoding".to_string(), encoding.to_string()));
    }
    headers.push(("alt-svc".to_string(), ALT_SVC.to_string()));
    if admin {
        for (name, value) in admin_headers() {
            headers.push((name.to_lowercase(), value.to_string()));
        }
    }

    H3Response {
        status: resolved.status,
        headers,
        body: resolved.body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiche::h3::Header;

    #[test]
    fn descriptor_extracts_pseudo_headers() {
        let headers = vec![
            Header::new(b":method", b"GET"),
            Header::new(b":path", b"/api/clean"),
            Header::new(b":scheme", b"https"),
            Header::new(b"user-agent", b"quic-client"),
        ];
        let descriptor = descriptor_from_request(
            &headers,
            Vec::new(),
            "203.0.113.9:4433".to_string(),
            FingerprintBlock::default(),
        );
        assert_eq!(descriptor.http_version, "h3");
        assert_eq!(descriptor.method, "GET");
        assert_eq!(descriptor.path, "/api/clean");
        assert_eq!(descriptor.user_agent, "quic-client");
        assert!(descriptor.tls.ja4h.starts_with("ge3"));
    }

    #[test]
    fn websocket_path_is_reserved() {
        assert!(is_websocket_request("/ws"));
        assert!(!is_websocket_request("/get"));
    }
}
