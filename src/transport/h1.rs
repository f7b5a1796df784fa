//! HTTP/1.1 line engine.
//!
//! One request per connection: read the head of the request off the
//! decrypted stream, parse the request line and headers, answer, close.
//! A malformed request line still gets a response, with `--` standing in
//! for the missing tokens.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::Result;
use crate::fingerprint::{ja4h, ja4h_r};
use crate::server::headers::normalize_header_name;
use crate::server::request::{
    resolve_directive, FingerprintBlock, H1Details, RequestDescriptor, ResolvedResponse,
};
use crate::server::{
    admin_headers, content_encoding_for_path, generate_request_id, is_admin_request, AppState,
    ALT_SVC,
};

/// The engine reads at most this much of a request.
const MAX_REQUEST_BYTES: usize = 1024;
/// How long to wait for bytes beyond the sniffed prefix.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// The decoded request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    pub user_agent: String,
    pub headers: Vec<String>,
}

/// Parse the head of a request. Any line with a colon counts as a
/// header; a request line without exactly three tokens degrades to `--`
/// markers.
pub fn parse_request(raw: &[u8]) -> ParsedRequest {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.split("\r\n");
    let first_line = lines.next().unwrap_or_default();

    let mut headers = Vec::new();
    let mut user_agent = String::new();
    for line in lines {
        if !line.contains(':') {
            continue;
        }
        headers.push(line.to_string());
        if line.to_ascii_lowercase().starts_with("user-agent") {
            if let Some((_, value)) = line.split_once(':') {
                user_agent = value.trim().to_string();
            }
        }
    }

    let tokens: Vec<&str> = first_line.split(' ').collect();
    if tokens.len() != 3 {
        return ParsedRequest {
            method: "--".to_string(),
            path: "--".to_string(),
            version: "--".to_string(),
            user_agent,
            headers,
        };
    }

    ParsedRequest {
        method: tokens[0].to_string(),
        path: tokens[1].to_string(),
        version: tokens[2].to_ascii_lowercase(),
        user_agent,
        headers,
    }
}

/// Serve one HTTP/1.1 exchange. `prefix` holds the bytes protocol
/// detection already consumed.
pub async fn serve<S>(
    mut stream: S,
    prefix: Vec<u8>,
    ip: String,
    tls: FingerprintBlock,
    state: Arc<AppState>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let mut raw = prefix;
    if raw.len() < MAX_REQUEST_BYTES {
        // One bounded read for the rest of the head; whatever arrived in
        // time is what gets parsed.
        let mut tail = vec![0u8; MAX_REQUEST_BYTES - raw.len()];
        match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut tail)).await {
            Ok(Ok(n)) => raw.extend_from_slice(&tail[..n]),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {}
        }
    }

    let parsed = parse_request(&raw);

    let mut tls = tls;
    tls.ja4h = ja4h(&parsed.method, &parsed.version, &parsed.headers);
    tls.ja4h_r = ja4h_r(&parsed.method, &parsed.version, &parsed.headers);

    let descriptor = RequestDescriptor {
        ip,
        http_version: if parsed.version == "--" {
            "--".to_string()
        } else {
            "http/1.1".to_string()
        },
        method: parsed.method.clone(),
        path: parsed.path.clone(),
        user_agent: parsed.user_agent.clone(),
        headers: parsed.headers.clone(),
        body: Vec::new(),
        tls,
        http1: Some(H1Details {
            headers: parsed.headers,
        }),
        http2: None,
    };

    let started = Instant::now();
    let request_id = generate_request_id();

    state.log_request(&descriptor);

    // OPTIONS preflights skip the router and just carry the CORS trio.
    let mut admin = is_admin_request(&state.config, &descriptor.method, &descriptor.headers);
    let resolved = if descriptor.method == "OPTIONS" {
        admin = true;
        ResolvedResponse {
            status: 200,
            content_type: "text/plain".to_string(),
            body: Vec::new(),
            extra_headers: Vec::new(),
        }
    } else {
        let routed = AssertUnwindSafe(crate::server::router::route(&descriptor, &state))
            .catch_unwind()
            .await;
        match routed {
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
        }
    };

    let response = render_response(
        &resolved,
        descriptor.path_only(),
        &request_id,
        started.elapsed().as_millis(),
        admin,
    );

    stream.write_all(&response).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Serialize the full response head and body.
fn render_response(
    resolved: &ResolvedResponse,
    path: &str,
    request_id: &str,
    elapsed_ms: u128,
    admin: bool,
) -> Vec<u8> {
    let reason = StatusCode::from_u16(resolved.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");

    let mut head = format!("HTTP/1.1 {} {}\r\n", resolved.status, reason);
    head.push_str(&format!("Content-Length: {}\r\n", resolved.body.len()));
    head.push_str(&format!("Content-Type: {}\r\n", resolved.content_type));
    head.push_str(&format!("X-Request-Id: {}\r\n", request_id));
    head.push_str(&format!("X-Response-Time: {}\r\n", elapsed_ms));

    for (name, value) in &resolved.extra_headers {
        head.push_str(&format!("{}: {}\r\n", normalize_header_name(name), value));
    }
    if let Some(encoding) = content_encoding_for_path(path) {
        head.push_str(&format!("Content-Encoding: {}\r\n", encoding));
    }
    if admin {
        for (name, value) in admin_headers() {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
    }
    head.push_str("Server: TrackMe\r\n");
    head.push_str(&format!("Alt-Svc: {}\r\n", ALT_SVC));
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(&resolved.body);
    out
}
