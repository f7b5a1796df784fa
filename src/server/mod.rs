//! Connection acceptance and the shared response machinery.
//!
//! A TCP accept feeds the TLS handshake; the ClientHello is dissected
//! from a pre-handshake peek of the first record; the decrypted stream
//! is sniffed for the HTTP/2 preamble and handed to the matching engine.

pub mod api;
pub mod headers;
pub mod httpbin;
pub mod request;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::analytics::Analytics;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fingerprint::clienthello::ClientHello;
use crate::fingerprint::{dissect, ja3, ja4, ja4_r, peetprint};
use crate::transport::h2::CONNECTION_PREFACE;
use crate::transport::tls::{negotiated_version_code, read_client_hello_record, TlsAcceptor};
use crate::transport::{h1, h2};
use request::{FingerprintBlock, RequestDescriptor};

/// Advertised on every response.
pub const ALT_SVC: &str = "h3=\":443\"; ma=86400";

/// How long a client gets to produce its ClientHello.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide state, threaded explicitly into every engine.
pub struct AppState {
    pub config: Config,
    pub analytics: Option<Analytics>,
}

impl AppState {
    pub fn new(config: Config, analytics: Option<Analytics>) -> Self {
        Self { config, analytics }
    }

    /// Best-effort analytics write-through; failures are logged once per
    /// request and never reach the caller.
    pub fn log_request(&self, req: &RequestDescriptor) {
        if !self.config.log_to_db {
            return;
        }
        let Some(analytics) = self.analytics.clone() else {
            return;
        };
        let record = crate::analytics::RequestLog::from_descriptor(req, self.config.mongo_log_ips);
        tokio::spawn(async move {
            if let Err(e) = analytics.insert(record).await {
                warn!("analytics write failed: {}", e);
            }
        });
    }
}

/// 16-char alphanumeric request id, attached as `X-Request-Id`.
pub fn generate_request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// The CORS trio attached to admin responses.
pub fn admin_headers() -> [(&'static str, &'static str); 3] {
    [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Methods", "*"),
        ("Access-Control-Allow-Headers", "*"),
    ]
}

/// A request is an admin request when the configured key header is
/// present (or it is a preflight and a key is configured at all).
pub fn is_admin_request(config: &Config, method: &str, headers: &[String]) -> bool {
    if config.cors_key.is_empty() {
        return false;
    }
    if method == "OPTIONS" {
        return true;
    }
    let key = config.cors_key.to_ascii_lowercase();
    headers
        .iter()
        .any(|h| h.to_ascii_lowercase().starts_with(&key))
}

/// Content-Encoding implied by the compression endpoints.
pub fn content_encoding_for_path(path: &str) -> Option<&'static str> {
    if path.starts_with("/gzip") {
        Some("gzip")
    } else if path.starts_with("/deflate") {
        Some("deflate")
    } else if path.starts_with("/brotli") {
        Some("br")
    } else {
        None
    }
}

/// Derive the per-session fingerprint block from the dissected hello,
/// the raw record bytes and the negotiated version.
pub fn fingerprint_session(
    raw: &[u8],
    hello: &ClientHello,
    negotiated_version: &str,
) -> FingerprintBlock {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let (ja3_str, ja3_hash) = ja3(hello);
    let (peetprint_str, peetprint_hash) = peetprint(hello);

    FingerprintBlock {
        ja3: ja3_str,
        ja3_hash,
        ja4: ja4(hello, negotiated_version),
        ja4_r: ja4_r(hello, negotiated_version),
        peetprint: peetprint_str,
        peetprint_hash,
        ja4h: String::new(),
        ja4h_r: String::new(),
        raw_hex: hex::encode(raw),
        raw_b64: STANDARD.encode(raw),
        record_version: hello.record_version.to_string(),
        negotiated_version: negotiated_version.to_string(),
        session_id: hex::encode(&hello.session_id),
        client_random: hex::encode(&hello.client_random),
        sni: hello.sni.clone().unwrap_or_default(),
    }
}

/// Bind both listeners and serve until the process dies.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let acceptor = Arc::new(TlsAcceptor::from_config(&state.config)?);
    let tls_listener = TcpListener::bind(state.config.tls_addr()).await?;
    let http_listener = TcpListener::bind(state.config.http_addr()).await?;
    info!(
        tls = %state.config.tls_addr(),
        http = %state.config.http_addr(),
        "listening"
    );

    tokio::spawn(http_redirect_loop(
        http_listener,
        state.config.http_redirect.clone(),
    ));

    loop {
        let (tcp, peer) = tls_listener.accept().await?;
        let acceptor = acceptor.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let ip = peer.to_string();
            if let Err(e) = handle_tls_connection(acceptor, tcp, ip, state).await {
                if !e.is_benign_disconnect() {
                    debug!("connection ended: {}", e);
                }
            }
        });
    }
}

/// One TLS connection: capture, dissect, handshake, detect, serve.
async fn handle_tls_connection(
    acceptor: Arc<TlsAcceptor>,
    mut tcp: TcpStream,
    ip: String,
    state: Arc<AppState>,
) -> Result<()> {
    let record = tokio::time::timeout(HELLO_TIMEOUT, read_client_hello_record(&mut tcp))
        .await
        .map_err(|_| Error::timeout("waiting for ClientHello"))??;

    // A hello the dissector rejects would not handshake either.
    let hello = dissect(&record)?;

    let mut stream = acceptor.accept(record.clone(), tcp).await?;
    let negotiated = negotiated_version_code(stream.ssl().version_str());
    let fingerprint = fingerprint_session(&record, &hello, &negotiated);

    // The first 24 plaintext bytes decide HTTP/2 vs HTTP/1.1.
    let mut preamble = [0u8; CONNECTION_PREFACE.len()];
    stream.read_exact(&mut preamble).await?;

    if preamble.as_slice() == CONNECTION_PREFACE {
        h2::serve(stream, ip, fingerprint, state).await
    } else {
        h1::serve(stream, preamble.to_vec(), ip, fingerprint, state).await
    }
}

/// Plain HTTP gets an unconditional redirect to the HTTPS deployment.
async fn http_redirect_loop(listener: TcpListener, target: String) {
    loop {
        let Ok((mut tcp, _)) = listener.accept().await else {
            continue;
        };
        let target = target.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let _ = tokio::time::timeout(Duration::from_secs(2), tcp.read(&mut buf)).await;
            let response = format!(
                "HTTP/1.1 301 Moved Permanently\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                target
            );
            let _ = tcp.write_all(response.as_bytes()).await;
            let _ = tcp.shutdown().await;
        });
    }
}
