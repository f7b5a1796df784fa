//! Request descriptors and handler return types shared by the three
//! protocol engines.

use serde::Serialize;

use crate::transport::h2::capture::CapturedFrame;

/// Everything derived from one TLS session's ClientHello. Computed once
/// per session; the JA4H fields are filled per request because they
/// depend on the HTTP header set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FingerprintBlock {
    pub ja3: String,
    pub ja3_hash: String,
    pub ja4: String,
    pub ja4_r: String,
    pub peetprint: String,
    pub peetprint_hash: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ja4h: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ja4h_r: String,
    pub raw_hex: String,
    pub raw_b64: String,
    /// Record-layer version as decimal (e.g. "769").
    pub record_version: String,
    /// Negotiated protocol version as decimal (e.g. "772").
    pub negotiated_version: String,
    pub session_id: String,
    pub client_random: String,
    /// SNI host name; surfaced by `/api/sni`, not serialized here.
    #[serde(skip)]
    pub sni: String,
}

/// HTTP/1.1-specific request detail.
#[derive(Debug, Clone, Serialize)]
pub struct H1Details {
    pub headers: Vec<String>,
}

/// HTTP/2-specific request detail: the captured frame sequence and the
/// Akamai fingerprint derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct H2Details {
    pub akamai_fingerprint: String,
    pub akamai_fingerprint_hash: String,
    pub sent_frames: Vec<CapturedFrame>,
}

/// The request as handed to the router: transport facts, the decoded
/// message, and the fingerprint block.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestDescriptor {
    /// Peer address including the port.
    pub ip: String,
    /// "http/1.1", "h2" or "h3".
    pub http_version: String,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    /// Decoded headers as `"name: value"` in wire order, pseudo-headers
    /// included for HTTP/2 and HTTP/3.
    #[serde(skip)]
    pub headers: Vec<String>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub tls: FingerprintBlock,
    #[serde(rename = "http1", skip_serializing_if = "Option::is_none")]
    pub http1: Option<H1Details>,
    #[serde(rename = "http2", skip_serializing_if = "Option::is_none")]
    pub http2: Option<H2Details>,
}

impl RequestDescriptor {
    /// Client address without the port.
    pub fn origin(&self) -> String {
        clean_ip(&self.ip)
    }

    /// Path without the query string.
    pub fn path_only(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    /// Query parameters, decoded.
    pub fn query_params(&self) -> Vec<(String, String)> {
        match self.path.split_once('?') {
            Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Strip the trailing `:port` from a peer address, IPv6-safe.
pub fn clean_ip(addr: &str) -> String {
    match addr.rsplit_once(':') {
        Some((host, _port)) => host.to_string(),
        None => addr.to_string(),
    }
}

/// What a handler returns. The engines translate this into status line,
/// Location and Set-Cookie headers uniformly across HTTP versions.
#[derive(Debug, Clone)]
pub enum ResponseDirective {
    /// A plain body with its MIME type.
    Body { body: Vec<u8>, content_type: String },
    /// An empty-bodied redirect.
    Redirect { status: u16, location: String },
    /// Set-Cookie headers wrapped around another directive.
    WithCookies {
        cookies: Vec<String>,
        inner: Box<ResponseDirective>,
    },
}

impl ResponseDirective {
    pub fn body(body: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self::Body {
            body: body.into(),
            content_type: content_type.into(),
        }
    }

    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self::body(body, "application/json")
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self::Redirect {
            status,
            location: location.into(),
        }
    }
}

/// A directive flattened for the wire.
#[derive(Debug, Clone)]
pub struct ResolvedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    /// `(name, value)` pairs for Location / Set-Cookie, lowercase names.
    pub extra_headers: Vec<(String, String)>,
}

/// Flatten a directive. The default status honours `/status/{c}` paths;
/// redirects override it and drop the body.
pub fn resolve_directive(directive: ResponseDirective, path: &str) -> ResolvedResponse {
    let mut resolved = ResolvedResponse {
        status: status_from_path(path),
        content_type: "text/plain".to_string(),
        body: Vec::new(),
        extra_headers: Vec::new(),
    };
    apply_directive(&mut resolved, directive);
    resolved
}

fn apply_directive(resolved: &mut ResolvedResponse, directive: ResponseDirective) {
    match directive {
        ResponseDirective::Body { body, content_type } => {
            resolved.body = body;
            resolved.content_type = content_type;
        }
        ResponseDirective::Redirect { status, location } => {
            resolved.status = status;
            resolved.content_type = "text/html; charset=utf-8".to_string();
            resolved.body = Vec::new();
            resolved
                .extra_headers
                .push(("location".to_string(), location));
        }
        ResponseDirective::WithCookies { cookies, inner } => {
            for cookie in cookies {
                resolved
                    .extra_headers
                    .push(("set-cookie".to_string(), cookie));
            }
            apply_directive(resolved, *inner);
        }
    }
}

/// Status code for `/status/{c}` paths, 200 otherwise.
pub fn status_from_path(path: &str) -> u16 {
    let Some(rest) = path.strip_prefix("/status/") else {
        return 200;
    };
    match rest.split('/').next().and_then(|c| c.parse::<u16>().ok()) {
        Some(code) if (100..600).contains(&code) => code,
        _ => 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_ip_strips_port() {
        assert_eq!(clean_ip("198.51.100.7:34712"), "198.51.100.7");
        assert_eq!(clean_ip("[::1]:443"), "[::1]");
    }

    #[test]
    fn query_params_decode() {
        let req = RequestDescriptor {
            path: "/cookies/set?k=v&x=a%20b".to_string(),
            ..RequestDescriptor::default()
        };
        assert_eq!(req.path_only(), "/cookies/set");
        assert_eq!(
            req.query_params(),
            vec![
                ("k".to_string(), "v".to_string()),
                ("x".to_string(), "a b".to_string())
            ]
        );
    }

    #[test]
    fn redirect_overrides_status_and_body() {
        let resolved = resolve_directive(
            ResponseDirective::redirect(302, "/get"),
            "/redirect/1",
        );
        assert_eq!(resolved.status, 302);
        assert!(resolved.body.is_empty());
        assert_eq!(
            resolved.extra_headers,
            vec![("location".to_string(), "/get".to_string())]
        );
    }

    #[test]
    fn cookies_wrap_an_inner_body() {
        let directive = ResponseDirective::WithCookies {
            cookies: vec!["a=1; Path=/".to_string(), "b=2; Path=/".to_string()],
            inner: Box::new(ResponseDirective::json(b"{}".to_vec())),
        };
        let resolved = resolve_directive(directive, "/cookies/set");
        assert_eq!(resolved.status, 200);
        assert_eq!(resolved.content_type, "application/json");
        assert_eq!(resolved.extra_headers.len(), 2);
        assert_eq!(resolved.extra_headers[0].0, "set-cookie");
    }

    #[test]
    fn status_path_parsing() {
        assert_eq!(status_from_path("/status/418"), 418);
        assert_eq!(status_from_path("/status/99"), 200);
        assert_eq!(status_from_path("/status/nan"), 200);
        assert_eq!(status_from_path("/get"), 200);
    }
}
