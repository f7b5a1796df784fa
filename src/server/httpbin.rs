//! HTTPBin-style endpoints.
//!
//! Every JSON body carries the fingerprint fields so clients can see
//! how they look on the wire no matter which endpoint they poke.

use std::io::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use serde_json::{json, Map, Value};

use crate::server::headers::{extract_cookies, extract_headers};
use crate::server::request::{RequestDescriptor, ResponseDirective};

type Params = [(String, String)];

/// Fingerprint fields common to every JSON body.
fn tls_fields(req: &RequestDescriptor) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("ja3".into(), req.tls.ja3.clone().into());
    fields.insert("ja3_hash".into(), req.tls.ja3_hash.clone().into());
    fields.insert("ja4".into(), req.tls.ja4.clone().into());
    fields.insert("ja4_r".into(), req.tls.ja4_r.clone().into());
    fields.insert("peetprint".into(), req.tls.peetprint.clone().into());
    fields.insert(
        "peetprint_hash".into(),
        req.tls.peetprint_hash.clone().into(),
    );
    match &req.http2 {
        Some(h2) => {
            fields.insert("akamai".into(), h2.akamai_fingerprint.clone().into());
            fields.insert(
                "akamai_hash".into(),
                h2.akamai_fingerprint_hash.clone().into(),
            );
        }
        None => {
            fields.insert("akamai".into(), "-".into());
            fields.insert("akamai_hash".into(), "-".into());
        }
    }
    fields.insert("http_version".into(), req.http_version.clone().into());
    fields
}

/// `origin`, `method`, `url` and decoded query args on top of the
/// fingerprint fields.
fn base_response(req: &RequestDescriptor, params: &Params) -> Map<String, Value> {
    let mut response = tls_fields(req);
    response.insert("origin".into(), req.origin().into());
    response.insert("method".into(), req.method.clone().into());
    response.insert(
        "url".into(),
        format!("https://tls.peet.ws{}", req.path).into(),
    );

    let mut args = Map::new();
    for (key, value) in params {
        match args.get_mut(key.as_str()) {
            Some(Value::Array(list)) => list.push(value.clone().into()),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value.clone().into()]);
            }
            None => {
                args.insert(key.clone(), value.clone().into());
            }
        }
    }
    response.insert("args".into(), args.into());
    response
}

fn headers_value(req: &RequestDescriptor) -> Value {
    extract_headers(req)
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect::<Map<String, Value>>()
        .into()
}

fn to_json(value: &impl serde::Serialize) -> Vec<u8> {
    serde_json::to_vec_pretty(value)
        .unwrap_or_else(|_| b"{\"error\": \"JSON encoding failed\"}".to_vec())
}

/// Path segment after the prefix, e.g. `/bytes/5` -> `5`.
fn path_segment(path: &str) -> Option<&str> {
    path.split('/').nth(2).filter(|s| !s.is_empty())
}

fn path_number(path: &str, default: i64, min: i64, max: i64) -> i64 {
    match path_segment(path).and_then(|s| s.parse::<i64>().ok()) {
        Some(n) if (min..=max).contains(&n) => n,
        _ => default,
    }
}

fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

// ---- echo endpoints -----------------------------------------------------

/// `/get`, `/delete`: query args and headers echoed back.
pub fn get(req: &RequestDescriptor, params: &Params) -> ResponseDirective {
    let mut response = base_response(req, params);
    response.insert("headers".into(), headers_value(req));
    ResponseDirective::json(to_json(&response))
}

/// `/post`, `/put`, `/patch`, `/anything`: the body is echoed too.
pub fn post(req: &RequestDescriptor, params: &Params) -> ResponseDirective {
    let mut response = base_response(req, params);
    response.insert("headers".into(), headers_value(req));

    if req.body.is_empty() {
        response.insert("data".into(), "".into());
        response.insert("json".into(), Value::Null);
    } else {
        response.insert(
            "data".into(),
            String::from_utf8_lossy(&req.body).into_owned().into(),
        );
        let parsed: Option<Value> = serde_json::from_slice(&req.body).ok();
        response.insert("json".into(), parsed.unwrap_or(Value::Null));
    }
    response.insert("files".into(), Map::new().into());
    response.insert("form".into(), Map::new().into());

    ResponseDirective::json(to_json(&response))
}

/// `/headers`
pub fn headers(req: &RequestDescriptor) -> ResponseDirective {
    let mut response = tls_fields(req);
    response.insert("headers".into(), headers_value(req));
    ResponseDirective::json(to_json(&response))
}

/// `/ip`
pub fn ip(req: &RequestDescriptor) -> ResponseDirective {
    let mut response = tls_fields(req);
    response.insert("origin".into(), req.origin().into());
    ResponseDirective::json(to_json(&response))
}

/// `/user-agent`
pub fn user_agent(req: &RequestDescriptor) -> ResponseDirective {
    let mut response = tls_fields(req);
    response.insert("user-agent".into(), req.user_agent.clone().into());
    ResponseDirective::json(to_json(&response))
}

// ---- compression --------------------------------------------------------

fn compressed_echo(
    req: &RequestDescriptor,
    params: &Params,
    flag: &str,
    compress: impl Fn(&[u8]) -> Vec<u8>,
) -> ResponseDirective {
    let mut response = base_response(req, params);
    response.insert("headers".into(), headers_value(req));
    response.insert(flag.into(), true.into());
    ResponseDirective::body(compress(&to_json(&response)), "application/json; charset=utf-8")
}

/// `/gzip`
pub fn gzip(req: &RequestDescriptor, params: &Params) -> ResponseDirective {
    compressed_echo(req, params, "gzipped", |data| {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        let _ = encoder.write_all(data);
        encoder.finish().unwrap_or_default()
    })
}

/// `/deflate` — the HTTP `deflate` coding is the zlib wrapper
/// (RFC 1950), not raw DEFLATE.
pub fn deflate(req: &RequestDescriptor, params: &Params) -> ResponseDirective {
    compressed_echo(req, params, "deflated", |data| {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let _ = encoder.write_all(data);
        encoder.finish().unwrap_or_default()
    })
}

/// `/brotli`
pub fn brotli_echo(req: &RequestDescriptor, params: &Params) -> ResponseDirective {
    compressed_echo(req, params, "brotli", |data| {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            let _ = writer.write_all(data);
        }
        out
    })
}

// ---- cookies ------------------------------------------------------------

/// `/cookies`
pub fn cookies(req: &RequestDescriptor) -> ResponseDirective {
    let mut response = tls_fields(req);
    let cookie_map: Map<String, Value> = extract_cookies(req)
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect();
    response.insert("cookies".into(), cookie_map.into());
    ResponseDirective::json(to_json(&response))
}

/// `/cookies/set?k=v&…` — one cookie per query pair.
pub fn cookies_set(req: &RequestDescriptor, params: &Params) -> ResponseDirective {
    let mut response = tls_fields(req);
    let mut cookie_map = Map::new();
    let mut set_cookies = Vec::new();
    for (key, value) in params {
        cookie_map.insert(key.clone(), value.clone().into());
        set_cookies.push(format!("{}={}; Path=/", key, value));
    }
    response.insert("cookies".into(), cookie_map.into());

    let inner = ResponseDirective::json(to_json(&response));
    if set_cookies.is_empty() {
        inner
    } else {
        ResponseDirective::WithCookies {
            cookies: set_cookies,
            inner: Box::new(inner),
        }
    }
}

/// `/cookies/delete`
pub fn cookies_delete(req: &RequestDescriptor) -> ResponseDirective {
    let mut response = tls_fields(req);
    response.insert("cookies".into(), Map::new().into());
    ResponseDirective::json(to_json(&response))
}

// ---- images -------------------------------------------------------------

/// Minimal valid JPEG (1x1 pixel).
const JPEG_IMAGE: &[u8] = &[
    0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xff, 0xdb, 0x00, 0x43, 0x00, 0x08, 0x06, 0x06, 0x07, 0x06,
    0x05, 0x08, 0x07, 0x07, 0x07, 0x09, 0x09, 0x08, 0x0a, 0x0c, 0x14, 0x0d, 0x0c, 0x0b, 0x0b,
    0x0c, 0x19, 0x12, 0x13, 0x0f, 0x14, 0x1d, 0x1a, 0x1f, 0x1e, 0x1d, 0x1a, 0x1c, 0x1c, 0x20,
    0x24, 0x2e, 0x27, 0x20, 0x22, 0x2c, 0x23, 0x1c, 0x1c, 0x28, 0x37, 0x29, 0x2c, 0x30, 0x31,
    0x34, 0x34, 0x34, 0x1f, 0x27, 0x39, 0x3d, 0x38, 0x32, 0x3c, 0x2e, 0x33, 0x34, 0x32, 0xff,
    0xc0, 0x00, 0x0b, 0x08, 0x00, 0x01, 0x00, 0x01, 0x01, 0x01, 0x11, 0x00, 0xff, 0xc4, 0x00,
    0x1f, 0x00, 0x00, 0x01, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b,
    0xff, 0xc4, 0x00, 0xb5, 0x10, 0x00, 0x02, 0x01, 0x03, 0x03, 0x02, 0x04, 0x03, 0x05, 0x05,
    0x04, 0x04, 0x00, 0x00, 0x01, 0x7d, 0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21,
    0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08,
    0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a,
    0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x34, 0x35, 0x36, 0x37,
    0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x53, 0x54, 0x55, 0x56,
    0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x73, 0x74, 0x75,
    0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x92, 0x93,
    0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9,
    0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6,
    0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7,
    0xf8, 0xf9, 0xfa, 0xff, 0xda, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3f, 0x00, 0xfb, 0xd5,
    0xdb, 0x20, 0xa8, 0xf1, 0x7e, 0xca, 0xb2, 0x2f, 0x1f, 0xff, 0xd9,
];

/// Minimal valid PNG (1x1 pixel).
const PNG_IMAGE: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
    0x77, 0x53, 0xde, 0x00, 0x00, 0x00, 0x0c, 0x49, 0x44, 0x41, 0x54, 0x08, 0xd7, 0x63, 0xf8,
    0xcf, 0xc0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x00, 0x05, 0xfe, 0xd4, 0xef, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Minimal valid GIF (1x1 pixel).
const GIF_IMAGE: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// Minimal valid WebP (1x1 pixel, lossless).
const WEBP_IMAGE: &[u8] = &[
    0x52, 0x49, 0x46, 0x46, 0x1a, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50, 0x56, 0x50, 0x38,
    0x4c, 0x0d, 0x00, 0x00, 0x00, 0x2f, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xfe, 0xfb, 0x94, 0x00, 0x00,
];

const SVG_IMAGE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
  <circle cx="50" cy="50" r="40" fill="blue"/>
</svg>"#;

/// `/image/{jpeg,png,gif,webp,svg}`
pub fn image(kind: &str) -> ResponseDirective {
    match kind {
        "jpeg" => ResponseDirective::body(JPEG_IMAGE, "image/jpeg"),
        "png" => ResponseDirective::body(PNG_IMAGE, "image/png"),
        "gif" => ResponseDirective::body(GIF_IMAGE, "image/gif"),
        "webp" => ResponseDirective::body(WEBP_IMAGE, "image/webp"),
        _ => ResponseDirective::body(SVG_IMAGE, "image/svg+xml"),
    }
}

// ---- dynamic endpoints --------------------------------------------------

/// `/bytes/{n}` — GET returns `n` deterministic bytes; POST and PUT echo
/// the request body for binary round-trip testing.
pub fn bytes(req: &RequestDescriptor) -> ResponseDirective {
    if (req.method == "POST" || req.method == "PUT") && !req.body.is_empty() {
        return ResponseDirective::body(req.body.clone(), "application/octet-stream");
    }

    let n = path_number(req.path_only(), 100, 1, 102_400) as usize;
    let data: Vec<u8> = (0..n).map(|i| (i % 256) as u8).collect();
    ResponseDirective::body(data, "application/octet-stream")
}

/// `/base64/{value}` — decode standard base64, or say why not.
pub fn base64_decode(req: &RequestDescriptor) -> ResponseDirective {
    let encoded = req
        .path_only()
        .strip_prefix("/base64/")
        .unwrap_or_default();
    match BASE64.decode(encoded) {
        Ok(decoded) => ResponseDirective::body(decoded, "text/html; charset=utf-8"),
        Err(_) => ResponseDirective::body(&b"Invalid base64"[..], "text/plain"),
    }
}

/// `/redirect/{n}` — chains down to `/get`.
pub fn redirect(req: &RequestDescriptor) -> ResponseDirective {
    let n = path_number(req.path_only(), 1, 1, 10);
    let location = if n > 1 {
        format!("/redirect/{}", n - 1)
    } else {
        "/get".to_string()
    };
    ResponseDirective::redirect(302, location)
}

/// `/redirect-to?url=U[&status_code=C]`
pub fn redirect_to(params: &Params) -> ResponseDirective {
    let target = param(params, "url").filter(|u| !u.is_empty()).unwrap_or("/get");
    let status = param(params, "status_code")
        .and_then(|c| c.parse::<u16>().ok())
        .filter(|c| (300..400).contains(c))
        .unwrap_or(302);
    ResponseDirective::redirect(status, target)
}

/// `/status/{code}` — the engine picks the status up from the path; the
/// body just repeats it.
pub fn status(req: &RequestDescriptor) -> ResponseDirective {
    let code = path_number(req.path_only(), 200, 100, 599);
    let mut response = tls_fields(req);
    response.insert("status_code".into(), code.into());
    ResponseDirective::json(to_json(&response))
}

/// `/delay/{seconds}`
pub async fn delay(req: &RequestDescriptor, params: &Params) -> ResponseDirective {
    let seconds = path_number(req.path_only(), 1, 1, 10);
    tokio::time::sleep(std::time::Duration::from_secs(seconds as u64)).await;

    let mut response = base_response(req, params);
    response.insert("headers".into(), headers_value(req));
    response.insert("delay".into(), seconds.into());
    ResponseDirective::json(to_json(&response))
}

/// `/stream/{n}` — newline-delimited JSON objects.
pub fn stream(req: &RequestDescriptor) -> ResponseDirective {
    let n = path_number(req.path_only(), 3, 1, 100);
    let mut out = Vec::new();
    for id in 0..n {
        let line = json!({
            "id": id,
            "ja3_hash": req.tls.ja3_hash,
            "origin": req.origin(),
            "url": format!("https://tlsfingerprint.com{}", req.path),
        });
        out.extend_from_slice(line.to_string().as_bytes());
        out.push(b'\n');
    }
    ResponseDirective::json(out)
}

/// `/sse[/n]` — a complete event-stream body, `n` messages plus a final
/// `done` event.
pub fn sse(req: &RequestDescriptor) -> ResponseDirective {
    let count = path_number(req.path_only(), 3, 1, 100);
    let mut out = String::new();
    for id in 1..=count {
        let data = json!({ "count": id, "ja3_hash": req.tls.ja3_hash });
        out.push_str("event: message\n");
        out.push_str(&format!("id: {}\n", id));
        out.push_str(&format!("data: {}\n\n", data));
    }
    out.push_str("event: done\n");
    out.push_str(&format!("id: {}\n", count + 1));
    out.push_str(&format!("data: {{\"total\": {}}}\n\n", count));
    ResponseDirective::body(out.into_bytes(), "text/event-stream")
}

// ---- fixed bodies -------------------------------------------------------

/// `/html`
pub fn html(req: &RequestDescriptor) -> ResponseDirective {
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>TLS Fingerprint HTTPBin</title></head>\n<body>\n\
         <h1>Hello from TLS Fingerprint HTTPBin!</h1>\n<p>JA3 Hash: {}</p>\n</body>\n</html>",
        req.tls.ja3_hash
    );
    ResponseDirective::body(body.into_bytes(), "text/html; charset=utf-8")
}

/// `/xml`
pub fn xml(req: &RequestDescriptor) -> ResponseDirective {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<response>\n  <ja3_hash>{}</ja3_hash>\n  \
         <origin>{}</origin>\n</response>",
        req.tls.ja3_hash,
        req.origin()
    );
    ResponseDirective::body(body.into_bytes(), "application/xml")
}

/// `/json`
pub fn json_sample(req: &RequestDescriptor) -> ResponseDirective {
    let mut response = tls_fields(req);
    response.insert(
        "slideshow".into(),
        json!({ "author": "TLS Fingerprint", "title": "Sample Slideshow" }),
    );
    ResponseDirective::json(to_json(&response))
}

/// `/robots.txt`
pub fn robots() -> ResponseDirective {
    ResponseDirective::body(&b"User-agent: *\nDisallow: /deny\n"[..], "text/plain")
}

/// `/deny`
pub fn deny() -> ResponseDirective {
    ResponseDirective::body(&b"YOU SHOULDN'T BE HERE"[..], "text/plain")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::request::FingerprintBlock;

    fn request(method: &str, path: &str) -> RequestDescriptor {
        RequestDescriptor {
            ip: "198.51.100.7:40112".to_string(),
            http_version: "h2".to_string(),
            method: method.to_string(),
            path: path.to_string(),
            tls: FingerprintBlock {
                ja3_hash: "aabbccddeeff00112233445566778899".to_string(),
                ..FingerprintBlock::default()
            },
            ..RequestDescriptor::default()
        }
    }

    fn body_of(directive: ResponseDirective) -> (Vec<u8>, String) {
        match directive {
            ResponseDirective::Body { body, content_type } => (body, content_type),
            other => panic!("expected a body, got {:?}", other),
        }
    }

    #[test]
    fn bytes_are_deterministic() {
        let (body, content_type) = body_of(bytes(&request("GET", "/bytes/5")));
        assert_eq!(body, vec![0, 1, 2, 3, 4]);
        assert_eq!(content_type, "application/octet-stream");
    }

    #[test]
    fn bytes_clamps_out_of_range() {
        let (body, _) = body_of(bytes(&request("GET", "/bytes/999999")));
        assert_eq!(body.len(), 100);
    }

    #[test]
    fn bytes_post_echoes_body() {
        let mut req = request("POST", "/bytes/5");
        req.body = vec![9, 9, 9];
        let (body, _) = body_of(bytes(&req));
        assert_eq!(body, vec![9, 9, 9]);
    }

    #[test]
    fn base64_decodes_or_complains() {
        let (body, content_type) = body_of(base64_decode(&request("GET", "/base64/SGVsbG8=")));
        assert_eq!(body, b"Hello");
        assert_eq!(content_type, "text/html; charset=utf-8");

        let (body, content_type) = body_of(base64_decode(&request("GET", "/base64/!!!")));
        assert_eq!(body, b"Invalid base64");
        assert_eq!(content_type, "text/plain");
    }

    #[test]
    fn redirect_chain_counts_down() {
        match redirect(&request("GET", "/redirect/3")) {
            ResponseDirective::Redirect { status, location } => {
                assert_eq!(status, 302);
                assert_eq!(location, "/redirect/2");
            }
            other => panic!("expected redirect, got {:?}", other),
        }
        match redirect(&request("GET", "/redirect/1")) {
            ResponseDirective::Redirect { location, .. } => assert_eq!(location, "/get"),
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn redirect_to_clamps_status() {
        let params = vec![
            ("url".to_string(), "https://example.com".to_string()),
            ("status_code".to_string(), "307".to_string()),
        ];
        match redirect_to(&params) {
            ResponseDirective::Redirect { status, location } => {
                assert_eq!(status, 307);
                assert_eq!(location, "https://example.com");
            }
            other => panic!("expected redirect, got {:?}", other),
        }

        let params = vec![("status_code".to_string(), "200".to_string())];
        match redirect_to(&params) {
            ResponseDirective::Redirect { status, location } => {
                assert_eq!(status, 302);
                assert_eq!(location, "/get");
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn stream_emits_n_lines() {
        let (body, _) = body_of(stream(&request("GET", "/stream/4")));
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = text.trim_end().split('\n').collect();
        assert_eq!(lines.len(), 4);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], 0);
        assert_eq!(first["origin"], "198.51.100.7");
    }

    #[test]
    fn sse_ends_with_done_event() {
        let (body, content_type) = body_of(sse(&request("GET", "/sse/2")));
        let text = String::from_utf8(body).unwrap();
        assert_eq!(content_type, "text/event-stream");
        assert_eq!(text.matches("event: message").count(), 2);
        assert!(text.contains("event: done\nid: 3\ndata: {\"total\": 2}\n\n"));
    }

    #[test]
    fn gzip_body_round_trips() {
        let directive = gzip(&request("GET", "/gzip"), &[]);
        let (body, _) = body_of(directive);
        let mut decoder = flate2::read::GzDecoder::new(&body[..]);
        let mut text = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut text).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["gzipped"], true);
    }

    #[test]
    fn deflate_uses_zlib_wrapper() {
        let directive = deflate(&request("GET", "/deflate"), &[]);
        let (body, _) = body_of(directive);
        // RFC 1950: low nibble of the first byte is 8 for deflate.
        assert_eq!(body[0] & 0x0f, 8);
        let mut decoder = flate2::read::ZlibDecoder::new(&body[..]);
        let mut text = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut text).unwrap();
        assert!(text.contains("\"deflated\": true"));
    }

    #[test]
    fn images_have_magic_bytes() {
        let (jpeg, _) = body_of(image("jpeg"));
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
        let (png, _) = body_of(image("png"));
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
        let (gif, _) = body_of(image("gif"));
        assert_eq!(&gif[..3], b"GIF");
        let (webp, _) = body_of(image("webp"));
        assert_eq!(&webp[..4], b"RIFF");
        let (svg, content_type) = body_of(image("svg"));
        assert!(svg.starts_with(b"<?xml"));
        assert_eq!(content_type, "image/svg+xml");
    }

    #[test]
    fn cookie_set_wraps_inner_json() {
        let params = vec![("session".to_string(), "abc".to_string())];
        match cookies_set(&request("GET", "/cookies/set"), &params) {
            ResponseDirective::WithCookies { cookies, inner } => {
                assert_eq!(cookies, vec!["session=abc; Path=/"]);
                let (body, _) = body_of(*inner);
                let value: Value = serde_json::from_slice(&body).unwrap();
                assert_eq!(value["cookies"]["session"], "abc");
            }
            other => panic!("expected cookies, got {:?}", other),
        }
    }

    #[test]
    fn post_parses_json_bodies() {
        let mut req = request("POST", "/post");
        req.body = br#"{"k": 1}"#.to_vec();
        let (body, _) = body_of(post(&req, &[]));
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["json"]["k"], 1);
        assert_eq!(value["data"], r#"{"k": 1}"#);
        assert_eq!(value["files"], json!({}));
    }

    #[test]
    fn html_embeds_ja3_hash() {
        let (body, _) = body_of(html(&request("GET", "/html")));
        assert!(String::from_utf8(body)
            .unwrap()
            .contains("aabbccddeeff00112233445566778899"));
    }
}
