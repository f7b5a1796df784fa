//! Fingerprint and analytics API endpoints.

use serde_json::{json, Map, Value};

use crate::analytics::{top_counts, RequestLog, SearchKind};
use crate::server::request::{RequestDescriptor, ResponseDirective};
use crate::server::AppState;

fn to_json(value: &impl serde::Serialize) -> Vec<u8> {
    serde_json::to_vec_pretty(value)
        .unwrap_or_else(|_| b"{\"error\": \"JSON encoding failed\"}".to_vec())
}

fn error_json(message: &str) -> ResponseDirective {
    ResponseDirective::json(to_json(&json!({ "error": message })))
}

/// `/api/all` — the full request descriptor.
pub fn all(req: &RequestDescriptor) -> ResponseDirective {
    ResponseDirective::json(to_json(req))
}

/// `/api/tls` — the fingerprint block alone.
pub fn tls(req: &RequestDescriptor) -> ResponseDirective {
    ResponseDirective::json(to_json(&json!({ "tls": req.tls })))
}

/// `/api/clean` — just the fingerprint strings and hashes.
pub fn clean(req: &RequestDescriptor) -> ResponseDirective {
    let (akamai, akamai_hash) = match &req.http2 {
        Some(h2) => (
            h2.akamai_fingerprint.clone(),
            h2.akamai_fingerprint_hash.clone(),
        ),
        None => ("-".to_string(), "-".to_string()),
    };
    ResponseDirective::json(to_json(&json!({
        "akamai": akamai,
        "akamai_hash": akamai_hash,
        "ja3": req.tls.ja3,
        "ja3_hash": req.tls.ja3_hash,
        "ja4": req.tls.ja4,
        "ja4_r": req.tls.ja4_r,
        "ja4h": req.tls.ja4h,
        "ja4h_r": req.tls.ja4h_r,
        "peetprint": req.tls.peetprint,
        "peetprint_hash": req.tls.peetprint_hash,
    })))
}

/// `/api/raw` — the ClientHello bytes as hex and base64.
pub fn raw(req: &RequestDescriptor) -> ResponseDirective {
    ResponseDirective::json(to_json(&json!({
        "raw": req.tls.raw_hex,
        "raw_b64": req.tls.raw_b64,
    })))
}

/// `/api/sni` — lets clients verify an SNI override took effect.
pub fn sni(req: &RequestDescriptor) -> ResponseDirective {
    ResponseDirective::json(to_json(&json!({
        "sni": req.tls.sni,
        "ip": req.ip,
        "http_version": req.http_version,
    })))
}

/// `/api/request-count`
pub async fn request_count(state: &AppState) -> ResponseDirective {
    let Some(analytics) = &state.analytics else {
        return error_json("Not connected to database.");
    };
    match analytics.total_count().await {
        Ok(count) => ResponseDirective::json(to_json(&json!({ "total_requests": count }))),
        Err(e) => error_json(&e.to_string()),
    }
}

/// `/api/search-{kind}?by=<value>` — co-occurrences of the other
/// fingerprint kinds, top ten each.
pub async fn search(state: &AppState, kind: SearchKind, by: Option<&str>) -> ResponseDirective {
    let Some(analytics) = &state.analytics else {
        return error_json("Not connected to database.");
    };
    let Some(by) = by.filter(|v| !v.is_empty()) else {
        return error_json("No 'by' param present");
    };

    let logs = match analytics.find_by(kind, by).await {
        Ok(logs) => logs,
        Err(e) => return error_json(&e.to_string()),
    };

    ResponseDirective::json(to_json(&summarize(kind, by, &logs)))
}

/// Count co-occurring values per related kind.
fn summarize(kind: SearchKind, by: &str, logs: &[RequestLog]) -> Map<String, Value> {
    let mut out = Map::new();
    let counted = |project: fn(&RequestLog) -> &str| Value::from(top_counts(logs, project));

    match kind {
        SearchKind::Ja3 => {
            out.insert("ja3".into(), by.into());
            out.insert("h2_fps".into(), counted(|l| &l.h2));
            out.insert("peet_prints".into(), counted(|l| &l.peetprint));
            out.insert("user_agents".into(), counted(|l| &l.user_agent));
        }
        SearchKind::Ja4 => {
            out.insert("ja4".into(), by.into());
            out.insert("ja3s".into(), counted(|l| &l.ja3));
            out.insert("ja4hs".into(), counted(|l| &l.ja4h));
            out.insert("h2_fps".into(), counted(|l| &l.h2));
            out.insert("peet_prints".into(), counted(|l| &l.peetprint));
            out.insert("user_agents".into(), counted(|l| &l.user_agent));
        }
        SearchKind::Ja4h => {
            out.insert("ja4h".into(), by.into());
            out.insert("ja3s".into(), counted(|l| &l.ja3));
            out.insert("ja4s".into(), counted(|l| &l.ja4));
            out.insert("h2_fps".into(), counted(|l| &l.h2));
            out.insert("peet_prints".into(), counted(|l| &l.peetprint));
            out.insert("user_agents".into(), counted(|l| &l.user_agent));
        }
        SearchKind::H2 => {
            out.insert("h2_fp".into(), by.into());
            out.insert("ja3s".into(), counted(|l| &l.ja3));
            out.insert("peet_prints".into(), counted(|l| &l.peetprint));
            out.insert("user_agents".into(), counted(|l| &l.user_agent));
        }
        SearchKind::PeetPrint => {
            out.insert("peet_print".into(), by.into());
            out.insert("ja3s".into(), counted(|l| &l.ja3));
            out.insert("h2_fps".into(), counted(|l| &l.h2));
            out.insert("user_agents".into(), counted(|l| &l.user_agent));
        }
        SearchKind::UserAgent => {
            out.insert("useragent".into(), by.into());
            out.insert("h2_fps".into(), counted(|l| &l.h2));
            out.insert("ja3s".into(), counted(|l| &l.ja3));
            out.insert("ja4s".into(), counted(|l| &l.ja4));
            out.insert("ja4hs".into(), counted(|l| &l.ja4h));
            out.insert("peet_prints".into(), counted(|l| &l.peetprint));
        }
    }
    out
}
