//! Request router.
//!
//! Exact paths first, then registered prefixes; exact-match wins. The
//! router is infallible: every input maps to a directive, unknown paths
//! included.

use serde_json::json;

use crate::analytics::SearchKind;
use crate::server::request::{RequestDescriptor, ResponseDirective};
use crate::server::{api, httpbin, AppState};

/// Map a request to its response directive.
pub async fn route(req: &RequestDescriptor, state: &AppState) -> ResponseDirective {
    let path = req.path_only();
    let params = req.query_params();
    let by = params
        .iter()
        .find(|(k, _)| k == "by")
        .map(|(_, v)| v.as_str());

    match path {
        "/" | "/api/all" => api::all(req),
        "/api/tls" => api::tls(req),
        "/api/clean" => api::clean(req),
        "/api/raw" => api::raw(req),
        "/api/sni" => api::sni(req),
        "/api/request-count" => api::request_count(state).await,
        "/api/search-ja3" => api::search(state, SearchKind::Ja3, by).await,
        "/api/search-ja4" => api::search(state, SearchKind::Ja4, by).await,
        "/api/search-ja4h" => api::search(state, SearchKind::Ja4h, by).await,
        "/api/search-h2" => api::search(state, SearchKind::H2, by).await,
        "/api/search-peetprint" => api::search(state, SearchKind::PeetPrint, by).await,
        "/api/search-useragent" => api::search(state, SearchKind::UserAgent, by).await,

        "/get" | "/delete" => httpbin::get(req, &params),
        "/post" | "/put" | "/patch" | "/anything" => httpbin::post(req, &params),
        "/headers" => httpbin::headers(req),
        "/ip" => httpbin::ip(req),
        "/user-agent" => httpbin::user_agent(req),

        "/gzip" => httpbin::gzip(req, &params),
        "/deflate" => httpbin::deflate(req, &params),
        "/brotli" => httpbin::brotli_echo(req, &params),

        "/cookies" => httpbin::cookies(req),
        "/cookies/set" => httpbin::cookies_set(req, &params),
        "/cookies/delete" => httpbin::cookies_delete(req),

        "/image/jpeg" => httpbin::image("jpeg"),
        "/image/png" => httpbin::image("png"),
        "/image/gif" => httpbin::image("gif"),
        "/image/webp" => httpbin::image("webp"),
        "/image/svg" => httpbin::image("svg"),

        "/html" => httpbin::html(req),
        "/xml" => httpbin::xml(req),
        "/json" => httpbin::json_sample(req),
        "/robots.txt" => httpbin::robots(),
        "/deny" => httpbin::deny(),
        "/sse" => httpbin::sse(req),

        _ => route_prefix(req, &params, path).await,
    }
}

/// Dynamic routes, matched by prefix after every exact path missed.
async fn route_prefix(
    req: &RequestDescriptor,
    params: &[(String, String)],
    path: &str,
) -> ResponseDirective {
    if path.starts_with("/bytes/") {
        httpbin::bytes(req)
    } else if path.starts_with("/base64/") {
        httpbin::base64_decode(req)
    } else if path.starts_with("/redirect-to") {
        httpbin::redirect_to(params)
    } else if path.starts_with("/redirect/") {
        httpbin::redirect(req)
    } else if path.starts_with("/status/") {
        httpbin::status(req)
    } else if path.starts_with("/delay/") {
        httpbin::delay(req, params).await
    } else if path.starts_with("/sse/") {
        httpbin::sse(req)
    } else if path.starts_with("/stream/") {
        httpbin::stream(req)
    } else if path.starts_with("/anything/") {
        httpbin::post(req, params)
    } else {
        not_found(path)
    }
}

fn not_found(path: &str) -> ResponseDirective {
    let body = serde_json::to_vec_pretty(&json!({
        "error": "unknown path",
        "path": path,
    }))
    .unwrap_or_default();
    ResponseDirective::json(body)
}
