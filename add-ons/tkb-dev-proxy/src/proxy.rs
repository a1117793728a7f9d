//! `/api` forwarding to the backend.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Largest request body forwarded to the backend.
pub(crate) const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Connection-scoped headers never forwarded in either direction.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
pub(crate) struct ProxyState {
    client: reqwest::Client,
    target: String,
}

impl ProxyState {
    pub(crate) fn new(client: reqwest::Client, target: &str) -> Self {
        Self {
            client,
            target: target.trim_end_matches('/').to_string(),
        }
    }
}

/// Forwards the request unchanged except for `Host`, which follows the target.
pub(crate) async fn forward(State(state): State<ProxyState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let url = format!("{}{}", state.target, path);

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(target: "tkb::proxy", url = %url, error = %e, "Request body rejected");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(serde_json::json!({ "error": "Request body too large" })),
            )
                .into_response();
        }
    };

    match send(&state, parts, body, &url).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(target: "tkb::proxy", url = %url, error = %e, "Proxy error");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "Backend service unavailable" })),
            )
                .into_response()
        }
    }
}

async fn send(state: &ProxyState, parts: Parts, body: Bytes, url: &str) -> Result<Response, reqwest::Error> {
    tracing::debug!(target: "tkb::proxy", method = %parts.method, url, "Forwarding");

    let upstream = state
        .client
        .request(parts.method, url)
        .headers(end_to_end(&parts.headers, &[header::HOST, header::CONTENT_LENGTH]))
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let headers = end_to_end(upstream.headers(), &[header::CONTENT_LENGTH]);
    let bytes = upstream.bytes().await?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Copy of `headers` without hop-by-hop headers and without `skip`.
fn end_to_end(headers: &HeaderMap, skip: &[HeaderName]) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) || skip.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn hop_by_hop_and_skipped_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::HOST, HeaderValue::from_static("localhost:3000"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.append("x-trace", HeaderValue::from_static("a"));
        headers.append("x-trace", HeaderValue::from_static("b"));

        let out = end_to_end(&headers, &[header::HOST]);
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get(header::HOST).is_none());
        assert_eq!(out[header::ACCEPT], "application/json");
        assert_eq!(out.get_all("x-trace").iter().count(), 2);
    }

    #[test]
    fn target_trailing_slash_is_trimmed() {
        let state = ProxyState::new(reqwest::Client::new(), "http://tkb-backend-1:3001/");
        assert_eq!(state.target, "http://tkb-backend-1:3001");
    }
}
