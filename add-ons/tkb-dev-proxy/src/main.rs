//! Frontend development server. Serves the frontend bundle and forwards `/api`
//! to the backend container. Config-driven via DevProxyConfig (`TKB_PROXY_*`).

mod proxy;

use axum::routing::any;
use axum::Router;
use proxy::ProxyState;
use std::path::PathBuf;
use tkb_core::DevProxyConfig;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[tkb-dev-proxy] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DevProxyConfig::load()?;
    let client = reqwest::Client::builder().build()?;
    let app = build_app(ProxyState::new(client, &config.target), PathBuf::from(&config.frontend_dir));

    let addr = config.listen_addr()?;
    tracing::info!(target: "tkb::proxy", "Dev server listening on {} (api -> {})", addr, config.target);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_app(state: ProxyState, frontend_dir: PathBuf) -> Router {
    let index_file = frontend_dir.join("index.html");
    Router::new()
        .route("/api", any(proxy::forward))
        .route("/api/*rest", any(proxy::forward))
        .with_state(state)
        .fallback_service(ServeDir::new(frontend_dir).fallback(ServeFile::new(index_file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::{get, post};
    use axum::Json;
    use tower::ServiceExt;

    async fn spawn_backend() -> String {
        let backend = Router::new()
            .route(
                "/api/hello",
                get(|uri: axum::http::Uri, headers: axum::http::HeaderMap| async move {
                    let host = headers.get("host").and_then(|h| h.to_str().ok()).unwrap_or("").to_string();
                    (
                        [("x-backend", "tkb")],
                        Json(serde_json::json!({
                            "message": "Hello from the TKB backend!",
                            "query": uri.query(),
                            "host": host,
                        })),
                    )
                }),
            )
            .route(
                "/api/redeploy",
                post(|body: String| async move { (StatusCode::CONFLICT, Json(serde_json::json!({ "echo": body }))) }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, backend).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn app(target: &str, frontend: &std::path::Path) -> Router {
        build_app(ProxyState::new(reqwest::Client::new(), target), frontend.to_path_buf())
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_api_request_is_forwarded_with_query_and_headers() {
        let target = spawn_backend().await;
        let web = tempfile::tempdir().unwrap();
        let req = Request::builder()
            .uri("/api/hello?lang=pt")
            .header("host", "localhost:3000")
            .body(Body::empty())
            .unwrap();
        let res = app(&target, web.path()).oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-backend"], "tkb");
        let json = body_json(res).await;
        assert_eq!(json["message"], "Hello from the TKB backend!");
        assert_eq!(json["query"], "lang=pt");
        assert_eq!(json["host"], target.trim_start_matches("http://"));
    }

    #[tokio::test]
    async fn test_post_body_and_status_pass_through() {
        let target = spawn_backend().await;
        let web = tempfile::tempdir().unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/api/redeploy")
            .body(Body::from("now"))
            .unwrap();
        let res = app(&target, web.path()).oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(res).await["echo"], "now");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_503_json() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let web = tempfile::tempdir().unwrap();

        let req = Request::builder().uri("/api/knowledge").body(Body::empty()).unwrap();
        let res = app(&dead, web.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(res).await["error"], "Backend service unavailable");
    }

    #[tokio::test]
    async fn test_oversized_body_is_413_without_forwarding() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let web = tempfile::tempdir().unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/api/redeploy")
            .body(Body::from(vec![b'x'; proxy::MAX_BODY_BYTES + 1]))
            .unwrap();
        let res = app(&dead, web.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(res).await["error"], "Request body too large");
    }

    #[tokio::test]
    async fn test_other_paths_serve_frontend_with_spa_fallback() {
        let web = tempfile::tempdir().unwrap();
        std::fs::write(web.path().join("index.html"), "<title>TKB</title>").unwrap();
        let app = app("http://127.0.0.1:9", web.path());

        for uri in ["/", "/registros"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let res = app.clone().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&bytes[..], b"<title>TKB</title>");
        }
    }
}
