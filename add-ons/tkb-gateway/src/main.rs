//! Axum-based HTTP facade for the knowledge registry. Config-driven via TkbConfig.

mod handlers;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tkb_core::{
    CommandDeployer, ConnectionManager, Deployer, Reconnector, RecordAggregator, RetryPolicy, RpcBinder, TkbConfig,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[tkb-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(TkbConfig::load()?);
    let binder = Arc::new(RpcBinder::new(config.rpc_endpoints.clone(), config.probe_timeout()));
    let connection = Arc::new(ConnectionManager::new(
        config.descriptor_path(),
        config.contract_name.as_str(),
        binder,
    ));
    let records = Arc::new(RecordAggregator::new(Arc::clone(&connection), config.read_concurrency));
    let deployer = CommandDeployer::from_settings(&config.deploy).map(|d| Arc::new(d) as Arc<dyn Deployer>);
    let retry = RetryPolicy::from(&config.retry);

    // Background connect loop; the read path never deploys on its own.
    let mut reconnector = Reconnector::new(Arc::clone(&connection), retry.clone());
    match (&deployer, config.deploy.auto_deploy) {
        (Some(deployer), true) => reconnector = reconnector.with_auto_deploy(Arc::clone(deployer)),
        (None, true) => tracing::warn!(target: "tkb::connector", "Auto-deploy enabled but no deploy command configured"),
        _ => {}
    }
    tokio::spawn(async move {
        if let Err(e) = reconnector.run().await {
            tracing::error!(target: "tkb::connector", error = %e, "Reconnect task stopped");
        }
    });

    let app = build_app(AppState {
        config: Arc::clone(&config),
        connection,
        records,
        deployer,
        retry,
    });

    let addr = config.listen_addr()?;
    tracing::info!("{} listening on {}", config.app_name, addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_app(state: AppState) -> Router {
    let frontend_dir = state
        .config
        .frontend_enabled
        .then(|| Path::new(&state.config.frontend_dir).to_path_buf());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let api = Router::new()
        .route("/hello", get(handlers::hello))
        .route("/knowledge", get(handlers::records::list_knowledge))
        .route("/debug", get(handlers::ops::debug))
        .route("/redeploy", post(handlers::ops::redeploy))
        .fallback(handlers::api_not_found);

    let app = Router::new().nest("/api", api).with_state(state);

    // Unmatched paths get index.html so client-side routes resolve.
    let app = match frontend_dir {
        Some(dir) => {
            let index_file = dir.join("index.html");
            app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index_file)))
        }
        None => app.fallback(handlers::api_not_found),
    };

    app.layer(cors)
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<TkbConfig>,
    pub(crate) connection: Arc<ConnectionManager>,
    pub(crate) records: Arc<RecordAggregator>,
    /// `None` when no deploy command is configured.
    pub(crate) deployer: Option<Arc<dyn Deployer>>,
    pub(crate) retry: RetryPolicy,
}
