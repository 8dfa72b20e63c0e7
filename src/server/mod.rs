//! HTTP boundary
//!
//! Health check, CSV upload into a local blob folder and single-record
//! prediction against a loaded [`ModelArtifact`](crate::export::ModelArtifact).

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root of the local blob store
    pub data_dir: PathBuf,
    /// Folder under `data_dir` receiving uploads
    pub upload_prefix: String,
    pub model_path: PathBuf,
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            upload_prefix: "uploads".to_string(),
            model_path: std::env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models/best_model_rf.bin")),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100 * 1024 * 1024), // 100MB
        }
    }
}

impl ServerConfig {
    /// Directory uploads are written to
    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join(&self.upload_prefix)
    }
}

async fn shutdown_signal(start_time: chrono::DateTime<chrono::Utc>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install CTRL+C handler; running until killed");
        std::future::pending::<()>().await;
    }
    let stop_time = chrono::Utc::now();
    let uptime = stop_time.signed_duration_since(start_time);
    info!(
        stopped_at = %stop_time.to_rfc3339(),
        uptime_secs = uptime.num_seconds(),
        "Shutdown signal received, stopping server gracefully"
    );
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    std::fs::create_dir_all(config.upload_dir())?;

    let state = Arc::new(AppState::new(config.clone()));
    if !state.has_model() {
        warn!(
            model_path = %config.model_path.display(),
            "No model loaded, /api/predict will answer 503"
        );
    }
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        data_dir = %config.data_dir.display(),
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        started_at = %start_time.to_rfc3339(),
        "seroscreen server starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(url = %format!("http://{}/api/health", addr), pid = std::process::id(), "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(start_time))
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
