//! Application state management

use super::ServerConfig;
use crate::export::ModelArtifact;
use std::sync::Arc;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    model: Option<Arc<ModelArtifact>>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Build state, loading the artifact at `config.model_path` when present
    pub fn new(config: ServerConfig) -> Self {
        let model = if config.model_path.exists() {
            match ModelArtifact::load(&config.model_path) {
                Ok(artifact) => {
                    info!(
                        model_path = %config.model_path.display(),
                        features = artifact.transform().spec().n_features(),
                        "Model artifact ready for inference"
                    );
                    Some(Arc::new(artifact))
                }
                Err(e) => {
                    warn!(
                        model_path = %config.model_path.display(),
                        error = %e,
                        "Could not load model artifact"
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            config,
            model,
            started_at: chrono::Utc::now(),
        }
    }

    /// Build state around an artifact already in memory
    pub fn with_model(config: ServerConfig, artifact: ModelArtifact) -> Self {
        Self {
            config,
            model: Some(Arc::new(artifact)),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn model(&self) -> Option<Arc<ModelArtifact>> {
        self.model.clone()
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file_leaves_state_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            model_path: dir.path().join("absent.bin"),
            ..Default::default()
        };
        let state = AppState::new(config);
        assert!(!state.has_model());
    }

    #[test]
    fn test_corrupt_model_file_leaves_state_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"not an artifact").unwrap();
        let config = ServerConfig {
            model_path: path,
            ..Default::default()
        };
        assert!(AppState::new(config).model().is_none());
    }
}
