//! Model artifact serialization
//!
//! An artifact bundles the fitted transform and the fitted classifier so the
//! two are always saved and loaded together. On disk it is a bincode envelope:
//! magic bytes, format version, FNV-1a checksum of the payload, payload.

use crate::error::{Result, SeroError};
use crate::preprocessing::{AgeCorrection, FittedTransform};
use crate::training::{RandomForest, TrainingMetrics};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Magic bytes for artifact files
pub const ARTIFACT_MAGIC: [u8; 4] = *b"SERO";

/// Current envelope format version
pub const ARTIFACT_FORMAT_VERSION: u32 = 2;

/// Descriptive fields stored with every artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    /// Version of the crate that wrote the artifact
    pub version: String,
    /// Training timestamp (RFC 3339)
    pub trained_at: String,
    pub target: String,
    pub numeric_features: Vec<String>,
    pub categorical_features: Vec<String>,
    pub hyperparameters: BTreeMap<String, String>,
    pub metrics: TrainingMetrics,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            name: "random_forest".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now().to_rfc3339(),
            target: String::new(),
            numeric_features: Vec::new(),
            categorical_features: Vec::new(),
            hyperparameters: BTreeMap::new(),
            metrics: TrainingMetrics::default(),
        }
    }
}

impl ModelMetadata {
    /// Create new metadata with name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Copy target and feature names from a fitted transform
    pub fn with_transform(mut self, transform: &FittedTransform) -> Self {
        let spec = transform.spec();
        self.target = spec.target.clone();
        self.numeric_features = spec.numeric.clone();
        self.categorical_features = spec.categorical.clone();
        self
    }

    /// Record the forest's hyperparameters
    pub fn with_forest(mut self, forest: &RandomForest) -> Self {
        let params = [
            ("n_estimators", forest.n_estimators.to_string()),
            (
                "max_depth",
                forest.max_depth.map_or_else(|| "none".to_string(), |d| d.to_string()),
            ),
            ("min_samples_split", forest.min_samples_split.to_string()),
            ("min_samples_leaf", forest.min_samples_leaf.to_string()),
            ("max_features", format!("{:?}", forest.max_features)),
            ("class_weight", format!("{:?}", forest.class_weight)),
            (
                "random_state",
                forest.random_state.map_or_else(|| "none".to_string(), |s| s.to_string()),
            ),
        ];
        for (k, v) in params {
            self.hyperparameters.insert(k.to_string(), v);
        }
        self
    }

    /// Set training metrics
    pub fn with_metrics(mut self, metrics: TrainingMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    magic: [u8; 4],
    format_version: u32,
    checksum: u64,
    payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct ArtifactPayload {
    metadata: ModelMetadata,
    age_correction: Option<AgeCorrection>,
    transform: FittedTransform,
    classifier: RandomForest,
}

/// FNV-1a over `data`
fn compute_checksum(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    data.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ *byte as u64).wrapping_mul(FNV_PRIME)
    })
}

/// A fitted transform and classifier that load as one unit
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    metadata: ModelMetadata,
    age_correction: Option<AgeCorrection>,
    transform: FittedTransform,
    classifier: RandomForest,
}

impl ModelArtifact {
    pub fn new(metadata: ModelMetadata, transform: FittedTransform, classifier: RandomForest) -> Self {
        Self {
            metadata,
            age_correction: None,
            transform,
            classifier,
        }
    }

    /// Correct ages with the training median before every transform
    pub fn with_age_correction(mut self, correction: AgeCorrection) -> Self {
        self.age_correction = Some(correction);
        self
    }

    pub fn age_correction(&self) -> Option<&AgeCorrection> {
        self.age_correction.as_ref()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn transform(&self) -> &FittedTransform {
        &self.transform
    }

    pub fn classifier(&self) -> &RandomForest {
        &self.classifier
    }

    /// Encode into the envelope format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&ArtifactPayload {
            metadata: self.metadata.clone(),
            age_correction: self.age_correction.clone(),
            transform: self.transform.clone(),
            classifier: self.classifier.clone(),
        })
        .map_err(|e| SeroError::SerializationError(format!("Failed to serialize: {}", e)))?;

        let envelope = ArtifactEnvelope {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            checksum: compute_checksum(&payload),
            payload,
        };
        bincode::serialize(&envelope)
            .map_err(|e| SeroError::SerializationError(format!("Failed to serialize: {}", e)))
    }

    /// Decode an envelope; any structural problem is `CorruptArtifact`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ARTIFACT_MAGIC.len() || bytes[..ARTIFACT_MAGIC.len()] != ARTIFACT_MAGIC {
            return Err(SeroError::CorruptArtifact("bad magic bytes".to_string()));
        }

        let envelope: ArtifactEnvelope = bincode::deserialize(bytes)
            .map_err(|e| SeroError::CorruptArtifact(format!("unreadable envelope: {}", e)))?;

        if envelope.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(SeroError::CorruptArtifact(format!(
                "unsupported format version {}",
                envelope.format_version
            )));
        }
        if compute_checksum(&envelope.payload) != envelope.checksum {
            return Err(SeroError::CorruptArtifact("checksum mismatch".to_string()));
        }

        let payload: ArtifactPayload = bincode::deserialize(&envelope.payload)
            .map_err(|e| SeroError::CorruptArtifact(format!("undecodable payload: {}", e)))?;

        Ok(Self {
            metadata: payload.metadata,
            age_correction: payload.age_correction,
            transform: payload.transform,
            classifier: payload.classifier,
        })
    }

    /// Write atomically: temp file in the destination directory, fsync, rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let bytes = self.to_bytes()?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| SeroError::IoError(e.error))?;

        info!(path = %path.display(), bytes = bytes.len(), "Saved model artifact");
        Ok(())
    }

    /// Read an artifact written by [`save`](Self::save)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let artifact = Self::from_bytes(&bytes)?;
        info!(
            path = %path.display(),
            name = %artifact.metadata.name,
            trained_at = %artifact.metadata.trained_at,
            "Loaded model artifact"
        );
        Ok(artifact)
    }

    /// Transform `rows` with the stored statistics
    pub fn features(&self, rows: &DataFrame) -> Result<Array2<f64>> {
        let missing = self.transform.spec().missing_columns(rows);
        if let Some(column) = missing.first() {
            return Err(SeroError::CorruptArtifact(format!(
                "artifact requires column '{}' which the rows lack",
                column
            )));
        }
        let x = match &self.age_correction {
            Some(correction) => self.transform.apply(&correction.apply(rows)?)?,
            None => self.transform.apply(rows)?,
        };
        if x.ncols() != self.classifier.n_features() {
            return Err(SeroError::CorruptArtifact(format!(
                "transform yields {} features, classifier expects {}",
                x.ncols(),
                self.classifier.n_features()
            )));
        }
        debug!(rows = x.nrows(), features = x.ncols(), "Transformed rows");
        Ok(x)
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, rows: &DataFrame) -> Result<Array1<f64>> {
        let x = self.features(rows)?;
        self.classifier.predict_proba(&x)
    }

    /// 0/1 label per row
    pub fn predict(&self, rows: &DataFrame) -> Result<Array1<u8>> {
        let x = self.features(rows)?;
        self.classifier.predict(&x)
    }
}
