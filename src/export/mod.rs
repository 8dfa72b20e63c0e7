//! Model export and serialization module
//!
//! Persists a fitted transform and classifier as a single binary artifact
//! and restores it for prediction.

mod serializer;

pub use serializer::{ModelArtifact, ModelMetadata, ARTIFACT_FORMAT_VERSION, ARTIFACT_MAGIC};
