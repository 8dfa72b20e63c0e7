//! Request handlers

use std::io::{Cursor, Write};
use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use polars::prelude::*;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::SeroError;
use crate::preprocessing::{format_category_number, FeatureSpec};
use crate::training::DECISION_THRESHOLD;

use super::error::{Result, ServerError};
use super::state::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": state.has_model(),
    }))
}

// ============================================================================
// Upload
// ============================================================================

#[derive(Deserialize)]
pub struct UploadQuery {
    filename: String,
}

/// Plain file name ending in `.csv`
fn validate_upload_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(ServerError::BadRequest(format!("Invalid file name: '{}'", name)));
    }
    if !name.to_ascii_lowercase().ends_with(".csv") {
        return Err(ServerError::BadRequest("Only .csv files are accepted".to_string()));
    }
    Ok(())
}

/// Store a raw CSV body under the upload prefix
pub async fn upload_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    validate_upload_name(&query.filename)?;
    if body.is_empty() {
        return Err(ServerError::BadRequest("Uploaded file is empty".to_string()));
    }

    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(1000))
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(&body))
        .finish()
        .map_err(|e| ServerError::BadRequest(format!("Not a readable CSV: {}", e)))?;

    let dir = state.config.upload_dir();
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(&query.filename);

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(&body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&path).map_err(|e| ServerError::Io(e.error))?;

    info!(
        filename = %query.filename,
        bytes = body.len(),
        rows = df.height(),
        columns = df.width(),
        "Stored upload"
    );

    let column_names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "filename": query.filename,
            "path": format!("{}/{}", state.config.upload_prefix, query.filename),
            "bytes": body.len(),
            "rows": df.height(),
            "columns": df.width(),
            "column_names": column_names,
        })),
    ))
}

// ============================================================================
// Inference
// ============================================================================

fn numeric_field(name: &str, value: Option<&Value>) -> Result<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ServerError::BadRequest(format!("Field '{}' must be numeric, got '{}'", name, s))),
        Some(other) => Err(ServerError::BadRequest(format!(
            "Field '{}' must be numeric, got {}",
            name, other
        ))),
    }
}

fn categorical_field(name: &str, value: Option<&Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(n.as_f64().map(format_category_number)),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(ServerError::BadRequest(format!(
            "Field '{}' must be a scalar, got {}",
            name, other
        ))),
    }
}

/// One-row table holding every feature the model reads; absent keys become nulls
pub(crate) fn record_to_frame(record: &Map<String, Value>, spec: &FeatureSpec) -> Result<DataFrame> {
    let known = spec
        .feature_names()
        .into_iter()
        .filter(|name| record.contains_key(*name))
        .count();
    if known == 0 {
        return Err(ServerError::BadRequest(format!(
            "Record has none of the model's features: {}",
            spec.feature_names().join(", ")
        )));
    }

    let mut columns = Vec::with_capacity(spec.n_features());
    for name in &spec.numeric {
        let value = numeric_field(name, record.get(name))?;
        columns.push(Column::from(Series::new(name.as_str().into(), vec![value])));
    }
    for name in &spec.categorical {
        let value = categorical_field(name, record.get(name))?;
        columns.push(Column::from(Series::new(name.as_str().into(), vec![value])));
    }
    DataFrame::new(columns).map_err(|e| ServerError::Internal(e.to_string()))
}

/// Score one flat JSON record
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let artifact = state
        .model()
        .ok_or_else(|| ServerError::ServiceUnavailable("No model is loaded".to_string()))?;

    let record = body
        .as_object()
        .ok_or_else(|| ServerError::BadRequest("Expected a JSON object of feature values".to_string()))?;
    let frame = record_to_frame(record, artifact.transform().spec())?;
    debug!(fields = record.len(), "Scoring record");

    let scoring = Arc::clone(&artifact);
    let probability = tokio::task::spawn_blocking(move || {
        let proba = scoring.predict_proba(&frame)?;
        proba
            .first()
            .copied()
            .ok_or_else(|| SeroError::ValidationError("no prediction produced".to_string()))
    })
    .await
    .map_err(|e| ServerError::Internal(format!("Inference task failed: {}", e)))??;

    let prediction = u8::from(probability >= DECISION_THRESHOLD);
    Ok(Json(json!({
        "prediction": prediction,
        "probability": probability,
        "model": artifact.metadata().name,
    })))
}
