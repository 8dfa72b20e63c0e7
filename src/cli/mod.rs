//! seroscreen CLI Module
//!
//! Command-line interface for training, evaluation, batch prediction and
//! serving.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::evaluation::{EvaluationReport, Evaluator};
use crate::export::ModelArtifact;
use crate::storage::{IfExists, TableStore};
use crate::training::TrainingPipeline;
use crate::utils::{save_csv, DataLoader};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "seroscreen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serology outcome classifier: train, evaluate and serve")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clean the records, train the forest and save the artifact
    Train {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output artifact path
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Seed for the split and the forest
        #[arg(long)]
        seed: Option<u64>,

        /// Number of trees
        #[arg(long)]
        trees: Option<usize>,

        /// Also store the cleaned table in this SQLite database
        #[arg(long)]
        db: Option<PathBuf>,

        /// Write the held-out evaluation as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Score a saved artifact against labelled records
    Evaluate {
        /// Labelled CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Trained artifact
        #[arg(short, long)]
        model: PathBuf,

        /// Write the evaluation as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Predict every row of a CSV file
    Predict {
        /// Trained artifact
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV with prediction and probability columns
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Describe an artifact or a data file
    Info {
        /// Trained artifact
        #[arg(short, long, required_unless_present = "data")]
        model: Option<PathBuf>,

        /// CSV file
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Start the HTTP server
    Serve {
        /// Server port
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Server host
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Artifact loaded for /api/predict
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Blob store root for uploads
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

// ─── Shared helpers ────────────────────────────────────────────────────────────

fn print_report(report: &EvaluationReport) {
    println!();
    for line in report.to_string().lines() {
        println!("  {}", line);
    }
    println!();
}

fn write_report(report: &EvaluationReport, path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    step_ok(&format!("Report written to {}", path.display()));
    Ok(())
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    data_path: &Path,
    config_path: Option<&Path>,
    model_path: Option<&Path>,
    seed: Option<u64>,
    trees: Option<usize>,
    db_path: Option<&Path>,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    section("Train");

    let mut config = match config_path {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(path) = model_path {
        config = config.with_model_path(path);
    }
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if let Some(trees) = trees {
        config = config.with_n_estimators(trees);
    }

    step_run("Loading data");
    let start = Instant::now();
    let df = DataLoader::new().load_csv(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    step_run(&format!("Training {} trees", config.forest.n_estimators.to_string().cyan()));
    let start = Instant::now();
    let outcome = TrainingPipeline::new(config.clone()).run(&df)?;
    step_done(&format!("{:?}", start.elapsed()));
    step_ok(&format!("Artifact saved to {}", config.model_path.display()));

    if let Some(db) = db_path {
        let mut store = TableStore::open(db)?;
        let rows = store.save_table(&config.table_name, &outcome.cleaned, IfExists::Replace)?;
        step_ok(&format!("Stored {} cleaned rows in {}:{}", rows, db.display(), config.table_name));
    }

    let metrics = &outcome.metrics;
    println!();
    println!("  {:<16} {}", muted("Train rows"), metrics.n_train.to_string().white());
    println!("  {:<16} {}", muted("Test rows"), metrics.n_test.to_string().white());
    println!("  {:<16} {}", muted("Train accuracy"), format!("{:.4}", metrics.train_accuracy).white().bold());
    println!("  {:<16} {}", muted("Time"), format!("{:.3}s", metrics.training_time_secs).white());

    section("Held-out evaluation");
    print_report(&outcome.report);
    if let Some(path) = report_path {
        write_report(&outcome.report, path)?;
    }
    Ok(())
}

pub fn cmd_evaluate(data_path: &Path, model_path: &Path, report_path: Option<&Path>) -> anyhow::Result<()> {
    section("Evaluate");

    step_run("Loading artifact");
    let artifact = ModelArtifact::load(model_path)?;
    step_done(&artifact.metadata().trained_at);

    step_run("Loading data");
    let df = DataLoader::new().load_csv(data_path)?;
    step_done(&format!("{} rows", df.height()));

    let report = Evaluator::new().run_on_table(&artifact, &df)?;
    print_report(&report);
    if let Some(path) = report_path {
        write_report(&report, path)?;
    }
    Ok(())
}

pub fn cmd_predict(model_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading artifact");
    let artifact = ModelArtifact::load(model_path)?;
    step_done(&artifact.metadata().name);

    step_run("Loading data");
    let mut df = DataLoader::new().load_csv(data_path)?;
    step_done(&format!("{} rows", df.height()));

    let start = Instant::now();
    let x = artifact.features(&df)?;
    let proba = artifact.classifier().predict_proba(&x)?;
    let labels: Vec<i32> = proba
        .iter()
        .map(|&p| i32::from(p >= crate::training::DECISION_THRESHOLD))
        .collect();
    let positives = labels.iter().filter(|&&l| l == 1).count();
    step_ok(&format!("Scored {} rows in {:?}", labels.len(), start.elapsed()));

    println!();
    println!("  {:<16} {}", muted("Positive"), positives.to_string().white().bold());
    println!("  {:<16} {}", muted("Negative"), (labels.len() - positives).to_string().white());

    if let Some(path) = output {
        df.with_column(Series::new("prediction".into(), labels))?;
        df.with_column(Series::new("probability".into(), proba.to_vec()))?;
        save_csv(&mut df, path)?;
        step_ok(&format!("Predictions written to {}", path.display()));
    }
    println!();
    Ok(())
}

pub fn cmd_info(model_path: Option<&Path>, data_path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = model_path {
        section("Artifact");
        let artifact = ModelArtifact::load(path)?;
        let meta = artifact.metadata();

        println!("  {:<18} {}", muted("File"), path.display());
        println!("  {:<18} {}", muted("Name"), meta.name);
        println!("  {:<18} {}", muted("Written by"), format!("v{}", meta.version));
        println!("  {:<18} {}", muted("Trained at"), meta.trained_at);
        println!("  {:<18} {}", muted("Target"), meta.target);
        println!("  {:<18} {}", muted("Numeric"), meta.numeric_features.join(", "));
        println!("  {:<18} {}", muted("Categorical"), meta.categorical_features.join(", "));
        if let Some(correction) = artifact.age_correction() {
            println!(
                "  {:<18} {}",
                muted("Age fill"),
                format!("{} = {:.1}", correction.column, correction.median)
            );
        }
        println!("  {:<18} {}", muted("Encoded width"), artifact.transform().n_output_features());
        println!("  {:<18} {}", muted("Train accuracy"), format!("{:.4}", meta.metrics.train_accuracy));
        println!();
        for (key, value) in &meta.hyperparameters {
            println!("  {:<18} {}", muted(key), value);
        }

        if let Some(importances) = artifact.classifier().feature_importances() {
            let names = artifact.transform().feature_names();
            let mut ranked: Vec<(&String, f64)> = names.iter().zip(importances.iter().copied()).collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

            section("Top features");
            for (name, score) in ranked.iter().take(10) {
                println!("  {:<32} {:>8.4}", name, score);
            }
        }
        println!();
    }

    if let Some(path) = data_path {
        section("Data Info");
        let info = DataLoader::new().file_info(path)?;
        let df = DataLoader::new().load_csv(path)?;

        println!("  {:<12} {}", muted("File"), path.display());
        println!("  {:<12} {:.2} KB", muted("Size"), info.file_size as f64 / 1024.0);
        println!("  {:<12} {}", muted("Rows"), df.height());
        println!("  {:<12} {}", muted("Columns"), df.width());
        println!();

        println!("  {:<24} {:<12} {:>6} {:>8}", muted("Column"), muted("Type"), muted("Nulls"), muted("Unique"));
        println!("  {}", dim(&"─".repeat(54)));
        for col in df.get_columns() {
            println!(
                "  {:<24} {:<12} {:>6} {:>8}",
                col.name(),
                format!("{:?}", col.dtype()).truecolor(140, 140, 140),
                col.null_count(),
                col.n_unique().unwrap_or(0)
            );
        }
        println!();
    }
    Ok(())
}

// ─── Serve ─────────────────────────────────────────────────────────────────────

pub async fn cmd_serve(
    host: &str,
    port: u16,
    model_path: Option<&Path>,
    data_dir: Option<&Path>,
) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let mut config = ServerConfig {
        host: host.to_string(),
        port,
        ..Default::default()
    };
    if let Some(path) = model_path {
        config.model_path = path.to_path_buf();
    }
    if let Some(dir) = data_dir {
        config.data_dir = dir.to_path_buf();
    }

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "seroscreen".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("Health ", &format!("http://{}:{}/api/health", host, port)));
    line_box(&kv("Predict", &format!("http://{}:{}/api/predict", host, port)));
    line_box(&kv("Upload ", &format!("http://{}:{}/api/upload", host, port)));
    line_box(&kv("Model  ", &config.model_path.display().to_string()));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    line_box_empty();
    line_box_bottom();
    println!();

    run_server(config).await
}
