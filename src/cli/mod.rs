//! exoserve CLI Module
//!
//! Command-line interface for serving the API, one-off predictions and
//! inspecting datasets and model artifacts.

use clap::{Args, Parser, Subcommand};
use colored::*;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::artifact;
use crate::config::ModelRegistry;
use crate::datasets::{profile, read_csv_file, FeatureStats};
use crate::inference::Predictor;
use crate::server::{run_server, ServerConfig};

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

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string())
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "exoserve")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Exoplanet classification prediction API")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where to find model artifacts; defaults come from the environment
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Directory holding model artifacts [env: MODELS_DIR]
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// TOML model registry [env: MODEL_REGISTRY]
    #[arg(long)]
    pub registry: Option<PathBuf>,
}

impl RegistryArgs {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(dir) = &self.models_dir {
            config.models_dir = dir.clone();
        }
        if let Some(path) = &self.registry {
            config.registry_path = Some(path.clone());
        }
    }

    pub fn load(&self) -> anyhow::Result<ModelRegistry> {
        let mut config = ServerConfig::default();
        self.apply(&mut config);
        Ok(config.load_registry()?)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API (default)
    Serve {
        /// Server port [env: API_PORT]
        #[arg(short, long)]
        port: Option<u16>,

        /// Server host [env: API_HOST]
        #[arg(long)]
        host: Option<String>,

        /// Directory for uploaded datasets [env: UPLOADS_DIR]
        #[arg(long)]
        uploads_dir: Option<PathBuf>,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Classify one sample
    Predict {
        /// Dataset key
        #[arg(short, long, default_value = "k2pandc")]
        dataset: String,

        /// Model key (knn, rf, cnn)
        #[arg(short, long, default_value = "knn")]
        model: String,

        /// JSON file holding an object of feature values
        #[arg(short, long)]
        features: Option<PathBuf>,

        /// Feature value as name=value; overrides the features file
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Print the statistics an upload of this CSV would record
    Describe {
        /// CSV file
        csv: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Comma-separated feature columns (all others when omitted)
        #[arg(long)]
        feature_columns: Option<String>,
    },

    /// Summarize a model artifact
    Inspect {
        #[arg(short, long, default_value = "k2pandc")]
        dataset: String,

        #[arg(short, long, default_value = "knn")]
        model: String,

        #[command(flatten)]
        registry: RegistryArgs,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Parse `name=value`; numeric values become JSON numbers
fn parse_assignment(raw: &str) -> anyhow::Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Expected NAME=VALUE, got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Empty feature name in {:?}", raw);
    }
    let value = value.trim();
    let value = match value.parse::<f64>() {
        Ok(v) => serde_json::Number::from_f64(v).map_or_else(|| Value::from(value), Value::Number),
        Err(_) => Value::from(value),
    };
    Ok((name.to_string(), value))
}

/// Merge the features file with `--set` overrides
pub fn collect_features(file: Option<&Path>, assignments: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut features = match file {
        Some(path) => match serde_json::from_slice::<Value>(&std::fs::read(path)?)? {
            Value::Object(map) => map,
            _ => anyhow::bail!("{} must contain a JSON object of feature values", path.display()),
        },
        None => Map::new(),
    };
    for raw in assignments {
        let (name, value) = parse_assignment(raw)?;
        features.insert(name, value);
    }
    Ok(features)
}

pub fn cmd_predict(
    dataset: &str,
    model: &str,
    features_file: Option<&Path>,
    assignments: &[String],
    registry: &RegistryArgs,
) -> anyhow::Result<()> {
    section("Predict");

    let features = collect_features(features_file, assignments)?;
    if features.is_empty() {
        anyhow::bail!("No features provided; use --features or --set");
    }

    let registry = registry.load()?;
    let source = registry.resolve(dataset, model)?;

    step_run(&format!("Loading {} / {}", dataset.cyan(), model.cyan()));
    let start = Instant::now();
    let predictor = Predictor::load(source)?;
    step_done(&format!("{:?}", start.elapsed()));

    let result = predictor.predict(&features)?;

    println!();
    println!("  {:<16} {}", muted("Prediction"), result.prediction.white().bold());
    let mut scores: Vec<(&String, &f64)> = result.confidence_scores.iter().collect();
    scores.sort_by(|a, b| b.1.total_cmp(a.1));
    for (class, score) in scores {
        let bar = "█".repeat((score / 5.0).round() as usize);
        println!("  {:<16} {:>6.2}% {}", muted(class), score, accent(&bar));
    }
    println!();
    Ok(())
}

pub fn cmd_describe(csv: &Path, target: &str, feature_columns: Option<&str>) -> anyhow::Result<()> {
    section("Describe");

    step_run("Loading data");
    let df = read_csv_file(csv)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    let requested = feature_columns.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    });
    let summary = profile(&df, target, requested.filter(|cols| !cols.is_empty()))?;

    println!();
    println!("  {}", "Target distribution".white().bold());
    for (value, count) in &summary.target_distribution {
        println!("  {:<24} {}", muted(value), count.to_string().white());
    }

    println!();
    println!(
        "  {:<24} {:>12} {:>12} {:>12} {:>12} {:>8}",
        "Feature".white().bold(),
        "mean",
        "std",
        "min",
        "max",
        "missing"
    );
    for name in &summary.feature_columns {
        match summary.stats(name) {
            Some(FeatureStats::Numeric { mean, std, min, max, missing }) => println!(
                "  {:<24} {:>12} {:>12} {:>12} {:>12} {:>8}",
                name,
                fmt_opt(mean),
                fmt_opt(std),
                fmt_opt(min),
                fmt_opt(max),
                missing
            ),
            Some(FeatureStats::Categorical { unique_values, missing }) => println!(
                "  {:<24} {:>12} {:>51}",
                name,
                dim(&format!("{} unique", unique_values)),
                missing
            ),
            None => {}
        }
    }
    println!();
    Ok(())
}

pub fn cmd_inspect(dataset: &str, model: &str, registry: &RegistryArgs) -> anyhow::Result<()> {
    section("Inspect");

    let registry = registry.load()?;
    let source = registry.resolve(dataset, model)?;

    step_run("Loading artifact");
    let start = Instant::now();
    let loaded = artifact::load_model(source)?;
    step_done(&format!("{:?}", start.elapsed()));

    let prep = &loaded.preprocessing;
    println!();
    println!("  {:<16} {}", muted("Estimator"), loaded.classifier.name().white().bold());
    println!("  {:<16} {}", muted("Artifact"), source.preprocessing_path().display());
    println!("  {:<16} {}", muted("Classes"), prep.label_encoder.classes().join(", "));
    println!("  {:<16} {}", muted("Features"), prep.n_features());
    for name in &prep.feature_names {
        println!("  {:<16} {} {}", "", name, dim(&format!("default {}", prep.default_value(name))));
    }
    println!();
    Ok(())
}

pub async fn cmd_serve(
    host: Option<String>,
    port: Option<u16>,
    uploads_dir: Option<PathBuf>,
    registry: &RegistryArgs,
) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(dir) = uploads_dir {
        config.uploads_dir = dir;
    }
    registry.apply(&mut config);

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "Exoplanet Prediction API".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("API    ", &format!("http://{}:{}", config.host, config.port)));
    line_box(&kv("Health ", &format!("http://{}:{}/health", config.host, config.port)));
    line_box(&kv("Models ", &config.models_dir.display().to_string()));
    line_box(&kv("Uploads", &config.uploads_dir.display().to_string()));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    line_box_empty();
    line_box_bottom();
    println!();

    run_server(config).await
}
