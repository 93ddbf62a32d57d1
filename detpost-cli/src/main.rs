use clap::Parser;
use detpost::{ConfLayout, DetectConfig, Detector, PriorBox, Variance};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "DetPost CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DetectConfigJson {
    num_classes: usize,
    background_label: usize,
    keep_top_k: usize,
    conf_thresh: f32,
    nms_threshold: f32,
    /// Per-class NMS cap; zero or negative disables the cap.
    nms_top_k: i64,
    variance: Variance,
    conf_layout: ConfLayout,
    parallel: bool,
}

impl Default for DetectConfigJson {
    fn default() -> Self {
        let cfg = DetectConfig::default();
        Self {
            num_classes: cfg.num_classes,
            background_label: cfg.background_label,
            keep_top_k: cfg.keep_top_k,
            conf_thresh: cfg.conf_thresh,
            nms_threshold: cfg.nms_threshold,
            nms_top_k: cfg.nms_top_k.map(|k| k as i64).unwrap_or(-1),
            variance: cfg.variance,
            conf_layout: cfg.conf_layout,
            parallel: cfg.parallel,
        }
    }
}

impl From<DetectConfigJson> for DetectConfig {
    fn from(value: DetectConfigJson) -> Self {
        Self {
            num_classes: value.num_classes,
            background_label: value.background_label,
            keep_top_k: value.keep_top_k,
            conf_thresh: value.conf_thresh,
            nms_threshold: value.nms_threshold,
            nms_top_k: (value.nms_top_k > 0).then_some(value.nms_top_k as usize),
            variance: value.variance,
            conf_layout: value.conf_layout,
            parallel: value.parallel,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    priors_path: String,
    loc_path: String,
    conf_path: String,
    output_path: Option<String>,
    detect: DetectConfigJson,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            priors_path: String::new(),
            loc_path: String::new(),
            conf_path: String::new(),
            output_path: None,
            detect: DetectConfigJson::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DetectionRecord {
    image_id: usize,
    label: usize,
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("detpost=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.priors_path.is_empty() || config.loc_path.is_empty() || config.conf_path.is_empty() {
        return Err("priors_path, loc_path and conf_path must be set in the config".into());
    }

    let priors: Vec<PriorBox> = load_json(&config.priors_path)?;
    let loc_data: Vec<f32> = load_json(&config.loc_path)?;
    let conf_data: Vec<f32> = load_json(&config.conf_path)?;

    let detector = Detector::new(priors, config.detect.into())?;
    let output = detector.run(&loc_data, &conf_data)?;

    let mut records = Vec::new();
    for image in 0..output.batch() {
        let real = output.num_detections(image).unwrap_or(0);
        for slot in 0..real {
            let row = output.row(image, slot).expect("slot within keep_top_k");
            records.push(DetectionRecord {
                image_id: row[0] as usize,
                label: row[1] as usize,
                score: row[2],
                x1: row[3],
                y1: row[4],
                x2: row[5],
                y2: row[6],
            });
        }
    }

    let json = serde_json::to_string_pretty(&records)?;
    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
