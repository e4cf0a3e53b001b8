use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub documents: Option<DocumentsConfig>,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmenterConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    4000
}
fn default_overlap() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractorConfig {
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_max_input_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}

impl OracleConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_secs() -> u64 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    #[serde(default = "default_ratio_threshold")]
    pub ratio_threshold: f64,
    #[serde(default = "default_jaccard_threshold")]
    pub jaccard_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: default_ratio_threshold(),
            jaccard_threshold: default_jaccard_threshold(),
        }
    }
}

fn default_ratio_threshold() -> f64 {
    0.4
}
fn default_jaccard_threshold() -> f64 {
    0.25
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    #[serde(default = "default_stale_after_months")]
    pub stale_after_months: u32,
    #[serde(default = "default_screen_batch_size")]
    pub screen_batch_size: usize,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stale_after_months: default_stale_after_months(),
            screen_batch_size: default_screen_batch_size(),
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}

fn default_stale_after_months() -> u32 {
    6
}
fn default_screen_batch_size() -> usize {
    200
}
fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./data/checkpoints")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_records_dir")]
    pub records_dir: PathBuf,
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            records_dir: default_records_dir(),
            index_path: default_index_path(),
        }
    }
}

fn default_records_dir() -> PathBuf {
    PathBuf::from("./data/commitments")
}
fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index.json")
}

impl Config {
    /// Minimal config for commands that only need defaults (tests, `segment`).
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/pledge.sqlite"),
            },
            segmenter: SegmenterConfig::default(),
            extractor: ExtractorConfig::default(),
            oracle: OracleConfig::default(),
            dedup: DedupConfig::default(),
            tracker: TrackerConfig::default(),
            documents: None,
            export: ExportConfig::default(),
        }
    }

    /// Check cross-field constraints. Every failure here is fatal at startup.
    pub fn validate(&self) -> std::result::Result<(), PipelineError> {
        let bad = |msg: String| Err(PipelineError::Configuration(msg));

        if self.segmenter.chunk_size == 0 {
            return bad("segmenter.chunk_size must be > 0".to_string());
        }
        if self.segmenter.overlap >= self.segmenter.chunk_size {
            return bad(format!(
                "segmenter.overlap ({}) must be smaller than segmenter.chunk_size ({})",
                self.segmenter.overlap, self.segmenter.chunk_size
            ));
        }
        if self.extractor.max_input_chars == 0 {
            return bad("extractor.max_input_chars must be > 0".to_string());
        }
        for (name, value) in [
            ("dedup.ratio_threshold", self.dedup.ratio_threshold),
            ("dedup.jaccard_threshold", self.dedup.jaccard_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return bad(format!("{} must be in [0.0, 1.0]", name));
            }
        }
        if self.tracker.stale_after_months == 0 {
            return bad("tracker.stale_after_months must be >= 1".to_string());
        }
        if self.tracker.screen_batch_size == 0 {
            return bad("tracker.screen_batch_size must be >= 1".to_string());
        }

        match self.oracle.provider.as_str() {
            "disabled" | "openai" => {}
            other => {
                return bad(format!(
                    "Unknown oracle provider: '{}'. Must be disabled or openai.",
                    other
                ))
            }
        }
        if self.oracle.is_enabled() && self.oracle.model.is_none() {
            return bad(format!(
                "oracle.model must be specified when provider is '{}'",
                self.oracle.provider
            ));
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
