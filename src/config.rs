use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BenchError, BenchResult};

/// Bundled system prompt for the query-rewrite model.
pub const DEFAULT_REWRITE_PROMPT: &str = include_str!("../prompts/rewrite_system.md");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub detector: DetectorConfig,
    pub rewrite: RewriteConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// JSON array of samples.
    pub manifest: PathBuf,
    /// Directory images resolve against; defaults to the manifest's directory.
    #[serde(default)]
    pub image_dir: Option<PathBuf>,
    /// Only samples whose `data_source` is listed here are evaluated.
    #[serde(default = "default_allowed_sources")]
    pub allowed_sources: Vec<String>,
}

fn default_allowed_sources() -> Vec<String> {
    ["tool", "shop", "gitlab", "forum"].into_iter().map(String::from).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_save_path")]
    pub save_path: PathBuf,
    /// Local cache of source screenshots consulted before downloading.
    #[serde(default)]
    pub image_cache_dir: Option<PathBuf>,
    #[serde(default = "default_bad_case_dir")]
    pub bad_case_dir: PathBuf,
    #[serde(default = "default_bad_case_csv")]
    pub bad_case_csv: PathBuf,
    #[serde(default = "default_report_html")]
    pub report_html: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_path: default_save_path(),
            image_cache_dir: None,
            bad_case_dir: default_bad_case_dir(),
            bad_case_csv: default_bad_case_csv(),
            report_html: default_report_html(),
        }
    }
}

impl OutputConfig {
    pub fn predictions_path(&self) -> PathBuf {
        self.save_path.join("predictions.json")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.save_path.join("metrics.txt")
    }

    pub fn visualization_dir(&self) -> PathBuf {
        self.save_path.join("visualizations")
    }

    /// Where bad-case extraction looks for (and stores) source screenshots.
    pub fn cache_dir(&self) -> PathBuf {
        self.image_cache_dir
            .clone()
            .unwrap_or_else(|| self.save_path.join("images"))
    }
}

fn default_save_path() -> PathBuf {
    PathBuf::from("./results")
}

fn default_bad_case_dir() -> PathBuf {
    PathBuf::from("./bad_case_img")
}

fn default_bad_case_csv() -> PathBuf {
    PathBuf::from("./bad_cases.csv")
}

fn default_report_html() -> PathBuf {
    PathBuf::from("./bad_cases_report.html")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    pub api_url: String,
    pub model: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Optional bearer token (falls back to env var GROUNDBENCH_REWRITE_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Extra HTTP headers sent with every rewrite request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Extra top-level fields merged into the request body.
    #[serde(default)]
    pub extra_body: toml::Table,
    /// Path to a system prompt file; the bundled prompt is used when absent.
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
    /// User text sent alongside the image. `{instruction}` is substituted.
    #[serde(default = "default_user_template")]
    pub user_template: String,
}

fn default_max_tokens() -> u32 {
    30000
}

fn default_user_template() -> String {
    "红框元素的描述: {instruction}".to_string()
}

impl RewriteConfig {
    pub fn system_prompt(&self) -> BenchResult<String> {
        match &self.system_prompt_file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                BenchError::Config(format!("cannot read system prompt {}: {e}", path.display()))
            }),
            None => Ok(DEFAULT_REWRITE_PROMPT.to_string()),
        }
    }

    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("GROUNDBENCH_REWRITE_API_KEY")
            .ok()
            .or_else(|| self.api_key.clone())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_gt_colour")]
    pub ground_truth_colour: [u8; 4],
    #[serde(default = "default_pred_colour")]
    pub prediction_colour: [u8; 4],
    #[serde(default = "default_thickness")]
    pub thickness: i32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ground_truth_colour: default_gt_colour(),
            prediction_colour: default_pred_colour(),
            thickness: default_thickness(),
        }
    }
}

fn default_gt_colour() -> [u8; 4] {
    [255, 0, 0, 255]
}

fn default_pred_colour() -> [u8; 4] {
    [0, 200, 0, 255]
}

fn default_thickness() -> i32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

impl HttpConfig {
    /// Shared client for every service call.
    pub fn build_client(&self) -> BenchResult<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?)
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> BenchResult<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(BenchError::Config(format!("config file {} not found", path.display())));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("groundbench").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(BenchError::Config(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

pub fn parse_config(content: &str) -> BenchResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

pub fn load_config(explicit: Option<&Path>) -> BenchResult<AppConfig> {
    let path = resolve_config_path(explicit)?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(
        path = %path.display(),
        manifest = %config.dataset.manifest.display(),
        rewrite_model = %config.rewrite.model,
        "config loaded"
    );
    Ok(config)
}
