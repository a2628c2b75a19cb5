use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Rewrite error: {0}")]
    Rewrite(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Image fetch error: {0}")]
    Fetch(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Predictions file error: {0}")]
    Predictions(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type BenchResult<T> = Result<T, BenchError>;
