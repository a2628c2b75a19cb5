use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{BenchError, BenchResult};
use crate::scoring::bbox::optional_box;
use crate::scoring::{BoundingBox, ImageDimensions, Verdict};

/// One scored sample, as stored in `predictions.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default, with = "optional_dims")]
    pub img_size: Option<ImageDimensions>,
    /// Normalized prediction.
    #[serde(default, with = "optional_box")]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub oss_url: String,
    #[serde(default)]
    pub rewritten_query: String,
    /// Normalized ground truth.
    #[serde(default, with = "optional_box")]
    pub gt_bbox: Option<BoundingBox>,
    #[serde(flatten)]
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationRecord {
    pub fn is_bad_case(&self) -> bool {
        self.verdict.is_bad_case()
    }
}

/// Last path component of a manifest file name, safe to join onto an output
/// directory. Names with no usable component fall back to `sample.png`.
pub fn output_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample.png".into())
}

/// A record that failed at least one verdict, with its position in the
/// predictions array.
#[derive(Debug, Clone, Copy)]
pub struct BadCase<'a> {
    pub index: usize,
    pub record: &'a EvaluationRecord,
}

impl BadCase<'_> {
    /// Output file name that stays unique even when file names repeat.
    pub fn unique_name(&self) -> String {
        format!("{}_{}", self.index, output_name(&self.record.file_name))
    }
}

pub fn bad_cases(records: &[EvaluationRecord]) -> impl Iterator<Item = BadCase<'_>> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_bad_case())
        .map(|(index, record)| BadCase { index, record })
}

/// Load a predictions file. A missing or unparseable file is an error.
pub fn load_predictions(path: &Path) -> BenchResult<Vec<EvaluationRecord>> {
    if !path.exists() {
        return Err(BenchError::Predictions(format!(
            "predictions file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let records: Vec<EvaluationRecord> = serde_json::from_str(&content).map_err(|e| {
        BenchError::Predictions(format!("cannot parse {}: {e}", path.display()))
    })?;
    tracing::info!(path = %path.display(), records = records.len(), "predictions loaded");
    Ok(records)
}

/// Serialize `records` to a temporary file beside `path`, then rename it
/// over `path`. Readers never observe a half-written array.
pub fn write_predictions(path: &Path, records: &[EvaluationRecord]) -> BenchResult<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "predictions.json".into());
    let tmp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()));

    let body = serde_json::to_vec_pretty(records)?;
    let result = (|| -> BenchResult<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Accumulates records and checkpoints the whole array after every push.
pub struct PredictionsWriter {
    path: PathBuf,
    records: Vec<EvaluationRecord>,
}

impl PredictionsWriter {
    /// Starts a fresh file containing an empty array.
    pub fn create(path: PathBuf) -> BenchResult<Self> {
        write_predictions(&path, &[])?;
        tracing::debug!(path = %path.display(), "predictions file initialised");
        Ok(Self {
            path,
            records: Vec::new(),
        })
    }

    pub fn push(&mut self, record: EvaluationRecord) -> BenchResult<()> {
        self.records.push(record);
        write_predictions(&self.path, &self.records)?;
        tracing::debug!(
            path = %self.path.display(),
            records = self.records.len(),
            "predictions checkpoint written"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<EvaluationRecord> {
        self.records
    }
}

/// `img_size` is `[w, h]`; placeholders such as `"N/A"` read back as `None`.
mod optional_dims {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::scoring::ImageDimensions;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDims {
        Pair([u32; 2]),
        Other(serde::de::IgnoredAny),
    }

    pub fn serialize<S: Serializer>(value: &Option<ImageDimensions>, serializer: S) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ImageDimensions>, D::Error> {
        Ok(match RawDims::deserialize(deserializer)? {
            RawDims::Pair([w, h]) => ImageDimensions::new(w, h),
            RawDims::Other(_) => None,
        })
    }
}
