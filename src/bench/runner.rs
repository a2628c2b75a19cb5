use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;

use crate::bench::metrics;
use crate::config::{AppConfig, OutputConfig};
use crate::dataset::{Dataset, Sample};
use crate::errors::{BenchError, BenchResult};
use crate::record::{output_name, EvaluationRecord, PredictionsWriter};
use crate::render::annotator::{encode_png, save_canvas};
use crate::render::Annotator;
use crate::scoring::{BoundingBox, ImageDimensions, Verdict};
use crate::services::{
    ElementDetector, HttpElementDetector, ImageUploader, OssUploader, QueryRewriter, VisionRewriteClient,
};

/// Counts from one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub evaluated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bad_cases: usize,
    pub predictions_path: PathBuf,
    pub metrics_path: PathBuf,
}

/// A decoded screenshot with its ground truth already normalized.
struct Screenshot {
    bytes: Vec<u8>,
    image: DynamicImage,
    dims: ImageDimensions,
    ground_truth: Option<BoundingBox>,
}

impl Screenshot {
    fn load(dataset: &Dataset, sample: &Sample) -> BenchResult<Self> {
        let bytes = dataset.read_image(sample)?;
        let image = image::load_from_memory(&bytes)?;
        let dims = ImageDimensions::new(image.width(), image.height())
            .ok_or_else(|| BenchError::Dataset(format!("{} has zero size", sample.file_name)))?;
        let ground_truth = BoundingBox::from_slice(&sample.bbox).map(|b| b.normalized(dims));
        if ground_truth.is_none() {
            tracing::warn!(file = %sample.file_name, bbox = ?sample.bbox, "ground truth is not four values");
        }
        Ok(Self {
            bytes,
            image,
            dims,
            ground_truth,
        })
    }
}

/// Sequential evaluation driver: one sample is uploaded, rewritten,
/// detected, scored and written before the next one starts.
pub struct BenchRunner {
    detector: Arc<dyn ElementDetector>,
    rewriter: Arc<dyn QueryRewriter>,
    uploader: Arc<dyn ImageUploader>,
    annotator: Annotator,
    allowed_sources: Vec<String>,
}

impl BenchRunner {
    pub fn new(
        detector: Arc<dyn ElementDetector>,
        rewriter: Arc<dyn QueryRewriter>,
        uploader: Arc<dyn ImageUploader>,
        annotator: Annotator,
        allowed_sources: Vec<String>,
    ) -> Self {
        Self {
            detector,
            rewriter,
            uploader,
            annotator,
            allowed_sources,
        }
    }

    /// Wire up the HTTP clients described by the config.
    pub fn from_config(config: &AppConfig) -> BenchResult<Self> {
        let client = config.http.build_client()?;
        Ok(Self::new(
            Arc::new(HttpElementDetector::new(&config.detector, client.clone())),
            Arc::new(VisionRewriteClient::new(&config.rewrite, client.clone())?),
            Arc::new(OssUploader::new(&config.upload, client)),
            Annotator::new(&config.render),
            config.dataset.allowed_sources.clone(),
        ))
    }

    fn is_allowed(&self, sample: &Sample) -> bool {
        self.allowed_sources.iter().any(|s| s == &sample.data_source)
    }

    pub async fn run(&self, dataset: &Dataset, output: &OutputConfig) -> BenchResult<RunSummary> {
        let vis_dir = output.visualization_dir();
        std::fs::create_dir_all(&vis_dir)?;
        let mut writer = PredictionsWriter::create(output.predictions_path())?;

        let (mut skipped, mut failed) = (0usize, 0usize);
        let total = dataset.len();
        for (idx, sample) in dataset.samples().iter().enumerate() {
            if !self.is_allowed(sample) {
                tracing::info!(
                    file = %sample.file_name,
                    data_source = %sample.data_source,
                    "skipping sample outside allowed sources"
                );
                skipped += 1;
                continue;
            }

            tracing::info!(
                index = idx + 1,
                total,
                file = %sample.file_name,
                instruction = %sample.instruction,
                "evaluating sample"
            );
            let record = self.evaluate_sample(dataset, sample, &vis_dir).await;
            if record.error.is_some() {
                failed += 1;
            }
            writer.push(record)?;
        }

        let predictions_path = writer.path().to_path_buf();
        let records = writer.into_records();
        let metrics_path = output.metrics_path();
        let summary = metrics::write_metrics(&records, &metrics_path)?;

        let result = RunSummary {
            evaluated: records.len(),
            skipped,
            failed,
            bad_cases: records.iter().filter(|r| r.is_bad_case()).count(),
            predictions_path,
            metrics_path,
        };
        tracing::info!(
            evaluated = result.evaluated,
            skipped = result.skipped,
            failed = result.failed,
            bad_cases = result.bad_cases,
            hit_top1 = summary.overall.hit_top1_rate(),
            "benchmark run complete"
        );
        Ok(result)
    }

    /// Never fails: errors end up in the record's `error` field with all
    /// verdicts cleared.
    pub async fn evaluate_sample(&self, dataset: &Dataset, sample: &Sample, vis_dir: &Path) -> EvaluationRecord {
        let mut record = EvaluationRecord {
            file_name: sample.file_name.clone(),
            data_type: sample.data_type.clone(),
            domain: sample.domain().map_or("unknown", |d| d.as_str()).to_string(),
            instruction: sample.instruction.clone(),
            img_size: None,
            bbox: None,
            oss_url: String::new(),
            rewritten_query: String::new(),
            gt_bbox: None,
            verdict: Verdict::failed(),
            error: None,
        };

        let shot = match Screenshot::load(dataset, sample) {
            Ok(shot) => shot,
            Err(e) => {
                tracing::error!(file = %sample.file_name, error = %e, "cannot load sample image");
                record.error = Some(e.to_string());
                return record;
            }
        };
        record.img_size = Some(shot.dims);
        record.gt_bbox = shot.ground_truth;

        match self.predict(&shot, sample, &mut record).await {
            Ok(()) => {
                record.verdict = Verdict::from_boxes(record.bbox.as_ref(), shot.ground_truth.as_ref());
            }
            Err(e) => {
                tracing::error!(file = %sample.file_name, error = %e, "sample failed, recording empty prediction");
                record.bbox = None;
                record.error = Some(e.to_string());
            }
        }

        let canvas = self
            .annotator
            .draw(&shot.image, shot.ground_truth.as_ref(), record.bbox.as_ref());
        let vis_path = vis_dir.join(output_name(&sample.file_name));
        match save_canvas(&canvas, &vis_path) {
            Ok(()) => tracing::debug!(path = %vis_path.display(), "visualization saved"),
            Err(e) => tracing::warn!(path = %vis_path.display(), error = %e, "visualization not saved"),
        }

        record
    }

    /// Fills `oss_url`, `rewritten_query` and `bbox` as each stage
    /// completes, so a later failure keeps what earlier stages produced.
    async fn predict(&self, shot: &Screenshot, sample: &Sample, record: &mut EvaluationRecord) -> BenchResult<()> {
        // the rewrite model is told to describe the red-boxed element
        let marked = self.annotator.draw(&shot.image, shot.ground_truth.as_ref(), None);
        let png = encode_png(&marked)?;
        let upload_name = format!("{}_marked.png", file_stem(&sample.file_name));
        record.oss_url = self.uploader.upload(&upload_name, png).await?;

        record.rewritten_query = self.rewriter.rewrite(&record.oss_url, &sample.instruction).await?;

        record.bbox = self
            .detector
            .detect(&shot.bytes, &record.rewritten_query)
            .await?
            .map(|pixels| pixels.pixel_to_normalized(shot.dims));
        if record.bbox.is_none() {
            tracing::warn!(file = %sample.file_name, "detector returned no box");
        }
        Ok(())
    }
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample".into())
}
