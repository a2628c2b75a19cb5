use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::errors::{BenchError, BenchResult};
use crate::record::{bad_cases, output_name, BadCase, EvaluationRecord};
use crate::render::annotator::save_canvas;
use crate::render::Annotator;
use crate::services::ImageFetcher;

/// One row of the bad-case CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadCaseRow {
    pub file_name: String,
    pub instruction: String,
    pub rewritten_query: String,
    /// Absolute path of the annotated image.
    pub processed_image: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionSummary {
    /// Bad cases found in the predictions.
    pub total: usize,
    /// Bad cases that were skipped because their image could not be produced.
    pub skipped: usize,
    pub rows: Vec<BadCaseRow>,
}

/// Re-renders every bad case with both boxes drawn.
pub struct BadCaseExtractor<'a> {
    dataset: Option<&'a Dataset>,
    fetcher: &'a dyn ImageFetcher,
    annotator: &'a Annotator,
    cache_dir: PathBuf,
    out_dir: PathBuf,
}

impl<'a> BadCaseExtractor<'a> {
    pub fn new(fetcher: &'a dyn ImageFetcher, annotator: &'a Annotator, cache_dir: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            dataset: None,
            fetcher,
            annotator,
            cache_dir,
            out_dir,
        }
    }

    /// Read source screenshots straight from the dataset when the record's
    /// file name is in the manifest.
    pub fn with_dataset(mut self, dataset: &'a Dataset) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub async fn extract(&self, records: &[EvaluationRecord]) -> BenchResult<ExtractionSummary> {
        std::fs::create_dir_all(&self.out_dir)?;
        let mut summary = ExtractionSummary::default();

        for case in bad_cases(records) {
            summary.total += 1;
            match self.process(&case).await {
                Ok(row) => summary.rows.push(row),
                Err(e) => {
                    tracing::warn!(
                        index = case.index,
                        file = %case.record.file_name,
                        error = %e,
                        "skipping bad case"
                    );
                    summary.skipped += 1;
                }
            }
        }

        tracing::info!(
            total = summary.total,
            written = summary.rows.len(),
            skipped = summary.skipped,
            out_dir = %self.out_dir.display(),
            "bad cases extracted"
        );
        Ok(summary)
    }

    async fn process(&self, case: &BadCase<'_>) -> BenchResult<BadCaseRow> {
        let record = case.record;
        let source = self.source_image(record).await?;
        let canvas = self
            .annotator
            .draw(&source, record.gt_bbox.as_ref(), record.bbox.as_ref());

        let out_path = self.out_dir.join(case.unique_name());
        save_canvas(&canvas, &out_path)?;
        let absolute = std::fs::canonicalize(&out_path)?;
        tracing::debug!(path = %absolute.display(), "bad case rendered");

        Ok(BadCaseRow {
            file_name: record.file_name.clone(),
            instruction: record.instruction.clone(),
            rewritten_query: record.rewritten_query.clone(),
            processed_image: absolute.to_string_lossy().into_owned(),
        })
    }

    /// Dataset image first, then the local cache, then the record's
    /// `oss_url`. Downloads are stored in the cache for the next pass.
    async fn source_image(&self, record: &EvaluationRecord) -> BenchResult<DynamicImage> {
        if let Some(dataset) = self.dataset {
            if let Some(sample) = dataset.find(&record.file_name) {
                let decoded = dataset
                    .read_image(sample)
                    .and_then(|bytes| Ok(image::load_from_memory(&bytes)?));
                match decoded {
                    Ok(img) => return Ok(img),
                    Err(e) => tracing::warn!(file = %record.file_name, error = %e, "dataset image unreadable"),
                }
            }
        }

        let cached = self.cache_dir.join(output_name(&record.file_name));
        if cached.is_file() {
            match image::open(&cached) {
                Ok(img) => return Ok(img),
                Err(e) => tracing::warn!(path = %cached.display(), error = %e, "cached image unreadable"),
            }
        }

        if record.oss_url.is_empty() {
            return Err(BenchError::Fetch(format!(
                "{} is not in the dataset or cache and has no oss_url",
                record.file_name
            )));
        }
        let bytes = self.fetcher.fetch(&record.oss_url).await?;
        let img = image::load_from_memory(&bytes)?;
        if let Err(e) = store(&cached, &bytes) {
            tracing::warn!(path = %cached.display(), error = %e, "could not cache downloaded image");
        }
        Ok(img)
    }
}

fn store(path: &Path, bytes: &[u8]) -> BenchResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Write the CSV with its header row. Nothing is written for an empty list.
pub fn write_csv(path: &Path, rows: &[BadCaseRow]) -> BenchResult<bool> {
    if rows.is_empty() {
        tracing::info!(path = %path.display(), "no bad cases, CSV not written");
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    tracing::info!(path = %path.display(), rows = rows.len(), "bad case CSV written");
    Ok(true)
}

pub fn read_csv(path: &Path) -> BenchResult<Vec<BadCaseRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<BadCaseRow>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::render::annotator::encode_png;
    use crate::scoring::{BoundingBox, ImageDimensions, Verdict};
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Serves canned bytes by URL and remembers what was asked for.
    #[derive(Default)]
    struct CannedFetcher {
        files: HashMap<String, Vec<u8>>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageFetcher for CannedFetcher {
        async fn fetch(&self, url: &str) -> BenchResult<Vec<u8>> {
            self.requested.lock().unwrap().push(url.to_string());
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| BenchError::Fetch(format!("404 for {url}")))
        }
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))).unwrap()
    }

    fn record(name: &str, oss_url: &str, verdict: Verdict) -> EvaluationRecord {
        EvaluationRecord {
            file_name: name.into(),
            data_type: "text".into(),
            domain: "web".into(),
            instruction: format!("find {name}"),
            img_size: ImageDimensions::new(40, 40),
            bbox: Some(BoundingBox::new(0.6, 0.6, 0.9, 0.9)),
            oss_url: oss_url.into(),
            rewritten_query: "a, \"quoted\" query".into(),
            gt_bbox: Some(BoundingBox::new(0.1, 0.1, 0.4, 0.4)),
            verdict,
            error: None,
        }
    }

    #[tokio::test]
    async fn extracts_from_cache_or_download_and_skips_unreachable() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        let out = dir.path().join("bad_case_img");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("local.png"), png(40, 40)).unwrap();

        let mut fetcher = CannedFetcher::default();
        fetcher.files.insert("https://oss/remote.png".into(), png(40, 40));

        let passing = Verdict::from_boxes(
            Some(&BoundingBox::new(0.1, 0.1, 0.4, 0.4)),
            Some(&BoundingBox::new(0.1, 0.1, 0.4, 0.4)),
        );
        let records = vec![
            record("fine.png", "https://oss/fine.png", passing),
            record("local.png", "https://oss/local.png", Verdict::failed()),
            record("remote.png", "https://oss/remote.png", Verdict::failed()),
            record("lost.png", "", Verdict::failed()),
        ];

        let annotator = Annotator::new(&RenderConfig::default());
        let extractor = BadCaseExtractor::new(&fetcher, &annotator, cache.clone(), out.clone());
        let summary = extractor.extract(&records).await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(*fetcher.requested.lock().unwrap(), vec!["https://oss/remote.png".to_string()]);

        assert!(out.join("1_local.png").exists());
        assert!(out.join("2_remote.png").exists());
        assert!(cache.join("remote.png").exists());
        assert!(Path::new(&summary.rows[0].processed_image).is_absolute());

        let rendered = image::open(out.join("1_local.png")).unwrap().to_rgba8();
        assert_eq!(rendered.get_pixel(4, 10).0, [255, 0, 0, 255]);
        assert_eq!(rendered.get_pixel(24, 30).0, [0, 200, 0, 255]);
    }

    #[tokio::test]
    async fn errored_record_renders_from_the_dataset_image() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("shop.png"), png(40, 40)).unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(
            &manifest,
            r#"[{"file_name": "shop.png", "instruction": "cart", "bbox": [4, 4, 16, 16],
                 "data_type": "icon", "data_source": "shop"}]"#,
        )
        .unwrap();
        let dataset = Dataset::load(&manifest, None).unwrap();

        let mut failed = record("shop.png", "", Verdict::failed());
        failed.bbox = None;
        failed.error = Some("Detector error: 502 Bad Gateway".into());

        let fetcher = CannedFetcher::default();
        let annotator = Annotator::new(&RenderConfig::default());
        let out = dir.path().join("bad_case_img");
        let summary = BadCaseExtractor::new(&fetcher, &annotator, dir.path().join("cache"), out.clone())
            .with_dataset(&dataset)
            .extract(&[failed])
            .await
            .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.skipped, 0);
        assert!(fetcher.requested.lock().unwrap().is_empty());
        let rendered = image::open(out.join("0_shop.png")).unwrap().to_rgba8();
        assert_eq!(rendered.get_pixel(4, 10).0, [255, 0, 0, 255]);
    }

    #[tokio::test]
    async fn downloads_are_cached_under_their_base_name() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        let out = dir.path().join("out");
        let mut fetcher = CannedFetcher::default();
        fetcher.files.insert("https://oss/up.png".into(), png(40, 40));

        let annotator = Annotator::new(&RenderConfig::default());
        let summary = BadCaseExtractor::new(&fetcher, &annotator, cache.clone(), out.clone())
            .extract(&[record("../up.png", "https://oss/up.png", Verdict::failed())])
            .await
            .unwrap();

        assert_eq!(summary.rows.len(), 1);
        assert!(cache.join("up.png").exists());
        assert!(!dir.path().join("up.png").exists());
        assert!(out.join("0_up.png").exists());
    }

    #[test]
    fn csv_keeps_quotes_and_commas() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad_cases.csv");
        let rows = vec![BadCaseRow {
            file_name: "a.png".into(),
            instruction: "click \"OK\", then wait".into(),
            rewritten_query: "the OK button".into(),
            processed_image: "/tmp/bad_case_img/0_a.png".into(),
        }];
        assert!(write_csv(&path, &rows).unwrap());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("file_name,instruction,rewritten_query,processed_image"));
        assert_eq!(read_csv(&path).unwrap(), rows);
    }

    #[test]
    fn empty_rows_write_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad_cases.csv");
        assert!(!write_csv(&path, &[]).unwrap());
        assert!(!path.exists());
    }
}
