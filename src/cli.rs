use std::path::PathBuf;

use clap::Parser;

use crate::bench::bad_cases::{write_csv, BadCaseExtractor};
use crate::bench::{metrics, report, BenchRunner};
use crate::config::AppConfig;
use crate::dataset::Dataset;
use crate::errors::BenchResult;
use crate::record::{load_predictions, write_predictions};
use crate::render::Annotator;
use crate::services::upload::upload_path;
use crate::services::{HttpImageFetcher, OssUploader};

/// `groundbench` - ScreenSpot_v2 grounding evaluation
///
/// Runs every allowed sample through upload, query rewrite and detection,
/// scores the predicted box against the ground truth and writes
/// `predictions.json`, `metrics.txt` and per-sample visualizations.
/// Follow-up commands turn the predictions into annotated bad cases, a CSV
/// and an HTML report.
#[derive(Parser, Debug)]
#[clap(name = "groundbench", version)]
pub struct Cli {
    /// Path to config.toml (defaults to the usual lookup locations)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub action: Commands,
}

#[derive(Parser, Debug)]
pub enum Commands {
    Run(Run),
    BadCases(BadCases),
    Report(Report),
    Metrics(Metrics),
    Rescore(Rescore),
    Upload(Upload),
}

impl Commands {
    pub async fn execute(self, config: AppConfig) -> BenchResult<()> {
        match self {
            Commands::Run(opts) => opts.run(config).await,
            Commands::BadCases(opts) => opts.extract(config).await,
            Commands::Report(opts) => opts.report(config),
            Commands::Metrics(opts) => opts.metrics(config),
            Commands::Rescore(opts) => opts.rescore(config),
            Commands::Upload(opts) => opts.upload(config).await,
        }
    }
}

#[derive(Parser, Debug)]
/// Evaluate the dataset and write predictions, metrics and visualizations.
pub struct Run {
    /// Output directory [default: output.save_path]
    #[clap(long)]
    pub save_path: Option<PathBuf>,
}

impl Run {
    pub async fn run(self, mut config: AppConfig) -> BenchResult<()> {
        if let Some(save_path) = self.save_path {
            config.output.save_path = save_path;
        }
        let dataset = Dataset::load(&config.dataset.manifest, config.dataset.image_dir.as_deref())?;
        let runner = BenchRunner::from_config(&config)?;
        let summary = runner.run(&dataset, &config.output).await?;
        println!(
            "evaluated {} samples ({} skipped, {} failed, {} bad cases)",
            summary.evaluated, summary.skipped, summary.failed, summary.bad_cases
        );
        println!("predictions: {}", summary.predictions_path.display());
        println!("metrics:     {}", summary.metrics_path.display());
        Ok(())
    }
}

#[derive(Parser, Debug)]
/// Render every bad case with both boxes and list them in a CSV.
pub struct BadCases {
    /// Predictions file [default: <save_path>/predictions.json]
    #[clap(long)]
    pub predictions: Option<PathBuf>,
    /// Directory for annotated images [default: output.bad_case_dir]
    #[clap(long)]
    pub out_dir: Option<PathBuf>,
    /// CSV path [default: output.bad_case_csv]
    #[clap(long)]
    pub csv: Option<PathBuf>,
}

impl BadCases {
    pub async fn extract(self, config: AppConfig) -> BenchResult<()> {
        let predictions = self.predictions.unwrap_or_else(|| config.output.predictions_path());
        let out_dir = self.out_dir.unwrap_or_else(|| config.output.bad_case_dir.clone());
        let csv = self.csv.unwrap_or_else(|| config.output.bad_case_csv.clone());

        let records = load_predictions(&predictions)?;
        let fetcher = HttpImageFetcher::new(config.http.build_client()?);
        let annotator = Annotator::new(&config.render);
        let dataset = match Dataset::load(&config.dataset.manifest, config.dataset.image_dir.as_deref()) {
            Ok(dataset) => Some(dataset),
            Err(e) => {
                tracing::warn!(error = %e, "dataset unavailable, using cache and oss_url only");
                None
            }
        };
        let mut extractor = BadCaseExtractor::new(&fetcher, &annotator, config.output.cache_dir(), out_dir);
        if let Some(dataset) = &dataset {
            extractor = extractor.with_dataset(dataset);
        }
        let summary = extractor.extract(&records).await?;

        println!(
            "{} bad cases: {} rendered, {} skipped",
            summary.total,
            summary.rows.len(),
            summary.skipped
        );
        if write_csv(&csv, &summary.rows)? {
            println!("csv: {}", csv.display());
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
/// Build the static HTML report from the bad-case CSV.
pub struct Report {
    /// CSV path [default: output.bad_case_csv]
    #[clap(long)]
    pub csv: Option<PathBuf>,
    /// HTML path [default: output.report_html]
    #[clap(long)]
    pub out: Option<PathBuf>,
}

impl Report {
    pub fn report(self, config: AppConfig) -> BenchResult<()> {
        let csv = self.csv.unwrap_or_else(|| config.output.bad_case_csv.clone());
        let out = self.out.unwrap_or_else(|| config.output.report_html.clone());
        let rows = report::generate_report(&csv, &out, &config.output.bad_case_dir)?;
        println!("report with {rows} rows: {}", out.display());
        Ok(())
    }
}

#[derive(Parser, Debug)]
/// Recompute the accuracy table from a predictions file.
pub struct Metrics {
    /// Predictions file [default: <save_path>/predictions.json]
    #[clap(long)]
    pub predictions: Option<PathBuf>,
    /// Output path [default: <save_path>/metrics.txt]
    #[clap(long)]
    pub out: Option<PathBuf>,
}

impl Metrics {
    pub fn metrics(self, config: AppConfig) -> BenchResult<()> {
        let predictions = self.predictions.unwrap_or_else(|| config.output.predictions_path());
        let out = self.out.unwrap_or_else(|| config.output.metrics_path());
        let records = load_predictions(&predictions)?;
        let summary = metrics::write_metrics(&records, &out)?;
        print!("{}", summary.render());
        Ok(())
    }
}

#[derive(Parser, Debug)]
/// Re-score stored predictions in place with the current scoring rules.
pub struct Rescore {
    /// Predictions file [default: <save_path>/predictions.json]
    #[clap(long)]
    pub predictions: Option<PathBuf>,
}

impl Rescore {
    pub fn rescore(self, config: AppConfig) -> BenchResult<()> {
        let predictions = self.predictions.unwrap_or_else(|| config.output.predictions_path());
        let mut records = load_predictions(&predictions)?;
        let changed = metrics::rescore(&mut records);
        write_predictions(&predictions, &records)?;

        let metrics_path = predictions.with_file_name("metrics.txt");
        let summary = metrics::write_metrics(&records, &metrics_path)?;
        println!("{changed} of {} verdicts changed", records.len());
        print!("{}", summary.render());
        Ok(())
    }
}

#[derive(Parser, Debug)]
/// Upload one file to OSS and print its URL.
pub struct Upload {
    pub file: PathBuf,
}

impl Upload {
    pub async fn upload(self, config: AppConfig) -> BenchResult<()> {
        let uploader = OssUploader::new(&config.upload, config.http.build_client()?);
        let url = upload_path(&uploader, &self.file).await?;
        println!("{url}");
        Ok(())
    }
}
