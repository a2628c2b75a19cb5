pub mod bad_cases;
pub mod metrics;
pub mod report;
pub mod runner;

pub use bad_cases::{BadCaseExtractor, BadCaseRow};
pub use metrics::MetricsSummary;
pub use runner::{BenchRunner, RunSummary};
