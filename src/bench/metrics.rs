use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::errors::BenchResult;
use crate::record::EvaluationRecord;
use crate::scoring::Verdict;

/// Counters for one group of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub samples: usize,
    pub errors: usize,
    pub hit_top1: usize,
    pub overlap_top1: usize,
    pub hit_topk: usize,
    pub overlap_topk: usize,
}

impl GroupStats {
    fn add(&mut self, record: &EvaluationRecord) {
        self.samples += 1;
        self.errors += usize::from(record.error.is_some());
        let v = &record.verdict;
        self.hit_top1 += usize::from(v.hit_top1);
        self.overlap_top1 += usize::from(v.overlap_top1);
        self.hit_topk += usize::from(v.hit_topk);
        self.overlap_topk += usize::from(v.overlap_topk);
    }

    fn rate(&self, count: usize) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            count as f64 / self.samples as f64
        }
    }

    pub fn hit_top1_rate(&self) -> f64 {
        self.rate(self.hit_top1)
    }

    pub fn overlap_top1_rate(&self) -> f64 {
        self.rate(self.overlap_top1)
    }

    pub fn hit_topk_rate(&self) -> f64 {
        self.rate(self.hit_topk)
    }

    pub fn overlap_topk_rate(&self) -> f64 {
        self.rate(self.overlap_topk)
    }
}

/// Accuracy per `(domain, data_type)` plus the overall row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    pub groups: BTreeMap<(String, String), GroupStats>,
    pub overall: GroupStats,
}

pub fn summarize(records: &[EvaluationRecord]) -> MetricsSummary {
    let mut summary = MetricsSummary::default();
    for record in records {
        summary
            .groups
            .entry((label(&record.domain), label(&record.data_type)))
            .or_default()
            .add(record);
        summary.overall.add(record);
    }
    summary
}

fn label(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

impl MetricsSummary {
    /// Fixed-width text table, one row per group and a final overall row.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<10} {:<10} {:>8} {:>7} {:>9} {:>13} {:>9} {:>13}",
            "domain", "data_type", "samples", "errors", "hit_top1", "overlap_top1", "hit_topk", "overlap_topk"
        );
        for ((domain, data_type), stats) in &self.groups {
            push_row(&mut out, domain, data_type, stats);
        }
        push_row(&mut out, "overall", "-", &self.overall);
        out
    }
}

fn push_row(out: &mut String, domain: &str, data_type: &str, s: &GroupStats) {
    let _ = writeln!(
        out,
        "{:<10} {:<10} {:>8} {:>7} {:>9.4} {:>13.4} {:>9.4} {:>13.4}",
        domain,
        data_type,
        s.samples,
        s.errors,
        s.hit_top1_rate(),
        s.overlap_top1_rate(),
        s.hit_topk_rate(),
        s.overlap_topk_rate()
    );
}

/// Summarize `records` and write the table to `path` under a timestamped
/// header.
pub fn write_metrics(records: &[EvaluationRecord], path: &Path) -> BenchResult<MetricsSummary> {
    let summary = summarize(records);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let body = format!(
        "ScreenSpot_v2 grounding metrics\ngenerated: {}\n\n{}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        summary.render()
    );
    std::fs::write(path, body)?;
    tracing::info!(
        path = %path.display(),
        samples = summary.overall.samples,
        hit_top1 = summary.overall.hit_top1_rate(),
        overlap_top1 = summary.overall.overlap_top1_rate(),
        "metrics written"
    );
    Ok(summary)
}

/// Recompute every verdict from the stored normalized boxes. Records without
/// image dimensions or carrying an error are failed. Returns how many
/// verdicts changed.
pub fn rescore(records: &mut [EvaluationRecord]) -> usize {
    let mut changed = 0;
    for record in records.iter_mut() {
        let verdict = if record.img_size.is_none() || record.error.is_some() {
            Verdict::failed()
        } else {
            Verdict::from_boxes(record.bbox.as_ref(), record.gt_bbox.as_ref())
        };
        if verdict != record.verdict {
            tracing::debug!(
                file = %record.file_name,
                before = ?record.verdict,
                after = ?verdict,
                "verdict changed"
            );
            record.verdict = verdict;
            changed += 1;
        }
    }
    changed
}
