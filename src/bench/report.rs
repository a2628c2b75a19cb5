//! Static HTML report over the bad-case CSV.
//!
//! Image links are rewritten so the report keeps working when it is opened
//! from disk next to the bad-case directory: URLs pass through, paths under
//! the report's own directory become relative, and anything else is cut at
//! the bad-case directory component (or, failing that, re-rooted there by
//! file name).
use std::path::{Component, Path, PathBuf};

use crate::bench::bad_cases::{read_csv, BadCaseRow};
use crate::errors::{BenchError, BenchResult};

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn join_slash<'a>(parts: impl Iterator<Item = Component<'a>>) -> String {
    parts
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve the `src` used for one processed image.
pub fn image_src(processed: &str, report_dir: &Path, bad_case_dir_name: &str) -> String {
    let trimmed = processed.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }

    let path = Path::new(trimmed);
    if let Ok(rel) = path.strip_prefix(report_dir) {
        if path.is_absolute() && !rel.as_os_str().is_empty() {
            return join_slash(rel.components());
        }
    }

    let components: Vec<Component> = path.components().collect();
    if let Some(pos) = components.iter().position(|c| {
        c.as_os_str()
            .to_string_lossy()
            .eq_ignore_ascii_case(bad_case_dir_name)
    }) {
        return join_slash(components[pos..].iter().copied());
    }

    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| trimmed.to_string());
    format!("{bad_case_dir_name}/{base}")
}

/// Render the full HTML document.
pub fn render_report(rows: &[BadCaseRow], report_dir: &Path, bad_case_dir_name: &str) -> String {
    let mut body = String::new();
    for (i, row) in rows.iter().enumerate() {
        let src = image_src(&row.processed_image, report_dir, bad_case_dir_name);
        let image_cell = if src.is_empty() {
            "<span class=\"missing\">无图片</span>".to_string()
        } else {
            let src = escape_html(&src);
            format!("<a href=\"{src}\" target=\"_blank\"><img src=\"{src}\" loading=\"lazy\" alt=\"\"></a>")
        };
        body.push_str(&format!(
            "      <tr>\n        <td>{}</td>\n        <td>{}</td>\n        <td>{}</td>\n        <td>{}</td>\n        <td>{}</td>\n      </tr>\n",
            i + 1,
            escape_html(&row.file_name),
            escape_html(&row.instruction),
            escape_html(&row.rewritten_query),
            image_cell,
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
  <meta charset="utf-8">
  <title>Bad Case 报告</title>
  <style>
    body {{ font-family: -apple-system, "PingFang SC", "Microsoft YaHei", sans-serif; margin: 24px; }}
    table {{ border-collapse: collapse; width: 100%; }}
    th, td {{ border: 1px solid #ddd; padding: 8px; vertical-align: top; text-align: left; }}
    th {{ background: #f4f4f4; position: sticky; top: 0; }}
    td img {{ max-width: 480px; max-height: 360px; }}
    .missing {{ color: #999; }}
  </style>
</head>
<body>
  <h1>Bad Case 报告</h1>
  <p>共 {count} 条 · 生成时间 {generated}</p>
  <table>
    <thead>
      <tr><th>#</th><th>文件名</th><th>原始指令</th><th>改写后描述</th><th>标注图片</th></tr>
    </thead>
    <tbody>
{body}    </tbody>
  </table>
</body>
</html>
"#,
        count = rows.len(),
        generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        body = body,
    )
}

fn absolute_dir(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::canonicalize(&dir).unwrap_or(dir)
}

/// Read `csv_path` and write the report to `out_path`. Returns the number
/// of rows rendered.
pub fn generate_report(csv_path: &Path, out_path: &Path, bad_case_dir: &Path) -> BenchResult<usize> {
    if !csv_path.is_file() {
        return Err(BenchError::Report(format!(
            "bad case CSV not found: {}",
            csv_path.display()
        )));
    }
    let rows = read_csv(csv_path)?;

    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let dir_name = bad_case_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bad_case_img".into());
    let html = render_report(&rows, &absolute_dir(out_path), &dir_name);
    std::fs::write(out_path, html)?;

    tracing::info!(
        csv = %csv_path.display(),
        report = %out_path.display(),
        rows = rows.len(),
        "bad case report written"
    );
    Ok(rows.len())
}
