//! Report generation for level scan results.
//!
//! Generates reports in two formats:
//! - Markdown (terminal / documentation)
//! - JSON (programmatic use)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zero_common::{Result, ResultExt};

use super::aggregate::LevelTables;

// ============================================================================
// Report Format
// ============================================================================

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown format (human-readable)
    #[default]
    Markdown,
    /// JSON format (machine-readable)
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

// ============================================================================
// Level Report
// ============================================================================

/// Report generator for aggregated scan tables.
pub struct LevelReport<'a> {
    tables: &'a LevelTables,
    diagnostics: bool,
}

impl<'a> LevelReport<'a> {
    pub fn new(tables: &'a LevelTables) -> Self {
        Self {
            tables,
            diagnostics: false,
        }
    }

    /// Include the per-instrument diagnostic table.
    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Generate report in the specified format.
    pub fn generate(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Json => self.to_json(),
        }
    }

    /// Save report to file, adding the format's extension if missing.
    pub fn save_to_file(&self, path: &Path, format: ReportFormat) -> Result<PathBuf> {
        let extension = match format {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        };
        let file_path = if path.extension().is_none() {
            path.with_extension(extension)
        } else {
            path.to_path_buf()
        };

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create report directory")?;
        }
        std::fs::write(&file_path, self.generate(format)).context("Failed to write report file")?;

        Ok(file_path)
    }

    /// Generate markdown report.
    pub fn to_markdown(&self) -> String {
        let t = self.tables;
        let mut md = String::new();

        md.push_str(&format!(
            "# Key Level Proximity Scan\n\n**Scan ID**: {}\n**Time**: {}\n**Threshold**: ±{}%\n**Scanned**: {}/{} ({} evaluated, {} failed)\n\n",
            t.scan_id,
            t.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            t.threshold_pct,
            t.completed,
            t.total,
            t.evaluated,
            t.failures.len()
        ));

        let mut any_match = false;
        for bucket in t.buckets.iter().filter(|b| !b.rows.is_empty()) {
            any_match = true;
            md.push_str(&format!("## {}\n\n", bucket.level.title()));
            md.push_str("| Symbol | Price | Level | Distance |\n");
            md.push_str("|--------|-------|-------|----------|\n");
            for row in &bucket.rows {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    row.symbol,
                    format_price(row.price),
                    format_price(row.level_value),
                    format_distance(row.distance_pct)
                ));
            }
            md.push('\n');
        }
        if !any_match {
            md.push_str(&format!(
                "_No instruments within ±{}% of an enabled level._\n\n",
                t.threshold_pct
            ));
        }

        if !t.top.is_empty() {
            md.push_str(&format!("## Closest {} Overall\n\n", t.top_k));
            md.push_str("| # | Symbol | Level | Distance |\n");
            md.push_str("|---|--------|-------|----------|\n");
            for (i, r) in t.top.iter().enumerate() {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    i + 1,
                    r.symbol,
                    r.level,
                    format_distance(r.distance_pct)
                ));
            }
            md.push('\n');
        }

        if !t.failures.is_empty() {
            md.push_str("## Failures\n\n");
            for f in &t.failures {
                md.push_str(&format!("- **{}**: {}\n", f.symbol, f.message));
            }
            md.push('\n');
        }

        if self.diagnostics && !t.diagnostics.is_empty() {
            md.push_str("## Diagnostics\n\n");
            md.push_str("| Symbol | Price |");
            let levels: Vec<_> = t.buckets.iter().map(|b| b.level).collect();
            for level in &levels {
                md.push_str(&format!(" {} |", level));
            }
            md.push_str(" Error |\n|--------|-------|");
            for _ in &levels {
                md.push_str("------|");
            }
            md.push_str("-------|\n");

            for row in &t.diagnostics {
                md.push_str(&format!(
                    "| {} | {} |",
                    row.symbol,
                    row.price.map(format_price).unwrap_or_else(|| "-".into())
                ));
                for cell in &row.cells {
                    let text = cell
                        .distance_pct
                        .map(format_distance)
                        .unwrap_or_else(|| "no data".into());
                    md.push_str(&format!(" {} |", text));
                }
                md.push_str(&format!(" {} |\n", row.failure.as_deref().unwrap_or("")));
            }
            md.push('\n');
        }

        md
    }

    /// Generate JSON report.
    pub fn to_json(&self) -> String {
        let value = if self.diagnostics {
            serde_json::to_value(self.tables)
        } else {
            serde_json::to_value(self.tables).map(|mut v| {
                if let Some(obj) = v.as_object_mut() {
                    obj.remove("diagnostics");
                }
                v
            })
        };
        value
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

/// Signed distance with two decimals, e.g. `+0.91%`.
pub fn format_distance(distance_pct: f64) -> String {
    format!("{:+.2}%", distance_pct)
}

/// Price with precision scaled to magnitude.
pub fn format_price(price: f64) -> String {
    let abs = price.abs();
    if abs >= 1000.0 {
        format!("{:.2}", price)
    } else if abs >= 1.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.6}", price)
    }
}
