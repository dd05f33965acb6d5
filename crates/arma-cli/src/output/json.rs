/// JSON report: per-database groups, a per-database summary, and a grand
/// total, with sizes in human-readable form.
///
/// ```json
/// {
///   "DBs": { "0": [ { "key": "user:*", "count": 2, "size": "4.0 kB" } ] },
///   "summary": [ { "db": 0, "count": 2, "size": "4.0 kB" } ],
///   "total": { "key": "*", "count": 2, "size": "4.0 kB" },
///   "generated_at": "2024-05-01T12:00:00+02:00"
/// }
/// ```
use super::ReportRenderer;
use anyhow::{Context, Result};
use arma_core::analysis::WILDCARD;
use arma_core::model::size::format_size;
use arma_core::AnalysisResult;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(rename = "DBs")]
    dbs: BTreeMap<u32, Vec<JsonGroup<'a>>>,
    summary: Vec<JsonDatabase>,
    total: JsonGroup<'a>,
    generated_at: DateTime<Local>,
}

#[derive(Serialize)]
struct JsonGroup<'a> {
    key: &'a str,
    count: u64,
    size: String,
}

#[derive(Serialize)]
struct JsonDatabase {
    db: u32,
    count: u64,
    size: String,
}

pub struct JsonRenderer {
    min_size: u64,
    generated_at: Option<DateTime<Local>>,
}

impl JsonRenderer {
    pub fn new(min_size: u64) -> Self {
        Self {
            min_size,
            generated_at: None,
        }
    }

    /// Stamp reports with a fixed time instead of the time of rendering.
    pub fn with_timestamp(mut self, generated_at: DateTime<Local>) -> Self {
        self.generated_at = Some(generated_at);
        self
    }
}

impl ReportRenderer for JsonRenderer {
    fn render(&self, result: &AnalysisResult, out: &mut dyn Write) -> Result<()> {
        let dbs = result
            .iter()
            .map(|report| {
                let groups = report
                    .groups_at_least(self.min_size)
                    .map(|group| JsonGroup {
                        key: group.label.as_str(),
                        count: group.count,
                        size: format_size(group.size),
                    })
                    .collect();
                (report.db, groups)
            })
            .collect();

        let summary = result
            .iter()
            .map(|report| JsonDatabase {
                db: report.db,
                count: report.total_count(),
                size: format_size(report.total_size()),
            })
            .collect();

        let report = JsonReport {
            dbs,
            summary,
            total: JsonGroup {
                key: WILDCARD,
                count: result.total_count(),
                size: format_size(result.total_size()),
            },
            generated_at: self.generated_at.unwrap_or_else(Local::now),
        };

        serde_json::to_writer_pretty(&mut *out, &report).context("failed to write JSON report")?;
        writeln!(out)?;
        Ok(())
    }
}
