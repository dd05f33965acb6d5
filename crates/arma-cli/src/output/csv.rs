/// CSV report: one `db,key,count,size_bytes` row per visible group.
///
/// Sizes are raw byte counts so the output can be loaded straight into a
/// spreadsheet or another tool. Totals are left to the consumer.
use super::ReportRenderer;
use anyhow::{Context, Result};
use arma_core::AnalysisResult;
use serde::Serialize;
use std::io::Write;

const HEADER: [&str; 4] = ["db", "key", "count", "size_bytes"];

#[derive(Serialize)]
struct CsvRow<'a> {
    db: u32,
    key: &'a str,
    count: u64,
    size_bytes: u64,
}

pub struct CsvRenderer {
    min_size: u64,
}

impl CsvRenderer {
    pub fn new(min_size: u64) -> Self {
        Self { min_size }
    }
}

impl ReportRenderer for CsvRenderer {
    fn render(&self, result: &AnalysisResult, out: &mut dyn Write) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        writer.write_record(HEADER)?;
        for report in result.iter() {
            for group in report.groups_at_least(self.min_size) {
                writer
                    .serialize(CsvRow {
                        db: report.db,
                        key: group.label.as_str(),
                        count: group.count,
                        size_bytes: group.size,
                    })
                    .with_context(|| format!("failed to write CSV row for db {}", report.db))?;
            }
        }
        writer.flush().context("failed to flush CSV report")?;
        Ok(())
    }
}
