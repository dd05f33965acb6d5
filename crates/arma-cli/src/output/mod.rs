/// Report renderers.
///
/// Every renderer receives the complete [`AnalysisResult`] and applies the
/// minimum-size filter itself: groups smaller than `min_size` are not
/// printed, but they still count towards every total. Databases are always
/// written in ascending id order.
pub mod csv;
pub mod json;
pub mod table;

use crate::args::OutputFormat;
use anyhow::Result;
use arma_core::AnalysisResult;
use std::io::Write;

pub use self::csv::CsvRenderer;
pub use self::json::JsonRenderer;
pub use self::table::TableRenderer;

/// Label of the grand-total row or entry.
pub const ALL_LABEL: &str = "All";

pub trait ReportRenderer {
    fn render(&self, result: &AnalysisResult, out: &mut dyn Write) -> Result<()>;
}

/// Build the renderer for `format`.
pub fn renderer_for(format: OutputFormat, min_size: u64) -> Box<dyn ReportRenderer> {
    match format {
        OutputFormat::Table => Box::new(TableRenderer::new(min_size)),
        OutputFormat::Json => Box::new(JsonRenderer::new(min_size)),
        OutputFormat::Csv => Box::new(CsvRenderer::new(min_size)),
    }
}

/// Write `result` once per requested format, in order.
pub fn write_reports(
    out: &mut dyn Write,
    result: &AnalysisResult,
    formats: &[OutputFormat],
    min_size: u64,
) -> Result<()> {
    for &format in formats {
        renderer_for(format, min_size).render(result, out)?;
    }
    out.flush()?;
    Ok(())
}
