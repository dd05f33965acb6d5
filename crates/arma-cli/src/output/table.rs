/// Plain-text tables: one per database, then a per-database summary.
///
/// ```text
/// +---------+-------+--------+
/// | KEY     | COUNT | SIZE   |
/// +---------+-------+--------+
/// | user:*  |     2 | 4.0 kB |
/// | order:* |     1 | 200 B  |
/// +---------+-------+--------+
/// | Total   |     3 | 4.2 kB |
/// +---------+-------+--------+
/// ```
use super::{ReportRenderer, ALL_LABEL};
use anyhow::Result;
use arma_core::model::size::format_size;
use arma_core::AnalysisResult;
use console::measure_text_width;
use std::io::Write;

pub struct TableRenderer {
    min_size: u64,
}

impl TableRenderer {
    pub fn new(min_size: u64) -> Self {
        Self { min_size }
    }
}

impl ReportRenderer for TableRenderer {
    fn render(&self, result: &AnalysisResult, out: &mut dyn Write) -> Result<()> {
        let mut summary = Table::new(["DB", "Count", "Size"]);

        for report in result.iter() {
            let mut table = Table::new(["Key", "Count", "Size"]);
            for group in report.groups_at_least(self.min_size) {
                table.row([
                    group.label.to_string(),
                    group.count.to_string(),
                    format_size(group.size),
                ]);
            }
            let size = format_size(report.total_size());
            table.footer([
                "Total".to_string(),
                report.total_count().to_string(),
                size.clone(),
            ]);
            table.write(out)?;

            summary.row([
                format!("DB {}", report.db),
                report.total_count().to_string(),
                size,
            ]);
        }

        summary.footer([
            ALL_LABEL.to_string(),
            result.total_count().to_string(),
            format_size(result.total_size()),
        ]);
        summary.write(out)?;
        Ok(())
    }
}

/// Three-column table; the middle (count) column is right-aligned.
struct Table {
    header: [String; 3],
    rows: Vec<[String; 3]>,
    footer: Option<[String; 3]>,
}

impl Table {
    fn new(header: [&str; 3]) -> Self {
        Self {
            header: header.map(str::to_uppercase),
            rows: Vec::new(),
            footer: None,
        }
    }

    fn row(&mut self, row: [String; 3]) {
        self.rows.push(row);
    }

    fn footer(&mut self, row: [String; 3]) {
        self.footer = Some(row);
    }

    fn widths(&self) -> [usize; 3] {
        let mut widths = [0; 3];
        let all = std::iter::once(&self.header)
            .chain(&self.rows)
            .chain(self.footer.as_ref());
        for row in all {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(measure_text_width(cell));
            }
        }
        widths
    }

    fn write(&self, out: &mut dyn Write) -> std::io::Result<()> {
        let widths = self.widths();
        let border = widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+");
        let border = format!("+{border}+");

        writeln!(out, "{border}")?;
        write_row(out, &self.header, &widths)?;
        writeln!(out, "{border}")?;
        for row in &self.rows {
            write_row(out, row, &widths)?;
        }
        if let Some(footer) = &self.footer {
            if !self.rows.is_empty() {
                writeln!(out, "{border}")?;
            }
            write_row(out, footer, &widths)?;
        }
        writeln!(out, "{border}")
    }
}

fn write_row(out: &mut dyn Write, row: &[String; 3], widths: &[usize; 3]) -> std::io::Result<()> {
    let pad = |cell: &str, width: usize| " ".repeat(width.saturating_sub(measure_text_width(cell)));
    writeln!(
        out,
        "| {}{} | {}{} | {}{} |",
        row[0],
        pad(&row[0], widths[0]),
        pad(&row[1], widths[1]),
        row[1],
        row[2],
        pad(&row[2], widths[2]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::sample_result;

    fn render(min_size: u64) -> String {
        let mut out = Vec::new();
        TableRenderer::new(min_size)
            .render(&sample_result(), &mut out)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn renders_database_tables_then_summary() {
        let expected = "\
+---------+-------+--------+
| KEY     | COUNT | SIZE   |
+---------+-------+--------+
| user:*  |     2 | 4.0 kB |
| order:* |     1 | 200 B  |
+---------+-------+--------+
| Total   |     3 | 4.2 kB |
+---------+-------+--------+
+---------+-------+--------+
| KEY     | COUNT | SIZE   |
+---------+-------+--------+
| cache:* |     1 | 2.0 kB |
+---------+-------+--------+
| Total   |     1 | 2.0 kB |
+---------+-------+--------+
+------+-------+--------+
| DB   | COUNT | SIZE   |
+------+-------+--------+
| DB 0 |     3 | 4.2 kB |
| DB 2 |     1 | 2.0 kB |
+------+-------+--------+
| All  |     4 | 6.2 kB |
+------+-------+--------+
";
        assert_eq!(render(0), expected);
    }

    #[test]
    fn small_groups_are_hidden_but_counted() {
        // The key column narrows to the widest visible label; the footer
        // still counts the hidden group.
        let expected = "\
+--------+-------+--------+
| KEY    | COUNT | SIZE   |
+--------+-------+--------+
| user:* |     2 | 4.0 kB |
+--------+-------+--------+
| Total  |     3 | 4.2 kB |
+--------+-------+--------+
+---------+-------+--------+
| KEY     | COUNT | SIZE   |
+---------+-------+--------+
| cache:* |     1 | 2.0 kB |
+---------+-------+--------+
| Total   |     1 | 2.0 kB |
+---------+-------+--------+
+------+-------+--------+
| DB   | COUNT | SIZE   |
+------+-------+--------+
| DB 0 |     3 | 4.2 kB |
| DB 2 |     1 | 2.0 kB |
+------+-------+--------+
| All  |     4 | 6.2 kB |
+------+-------+--------+
";
        assert_eq!(render(1_000), expected);
    }

    #[test]
    fn empty_result_prints_only_the_total() {
        let mut out = Vec::new();
        TableRenderer::new(0)
            .render(&AnalysisResult::new(), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\
+-----+-------+------+
| DB  | COUNT | SIZE |
+-----+-------+------+
| All |     0 | 0 B  |
+-----+-------+------+
"
        );
    }
}
