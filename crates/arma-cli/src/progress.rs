/// Terminal progress bars, one per database.
///
/// Fed from the analysis progress channel. Bars are created in database
/// order as soon as the selection is known, so they do not jump around as
/// pipelines start in arbitrary order.
use arma_core::scanner::progress::ScanProgress;
use arma_core::store::Database;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;

const BAR_TEMPLATE: &str = "{prefix:.bold} {pos} / {len} [{bar:40.cyan/blue}] {percent:>3}% {msg}";

pub struct ProgressDisplay {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: HashMap<u32, ProgressBar>,
}

impl ProgressDisplay {
    /// Draw to stderr.
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        Self {
            multi: MultiProgress::with_draw_target(target),
            style,
            bars: HashMap::new(),
        }
    }

    fn add_bar(&mut self, database: Database) -> &ProgressBar {
        let Self { multi, style, bars } = self;
        bars.entry(database.id).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(database.approx_keys));
            bar.set_style(style.clone());
            bar.set_prefix(format!("DB {} ({} keys)", database.id, database.approx_keys));
            bar
        })
    }

    /// Apply one progress message.
    pub fn handle(&mut self, message: &ScanProgress) {
        match message {
            ScanProgress::Databases { selected } => {
                for &database in selected {
                    self.add_bar(database);
                }
            }
            ScanProgress::Started { db, approx_keys } => {
                self.add_bar(Database {
                    id: *db,
                    approx_keys: *approx_keys,
                });
            }
            ScanProgress::KeysProcessed { db, keys } => {
                if let Some(bar) = self.bars.get(db) {
                    // The key count is only an estimate; keep the bar sane.
                    if bar.position() + keys > bar.length().unwrap_or(0) {
                        bar.set_length(bar.position() + keys);
                    }
                    bar.inc(*keys);
                }
            }
            ScanProgress::Complete { db, keys, .. } => {
                if let Some(bar) = self.bars.get(db) {
                    bar.set_length(*keys);
                    bar.set_position(*keys);
                    bar.finish_with_message("done");
                }
            }
            ScanProgress::Failed { db, .. } => {
                if let Some(bar) = self.bars.get(db) {
                    bar.abandon_with_message("failed");
                }
            }
        }
    }

    /// Position of the bar for `db`, if it has one.
    pub fn position(&self, db: u32) -> Option<u64> {
        self.bars.get(&db).map(ProgressBar::position)
    }

    /// Remove the bars before the report is printed.
    pub fn clear(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
        let _ = self.multi.clear();
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}
