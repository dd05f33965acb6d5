/// Command-line arguments.
///
/// Parsed with clap's derive API. Flag names and short options follow the
/// long-standing `arma` interface so existing scripts keep working.
use arma_core::config::{
    DEFAULT_CONCURRENCY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_SCAN_COUNT,
};
use arma_core::model::size::parse_size;
use arma_core::{AnalysisConfig, ConnectionConfig, ErrorPolicy};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;
use tracing::Level;

const ABOUT: &str = "arma - Another Redis Memory Analyzer";

const LONG_ABOUT: &str = "\
arma - Another Redis Memory Analyzer

Shows which key patterns use the most memory in a Redis instance. Every key is \
sized with MEMORY USAGE, grouped by key-name pattern, and totalled per database.";

const EXAMPLES: &str = "\
EXAMPLES:
    Analyse a local instance on the default port:
        arma analyze

    Remote instance with a custom port, prompting for the password:
        arma analyze --host example.com --port 6380 --ask-password

    Group keys by a custom delimiter, two segments deep:
        arma analyze --delimiter \"-\" --level 2

    One database, larger scan batches, only groups of 1MB or more:
        arma analyze --db 3 --scan 10000 --min-size 1MB

    Machine-readable output:
        arma analyze -o json,csv --no-progress-bar > report.txt";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "arma",
    version,
    about = ABOUT,
    long_about = LONG_ABOUT,
    after_help = EXAMPLES
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log more detail to stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Analyse the memory used by each key pattern of a Redis instance
    #[command(after_help = EXAMPLES)]
    Analyze(AnalyzeArgs),
}

/// Report formats. Several may be requested; they are written in order.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One table per database plus a summary table
    Table,
    /// A single pretty-printed JSON document
    Json,
    /// One `db,key,count,size_bytes` row per group
    Csv,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Redis server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Redis server port
    #[arg(short = 'P', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// ACL user name (Redis 6+)
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    /// Redis server password. Prefer --ask-password, which keeps it out of
    /// the shell history
    #[arg(short = 'p', long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Prompt for the password on the terminal (recommended)
    #[arg(short = 'a', long)]
    pub ask_password: bool,

    /// Do not draw progress bars
    #[arg(short = 'b', long)]
    pub no_progress_bar: bool,

    /// Separator between key-name segments
    #[arg(short = 'd', long, default_value = ":")]
    pub delimiter: String,

    /// Number of leading key segments kept in a group label
    #[arg(
        short = 'l',
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub level: u32,

    /// Database to analyse (-1 analyses every database)
    #[arg(
        short = 'D',
        long,
        default_value_t = -1,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(-1..=u32::MAX as i64)
    )]
    pub db: i64,

    /// Initial SCAN batch size (keys requested per round-trip)
    #[arg(short = 'S', long = "scan", default_value_t = DEFAULT_SCAN_COUNT, value_name = "COUNT")]
    pub scan_count: usize,

    /// Hide groups smaller than this. Human readable (KB, MB, GB, MiB, ...)
    #[arg(short = 's', long, default_value = "1KB", value_parser = parse_size, value_name = "SIZE")]
    pub min_size: u64,

    /// Output format(s), comma separated or repeated
    #[arg(
        short = 'o',
        long,
        value_enum,
        value_delimiter = ',',
        action = ArgAction::Append,
        ignore_case = true,
        default_value = "table"
    )]
    pub format: Vec<OutputFormat>,

    /// Concurrent MEMORY USAGE workers per database
    #[arg(
        short = 'g',
        long = "goroutines",
        visible_alias = "concurrency",
        default_value_t = DEFAULT_CONCURRENCY,
        value_name = "NUM"
    )]
    pub concurrency: usize,

    /// Keep analysing the other databases when one fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Per-request read timeout in seconds
    #[arg(
        long,
        default_value_t = 60,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,
}

impl Cli {
    /// Maximum level for the tracing subscriber.
    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::WARN;
        }
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

impl AnalyzeArgs {
    /// Connection settings. `password` overrides `--password` (used after
    /// an interactive prompt).
    pub fn connection_config(&self, password: Option<String>) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.user.clone(),
            password: password.or_else(|| self.password.clone()).filter(|p| !p.is_empty()),
            read_timeout: Duration::from_secs(self.timeout),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            delimiter: self.delimiter.clone(),
            level: self.level as usize,
            only_db: u32::try_from(self.db).ok(),
            scan_count: self.scan_count,
            concurrency: self.concurrency,
            error_policy: if self.continue_on_error {
                ErrorPolicy::Continue
            } else {
                ErrorPolicy::Abort
            },
        }
    }

    /// Progress bars are drawn only when asked for and stderr is a terminal.
    pub fn show_progress(&self) -> bool {
        !self.no_progress_bar && console::user_attended_stderr()
    }
}
