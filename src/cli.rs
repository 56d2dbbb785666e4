//! CLI argument parsing for the recipe batch runner.
//!
//! Flags only describe where inputs live and how loud to be; environment
//! fallbacks are merged later in `config` so there is a single place that
//! decides precedence.
use clap::Parser;
use std::path::PathBuf;

/// Default location of the AutoPkg binary on managed runners.
pub const DEFAULT_AUTOPKG_PATH: &str = "/usr/local/bin/autopkg";

/// Report plist handed to `autopkg run --report-plist`.
pub const DEFAULT_REPORT_PATH: &str = "/tmp/autopkg.plist";

/// Orchestration log shared by the runner and streamed engine output.
pub const DEFAULT_LOG_FILE: &str = "/tmp/autopkg_tools.log";

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "autopkg-runner",
    version,
    about = "Run a batch of AutoPkg recipes with trust checks and Teams alerts",
    after_help = "Environment:\n  DEBUG          Enable debug mode (same as --debug)\n  OVERRIDES_DIR  Directory containing recipe override files\n  RECIPE         Comma-separated recipes to run instead of --list\n  TEAMS_WEBHOOK  Incoming webhook URL for Teams alerts\n\nExamples:\n  autopkg-runner --list recipe_list.json\n  autopkg-runner --list recipe_list.json --cleanup-list cleanup.json --promote-list promote.json\n  RECIPE=Firefox autopkg-runner --debug"
)]
pub struct RootArgs {
    /// Path to a plist or JSON list of recipe names
    #[arg(short = 'l', long, value_name = "PATH")]
    pub list: Option<PathBuf>,

    /// Disable Teams alerts and add verbosity to engine output
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Skip recipe trust verification
    #[arg(short = 'v', long, alias = "disable_verification")]
    pub disable_verification: bool,

    /// JSON list of `{name, keep_count}` entries to run version cleanup for
    #[arg(short = 'c', long, value_name = "PATH")]
    pub cleanup_list: Option<PathBuf>,

    /// JSON list of recipe names to run promotion for
    #[arg(long, value_name = "PATH")]
    pub promote_list: Option<PathBuf>,

    /// AutoPkg executable to invoke
    #[arg(long, value_name = "PATH", default_value = DEFAULT_AUTOPKG_PATH)]
    pub autopkg: PathBuf,

    /// Report plist path passed to `autopkg run`
    #[arg(long, value_name = "PATH", default_value = DEFAULT_REPORT_PATH)]
    pub report_path: PathBuf,

    /// Orchestration log file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Directory containing recipe overrides (defaults to OVERRIDES_DIR)
    #[arg(long, value_name = "DIR")]
    pub overrides_dir: Option<PathBuf>,

    /// Output path for the batch summary JSON
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Exit nonzero when any recipe ends up in the failure list
    #[arg(long)]
    pub strict: bool,
}
