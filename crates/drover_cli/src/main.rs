//! # Commands
//!
//! - `drover ghe` - Scan GitHub Enterprise repos with recent commits
//! - `drover jira` - Scan recently updated Jira issues and their Google Doc links
//! - `drover gdrive` - Scan a Google Drive corpus, folder, or shared drive
//! - `drover pypi` - Scan the latest sdist of a PyPI package
//! - `drover rubygems` - Scan the latest version of a RubyGem
//! - `drover s3-listing` - Scan fresh artifacts from S3 bucket listings
//! - `drover html-listing` - Scan artifacts from HTML directory listings
//!
//! Every subcommand runs the same pipeline: enumerate targets from the
//! source, fan the external scanner out over them, aggregate the findings,
//! and publish one telemetry batch. Credentials and scanner paths come from
//! the environment; a missing variable aborts before anything is scanned.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "drover",
    version,
    about = "Drives external secret scanners across source inventories and ships the findings",
    arg_required_else_help = true,
)]
struct Cli {
    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan every GHE repository with commits in the recency window.
    Ghe(GheArgs),

    /// Scan recently updated Jira issues and their Google Doc links.
    Jira(JiraArgs),

    /// Scan a Google Drive corpus: native docs plus downloadable binaries.
    Gdrive(GdriveArgs),

    /// Scan the latest published sdist of one PyPI package.
    Pypi(PypiArgs),

    /// Scan the latest published version of one RubyGem.
    Rubygems(RubygemsArgs),

    /// Scan fresh artifacts from the S3 bucket listings in a config file.
    S3Listing(ListingArgs),

    /// Scan artifacts from the HTML directory listings in a config file.
    HtmlListing(ListingArgs),
}

/// Flags shared by every monitor variant.
#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Scan only a random sample of the enumerated targets.
    #[arg(long, value_name = "N")]
    pub sample: Option<usize>,

    /// Number of scanner processes run in parallel.
    #[arg(long, value_name = "W", default_value_t = 3)]
    pub concurrency: usize,

    /// Per-invocation scanner timeout in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub timeout: u64,

    /// Drop findings matching the built-in false-positive word list.
    #[arg(long)]
    pub filter_false_positives: bool,
}

/// Arguments for the `drover ghe` command.
#[derive(Debug, Parser)]
pub struct GheArgs {
    /// Scan only this `org/repo` instead of the whole instance.
    #[arg(long, value_name = "ORG/REPO")]
    pub knownbad: Option<String>,

    /// Scan only repositories belonging to this organization.
    #[arg(long, value_name = "NAME", conflicts_with = "knownbad")]
    pub org: Option<String>,

    /// How far back the commit window reaches.
    #[arg(long, value_name = "H", default_value_t = 24)]
    pub since_hours: i64,

    /// Shared run options.
    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the `drover jira` command.
#[derive(Debug, Parser)]
pub struct JiraArgs {
    /// Override the issue search query.
    #[arg(long, value_name = "JQL")]
    pub jql: Option<String>,

    /// Shared run options.
    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the `drover gdrive` command.
#[derive(Debug, Parser)]
pub struct GdriveArgs {
    /// Restrict the listing to children of this folder id.
    #[arg(long, value_name = "ID")]
    pub folder: Option<String>,

    /// Restrict the listing to this shared drive.
    #[arg(long, value_name = "ID")]
    pub drive_id: Option<String>,

    /// Shared run options.
    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the `drover pypi` command.
#[derive(Debug, Parser)]
pub struct PypiArgs {
    /// Package name on the index.
    pub package: String,

    /// Shared run options.
    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the `drover rubygems` command.
#[derive(Debug, Parser)]
pub struct RubygemsArgs {
    /// Gem name on the registry.
    pub gem: String,

    /// Shared run options.
    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the listing commands.
#[derive(Debug, Parser)]
pub struct ListingArgs {
    /// Path to the JSON listing config file.
    pub config: PathBuf,

    /// Shared run options.
    #[command(flatten)]
    pub run: RunArgs,
}

fn main() {
    let cli = Cli::parse();

    init_tracing(&cli.log);

    if let Err(e) = run(cli.command) {
        eprintln!("drover: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(default_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ghe(args) => commands::ghe::run(&args),
        Command::Jira(args) => commands::jira::run(&args),
        Command::Gdrive(args) => commands::gdrive::run(&args),
        Command::Pypi(args) => commands::packages::run_pypi(&args),
        Command::Rubygems(args) => commands::packages::run_rubygems(&args),
        Command::S3Listing(args) => commands::listing::run_s3(&args),
        Command::HtmlListing(args) => commands::listing::run_html(&args),
    }
}
