use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use roost_core::UserId;
use roost_recommend::StatisticsDimension;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct ListingAddArgs {
    #[arg(long = "id", help = "Listing identifier")]
    pub house_id: String,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub community: Option<String>,

    #[arg(long)]
    pub city: Option<String>,

    #[arg(long)]
    pub town: Option<String>,

    #[arg(long)]
    pub house_type: Option<String>,

    #[arg(long)]
    pub orientation: Option<String>,

    #[arg(long, help = "Semicolon-separated tags, for example \"Garden;Pool\"")]
    pub tags: Option<String>,

    #[arg(long)]
    pub total_price: Option<f64>,

    #[arg(long)]
    pub floor_area: Option<f64>,

    #[arg(long, help = "Price per square metre")]
    pub unit_price: Option<f64>,

    #[arg(long)]
    pub floor_type: Option<String>,

    #[arg(long)]
    pub cover_image: Option<String>,

    #[arg(long, help = "Creation time in epoch milliseconds (defaults to now)")]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ListingImportArgs {
    #[arg(help = "JSON file holding an array of listings")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ListingShowArgs {
    pub house_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ListingRemoveArgs {
    #[arg(required = true, num_args = 1..)]
    pub house_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ListingListArgs {
    #[arg(
        long,
        default_value_t = 20,
        help = "Number of newest listings to show (clamped to 1..1000)"
    )]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum ListingCommands {
    /// Add or replace one listing
    Add(ListingAddArgs),
    /// Import listings from a JSON file
    Import(ListingImportArgs),
    /// Show one listing
    Show(ListingShowArgs),
    /// Remove listings by id
    Remove(ListingRemoveArgs),
    /// List the newest listings
    List(ListingListArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct UserArgs {
    #[arg(long = "user", help = "User id")]
    pub user_id: UserId,

    #[arg(long, help = "Display name stored alongside activity and snapshots")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ActivityArgs {
    #[command(flatten)]
    pub user: UserArgs,

    #[arg(help = "Listing identifier")]
    pub house_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RecommendArgs {
    #[command(flatten)]
    pub user: UserArgs,

    #[arg(long, default_value_t = 1, help = "Page number, starting at 1")]
    pub page: u32,

    #[arg(
        long,
        default_value_t = 10,
        help = "Listings per page (clamped to 1..100)"
    )]
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub user: UserArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SnapshotsArgs {
    #[arg(long = "user", help = "Only snapshots of this user")]
    pub user_id: Option<UserId>,

    #[arg(
        long,
        default_value_t = 20,
        help = "Number of snapshots to list (clamped to 1..100)"
    )]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SnapshotShowArgs {
    pub snapshot_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SnapshotRemoveArgs {
    #[arg(required = true, num_args = 1..)]
    pub snapshot_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum SnapshotCommands {
    /// Show one snapshot with its decoded content
    Show(SnapshotShowArgs),
    /// Delete snapshots by id
    Remove(SnapshotRemoveArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ConfigSetArgs {
    #[arg(help = "Dotted key, for example recommend.view_window")]
    pub key: String,

    #[arg(
        allow_hyphen_values = true,
        help = "New value, parsed as TOML when possible"
    )]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct StatsArgs {
    #[arg(
        value_parser = parse_statistics_dimension,
        help = "orientation, town, tags, house_type, floor_type, community, or price"
    )]
    pub dimension: StatisticsDimension,

    #[arg(long)]
    pub town: Option<String>,

    #[arg(long)]
    pub community: Option<String>,

    #[arg(long)]
    pub house_type: Option<String>,

    #[arg(long)]
    pub orientation: Option<String>,

    #[arg(long, help = "Only listings whose tags contain this text")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum ConfigCommands {
    /// Set one value in .roost/config.toml
    Set(ConfigSetArgs),
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Commands {
    /// Manage the listing catalogue
    #[command(subcommand)]
    Listing(ListingCommands),
    /// Record a listing view
    View(ActivityArgs),
    /// Like a listing, or remove an existing like
    Like(ActivityArgs),
    /// Show a page of recommendations, regenerating page 1 when stale
    Recommend(RecommendArgs),
    /// Regenerate recommendations regardless of staleness
    Refresh(RefreshArgs),
    /// List stored recommendation snapshots
    Snapshots(SnapshotsArgs),
    /// Inspect or delete one snapshot
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
    /// Listing counts and unit-price spread grouped by one dimension
    Stats(StatsArgs),
    /// Edit the workspace configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "ROOST listing recommendation engine")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root holding .roost/"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_statistics_dimension(value: &str) -> Result<StatisticsDimension, String> {
    value.parse()
}
