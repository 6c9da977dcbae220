use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use roost_config::{RoostConfig, set_config_value, validate_config};
use roost_core::{Listing, current_unix_timestamp_millis, format_timestamp_millis};
use roost_recommend::{
    ActivityRequest, ActivityService, RecommendService, RecommendationRequest, StatisticsService,
    parse_snapshot_content,
};
use roost_store::{ListingFilter, SnapshotRecord, SqliteStore, Store};
use serde::Serialize;
use serde_json::{Value, json};

use crate::cli::{
    ActivityArgs, Commands, ConfigCommands, ConfigSetArgs, ListingAddArgs, ListingCommands,
    RecommendArgs, RefreshArgs, SnapshotCommands, SnapshotsArgs, StatsArgs,
};

const MAX_PAGE_SIZE: u32 = 100;
const MAX_LISTING_LIMIT: u32 = 1000;
const MAX_SNAPSHOT_LIMIT: u32 = 100;

pub fn run_command(
    workspace: &Path,
    config: &RoostConfig,
    command: Commands,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        Commands::Listing(listing) => run_listing_command(workspace, listing, out),
        Commands::View(args) => run_view_command(workspace, config, args, out),
        Commands::Like(args) => run_like_command(workspace, config, args, out),
        Commands::Recommend(args) => run_recommend_command(workspace, config, args, out),
        Commands::Refresh(args) => run_refresh_command(workspace, config, args, out),
        Commands::Snapshots(args) => run_snapshots_command(workspace, args, out),
        Commands::Snapshot(snapshot) => run_snapshot_command(workspace, snapshot, out),
        Commands::Stats(args) => run_stats_command(workspace, config, args, out),
        Commands::Config(ConfigCommands::Set(args)) => {
            run_config_set_command(workspace, args, out)
        }
    }
}

fn open_store(workspace: &Path) -> Result<SqliteStore> {
    SqliteStore::open(workspace).with_context(|| {
        format!(
            "failed to open listing store under {}",
            workspace.join(".roost").display()
        )
    })
}

fn run_listing_command(
    workspace: &Path,
    command: ListingCommands,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(workspace)?;
    match command {
        ListingCommands::Add(args) => {
            let listing = listing_from_args(args)?;
            store
                .upsert_listing(&listing)
                .with_context(|| format!("failed to save listing {}", listing.house_id))?;
            write_json(out, &listing)
        }
        ListingCommands::Import(args) => {
            let raw = fs::read_to_string(&args.path)
                .with_context(|| format!("failed to read {}", args.path.display()))?;
            let listings: Vec<Listing> = serde_json::from_str(&raw).with_context(|| {
                format!("{} is not a JSON array of listings", args.path.display())
            })?;

            let now_ms = current_unix_timestamp_millis();
            let mut imported = Vec::with_capacity(listings.len());
            for mut listing in listings {
                listing.house_id = listing.house_id.trim().to_owned();
                if listing.house_id.is_empty() {
                    bail!("listing without an id in {}", args.path.display());
                }
                if listing.created_at <= 0 {
                    listing.created_at = now_ms;
                }
                store
                    .upsert_listing(&listing)
                    .with_context(|| format!("failed to save listing {}", listing.house_id))?;
                imported.push(listing.house_id);
            }
            tracing::info!(count = imported.len(), "imported listings");
            write_json(out, &json!({ "imported": imported.len(), "house_ids": imported }))
        }
        ListingCommands::Show(args) => {
            let listing = store
                .find_listing_by_id(&args.house_id)
                .context("failed to load listing")?
                .with_context(|| format!("listing not found: {}", args.house_id))?;
            write_json(out, &listing)
        }
        ListingCommands::Remove(args) => {
            let deleted = store
                .delete_listings(&args.house_ids)
                .context("failed to delete listings")?;
            write_json(out, &json!({ "deleted": deleted }))
        }
        ListingCommands::List(args) => {
            let listings = store
                .list_listings(args.limit.clamp(1, MAX_LISTING_LIMIT))
                .context("failed to list listings")?;
            write_json(out, &listings)
        }
    }
}

fn listing_from_args(args: ListingAddArgs) -> Result<Listing> {
    let house_id = args.house_id.trim().to_owned();
    if house_id.is_empty() {
        bail!("listing id must not be empty");
    }

    Ok(Listing {
        house_id,
        title: args.title,
        community: args.community,
        city: args.city,
        town: args.town,
        house_type: args.house_type,
        orientation: args.orientation,
        tags: args.tags,
        total_price: args.total_price,
        floor_area: args.floor_area,
        unit_price: args.unit_price,
        floor_type: args.floor_type,
        cover_image: args.cover_image,
        created_at: args.created_at.unwrap_or_else(current_unix_timestamp_millis),
    })
}

fn activity_request(args: ActivityArgs) -> ActivityRequest {
    ActivityRequest {
        user_id: args.user.user_id,
        user_name: args.user.user_name,
        house_id: args.house_id,
        now_ms: None,
    }
}

fn run_view_command(
    workspace: &Path,
    config: &RoostConfig,
    args: ActivityArgs,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(workspace)?;
    let service = ActivityService::new(&store, &config.recommend);
    let outcome = service
        .record_view(&activity_request(args))
        .context("failed to record view")?;
    write_json(out, &outcome)
}

fn run_like_command(
    workspace: &Path,
    config: &RoostConfig,
    args: ActivityArgs,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(workspace)?;
    let service = ActivityService::new(&store, &config.recommend);
    let outcome = service
        .toggle_like(&activity_request(args))
        .context("failed to toggle like")?;
    write_json(out, &outcome)
}

fn run_recommend_command(
    workspace: &Path,
    config: &RoostConfig,
    args: RecommendArgs,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(workspace)?;
    let service = RecommendService::new(&store, &config.recommend);
    let page = service.recommendations(&RecommendationRequest {
        user_id: args.user.user_id,
        user_name: args.user.user_name,
        page_num: args.page.max(1),
        page_size: args.page_size.clamp(1, MAX_PAGE_SIZE),
        now_ms: None,
    });
    write_json(out, &page)
}

fn run_refresh_command(
    workspace: &Path,
    config: &RoostConfig,
    args: RefreshArgs,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(workspace)?;
    let service = RecommendService::new(&store, &config.recommend);
    let snapshot = service.refresh(args.user.user_id, args.user.user_name.as_deref(), None);
    write_json(
        out,
        &json!({
            "user_id": args.user.user_id,
            "refreshed": snapshot.is_some(),
            "snapshot": snapshot.as_ref().map(snapshot_summary),
        }),
    )
}

fn run_snapshots_command(
    workspace: &Path,
    args: SnapshotsArgs,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(workspace)?;
    let snapshots = store
        .list_snapshots(args.user_id, args.limit.clamp(1, MAX_SNAPSHOT_LIMIT))
        .context("failed to list snapshots")?;
    let summaries = snapshots.iter().map(snapshot_summary).collect::<Vec<_>>();
    write_json(out, &summaries)
}

fn run_snapshot_command(
    workspace: &Path,
    command: SnapshotCommands,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(workspace)?;
    match command {
        SnapshotCommands::Show(args) => {
            let snapshot = store
                .get_snapshot(args.snapshot_id)
                .context("failed to load snapshot")?
                .with_context(|| format!("snapshot not found: {}", args.snapshot_id))?;

            let mut detail = snapshot_summary(&snapshot);
            let model_info = snapshot
                .model_info
                .as_deref()
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok());
            detail["model_info"] = model_info.unwrap_or(Value::Null);
            match parse_snapshot_content(snapshot.content.as_deref()) {
                Ok(house_ids) => detail["house_ids"] = json!(house_ids),
                Err(err) => detail["content_error"] = json!(err.to_string()),
            }
            write_json(out, &detail)
        }
        SnapshotCommands::Remove(args) => {
            let deleted = store
                .delete_snapshots(&args.snapshot_ids)
                .context("failed to delete snapshots")?;
            write_json(out, &json!({ "deleted": deleted }))
        }
    }
}

fn run_stats_command(
    workspace: &Path,
    config: &RoostConfig,
    args: StatsArgs,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(workspace)?;
    let filter = ListingFilter {
        town: args.town,
        community: args.community,
        house_type: args.house_type,
        orientation: args.orientation,
        tag: args.tag,
    };
    let entries = StatisticsService::new(&store, &config.statistics)
        .statistics(args.dimension, &filter)
        .with_context(|| format!("failed to compute {} statistics", args.dimension.as_str()))?;
    write_json(
        out,
        &json!({ "dimension": args.dimension, "entries": entries }),
    )
}

fn run_config_set_command(
    workspace: &Path,
    args: ConfigSetArgs,
    out: &mut impl Write,
) -> Result<()> {
    let updated = set_config_value(workspace, &args.key, &args.value)
        .with_context(|| format!("failed to set config key {}", args.key))?;
    let warnings = validate_config(&updated)
        .into_iter()
        .map(|warning| json!({ "code": warning.code, "message": warning.message }))
        .collect::<Vec<_>>();
    write_json(
        out,
        &json!({ "key": args.key, "config": updated, "warnings": warnings }),
    )
}

fn snapshot_summary(snapshot: &SnapshotRecord) -> Value {
    let total = parse_snapshot_content(snapshot.content.as_deref())
        .map(|house_ids| house_ids.len())
        .ok();
    json!({
        "id": snapshot.id,
        "user_id": snapshot.user_id,
        "user_name": snapshot.user_name,
        "create_time": snapshot.create_time,
        "created": snapshot.create_time.map(format_timestamp_millis),
        "total": total,
    })
}

fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to serialize JSON output")?;
    writeln!(out).context("failed to write trailing newline")?;
    Ok(())
}
