//! Cache command - manage build cache volumes

use crate::cache::{CacheManager, CacheVolume};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::KilnResult;
use crate::orchestration::{create_runtime, ContainerRuntime};
use crate::ui::{self, UiContext};
use chrono::Utc;
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> KilnResult<()> {
    let runtime = create_runtime()?;
    runtime.ensure_ready().await?;

    match args.action {
        CacheAction::List { format } => list_caches(&*runtime, format).await,
        CacheAction::Gc { days, dry_run } => gc_caches(&*runtime, config, days, dry_run).await,
        CacheAction::Clear { yes } => clear_all_caches(&*runtime, yes).await,
    }
}

/// List all cache volumes
async fn list_caches(runtime: &dyn ContainerRuntime, format: OutputFormat) -> KilnResult<()> {
    let caches = CacheManager::new(runtime).list().await?;

    if caches.is_empty() {
        println!("No cache volumes found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_cache_table(&caches),
        OutputFormat::Json => print_cache_json(&caches)?,
        OutputFormat::Plain => print_cache_plain(&caches),
    }

    Ok(())
}

fn print_cache_table(caches: &[CacheVolume]) {
    println!(
        "{:<36} {:<7} {:<28} {:<10} {:<17}",
        "VOLUME", "KIND", "APP", "LIFECYCLE", "CREATED"
    );
    println!("{}", "-".repeat(100));

    for cache in caches {
        println!(
            "{:<36} {:<7} {:<28} {:<10} {:<17}",
            cache.name,
            cache.kind.as_str(),
            cache.app,
            cache.provenance.lifecycle_version,
            cache.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("Total: {} cache(s)", caches.len());
}

#[derive(serde::Serialize)]
struct CacheJson<'a> {
    name: &'a str,
    kind: String,
    app: &'a str,
    builder: &'a str,
    lifecycle_version: &'a str,
    stack_id: &'a str,
    created_at: String,
}

fn print_cache_json(caches: &[CacheVolume]) -> KilnResult<()> {
    let json: Vec<CacheJson<'_>> = caches
        .iter()
        .map(|c| CacheJson {
            name: &c.name,
            kind: c.kind.to_string(),
            app: &c.app,
            builder: &c.builder,
            lifecycle_version: &c.provenance.lifecycle_version,
            stack_id: &c.provenance.stack_id,
            created_at: c.created_at.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_cache_plain(caches: &[CacheVolume]) {
    for cache in caches {
        println!("{}", cache.name);
    }
}

/// Remove caches older than the configured age
async fn gc_caches(
    runtime: &dyn ContainerRuntime,
    config: &Config,
    days_override: Option<u32>,
    dry_run: bool,
) -> KilnResult<()> {
    let gc_days = days_override.unwrap_or(config.cache.gc_days);

    if gc_days == 0 {
        println!("Cache GC is disabled (gc_days = 0)");
        return Ok(());
    }

    let manager = CacheManager::new(runtime);
    let stale: Vec<CacheVolume> = manager
        .list()
        .await?
        .into_iter()
        .filter(|c| c.is_older_than_days(gc_days))
        .collect();

    if stale.is_empty() {
        println!("No caches older than {} days.", gc_days);
        return Ok(());
    }

    println!("Found {} cache(s) older than {} days:", stale.len(), gc_days);
    for cache in &stale {
        let age_days = (Utc::now() - cache.created_at).num_days();
        println!("  {} {} ({} days old)", style("•").red(), cache.name, age_days);
    }

    if dry_run {
        println!();
        println!("Dry run - no caches removed.");
        return Ok(());
    }

    let removed = manager.gc(gc_days).await?;
    println!();
    println!("{} removed {} cache(s)", style("✓").green(), removed.len());

    Ok(())
}

/// Remove every kiln cache volume
async fn clear_all_caches(runtime: &dyn ContainerRuntime, skip_confirm: bool) -> KilnResult<()> {
    let ctx = UiContext::detect().with_auto_yes(skip_confirm);
    let manager = CacheManager::new(runtime);
    let caches = manager.list().await?;

    if caches.is_empty() {
        println!("No cache volumes to clear.");
        return Ok(());
    }

    println!("This will remove {} cache volume(s):", caches.len());
    for cache in &caches {
        println!("  {} {}", style("•").red(), cache.name);
    }
    println!();

    if !ui::confirm(&ctx, "Remove these caches?", false).await? {
        println!("Cancelled.");
        return Ok(());
    }

    let removed = manager.clear().await?;
    ui::step_ok(&ctx, &format!("Removed {} cache volume(s)", removed.len()));
    Ok(())
}
