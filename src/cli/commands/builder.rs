//! Builder command - suggested builders and builder inspection

use crate::builder::BuilderImage;
use crate::cli::args::{BuilderAction, BuilderArgs};
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::orchestration::create_runtime;
use crate::trust::{TrustStore, SUGGESTED_BUILDERS};
use crate::ui::{self, UiContext};
use console::style;

/// Execute the builder command
pub async fn execute(args: BuilderArgs, manager: &ConfigManager, config: &Config) -> KilnResult<()> {
    match args.action {
        BuilderAction::Suggest => {
            suggest();
            Ok(())
        }
        BuilderAction::Inspect { builder } => inspect(&builder, manager, config).await,
    }
}

/// Print the suggested builders
pub fn suggest() {
    println!("Suggested builders:");
    let width = SUGGESTED_BUILDERS
        .iter()
        .map(|b| b.image.len())
        .max()
        .unwrap_or(0);
    for builder in SUGGESTED_BUILDERS {
        println!(
            "  {:<18} {:<width$}  {}",
            format!("{}:", builder.vendor),
            style(builder.image).bold(),
            style(builder.description).dim(),
            width = width
        );
    }
    println!();
    println!("Tip: Learn more about a specific builder with:");
    println!("  kiln builder inspect <builder-image>");
}

async fn inspect(name: &str, manager: &ConfigManager, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let runtime = create_runtime()?;
    runtime.ensure_ready().await?;

    let builder = BuilderImage::inspect(&*runtime, name, config.build.pull_policy).await?;
    let trusted = TrustStore::new(manager.clone(), config.clone()).is_trusted(name);

    ui::section(&ctx, &builder.name);
    ui::key_value(&ctx, "Trusted", if trusted { "yes" } else { "no" });
    if let Some(ref description) = builder.description {
        ui::key_value(&ctx, "Description", description);
    }
    ui::key_value(&ctx, "Stack", &builder.stack.id);
    if let Some(ref run_image) = builder.stack.run_image {
        ui::key_value(&ctx, "Run image", run_image);
    }
    if let Some(ref version) = builder.lifecycle.version {
        ui::key_value(&ctx, "Lifecycle", &version.to_string());
    }
    ui::key_value(&ctx, "Platform APIs", &builder.lifecycle.platform_apis.describe());
    ui::key_value(&ctx, "Buildpack APIs", &builder.lifecycle.buildpack_apis.describe());

    ui::section(&ctx, "Buildpacks");
    for bp in &builder.buildpacks {
        let api = bp.api.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string());
        println!("  {:<40} {:<12} api {}", bp.id, bp.version, api);
    }

    if !builder.order.is_empty() {
        ui::section(&ctx, "Detection order");
        for (i, group) in builder.order.iter().enumerate() {
            println!("  Group #{}:", i + 1);
            for bp in &group.group {
                let optional = if bp.optional { " (optional)" } else { "" };
                println!(
                    "    {}@{}{}",
                    bp.id,
                    bp.version.as_deref().unwrap_or("latest"),
                    optional
                );
            }
        }
    }

    Ok(())
}
