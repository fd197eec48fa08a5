//! Lifecycle command - show what a lifecycle supports

use crate::cli::args::{LifecycleAction, LifecycleArgs};
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::lifecycle::{
    compat::SUPPORTED_PLATFORM_APIS, LifecycleDescriptor, LifecycleResolver, LifecycleSource,
};
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the lifecycle command
pub async fn execute(args: LifecycleArgs, config: &Config) -> KilnResult<()> {
    match args.action {
        LifecycleAction::Inspect { lifecycle, json } => inspect(lifecycle, json, config).await,
    }
}

async fn inspect(source: Option<String>, json: bool, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let source = source
        .or_else(|| config.lifecycle.source.clone())
        .map(|s| LifecycleSource::parse(&s))
        .unwrap_or_default();

    // The pinned lifecycle's descriptor is embedded, no download needed
    let (descriptor, creator) = match source {
        LifecycleSource::Default => (LifecycleResolver::default_descriptor()?, None),
        ref other => {
            let mut spinner = TaskSpinner::new(&ctx);
            spinner.start(&format!("Resolving lifecycle from {}...", other));
            let lifecycle = match resolver(config).resolve(other).await {
                Ok(lifecycle) => lifecycle,
                Err(e) => {
                    spinner.stop_error("Lifecycle could not be resolved");
                    return Err(e);
                }
            };
            spinner.stop(&format!("Lifecycle {}", lifecycle.descriptor().info.version));
            let creator = lifecycle.supports_creator();
            (lifecycle.descriptor().clone(), Some(creator))
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(());
    }

    print_descriptor(&ctx, &source, &descriptor, creator);
    Ok(())
}

/// Resolver using the configured or default lifecycle cache directory
pub fn resolver(config: &Config) -> LifecycleResolver {
    LifecycleResolver::new(
        config
            .lifecycle
            .cache_dir
            .clone()
            .unwrap_or_else(ConfigManager::default_lifecycle_cache_dir),
    )
}

fn print_descriptor(
    ctx: &UiContext,
    source: &LifecycleSource,
    descriptor: &LifecycleDescriptor,
    creator: Option<bool>,
) {
    ui::section(ctx, &format!("Lifecycle {}", descriptor.info.version));
    ui::key_value(ctx, "Source", &source.to_string());
    ui::key_value(ctx, "Buildpack APIs", &descriptor.apis.buildpack.describe());
    ui::key_value(ctx, "Platform APIs", &descriptor.apis.platform.describe());

    let negotiated = SUPPORTED_PLATFORM_APIS
        .iter()
        .filter_map(|api| descriptor.apis.platform.latest_supporting(api))
        .max();
    match negotiated {
        Some(api) => ui::key_value(ctx, "Platform API used", &api.to_string()),
        None => ui::step_warn(ctx, "No platform API in common with kiln"),
    }

    if let Some(creator) = creator {
        ui::key_value(
            ctx,
            "Single-container builds",
            if creator { "supported" } else { "not supported" },
        );
    }

    if !descriptor.order.is_empty() {
        ui::remark(ctx, &format!("{} default order group(s)", descriptor.order.len()));
    }
}
