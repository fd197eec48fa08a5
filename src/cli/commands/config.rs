//! Config command - show configuration and manage trusted builders

use crate::cli::args::{ConfigAction, ConfigArgs, TrustedBuildersAction};
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::trust::{AddOutcome, RemoveOutcome, TrustStore};
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> KilnResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config),
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::TrustedBuilders(args)) => {
            trusted_builders(args.action.unwrap_or(TrustedBuildersAction::List), manager, config)
                .await?
        }
    }

    Ok(())
}

fn show_config(config: &Config) {
    let toml =
        toml::to_string_pretty(config).unwrap_or_else(|_| "Error serializing config".to_string());
    println!("{}", toml);
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

/// List, add or remove trusted builders
pub async fn trusted_builders(
    action: TrustedBuildersAction,
    manager: &ConfigManager,
    config: &Config,
) -> KilnResult<()> {
    let mut store = TrustStore::new(manager.clone(), config.clone());
    let ctx = UiContext::detect();

    match action {
        TrustedBuildersAction::List => {
            println!("Trusted Builders:");
            for name in store.list() {
                println!("  {}", name);
            }
        }
        TrustedBuildersAction::Add(arg) => match store.add(&arg.builder).await? {
            AddOutcome::Added => ui::step_ok(&ctx, &format!("Builder {} is now trusted", arg.builder)),
            AddOutcome::AlreadyTrusted => {
                ui::step_info(&ctx, &format!("Builder {} is already trusted", arg.builder))
            }
            AddOutcome::Suggested => ui::step_info(
                &ctx,
                &format!("Builder {} is a suggested builder, and is trusted by default", arg.builder),
            ),
        },
        TrustedBuildersAction::Remove(arg) => match store.remove(&arg.builder).await? {
            RemoveOutcome::Removed => {
                ui::step_ok(&ctx, &format!("Builder {} is no longer trusted", arg.builder))
            }
            RemoveOutcome::NotTrusted => {
                ui::step_info(&ctx, &format!("Builder {} wasn't trusted", arg.builder))
            }
        },
    }

    Ok(())
}
