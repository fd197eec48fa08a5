//! Deprecated top-level commands
//!
//! Each old name keeps working: it prints a notice naming its replacement
//! and is rewritten into the replacement command, which then runs through
//! the normal dispatch.

use crate::cli::args::{
    BuilderAction, BuilderArgs, BuilderNameArg, Commands, ConfigAction, ConfigArgs,
    DeprecatedCommand, StackAction, StackArgs, TrustedBuildersAction, TrustedBuildersArgs,
};
use crate::error::{KilnError, KilnResult};
use console::style;

/// A deprecated command, the command that replaced it, and how to build the replacement
#[derive(Debug, Clone, Copy)]
pub struct Deprecation {
    pub old: &'static str,
    pub new: &'static str,
    /// Builds the replacement from the old command's builder argument
    pub canonical: fn(Option<BuilderNameArg>) -> Commands,
}

pub const DEPRECATED_COMMANDS: &[Deprecation] = &[
    Deprecation {
        old: "trust-builder",
        new: "config trusted-builders add",
        canonical: trust_builder,
    },
    Deprecation {
        old: "untrust-builder",
        new: "config trusted-builders remove",
        canonical: untrust_builder,
    },
    Deprecation {
        old: "list-trusted-builders",
        new: "config trusted-builders list",
        canonical: list_trusted_builders,
    },
    Deprecation {
        old: "suggest-builders",
        new: "builder suggest",
        canonical: suggest_builders,
    },
    Deprecation {
        old: "suggest-stacks",
        new: "stack suggest",
        canonical: suggest_stacks,
    },
];

fn trusted_builders(action: Option<TrustedBuildersAction>) -> Commands {
    Commands::Config(ConfigArgs {
        action: Some(ConfigAction::TrustedBuilders(TrustedBuildersArgs { action })),
    })
}

fn trust_builder(arg: Option<BuilderNameArg>) -> Commands {
    trusted_builders(arg.map(TrustedBuildersAction::Add))
}

fn untrust_builder(arg: Option<BuilderNameArg>) -> Commands {
    trusted_builders(arg.map(TrustedBuildersAction::Remove))
}

fn list_trusted_builders(_: Option<BuilderNameArg>) -> Commands {
    trusted_builders(Some(TrustedBuildersAction::List))
}

fn suggest_builders(_: Option<BuilderNameArg>) -> Commands {
    Commands::Builder(BuilderArgs {
        action: BuilderAction::Suggest,
    })
}

fn suggest_stacks(_: Option<BuilderNameArg>) -> Commands {
    Commands::Stack(StackArgs {
        action: StackAction::Suggest,
    })
}

impl DeprecatedCommand {
    /// Name the command is invoked as
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrustBuilder(_) => "trust-builder",
            Self::UntrustBuilder(_) => "untrust-builder",
            Self::ListTrustedBuilders => "list-trusted-builders",
            Self::SuggestBuilders => "suggest-builders",
            Self::SuggestStacks => "suggest-stacks",
        }
    }

    fn into_arg(self) -> Option<BuilderNameArg> {
        match self {
            Self::TrustBuilder(arg) | Self::UntrustBuilder(arg) => Some(arg),
            Self::ListTrustedBuilders | Self::SuggestBuilders | Self::SuggestStacks => None,
        }
    }
}

fn lookup(old: &str) -> Option<&'static Deprecation> {
    DEPRECATED_COMMANDS.iter().find(|d| d.old == old)
}

/// Replacement for a deprecated command name
pub fn replacement(old: &str) -> Option<&'static str> {
    lookup(old).map(|d| d.new)
}

/// Notice printed when a deprecated command runs
pub fn notice(old: &str) -> Option<String> {
    replacement(old).map(|new| {
        format!(
            "Command 'kiln {}' has been deprecated, please use 'kiln {}' instead",
            old, new
        )
    })
}

/// Print the deprecation notice for `old` to stderr
pub fn warn(old: &str) {
    if let Some(message) = notice(old) {
        eprintln!("{} {}", style("Warning:").yellow().bold(), message);
    }
}

/// Warn about `command` and return the command that replaces it
pub fn redirect(command: DeprecatedCommand) -> KilnResult<Commands> {
    let deprecation = lookup(command.name()).ok_or_else(|| {
        KilnError::Internal(format!("no replacement registered for '{}'", command.name()))
    })?;
    warn(deprecation.old);
    Ok((deprecation.canonical)(command.into_arg()))
}
