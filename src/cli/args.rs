//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Kiln - Build app images from buildpack builders
///
/// Runs the buildpack lifecycle in rootless podman containers. Trusted
/// builders run in a single container; others run each phase isolated.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an app image from source
    Build(BuildArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Interact with builders
    Builder(BuilderArgs),

    /// Interact with stacks
    Stack(StackArgs),

    /// Manage build cache volumes
    Cache(CacheArgs),

    /// Inspect lifecycles
    Lifecycle(LifecycleArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },

    #[command(flatten)]
    Deprecated(DeprecatedCommand),
}

/// Old top-level commands, kept as hidden aliases
#[derive(Subcommand, Debug)]
pub enum DeprecatedCommand {
    #[command(hide = true)]
    TrustBuilder(BuilderNameArg),

    #[command(hide = true)]
    UntrustBuilder(BuilderNameArg),

    #[command(hide = true)]
    ListTrustedBuilders,

    #[command(hide = true)]
    SuggestBuilders,

    #[command(hide = true)]
    SuggestStacks,
}

/// A single builder image name
#[derive(Parser, Debug, Clone)]
pub struct BuilderNameArg {
    /// Builder image name
    pub builder: String,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Name of the app image to build
    pub image: String,

    /// Builder image (defaults to build.default_builder from config)
    #[arg(short = 'B', long)]
    pub builder: Option<String>,

    /// App source directory (defaults to current directory)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Trust the builder for this build only
    #[arg(long)]
    pub trust_builder: bool,

    /// Lifecycle directory, archive or URL to use instead of the default
    #[arg(long)]
    pub lifecycle: Option<String>,

    /// Store the build cache in this image instead of local volumes
    #[arg(long)]
    pub cache_image: Option<String>,

    /// Discard the build cache before building
    #[arg(long)]
    pub clear_cache: bool,

    /// Push the app image to its registry instead of the local image store
    #[arg(long)]
    pub publish: bool,

    /// Build-time environment variables (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Run image to use instead of the builder's default
    #[arg(long)]
    pub run_image: Option<String>,

    /// Previous image to reuse layers and metadata from
    #[arg(long)]
    pub previous_image: Option<String>,

    /// Network for the detect and build phases (default: none)
    #[arg(long)]
    pub network: Option<String>,

    /// Image pull policy for the builder
    #[arg(long, value_enum)]
    pub pull_policy: Option<PullPolicyArg>,

    /// Abort the build after N seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Pull policy as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PullPolicyArg {
    Always,
    IfNotPresent,
    Never,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// List, add or remove trusted builders
    #[command(visible_alias = "trusted-builder")]
    TrustedBuilders(TrustedBuildersArgs),
}

/// Arguments for `config trusted-builders`
#[derive(Parser, Debug)]
pub struct TrustedBuildersArgs {
    #[command(subcommand)]
    pub action: Option<TrustedBuildersAction>,
}

/// Trusted builder subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum TrustedBuildersAction {
    /// List trusted builders
    List,

    /// Trust a builder
    Add(BuilderNameArg),

    /// Stop trusting a builder
    Remove(BuilderNameArg),
}

/// Arguments for the builder command
#[derive(Parser, Debug)]
pub struct BuilderArgs {
    #[command(subcommand)]
    pub action: BuilderAction,
}

/// Builder subcommands
#[derive(Subcommand, Debug)]
pub enum BuilderAction {
    /// List suggested builders
    Suggest,

    /// Show a builder's stack, lifecycle and buildpacks
    Inspect {
        /// Builder image name
        builder: String,
    },
}

/// Arguments for the stack command
#[derive(Parser, Debug)]
pub struct StackArgs {
    #[command(subcommand)]
    pub action: StackAction,
}

/// Stack subcommands
#[derive(Subcommand, Debug)]
pub enum StackAction {
    /// List suggested stacks
    Suggest,
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List all cache volumes
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove old caches
    Gc {
        /// Remove caches older than N days (default: from config)
        #[arg(long)]
        days: Option<u32>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove every cache volume
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the lifecycle command
#[derive(Parser, Debug)]
pub struct LifecycleArgs {
    #[command(subcommand)]
    pub action: LifecycleAction,
}

/// Lifecycle subcommands
#[derive(Subcommand, Debug)]
pub enum LifecycleAction {
    /// Show the descriptor of a lifecycle
    Inspect {
        /// Lifecycle directory, archive or URL (defaults to the pinned lifecycle)
        #[arg(long)]
        lifecycle: Option<String>,

        /// Print the descriptor as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}
