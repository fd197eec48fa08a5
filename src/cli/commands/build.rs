//! Build command - build an app image with a builder

use crate::build::{
    context::REGISTRY_AUTH_ENV, default_daemon_socket, BuildEvent, BuildReport, BuildRequest,
    CancelToken, Orchestrator,
};
use crate::builder::BuilderImage;
use crate::cache::CacheStrategy;
use crate::cli::args::{BuildArgs, PullPolicyArg};
use crate::cli::commands::lifecycle::resolver;
use crate::config::{Config, ConfigManager, PullPolicy};
use crate::error::{KilnError, KilnResult};
use crate::lifecycle::LifecycleSource;
use crate::orchestration::{create_runtime, output_tail, ERROR_TAIL_LINES};
use crate::trust::TrustStore;
use crate::ui::{self, PhaseProgress, TaskSpinner, UiContext};
use console::style;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Execute the build command; `verbose` is the global `-v` count
pub async fn execute(
    args: BuildArgs,
    verbose: u8,
    manager: &ConfigManager,
    config: &Config,
) -> KilnResult<()> {
    let ctx = UiContext::detect();

    let builder_name = args
        .builder
        .clone()
        .or_else(|| config.build.default_builder.clone())
        .ok_or_else(|| {
            KilnError::User(
                "no builder given; pass --builder or set build.default_builder in the config"
                    .to_string(),
            )
        })?;
    let app_dir = resolve_app_dir(args.path.clone())?;

    let runtime = create_runtime()?;
    runtime.ensure_ready().await?;
    debug!("Using {} runtime", runtime.runtime_name());

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Inspecting builder {}...", builder_name));
    let pull_policy = args.pull_policy.map(PullPolicy::from).unwrap_or(config.build.pull_policy);
    let builder = match BuilderImage::inspect(&*runtime, &builder_name, pull_policy).await {
        Ok(builder) => builder,
        Err(e) => {
            spinner.stop_error("Builder could not be inspected");
            return Err(e);
        }
    };
    spinner.stop(&format!("Builder {} (stack {})", builder.name, builder.stack.id));

    let store = TrustStore::new(manager.clone(), config.clone());
    let trusted = args.trust_builder || store.is_trusted(&builder.name);
    if !trusted {
        ui::remark(
            &ctx,
            &format!(
                "Builder {} is untrusted, running each phase in its own container",
                builder.name
            ),
        );
    }

    let source = args
        .lifecycle
        .clone()
        .or_else(|| config.lifecycle.source.clone())
        .map(|s| LifecycleSource::parse(&s))
        .unwrap_or_default();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Resolving {}...", source));
    let lifecycle = match resolver(config).resolve(&source).await {
        Ok(lifecycle) => lifecycle,
        Err(e) => {
            spinner.stop_error("Lifecycle could not be resolved");
            return Err(e);
        }
    };
    spinner.stop(&format!("Lifecycle {}", lifecycle.descriptor().info.version));

    let mut request = build_request(&args, &builder_name, app_dir, config);
    request.log_level = lifecycle_log_level(verbose);

    let cancel = CancelToken::new();
    let ctrl_c = cancel.cancel_on_ctrl_c();
    let timeout_secs = args.timeout.unwrap_or(config.build.timeout_secs);
    let timer = (timeout_secs > 0).then(|| cancel.cancel_after(Duration::from_secs(timeout_secs)));

    let progress = PhaseProgress::new(&ctx, &request.image);
    let result = Orchestrator::new(&*runtime, &*lifecycle)
        .build(&builder, &request, trusted, &cancel, &|event: BuildEvent| {
            progress.on_event(event)
        })
        .await;
    progress.finish();

    ctrl_c.abort();
    if let Some(timer) = timer {
        timer.abort();
    }

    match result {
        Ok(report) => {
            print_report(&ctx, &report);
            Ok(())
        }
        Err(e) => {
            if let KilnError::PhaseExecution { phase, .. } = &e {
                let output = progress.current_output();
                if !output.is_empty() {
                    eprintln!(
                        "{}",
                        style(format!("Last output of {}:", phase.binary())).bold()
                    );
                    eprintln!("{}", output_tail(&output, ERROR_TAIL_LINES));
                }
            }
            Err(e)
        }
    }
}

fn resolve_app_dir(path: Option<PathBuf>) -> KilnResult<PathBuf> {
    let dir = match path {
        Some(p) => p,
        None => env::current_dir().map_err(|e| KilnError::io("getting current directory", e))?,
    };
    if !dir.is_dir() {
        return Err(KilnError::PathNotFound(dir));
    }
    dir.canonicalize()
        .map_err(|e| KilnError::io(format!("resolving {}", dir.display()), e))
}

fn build_request(args: &BuildArgs, builder: &str, app_dir: PathBuf, config: &Config) -> BuildRequest {
    let cache = match args.cache_image.clone().or_else(|| config.cache.image.clone()) {
        Some(reference) => CacheStrategy::Image(reference),
        None => CacheStrategy::Volume,
    };

    BuildRequest {
        image: args.image.clone(),
        builder: builder.to_string(),
        app_dir,
        publish: args.publish,
        clear_cache: args.clear_cache,
        cache,
        env: args.env.iter().cloned().collect::<BTreeMap<_, _>>(),
        run_image: args.run_image.clone(),
        previous_image: args.previous_image.clone(),
        network: args.network.clone().or_else(|| config.build.network.clone()),
        registry_auth: env::var(REGISTRY_AUTH_ENV).ok(),
        daemon_socket: if args.publish { None } else { default_daemon_socket() },
        log_level: None,
    }
}

/// Lifecycle `-log-level` for a `-v` count, lifecycle default when quiet
fn lifecycle_log_level(verbose: u8) -> Option<String> {
    (verbose > 0).then(|| "debug".to_string())
}

fn print_report(ctx: &UiContext, report: &BuildReport) {
    ui::step_ok_detail(
        ctx,
        &format!("Built {}", report.image),
        &format!(
            "{} phase(s), {:.1}s",
            report.phases.len(),
            report.duration.as_secs_f64()
        ),
    );
    ui::key_value(ctx, "Strategy", &report.strategy.to_string());
    ui::key_value(ctx, "Platform API", &report.platform_api.to_string());
    if let Some(state) = report.cache_state {
        ui::key_value(ctx, "Cache", &state.to_string());
    }
}

impl From<PullPolicyArg> for PullPolicy {
    fn from(arg: PullPolicyArg) -> Self {
        match arg {
            PullPolicyArg::Always => Self::Always,
            PullPolicyArg::IfNotPresent => Self::IfNotPresent,
            PullPolicyArg::Never => Self::Never,
        }
    }
}
