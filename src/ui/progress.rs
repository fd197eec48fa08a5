//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::build::{BuildEvent, Phase};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    message: String,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a new spinner (shows immediately in interactive mode)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            message: String::new(),
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        self.message = message.to_string();

        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            // Plain output for CI
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Progress display for the lifecycle phases of a build.
///
/// Shows an indicatif bar over the phase plan in interactive mode, with the
/// latest phase output as its message. In CI every output line is printed,
/// prefixed with the lifecycle binary that produced it.
pub struct PhaseProgress {
    bar: Option<ProgressBar>,
    /// Output of the phase currently running
    current: Mutex<Vec<String>>,
}

impl PhaseProgress {
    pub fn new(ctx: &UiContext, image: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(0);
            let template = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} {prefix:.bold} {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(
                template
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                    .progress_chars("━╸─"),
            );
            bar.set_message(image.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Building {}...", image);
            None
        };
        Self {
            bar,
            current: Mutex::new(Vec::new()),
        }
    }

    /// Handle an orchestrator event
    pub fn on_event(&self, event: BuildEvent) {
        match event {
            BuildEvent::StrategyChosen(strategy) => {
                if self.bar.is_none() {
                    println!("  Running phases {}", strategy);
                }
            }
            BuildEvent::CacheResolved(Some(state)) => {
                if self.bar.is_none() {
                    println!("  Cache: {}", state);
                }
            }
            BuildEvent::CacheResolved(None) => {}
            BuildEvent::PhaseStarted { phase, index, total } => {
                if let Ok(mut lines) = self.current.lock() {
                    lines.clear();
                }
                match self.bar {
                    Some(ref bar) => {
                        bar.set_length(total as u64);
                        bar.set_position(index.saturating_sub(1) as u64);
                        bar.set_prefix(phase.to_string());
                    }
                    None => println!("===> {}", phase.as_str().to_uppercase()),
                }
            }
            BuildEvent::Output { phase, line } => {
                match self.bar {
                    Some(ref bar) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            bar.set_message(truncate(trimmed, 60));
                        }
                    }
                    None => println!("{}", prefixed(phase, &line)),
                }
                if let Ok(mut lines) = self.current.lock() {
                    lines.push(line);
                }
            }
            BuildEvent::PhaseFinished { status, .. } => {
                if let Some(ref bar) = self.bar {
                    if status == 0 {
                        bar.inc(1);
                    }
                }
            }
        }
    }

    /// Output of the last phase that started
    pub fn current_output(&self) -> Vec<String> {
        self.current
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Finish and clear the progress bar.
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn prefixed(phase: Phase, line: &str) -> String {
    format!("{} {}", style(format!("[{}]", phase.binary())).dim(), line)
}

fn truncate(line: &str, max: usize) -> String {
    if line.chars().count() > max {
        let head: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}
