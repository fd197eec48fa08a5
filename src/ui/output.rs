//! Line output for commands, styled in interactive mode and tagged in CI

use super::context::UiContext;
use console::{style, StyledObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Ok,
    Info,
    Warn,
}

impl Step {
    /// Tag printed in front of the message in plain output
    fn tag(self) -> StyledObject<&'static str> {
        match self {
            Step::Ok => style("[OK]").green(),
            Step::Info => style("[INFO]").cyan(),
            Step::Warn => style("[WARN]").yellow(),
        }
    }

    fn emit(self, ctx: &UiContext, message: &str) {
        if !ctx.use_fancy_output() {
            println!("  {} {}", self.tag(), message);
            return;
        }
        let _ = match self {
            Step::Ok => cliclack::log::success(message),
            Step::Info => cliclack::log::info(message),
            Step::Warn => cliclack::log::warning(message),
        };
    }
}

/// Bold heading, preceded by a blank line
pub fn section(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        let _ = cliclack::log::info(style(title).bold());
    } else {
        println!("{}", style(title).bold());
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    Step::Ok.emit(ctx, message);
}

/// Success line with a dimmed detail in parentheses
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    let line = if ctx.use_fancy_output() {
        format!("{} ({})", message, style(detail).dim())
    } else {
        format!("{} ({})", message, detail)
    };
    Step::Ok.emit(ctx, &line);
}

pub fn step_info(ctx: &UiContext, message: &str) {
    Step::Info.emit(ctx, message);
}

pub fn step_warn(ctx: &UiContext, message: &str) {
    Step::Warn.emit(ctx, message);
}

/// Dimmed aside
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        let _ = cliclack::log::remark(message);
    } else {
        println!("  {}", style(message).dim());
    }
}

/// Indented `key: value` line
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    let key = if ctx.use_fancy_output() {
        style(key).dim()
    } else {
        style(key)
    };
    println!("  {}: {}", key, value);
}
