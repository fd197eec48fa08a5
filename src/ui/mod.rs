//! Terminal output for kiln commands
//!
//! Uses `cliclack` for prompts and step output, with plain `[OK]`-style
//! lines when stdout is not an interactive terminal or `CI` is set.
//!
//! ```rust,ignore
//! use kiln::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Resolving lifecycle...");
//! spinner.stop("Lifecycle 0.11.1");
//! ui::step_ok(&ctx, "Builder example/builder is now trusted");
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{key_value, remark, section, step_info, step_ok, step_ok_detail, step_warn};
pub use progress::{PhaseProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::{init_theme, KilnTheme};
