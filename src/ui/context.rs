//! Interactive vs CI detection

use std::io::IsTerminal;

/// CI systems that do not set `CI` themselves
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "BUILDKITE",
    "JENKINS_URL",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// Decides whether output may use spinners, bars and prompts
#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
    /// Approve prompts without asking (`--yes`)
    auto_yes: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        Self {
            interactive: detect_interactive(|name| std::env::var_os(name).is_some()),
            auto_yes: false,
        }
    }

    /// Plain output, no prompts
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
        }
    }

    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    /// Whether spinners and progress bars may be drawn
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}

fn detect_interactive(is_set: impl Fn(&str) -> bool) -> bool {
    if !std::io::stdout().is_terminal() || !std::io::stdin().is_terminal() {
        return false;
    }
    if std::env::var("TERM").is_ok_and(|term| term == "dumb") {
        return false;
    }
    !CI_VARS.iter().any(|name| is_set(name))
}
