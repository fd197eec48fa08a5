//! Completions command - generate shell completions

use crate::cli::Cli;
use crate::error::KilnResult;
use clap::CommandFactory;
use clap_complete::Shell;

/// Write completions for `shell` to stdout
pub fn execute(shell: Shell) -> KilnResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
