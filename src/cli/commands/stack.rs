//! Stack command

use crate::cli::args::{StackAction, StackArgs};
use crate::error::KilnResult;
use crate::trust::SUGGESTED_STACKS;
use console::style;

/// Execute the stack command
pub async fn execute(args: StackArgs) -> KilnResult<()> {
    match args.action {
        StackAction::Suggest => suggest(),
    }
    Ok(())
}

/// Print the suggested stacks
pub fn suggest() {
    println!("Stacks maintained by the community:");
    for stack in SUGGESTED_STACKS {
        println!();
        println!("    Stack ID: {}", style(stack.id).bold());
        println!("    Description: {}", stack.description);
        println!("    Maintainer: {}", stack.maintainer);
        println!("    Build Image: {}", stack.build_image);
        println!("    Run Image: {}", stack.run_image);
    }
}
