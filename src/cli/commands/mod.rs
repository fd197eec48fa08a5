//! CLI command implementations

pub mod build;
pub mod builder;
pub mod cache;
pub mod completions;
pub mod config;
pub mod deprecated;
pub mod lifecycle;
pub mod stack;

pub use build::execute as build;
pub use builder::execute as builder;
pub use cache::execute as cache;
pub use completions::execute as completions;
pub use config::execute as config;
pub use lifecycle::execute as lifecycle;
pub use stack::execute as stack;
