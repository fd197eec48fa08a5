//! Kiln - build app images from buildpack builders
//!
//! Resolves a buildpack lifecycle, checks it against the builder, and runs
//! its phases in rootless podman containers. Builders in the trust store
//! run in a single container; all others run each phase isolated with only
//! the mounts, network and credentials that phase needs.

pub mod build;
pub mod builder;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod orchestration;
pub mod trust;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{KilnError, KilnResult};
