//! strapkit - source-based package build orchestrator
//!
//! This library drives packages described by JSON recipes through fetch,
//! configure, build and install, persisting progress so interrupted builds
//! resume where they stopped and building independent packages concurrently.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Build records, recipes, the builder and the scheduler
//! - [`infra`] - Infrastructure layer (network, filesystem, processes, locking)
//! - [`config`] - Configuration constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
