//! Core business logic module
//!
//! # Submodules
//!
//! - [`config`] - Repository configuration
//! - [`version`] - Package versions and dependency expressions
//! - [`package`] - Package descriptors
//! - [`recipe`] - Recipe loading and substitution
//! - [`record`] - Persisted per-package build records
//! - [`stage`] - Running stage commands
//! - [`fetch`] - Source acquisition
//! - [`builder`] - Per-package build state machine
//! - [`graph`] - Dependency graph
//! - [`scheduler`] - Concurrent builds over the graph
//! - [`setup`] - Repository setup
//! - [`clean`] - Removing build output
//! - [`doctor`] - System and repository checks
//! - [`update`] - Pulling recipe changes and rebuilding

pub mod builder;
pub mod clean;
pub mod config;
pub mod doctor;
pub mod fetch;
pub mod graph;
pub mod package;
pub mod recipe;
pub mod record;
pub mod scheduler;
pub mod setup;
pub mod stage;
pub mod update;
pub mod version;
