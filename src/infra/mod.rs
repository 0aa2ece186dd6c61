//! Infrastructure layer
//!
//! Handles I/O that is not specific to one build stage: network downloads,
//! filesystem helpers, external tools and the repository lock.

pub mod download;
pub mod filesystem;
pub mod git;
pub mod lock;
pub mod process;
