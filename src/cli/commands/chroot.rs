//! CLI implementation for `strapkit chroot`

use std::path::Path;

use anyhow::{bail, Result};

use super::open_repository;
use crate::infra::process::exec_chrooted;

/// Execute the chroot command; only returns on failure
pub fn execute(root: &Path, command: &[String]) -> Result<()> {
    let config = open_repository(root)?;
    let Some((program, args)) = command.split_first() else {
        bail!("No command given");
    };

    Err(exec_chrooted(&config.dirs.prefix, program, args).into())
}
