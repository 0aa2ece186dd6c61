//! External tool invocation
//!
//! Source acquisition and `update` shell out to `tar`, `git` and `patch`.
//! Tools inherit the terminal so their progress output reaches the user.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{ChrootError, FetchError};

/// Run `tool` with `args` in `cwd`, failing on a non-zero exit
pub async fn run_tool(package: &str, tool: &str, args: &[&str], cwd: Option<&Path>) -> Result<(), FetchError> {
    debug!("{package}: {tool} {}", args.join(" "));

    let mut command = Command::new(tool);
    command.args(args).kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let status = command.status().await.map_err(|e| FetchError::SpawnFailed {
        tool: tool.to_string(),
        error: e.to_string(),
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(FetchError::ToolFailed {
            package: package.to_string(),
            tool: tool.to_string(),
            status: status.code().unwrap_or(-1),
        })
    }
}

/// Run `tool` with `args` in `cwd` and return what it printed on stdout
pub async fn tool_output(package: &str, tool: &str, args: &[&str], cwd: Option<&Path>) -> Result<String, FetchError> {
    debug!("{package}: {tool} {}", args.join(" "));

    let mut command = Command::new(tool);
    command
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let output = command.output().await.map_err(|e| FetchError::SpawnFailed {
        tool: tool.to_string(),
        error: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(FetchError::ToolFailed {
            package: package.to_string(),
            tool: tool.to_string(),
            status: output.status.code().unwrap_or(-1),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Replace this process with `program` running with `root` as its root
/// directory. Only returns on failure; changing the root needs privileges.
#[cfg(unix)]
pub fn exec_chrooted(root: &Path, program: &str, args: &[String]) -> ChrootError {
    use std::os::unix::process::CommandExt;

    let chroot_error = |e: std::io::Error| ChrootError::Chroot {
        path: root.to_path_buf(),
        error: e.to_string(),
    };
    if let Err(e) = std::os::unix::fs::chroot(root) {
        return chroot_error(e);
    }
    if let Err(e) = std::env::set_current_dir("/") {
        return chroot_error(e);
    }

    debug!("exec {program} {}", args.join(" "));
    let error = std::process::Command::new(program).args(args).exec();
    ChrootError::Exec {
        program: program.to_string(),
        error: error.to_string(),
    }
}

#[cfg(not(unix))]
pub fn exec_chrooted(root: &Path, _program: &str, _args: &[String]) -> ChrootError {
    ChrootError::Chroot {
        path: root.to_path_buf(),
        error: "not supported on this platform".to_string(),
    }
}
