//! Stage execution
//!
//! All commands of one stage run in a single `bash -c` invocation, so that
//! environment changes made by earlier commands (`export`, `cd`) stay visible
//! to later ones. Each command is followed by a guard that records which
//! command failed and with what status, then stops the script.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command as Process;
use tracing::{debug, info};

use crate::config::defaults;
use crate::core::package::Command;
use crate::error::StageError;

/// Runs stage command lists through bash
#[derive(Debug, Clone)]
pub struct StageRunner {
    cwd: PathBuf,
}

impl StageRunner {
    /// Runner whose commands start in `cwd` (the repository root)
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    /// Run `commands` for `stage` of `package`, stopping at the first failure
    pub async fn run(&self, package: &str, stage: &str, commands: &[Command]) -> Result<(), StageError> {
        if commands.is_empty() {
            debug!("{package}: nothing to do for {stage}");
            return Ok(());
        }

        let script = script(commands)?;
        let status_file = status_file(package, stage);
        // A leftover from an earlier run would blame the wrong command
        let _ = std::fs::remove_file(&status_file);

        info!("{package}: running {stage} ({} commands)", commands.len());
        debug!("{package}: {stage} script:\n{script}");

        let status = Process::new("bash")
            .arg("-c")
            .arg(&script)
            .env(defaults::ENV_STAGE_STATUS, &status_file)
            .current_dir(&self.cwd)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| StageError::SpawnFailed {
                error: e.to_string(),
            })?;

        let failed = read_status(&status_file);
        let _ = std::fs::remove_file(&status_file);

        if status.success() {
            return Ok(());
        }

        let (command, code) = match failed {
            Some((index, code)) => (
                commands
                    .get(index)
                    .map_or_else(|| format!("command #{index}"), ToString::to_string),
                code,
            ),
            None => (format!("bash -c ({stage})"), status.code().unwrap_or(-1)),
        };

        Err(StageError::CommandFailed {
            command,
            status: code,
        })
    }

    /// Run a probe command with its output suppressed; true when it exits 0
    pub async fn probe(&self, command: &str) -> Result<bool, StageError> {
        debug!("Probing: {command}");
        let status = Process::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| StageError::SpawnFailed {
                error: e.to_string(),
            })?;
        Ok(status.success())
    }
}

/// Quote one argument for the stage shell.
///
/// Arguments are double quoted unless they contain `*`, which is left bare so
/// the shell expands the glob.
pub fn quote(argument: &str) -> Result<String, StageError> {
    if argument.contains('"') {
        return Err(StageError::UnquotableArgument {
            argument: argument.to_string(),
        });
    }
    if argument.contains('*') {
        Ok(argument.to_string())
    } else {
        Ok(format!("\"{argument}\""))
    }
}

/// Assemble the bash script of a stage
pub fn script(commands: &[Command]) -> Result<String, StageError> {
    let mut script = String::new();
    for (index, command) in commands.iter().enumerate() {
        let line = command
            .argv
            .iter()
            .map(|arg| quote(arg))
            .collect::<Result<Vec<_>, _>>()?
            .join(" ");
        let _ = writeln!(
            script,
            "{line} || {{ rc=$?; printf '%d %d\\n' {index} \"$rc\" > \"${}\"; exit \"$rc\"; }}",
            defaults::ENV_STAGE_STATUS
        );
    }
    Ok(script)
}

fn status_file(package: &str, stage: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "strapkit-{}-{package}-{stage}.status",
        std::process::id()
    ))
}

fn read_status(path: &Path) -> Option<(usize, i32)> {
    let content = std::fs::read_to_string(path).ok()?;
    let mut fields = content.split_whitespace();
    let index = fields.next()?.parse().ok()?;
    let code = fields.next()?.parse().ok()?;
    Some((index, code))
}
