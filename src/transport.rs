//! Thin wrappers around the external commands used to retrieve grammars.

use std::path::Path;
use std::process::{Command, Output};
use std::time::Duration;

use crate::error::Error;

/// Download and extraction settings shared by every package source.
#[derive(Debug, Clone)]
pub struct Transport {
    /// Timeout for tarball and repository archive downloads.
    pub archive_timeout: Duration,
    /// Timeout for single grammar downloads.
    pub grammar_timeout: Duration,
}

impl Transport {
    /// Download a tarball or repository archive to `dest`.
    ///
    /// # Errors
    ///
    /// Returns `Error::CommandFailed` if curl cannot be spawned or exits non-zero.
    pub fn download_archive(&self, url: &str, dest: &Path) -> Result<(), Error> {
        return download(url, dest, self.archive_timeout);
    }

    /// Download a single grammar file to `dest`.
    ///
    /// # Errors
    ///
    /// Returns `Error::CommandFailed` if curl cannot be spawned or exits non-zero.
    pub fn download_grammar(&self, url: &str, dest: &Path) -> Result<(), Error> {
        return download(url, dest, self.grammar_timeout);
    }

    /// Build a transport from the timeouts in the loaded config.
    pub const fn new(archive_timeout: Duration, grammar_timeout: Duration) -> Self {
        return Self { archive_timeout, grammar_timeout };
    }
}

/// Run a command to completion, capturing stdout.
///
/// # Errors
///
/// Returns `Error::CommandFailed` if the process cannot be spawned or exits non-zero.
pub fn capture(cmd: &mut Command, program: &str) -> Result<Output, Error> {
    let output = cmd.output().map_err(|e| {
        return Error::CommandFailed {
            detail: e.to_string(),
            program: program.to_string(),
        };
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::CommandFailed {
            detail: format!("{} {}", output.status, stderr.trim()).trim_end().to_string(),
            program: program.to_string(),
        });
    }

    return Ok(output);
}

/// Download `url` to `dest` with `curl`, giving up after `timeout`.
///
/// # Errors
///
/// Returns `Error::CommandFailed` if curl cannot be spawned or exits non-zero.
fn download(url: &str, dest: &Path, timeout: Duration) -> Result<(), Error> {
    tracing::debug!(%url, dest = %dest.display(), "downloading");
    let mut cmd = Command::new("curl");
    cmd.args(["--silent", "--show-error", "--fail", "--location", "--max-time"])
        .arg(timeout.as_secs().to_string())
        .arg("--output")
        .arg(dest)
        .arg(url);
    return run(&mut cmd, "curl");
}

/// Unpack `archive` into `dest`, creating `dest` first.
///
/// # Errors
///
/// Returns `Error::Io` if `dest` cannot be created, or `Error::CommandFailed`
/// if tar cannot be spawned or exits non-zero.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dest)?;
    let mut cmd = Command::new("tar");
    cmd.arg("-C").arg(dest).arg("-xf").arg(archive);
    return run(&mut cmd, "tar");
}

/// Run the environment preparation command (e.g. `npm install`) once.
/// An empty command is a no-op.
///
/// # Errors
///
/// Returns `Error::CommandFailed` if the command cannot be spawned or exits non-zero.
pub fn prepare(command: &[String], root: &Path) -> Result<(), Error> {
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };
    tracing::info!(command = %command.join(" "), "preparing environment");
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(root);
    return run(&mut cmd, program);
}

/// Run a command to completion, discarding its output.
///
/// # Errors
///
/// Returns `Error::CommandFailed` if the process cannot be spawned or exits non-zero.
fn run(cmd: &mut Command, program: &str) -> Result<(), Error> {
    capture(cmd, program)?;
    return Ok(());
}

/// Export a Subversion directory to `dest`.
///
/// # Errors
///
/// Returns `Error::CommandFailed` if svn cannot be spawned or exits non-zero.
pub fn svn_export(url: &str, dest: &Path) -> Result<(), Error> {
    tracing::debug!(%url, dest = %dest.display(), "exporting");
    let mut cmd = Command::new("svn");
    cmd.args(["export", "-q", url]).arg(dest);
    return run(&mut cmd, "svn");
}
