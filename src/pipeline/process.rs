//! External tool invocation.
//!
//! Tools are always spawned from a discrete argument vector; no shell ever
//! sees a path or a caller-supplied value. stdout and stderr are captured
//! in full before [`run`] resolves. The child is spawned with
//! `kill_on_drop`, so dropping the operation future (or hitting the
//! configured timeout) terminates it.
//!
//! Outcome classification is three-way and lives in
//! [`ToolOutput::classify`]:
//!
//! | stderr carries the tool's error marker | exit status | result |
//! |---|---|---|
//! | yes | any | [`MassageError::InvalidDocument`] |
//! | no  | non-zero / signal | [`MassageError::ProcessingFailure`] |
//! | no  | 0 | success |

use crate::error::MassageError;
use crate::pipeline::input::Source;
use futures::StreamExt;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tracing::{debug, warn};

/// One external command: program, arguments and where it runs.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run the tool from `dir`, so relative side files it writes land there.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Tool name for log lines and error markers, e.g. `identify`.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Captured result of a finished tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// `true` when any stderr line starts with `marker`.
    pub fn reports_error(&self, marker: &str) -> bool {
        self.stderr_lossy()
            .lines()
            .any(|line| line.trim_start().starts_with(marker))
    }

    /// Map the run to success or one error kind.
    ///
    /// `marker` is the prefix the tool puts on lines that reject the input
    /// (ImageMagick prefixes them with its own name); `None` for tools that
    /// have no such convention.
    pub fn classify(&self, tool: &str, marker: Option<&str>) -> Result<(), MassageError> {
        if let Some(marker) = marker {
            if self.reports_error(marker) {
                warn!("{} rejected the document: {}", tool, self.stderr_lossy().trim());
                return Err(MassageError::InvalidDocument);
            }
        }
        if !self.success() {
            warn!(
                "{} failed (exit code {}): {}",
                tool,
                self.exit_code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                self.stderr_lossy().trim()
            );
            return Err(MassageError::ProcessingFailure);
        }
        Ok(())
    }
}

/// Spawn `invocation`, optionally feed `stdin`, and wait for it to exit.
///
/// Errors here are only about running the process at all (spawn failure,
/// timeout, lost pipes); a tool that ran and exited non-zero still returns
/// `Ok` so the caller can [`ToolOutput::classify`] it.
pub async fn run(
    invocation: &Invocation,
    stdin: Option<Source>,
    timeout: Option<Duration>,
) -> Result<ToolOutput, MassageError> {
    let tool = invocation.tool_name();
    debug!("Running {} {:?}", invocation.program.display(), invocation.args);

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref dir) = invocation.current_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| {
        warn!("Failed to spawn {}: {}", tool, e);
        MassageError::ProcessingFailure
    })?;

    let feed = feed_stdin(child.stdin.take(), stdin);
    let finish = async { tokio::join!(feed, child.wait_with_output()) };

    let (fed, output) = match timeout {
        Some(limit) => tokio::time::timeout(limit, finish).await.map_err(|_| {
            warn!("{} did not finish within {:?}; killed", tool, limit);
            MassageError::ProcessingFailure
        })?,
        None => finish.await,
    };

    let output = output.map_err(|e| {
        warn!("Failed to wait for {}: {}", tool, e);
        MassageError::ProcessingFailure
    })?;

    if let Err(e) = fed {
        // The tool may legitimately stop reading early (e.g. on garbage
        // input); its exit status and stderr decide the outcome then.
        if e.kind() == io::ErrorKind::BrokenPipe {
            debug!("{} closed stdin early", tool);
        } else {
            warn!("Failed to feed {} stdin: {}", tool, e);
            return Err(MassageError::ProcessingFailure);
        }
    }

    let result = ToolOutput {
        exit_code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    };
    debug!(
        "{} exited with {:?} ({} bytes stdout, {} bytes stderr)",
        tool,
        result.exit_code,
        result.stdout.len(),
        result.stderr.len()
    );
    Ok(result)
}

/// Copy `source` into the child's stdin and close it.
async fn feed_stdin(pipe: Option<ChildStdin>, source: Option<Source>) -> io::Result<()> {
    let (Some(mut pipe), Some(source)) = (pipe, source) else {
        return Ok(());
    };
    match source {
        Source::Bytes(bytes) => pipe.write_all(&bytes).await?,
        Source::Stream(mut chunks) => {
            while let Some(chunk) = chunks.next().await {
                pipe.write_all(&chunk?).await?;
            }
        }
    }
    pipe.flush().await?;
    drop(pipe);
    Ok(())
}
