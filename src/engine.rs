//! Seam between orchestration and the AutoPkg command line.
//!
//! Commands are always built as argument vectors; the shell-quoted form is
//! only produced for logging.
use crate::logging::ENGINE_TARGET;
use anyhow::{anyhow, Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Instant;

pub const CLEANER_PROCESSOR: &str =
    "com.github.almenscorner.intune-upload.processors/IntuneAppCleaner";
pub const PROMOTER_PROCESSOR: &str =
    "com.github.almenscorner.intune-upload.processors/IntuneAppPromoter";

/// Post-processor directive appended to `autopkg run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessor {
    Cleanup { keep_count: Option<String> },
    Promote,
}

impl PostProcessor {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            PostProcessor::Cleanup { keep_count } => {
                args.push("--post".to_string());
                args.push(CLEANER_PROCESSOR.to_string());
                if let Some(count) = keep_count {
                    args.push("-k".to_string());
                    args.push(format!("keep_version_count={count}"));
                }
            }
            PostProcessor::Promote => {
                args.push("--post".to_string());
                args.push(PROMOTER_PROCESSOR.to_string());
            }
        }
    }
}

/// Inputs for one `autopkg run` invocation.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub identifier: &'a str,
    pub report_path: &'a Path,
    pub post_processors: &'a [PostProcessor],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustCheck {
    Trusted,
    Untrusted { diagnostic: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed { detail: String },
}

/// The three engine operations the orchestrator depends on.
pub trait RecipeEngine {
    fn verify_trust(&self, identifier: &str) -> TrustCheck;

    fn update_trust(&self, identifier: &str) -> Result<()>;

    /// Run a recipe, streaming its output to the log while it executes.
    fn run(&self, request: &RunRequest<'_>) -> RunStatus;
}

/// `RecipeEngine` backed by the `autopkg` executable.
#[derive(Debug, Clone)]
pub struct AutopkgCli {
    binary: PathBuf,
    debug: bool,
}

impl AutopkgCli {
    pub fn new(binary: PathBuf, debug: bool) -> Self {
        Self { binary, debug }
    }

    pub fn verify_args(identifier: &str) -> Vec<String> {
        vec![
            "verify-trust-info".to_string(),
            identifier.to_string(),
            "-vvv".to_string(),
        ]
    }

    pub fn update_args(identifier: &str) -> Vec<String> {
        vec!["update-trust-info".to_string(), identifier.to_string()]
    }

    pub fn run_args(&self, request: &RunRequest<'_>) -> Vec<String> {
        let verbosity = if self.debug { "-vvv" } else { "-v" };
        let mut args = vec![
            "run".to_string(),
            request.identifier.to_string(),
            verbosity.to_string(),
            "--report-plist".to_string(),
            request.report_path.display().to_string(),
        ];
        for post in request.post_processors {
            post.push_args(&mut args);
        }
        args
    }

    fn command(&self, args: &[String]) -> Command {
        tracing::debug!(command = %self.command_line(args), "running autopkg");
        let mut command = Command::new(&self.binary);
        command.args(args);
        command
    }

    fn command_line(&self, args: &[String]) -> String {
        let binary = self.binary.display().to_string();
        shell_words::join(std::iter::once(binary.as_str()).chain(args.iter().map(String::as_str)))
    }
}

impl RecipeEngine for AutopkgCli {
    fn verify_trust(&self, identifier: &str) -> TrustCheck {
        let output = match self.command(&Self::verify_args(identifier)).output() {
            Ok(output) => output,
            Err(err) => {
                return TrustCheck::Untrusted {
                    diagnostic: format!("spawn {}: {err}", self.binary.display()),
                }
            }
        };
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: ENGINE_TARGET, stream = "stdout", "{line}");
        }
        if output.status.success() {
            TrustCheck::Trusted
        } else {
            TrustCheck::Untrusted {
                diagnostic: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        }
    }

    fn update_trust(&self, identifier: &str) -> Result<()> {
        let output = self
            .command(&Self::update_args(identifier))
            .output()
            .with_context(|| format!("spawn {}", self.binary.display()))?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::info!(target: ENGINE_TARGET, stream = "stdout", "{line}");
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "update-trust-info exited with {}: {}",
                exit_status_string(&output.status),
                stderr.trim()
            ));
        }
        Ok(())
    }

    fn run(&self, request: &RunRequest<'_>) -> RunStatus {
        let start = Instant::now();
        let command = self.command(&self.run_args(request));
        let status = match stream_command(command) {
            Ok(status) => status,
            Err(err) => {
                return RunStatus::Failed {
                    detail: format!("{err:#}"),
                }
            }
        };
        tracing::info!(
            identifier = request.identifier,
            elapsed_ms = start.elapsed().as_millis(),
            status = %exit_status_string(&status),
            "autopkg run complete"
        );
        if status.success() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed {
                detail: format!("autopkg run exited with {}", exit_status_string(&status)),
            }
        }
    }
}

/// Spawn a command and forward stdout and stderr line by line until it exits.
fn stream_command(mut command: Command) -> Result<ExitStatus> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("spawn autopkg")?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("autopkg stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("autopkg stderr was not captured"))?;

    std::thread::scope(|scope| {
        scope.spawn(move || forward_lines(stderr, "stderr"));
        forward_lines(stdout, "stdout");
    });

    child.wait().context("wait for autopkg")
}

fn forward_lines<R: Read>(reader: R, stream: &'static str) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                tracing::info!(target: ENGINE_TARGET, stream, "{line}");
            }
            Err(err) => {
                tracing::warn!(stream, error = %err, "stopped reading autopkg output");
                break;
            }
        }
    }
}

fn exit_status_string(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => status.to_string(),
    }
}
