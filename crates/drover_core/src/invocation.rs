use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::{BoxFuture, RunStatus, ScanRunner};
use crate::target::Target;

/// Default per-invocation timeout. A hung scanner process becomes an
/// invocation failure instead of stalling a pool worker forever.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(300);

/// How a scanner hands back its findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// The scanner accepts `--outputfile <path>` and writes a JSON array
    /// there (choctaw, ankamali, gottingen).
    OutputFile,
    /// The scanner prints the JSON array on stdout (duroc `-z`).
    Stdout,
}

/// Where one invocation's findings ended up.
///
/// A file artifact is a temp path owned by the invocation; the aggregator
/// deletes it after consumption, on every path. A buffer artifact is the
/// captured stdout and needs no cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Temp file the scanner wrote to (may not exist if the scanner failed).
    File(PathBuf),
    /// Captured stdout bytes.
    Buffer(Vec<u8>),
}

/// How to invoke one external scanner binary.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Path to the scanner executable.
    pub binary: PathBuf,
    /// Whether findings arrive via `--outputfile` or stdout.
    pub output: OutputMode,
    /// Flags inserted before the target locator on every invocation
    /// (`--sshkeypath <key>`, `--username <u> --password <p> --url <u>`,
    /// `-z`, ...).
    pub args: Vec<String>,
    /// Kill the scanner and record a failure after this long.
    pub timeout: Duration,
}

impl ScannerConfig {
    /// Creates a config with no extra flags and the default timeout.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, output: OutputMode) -> Self {
        Self {
            binary: binary.into(),
            output,
            args: Vec::new(),
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    /// Appends fixed flags passed on every invocation.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Overrides the per-invocation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The concrete command executed for one target.
///
/// Created at dispatch time; the artifact path is named with a fresh UUIDv4
/// so overlapping runs on the same host can never collide.
#[derive(Debug)]
pub struct ScanInvocation {
    program: PathBuf,
    args: Vec<String>,
    artifact: Artifact,
    timeout: Duration,
}

impl ScanInvocation {
    /// Builds the command line for scanning `subject` (a locator or a local
    /// file path) with the given scanner.
    ///
    /// Argument order follows the scanners' conventions: output flags first,
    /// then the per-target cursor, then fixed flags, then the subject.
    #[must_use]
    pub fn build(config: &ScannerConfig, since_commit: Option<&str>, subject: &str) -> Self {
        let mut args = Vec::new();
        let artifact = match config.output {
            OutputMode::OutputFile => {
                let path = std::env::temp_dir().join(Uuid::new_v4().to_string());
                args.push("--outputfile".to_string());
                args.push(path.display().to_string());
                Artifact::File(path)
            }
            OutputMode::Stdout => Artifact::Buffer(Vec::new()),
        };
        if let Some(sha) = since_commit {
            args.push("--since_commit".to_string());
            args.push(sha.to_string());
        }
        args.extend(config.args.iter().cloned());
        args.push(subject.to_string());

        Self {
            program: config.binary.clone(),
            args,
            artifact,
            timeout: config.timeout,
        }
    }

    /// The argument list, for logging and tests.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Runs the scanner and classifies the outcome.
    ///
    /// Never errors: spawn failures, timeouts, and non-zero exits all become
    /// `RunStatus::InvocationFailure` so the batch keeps going. The artifact
    /// is returned on every path since partial output may exist.
    pub async fn run(self) -> (RunStatus, Artifact) {
        info!(program = %self.program.display(), args = ?self.args, "running scanner");

        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                let status = RunStatus::InvocationFailure {
                    exit_code: None,
                    stderr: format!("failed to spawn {}: {e}", self.program.display()).into(),
                };
                return (status, self.artifact);
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let status = RunStatus::InvocationFailure {
                    exit_code: None,
                    stderr: format!("failed to collect scanner output: {e}").into(),
                };
                return (status, self.artifact);
            }
            Err(_) => {
                warn!(program = %self.program.display(), timeout = ?self.timeout, "scanner timed out");
                let status = RunStatus::InvocationFailure {
                    exit_code: None,
                    stderr: format!("scanner timed out after {:?}", self.timeout).into(),
                };
                return (status, self.artifact);
            }
        };

        debug!(
            status = ?output.status.code(),
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "scanner finished"
        );

        let artifact = match self.artifact {
            Artifact::Buffer(_) => Artifact::Buffer(output.stdout),
            file => file,
        };

        if output.status.success() {
            (RunStatus::Success, artifact)
        } else {
            let status = RunStatus::InvocationFailure {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned().into(),
            };
            (status, artifact)
        }
    }
}

/// Runs the configured scanner binary directly against each target's
/// locator. The standard unit of work for sources whose locator the scanner
/// understands natively (git URLs, document ids, issue keys).
#[derive(Debug, Clone)]
pub struct BinaryRunner {
    config: ScannerConfig,
}

impl BinaryRunner {
    /// Wraps a scanner config as a dispatchable runner.
    #[must_use]
    pub const fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Scans a local file path instead of the target locator. Used by
    /// download-then-scan flows after fetching the target's content.
    pub async fn scan_path(&self, path: &Path) -> (RunStatus, Artifact) {
        ScanInvocation::build(&self.config, None, &path.display().to_string())
            .run()
            .await
    }
}

impl ScanRunner for BinaryRunner {
    fn scan<'a>(&'a self, target: &'a Target) -> BoxFuture<'a, (RunStatus, Artifact)> {
        Box::pin(async move {
            ScanInvocation::build(&self.config, target.since_commit.as_deref(), &target.locator)
                .run()
                .await
        })
    }
}

#[cfg(test)]
#[expect(clippy::panic, reason = "tests panic for clearer failure messages")]
mod tests {
    use super::*;
    use crate::target::SourceKind;

    #[test]
    fn output_file_invocations_get_unique_artifact_paths() {
        let config = ScannerConfig::new("/usr/local/bin/choctaw_hog", OutputMode::OutputFile);
        let a = ScanInvocation::build(&config, None, "git@ghe.example:org/a.git");
        let b = ScanInvocation::build(&config, None, "git@ghe.example:org/a.git");

        let (Artifact::File(path_a), Artifact::File(path_b)) = (&a.artifact, &b.artifact) else {
            panic!("output-file mode must produce file artifacts");
        };
        assert_ne!(path_a, path_b);
    }

    #[test]
    fn argument_order_matches_scanner_conventions() {
        let config = ScannerConfig::new("/opt/choctaw_hog", OutputMode::OutputFile)
            .with_args(["--sshkeypath", "/home/ec2-user/.ssh/id_rsa"]);
        let invocation = ScanInvocation::build(&config, Some("abc123"), "git@ghe.example:org/repo.git");

        let args = invocation.args();
        assert_eq!(args[0], "--outputfile");
        assert_eq!(args[2], "--since_commit");
        assert_eq!(args[3], "abc123");
        assert_eq!(args[4], "--sshkeypath");
        assert_eq!(args[6], "git@ghe.example:org/repo.git");
    }

    #[test]
    fn stdout_mode_has_no_output_flag() {
        let config = ScannerConfig::new("/opt/duroc_hog", OutputMode::Stdout).with_args(["-z"]);
        let invocation = ScanInvocation::build(&config, None, "/tmp/agent.tar.gz");

        assert_eq!(invocation.args(), ["-z", "/tmp/agent.tar.gz"]);
        assert_eq!(invocation.artifact, Artifact::Buffer(Vec::new()));
    }

    #[tokio::test]
    async fn nonzero_exit_becomes_invocation_failure() {
        let config = ScannerConfig::new("sh", OutputMode::Stdout).with_args(["-c", "echo boom >&2; exit 3"]);
        let target = Target::new(SourceKind::Archive, "ignored");

        let (status, _artifact) = BinaryRunner::new(config).scan(&target).await;

        let RunStatus::InvocationFailure { exit_code, stderr } = status else {
            panic!("expected invocation failure, got {status:?}");
        };
        assert_eq!(exit_code, Some(3));
        assert!(stderr.contains("boom"));
    }

    #[tokio::test]
    async fn stdout_artifact_captures_scanner_output() {
        let config = ScannerConfig::new("sh", OutputMode::Stdout).with_args(["-c", "printf '[]'"]);
        let target = Target::new(SourceKind::Archive, "ignored");

        let (status, artifact) = BinaryRunner::new(config).scan(&target).await;

        assert_eq!(status, RunStatus::Success);
        assert_eq!(artifact, Artifact::Buffer(b"[]".to_vec()));
    }

    #[tokio::test]
    async fn hung_scanner_times_out_as_failure() {
        let config = ScannerConfig::new("sh", OutputMode::Stdout)
            .with_args(["-c", "sleep 30"])
            .with_timeout(Duration::from_millis(50));
        let target = Target::new(SourceKind::Archive, "ignored");

        let (status, _artifact) = BinaryRunner::new(config).scan(&target).await;

        let RunStatus::InvocationFailure { exit_code, stderr } = status else {
            panic!("expected timeout failure, got {status:?}");
        };
        assert_eq!(exit_code, None);
        assert!(stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn missing_binary_is_contained() {
        let config = ScannerConfig::new("/nonexistent/drover-test-scanner", OutputMode::Stdout);
        let target = Target::new(SourceKind::Archive, "ignored");

        let (status, _artifact) = BinaryRunner::new(config).scan(&target).await;
        assert!(matches!(status, RunStatus::InvocationFailure { exit_code: None, .. }));
    }
}
