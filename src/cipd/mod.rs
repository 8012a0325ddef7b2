//! Wrapper around the external `cipd` package tool.
//!
//! Only three commands are used: `ensure` with the manifest on stdin,
//! `ensure-file-resolve`, and `acl-check`. Every invocation runs with an
//! explicit timeout and the child is killed if it is exceeded.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::PrebuiltError;
use crate::runtime::Runtime;

pub const EXECUTABLE: &str = "cipd";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CipdTool: Send + Sync {
    /// `cipd ensure -ensure-file - -root <root>`, reading `manifest` from stdin.
    async fn ensure(&self, root: &Path, manifest: &str, cwd: &Path) -> Result<()>;

    /// `cipd ensure-file-resolve -ensure-file <ensure_file>`.
    async fn resolve(&self, ensure_file: &Path, cwd: &Path) -> Result<()>;

    /// `cipd acl-check <prefix> -reader`.
    async fn has_read_access(&self, prefix: &str) -> Result<bool>;
}

/// Locates the executable: the explicit path if given, else `default_location`,
/// else the first `cipd` on `PATH`.
pub fn discover<R: Runtime>(
    runtime: &R,
    explicit: Option<&Path>,
    default_location: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if runtime.exists(path) {
            return Some(path.to_path_buf());
        }
        warn!("cipd not found at {:?}", path);
        return None;
    }
    if runtime.exists(default_location) {
        return Some(default_location.to_path_buf());
    }
    match which::which(EXECUTABLE) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!("cipd not on PATH: {}", e);
            None
        }
    }
}

pub struct Cipd {
    exe: PathBuf,
    timeout: Duration,
}

impl Cipd {
    pub fn new(exe: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            exe: exe.into(),
            timeout,
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.exe.display(), args.join(" "))
    }

    #[tracing::instrument(skip(self, stdin))]
    async fn run(&self, args: &[&str], stdin: Option<&str>, cwd: Option<&Path>) -> Result<Output> {
        let command = self.describe(args);
        debug!("Running {}", command);

        let mut cmd = Command::new(&self.exe);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| PrebuiltError::ToolInvocation {
            command: command.clone(),
            status: "failed to start".to_string(),
            code: None,
            detail: e.to_string(),
        })?;

        // Feed stdin while collecting output, both under the timeout: a tool
        // that exits without reading must not block us on a full pipe.
        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                pipe.write_all(input.as_bytes()).await?;
                // Close stdin so the tool sees end of input.
                pipe.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let run = async move { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                return Err(PrebuiltError::ToolInvocation {
                    command,
                    status: format!("timed out after {}s", self.timeout.as_secs()),
                    code: None,
                    detail: String::new(),
                }
                .into());
            }
        };
        let output = output.with_context(|| format!("Failed to wait for {}", command))?;

        if let Err(e) = fed {
            debug!("{} did not take its input: {}", command, e);
            // A failing exit explains itself; a clean one never saw the manifest.
            if output.status.success() {
                return Err(PrebuiltError::ToolInvocation {
                    command,
                    status: "exited before reading its input".to_string(),
                    code: None,
                    detail: e.to_string(),
                }
                .into());
            }
        }
        Ok(output)
    }

    /// Runs `args` and turns a non-zero exit into a `ToolInvocation` error.
    async fn run_checked(
        &self,
        args: &[&str],
        stdin: Option<&str>,
        cwd: Option<&Path>,
    ) -> Result<()> {
        let output = self.run(args, stdin, cwd).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(PrebuiltError::ToolInvocation {
            command: self.describe(args),
            status: output.status.to_string(),
            code: output.status.code(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into())
    }
}

#[async_trait]
impl CipdTool for Cipd {
    async fn ensure(&self, root: &Path, manifest: &str, cwd: &Path) -> Result<()> {
        let root = root.to_string_lossy();
        info!("Running cipd ensure into {}", root);
        self.run_checked(
            &["ensure", "-ensure-file", "-", "-root", &*root],
            Some(manifest),
            Some(cwd),
        )
        .await
    }

    async fn resolve(&self, ensure_file: &Path, cwd: &Path) -> Result<()> {
        let ensure_file = ensure_file.to_string_lossy();
        self.run_checked(
            &["ensure-file-resolve", "-ensure-file", &*ensure_file],
            None,
            Some(cwd),
        )
        .await
    }

    async fn has_read_access(&self, prefix: &str) -> Result<bool> {
        let output = self.run(&["acl-check", prefix, "-reader"], None, None).await?;
        debug!("acl-check {} exited with {}", prefix, output.status);
        Ok(output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    #[test]
    fn test_discover_explicit_path() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/opt/cipd")))
            .returning(|_| true);

        let found = discover(
            &runtime,
            Some(Path::new("/opt/cipd")),
            Path::new("/src/.cipd/cipd"),
        );
        assert_eq!(found, Some(PathBuf::from("/opt/cipd")));
    }

    #[test]
    fn test_discover_missing_explicit_path_does_not_fall_back() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/nonexistent/cipd")))
            .returning(|_| false);

        let found = discover(
            &runtime,
            Some(Path::new("/nonexistent/cipd")),
            Path::new("/src/.cipd/cipd"),
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_discover_default_location() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/src/.cipd/cipd")))
            .returning(|_| true);

        let found = discover(&runtime, None, Path::new("/src/.cipd/cipd"));
        assert_eq!(found, Some(PathBuf::from("/src/.cipd/cipd")));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::{TempDir, tempdir};

        /// Writes a shell script standing in for the tool.
        fn fake_cipd(body: &str) -> (TempDir, PathBuf) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("cipd");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            (dir, path)
        }

        #[tokio::test]
        async fn test_ensure_passes_manifest_on_stdin() {
            let (dir, exe) = fake_cipd(r#"echo "$@" > args.txt; cat > manifest.txt"#);
            let cipd = Cipd::new(&exe, Duration::from_secs(10));

            cipd.ensure(
                Path::new("/tmp/downloads"),
                "$ServiceURL https://example.com\nfuchsia/tools/gn/${platform} latest\n",
                dir.path(),
            )
            .await
            .unwrap();

            let args = fs::read_to_string(dir.path().join("args.txt")).unwrap();
            assert_eq!(args.trim(), "ensure -ensure-file - -root /tmp/downloads");
            let manifest = fs::read_to_string(dir.path().join("manifest.txt")).unwrap();
            assert!(manifest.starts_with("$ServiceURL"));
        }

        #[tokio::test]
        async fn test_failure_carries_exit_code_and_stderr() {
            let (dir, exe) = fake_cipd("echo 'backend unavailable' >&2; exit 7");
            let cipd = Cipd::new(&exe, Duration::from_secs(10));

            let err = cipd
                .resolve(Path::new("prebuilts.ensure"), dir.path())
                .await
                .unwrap_err();

            match err.downcast_ref::<PrebuiltError>() {
                Some(PrebuiltError::ToolInvocation { code, detail, .. }) => {
                    assert_eq!(*code, Some(7));
                    assert_eq!(detail, "backend unavailable");
                }
                other => panic!("unexpected error: {:?}", other),
            }
            assert_eq!(crate::error::exit_code(&err), 7);
        }

        #[tokio::test]
        async fn test_early_exit_with_unread_manifest_is_tool_failure() {
            let (dir, exe) = fake_cipd("echo 'auth required' >&2; exit 5");
            let cipd = Cipd::new(&exe, Duration::from_secs(10));
            // Far beyond any pipe buffer, so the write cannot complete.
            let manifest = "fuchsia/tools/gn/${platform} git_revision:abc\n".repeat(20_000);

            let err = cipd
                .ensure(Path::new("/tmp/downloads"), &manifest, dir.path())
                .await
                .unwrap_err();

            match err.downcast_ref::<PrebuiltError>() {
                Some(PrebuiltError::ToolInvocation { code, detail, .. }) => {
                    assert_eq!(*code, Some(5));
                    assert_eq!(detail, "auth required");
                }
                other => panic!("unexpected error: {:?}", other),
            }
            assert_eq!(crate::error::exit_code(&err), 5);
            assert!(err.to_string().contains("--no-cipd"));
        }

        #[tokio::test]
        async fn test_acl_check() {
            let (_dir, exe) = fake_cipd(r#"[ "$2" = "fuchsia_internal" ] || exit 1"#);
            let cipd = Cipd::new(&exe, Duration::from_secs(10));

            assert!(cipd.has_read_access("fuchsia_internal").await.unwrap());
            assert!(!cipd.has_read_access("other").await.unwrap());
        }

        #[tokio::test]
        async fn test_timeout_is_tool_failure() {
            let (dir, exe) = fake_cipd("sleep 5");
            let cipd = Cipd::new(&exe, Duration::from_millis(100));

            let err = cipd
                .resolve(Path::new("prebuilts.ensure"), dir.path())
                .await
                .unwrap_err();
            assert_eq!(crate::error::exit_code(&err), 4);
        }

        #[tokio::test]
        async fn test_missing_executable() {
            let cipd = Cipd::new("/nonexistent/cipd", Duration::from_secs(1));
            let err = cipd.has_read_access("fuchsia_internal").await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PrebuiltError>(),
                Some(PrebuiltError::ToolInvocation { code: None, .. })
            ));
        }
    }
}
