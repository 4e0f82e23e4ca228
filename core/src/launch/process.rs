//! Spawning launch commands and the post-spawn liveness probe.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use super::LaunchError;
use crate::config::home_dir;
use crate::sync::lock;

/// Bytes of stderr kept per child.
pub const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// How long to wait for the drain to catch up after an early exit.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// The last [`STDERR_TAIL_BYTES`] a child wrote to stderr.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    buf: Arc<Mutex<VecDeque<u8>>>,
}

impl StderrTail {
    fn push(&self, bytes: &[u8]) {
        let mut buf = lock(&self.buf);
        buf.extend(bytes);
        let excess = buf.len().saturating_sub(STDERR_TAIL_BYTES);
        buf.drain(..excess);
    }

    pub fn contents(&self) -> String {
        let buf = lock(&self.buf);
        let (a, b) = buf.as_slices();
        let mut bytes = Vec::with_capacity(buf.len());
        bytes.extend_from_slice(a);
        bytes.extend_from_slice(b);
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R, tail: StderrTail) {
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => tail.push(&chunk[..n]),
            Err(e) => {
                tracing::debug!("stderr drain ended: {}", e);
                break;
            }
        }
    }
}

/// A spawned child that passed the liveness probe.
#[derive(Debug)]
pub struct RunningChild {
    child: Child,
    stderr: StderrTail,
}

impl RunningChild {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn stderr(&self) -> &StderrTail {
        &self.stderr
    }

    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// Render argv for logs with the home directory shown as `~`.
pub fn display_command(argv: &[String]) -> String {
    let line = argv.join(" ");
    match home_dir() {
        Some(home) => {
            let home = home.to_string_lossy();
            if home.is_empty() || home == "/" {
                line
            } else {
                line.replace(home.as_ref(), "~")
            }
        }
        None => line,
    }
}

/// Spawn `argv`, wait `settle`, and fail if the process already exited.
///
/// Stderr is drained continuously in the background; on an early exit its
/// tail becomes the error text.
pub async fn spawn_checked(argv: &[String], settle: Duration) -> Result<RunningChild, LaunchError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(LaunchError::EmptyCommand);
    };

    tracing::info!("Launching: {}", display_command(argv));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stderr = StderrTail::default();
    let drainer = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(drain(pipe, stderr.clone())));

    tokio::time::sleep(settle).await;

    match child.try_wait() {
        Ok(None) => Ok(RunningChild { child, stderr }),
        Ok(Some(status)) => {
            if let Some(drainer) = drainer {
                // Grandchildren may keep the pipe open; don't wait on them
                let _ = tokio::time::timeout(DRAIN_GRACE, drainer).await;
            }
            let stderr = stderr.contents();
            tracing::warn!("{} exited immediately ({}): {}", program, status, stderr);
            Err(LaunchError::ExitedImmediately {
                status: status.to_string(),
                stderr,
            })
        }
        Err(source) => Err(LaunchError::Spawn {
            program: program.clone(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let tail = StderrTail::default();
        tail.push(&vec![b'a'; STDERR_TAIL_BYTES]);
        tail.push(b"end");
        let contents = tail.contents();
        assert_eq!(contents.len(), STDERR_TAIL_BYTES);
        assert!(contents.ends_with("aend"));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        assert!(matches!(
            spawn_checked(&[], Duration::from_millis(1)).await,
            Err(LaunchError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let argv = vec!["romshelf-definitely-not-a-program".to_string()];
        assert!(matches!(
            spawn_checked(&argv, Duration::from_millis(1)).await,
            Err(LaunchError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_early_exit_surfaces_stderr() {
        let err = spawn_checked(&sh("echo 'bad rom' >&2; exit 3"), Duration::from_millis(300))
            .await
            .unwrap_err();
        match err {
            LaunchError::ExitedImmediately { stderr, .. } => assert_eq!(stderr, "bad rom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_live_process_passes_probe() {
        let mut child = spawn_checked(&sh("sleep 1"), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(child.id().is_some());
        assert!(child.wait().await.unwrap().success());
    }
}
