//! Bounded child termination.

use std::time::Duration;

use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long reader tasks get to drain after the child is gone.
pub(crate) const READER_JOIN_GRACE: Duration = Duration::from_millis(500);

/// Stops `child`, escalating from a cooperative exit to SIGTERM to SIGKILL.
///
/// Each stage waits at most `timeout`. The caller has already closed stdin,
/// which is the cooperative shutdown request for a stdio server.
pub(crate) async fn terminate(mut child: Child, timeout: Duration) {
    if wait_for_exit(&mut child, timeout).await {
        return;
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            debug!(pid, "Child still running after stdin closed, sending SIGTERM");
            send_sigterm(pid);
            if wait_for_exit(&mut child, timeout).await {
                return;
            }
        }
    }

    debug!("Child ignored shutdown request, killing");
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to kill child process");
    }
    if !wait_for_exit(&mut child, timeout).await {
        warn!("Child process did not exit after kill");
    }
}

/// Waits for `child` to exit; `true` once it is gone.
async fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(%status, "Child process exited");
            true
        }
        Ok(Err(e)) => {
            // Nothing left to wait on.
            debug!(error = %e, "Waiting for child failed");
            true
        }
        Err(_) => false,
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM failed");
    }
}

/// Joins reader tasks within `grace`, aborting any that are still running.
///
/// A reader can outlive the child when a grandchild inherited its pipes.
pub(crate) async fn join_readers(readers: Vec<JoinHandle<()>>, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    for mut reader in readers {
        if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
            debug!("Reader still running after grace period, aborting");
            reader.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_terminate_exited_child() {
        let child = Command::new("true").stdin(Stdio::null()).spawn().unwrap();
        tokio::time::timeout(Duration::from_secs(5), terminate(child, Duration::from_millis(500)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_sigterm() {
        let child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .spawn()
            .unwrap();

        let started = std::time::Instant::now();
        terminate(child, Duration::from_millis(200)).await;
        // sleep honours SIGTERM, so the kill stage is never reached.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_join_readers_aborts_stuck_task() {
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let started = std::time::Instant::now();
        join_readers(vec![stuck], Duration::from_millis(100)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
