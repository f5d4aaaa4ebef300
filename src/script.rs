//! Pre-/post-script execution for test sets.
//!
//! Scripts run through `sh -c` with inherited stdio and a hard deadline.
//! The child is killed on timeout and on scope cancellation.

use crate::error::{Error, Result};
use crate::scope::CancelScope;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Default bound on script execution.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(25);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run `script` to completion. Empty scripts succeed immediately.
pub async fn execute_script(scope: &CancelScope, script: &str, timeout: Duration) -> Result<()> {
    if script.is_empty() {
        return Ok(());
    }
    tracing::info!(script, "running script");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| Error::script(format!("failed to launch script: {e}")))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(());
                }
                return Err(Error::script(format!("script exited with {status}")));
            }
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::script(format!("failed to poll script: {e}")));
            }
        }
        if scope.is_canceled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Aborted);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::script(format!(
                "script timed out after {}s",
                timeout.as_secs()
            )));
        }
        asupersync::time::sleep(asupersync::time::wall_now(), POLL_INTERVAL).await;
    }
}
