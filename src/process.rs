//! Child process helpers shared by the command-backed synthesizer and player.

use std::process::Child;

/// Kills `child` and waits for it so no zombie is left behind. Failures are
/// logged at debug level; the child may already have exited.
pub(crate) fn kill_quietly(child: &mut Child, role: &str) {
    if let Err(e) = child.kill() {
        tracing::debug!("failed to kill {role} process: {e}");
    }
    if let Err(e) = child.wait() {
        tracing::debug!("failed to reap {role} process: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    #[test]
    fn test_kill_quietly_reaps_running_child() {
        let mut child = Command::new("sleep")
            .arg("5")
            .stdin(Stdio::null())
            .spawn()
            .unwrap();

        let start = Instant::now();
        kill_quietly(&mut child, "test");

        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_kill_quietly_tolerates_exited_child() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().unwrap();

        kill_quietly(&mut child, "test");
        assert!(child.try_wait().unwrap().is_some());
    }
}
