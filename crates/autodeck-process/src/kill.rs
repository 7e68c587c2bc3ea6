//! Platform-abstracted process-tree termination.
//!
//! Script subprocesses may spawn children of their own; cancellation must
//! take down the transitive tree, not only the root. "Already dead" is
//! treated as success on every platform.

/// Kill the process tree rooted at `pid`.
///
/// On Unix the invoker puts each run into its own process group, so a
/// group kill reaches the whole tree. On Windows the system tree-kill tool
/// is used.
#[cfg(unix)]
pub fn kill_tree(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        tracing::debug!(pid, "killpg failed (process already gone): {e}");
    }
}

#[cfg(windows)]
pub fn kill_tree(pid: u32) {
    if let Err(e) = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
    {
        tracing::debug!(pid, "taskkill failed (process already gone): {e}");
    }
}

#[cfg(not(any(unix, windows)))]
pub fn kill_tree(pid: u32) {
    tracing::warn!(pid, "process-tree kill not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_dead_is_silently_ignored() {
        // A pid from the far end of the range is almost certainly unused;
        // either way the call must not panic or error out.
        kill_tree(u32::MAX / 2);
    }
}
