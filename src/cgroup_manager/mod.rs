#[cfg(target_os = "linux")]
mod cgroup_manager_linux;

#[cfg(target_os = "linux")]
pub use cgroup_manager_linux::*;

#[cfg(not(target_os = "linux"))]
mod cgroup_manager_stub;

use std::ffi::OsString;
use std::io::Read;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::Context;
#[cfg(not(target_os = "linux"))]
pub use cgroup_manager_stub::*;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{trace, warn};

use crate::configuration::Configuration;

/// Time allowed for a killed process tree to disappear, and for its pipes to close.
const CLEANUP_DURATION: Duration = Duration::from_secs(1);

/// Environment variable set on a match's root process and inherited by the whole tree.
///
/// Processes orphaned by an early exit are reparented away from the root; the tag is how
/// they are still found.
pub(self) const TREE_TAG_VAR: &str = "LUX_TUNER_MATCH";

/// Tag unique to one launched tree in this process.
pub(self) fn new_tree_tag() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(1);
    format!(
        "{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// What a finished (or killed) process left behind.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `None` when the process was killed at its deadline
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }
}

pub(self) fn create_process(command: &str, args: &[String], tag: &str) -> anyhow::Result<Child> {
    std::process::Command::new(command)
        .args(args)
        .env(TREE_TAG_VAR, tag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("command '{command}' could not be launched"))
}

/// Launch `command` with the containment requested by `config`.
///
/// Falls back to a plain process when the cgroup cannot be created and
/// `config.allow_uncontained` is set.
pub fn spawn_process(
    command: &str,
    args: &[String],
    config: &Configuration,
) -> anyhow::Result<LimitedProcess> {
    if !config.contained {
        return LimitedProcess::launch_without_container(command, args);
    }
    match LimitedProcess::launch(command, args) {
        Ok(process) => Ok(process),
        Err(e) if config.allow_uncontained => {
            warn!("running '{command}' without cgroup: {e:#}");
            LimitedProcess::launch_without_container(command, args)
        }
        Err(e) => Err(e).context("cgroup containment failed and uncontained runs are disabled"),
    }
}

impl LimitedProcess {
    /// Wait for the process to exit, killing its whole tree once `timeout` has elapsed.
    ///
    /// The tree is killed on a normal exit too, so no agent outlives its match. Both pipes are
    /// drained on helper threads so a verbose child never blocks on a full pipe; once the tree
    /// is gone, output still held open by an escaped process is given up after
    /// [`CLEANUP_DURATION`].
    pub fn wait_with_deadline(mut self, timeout: Option<Duration>) -> anyhow::Result<ProcessOutput> {
        let start = Instant::now();
        let stdout = spawn_reader(self.child.stdout.take());
        let stderr = spawn_reader(self.child.stderr.take());

        let status = loop {
            if let Some(status) = self.child.try_wait().context("could not poll child")? {
                break Some(status);
            }
            if timeout.is_some_and(|t| start.elapsed() >= t) {
                trace!(pid = self.child.id(), "deadline reached, killing process tree");
                break None;
            }
            std::thread::sleep(Duration::from_millis(10));
        };

        // kill whatever is left (the agents, on a deadline the simulator too)
        self.try_kill(CLEANUP_DURATION)?;

        Ok(ProcessOutput {
            status,
            stdout: collect_reader(stdout, "stdout"),
            stderr: collect_reader(stderr, "stderr"),
            elapsed: start.elapsed(),
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    let mut pipe = pipe?;
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        let _ = tx.send(String::from_utf8_lossy(&bytes).into_owned());
    });
    Some(rx)
}

fn collect_reader(rx: Option<Receiver<String>>, name: &str) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    match rx.recv_timeout(CLEANUP_DURATION) {
        Ok(text) => text,
        Err(_) => {
            warn!("{name} still open after the process tree was killed, output dropped");
            String::new()
        }
    }
}

/// Kill every live process of the tree rooted at `root`, deepest first. `root` itself is left
/// alone.
///
/// The tree is the descendants of `root` plus every process carrying `tag` in
/// [`TREE_TAG_VAR`], which covers orphans reparented after their parent exited.
pub(self) fn kill_tree(root: u32, tag: &str) {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_environ(UpdateKind::Always),
    );

    let root = Pid::from_u32(root);
    let mut tree = vec![root];
    let mut i = 0;
    while i < tree.len() {
        let parent = tree[i];
        for (pid, process) in sys.processes() {
            if process.parent() == Some(parent) && !tree.contains(pid) {
                tree.push(*pid);
            }
        }
        i += 1;
    }

    let marker = OsString::from(format!("{TREE_TAG_VAR}={tag}"));
    for (pid, process) in sys.processes() {
        if !tree.contains(pid) && process.environ().contains(&marker) {
            tree.push(*pid);
        }
    }

    for pid in tree.iter().skip(1).rev() {
        if let Some(process) = sys.process(*pid) {
            trace!(%pid, "killing process of the tree");
            process.kill();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    fn uncontained() -> Configuration {
        Configuration::new().with_contained(false)
    }

    #[test]
    fn captures_both_pipes() {
        let process = spawn_process("sh", &sh("echo out; echo err >&2"), &uncontained()).unwrap();
        let output = process.wait_with_deadline(Some(Duration::from_secs(10))).unwrap();
        assert!(!output.timed_out());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn deadline_kills_the_process() {
        let process = spawn_process("sh", &sh("sleep 30"), &uncontained()).unwrap();
        let output = process
            .wait_with_deadline(Some(Duration::from_millis(200)))
            .unwrap();
        assert!(output.timed_out());
        assert!(output.elapsed < Duration::from_secs(10));
    }

    #[test]
    fn deadline_reaches_grandchildren() {
        // the grandchild keeps stdout open: the join would hang if it survived
        let process = spawn_process("sh", &sh("sleep 30 & wait"), &uncontained()).unwrap();
        let output = process
            .wait_with_deadline(Some(Duration::from_millis(300)))
            .unwrap();
        assert!(output.timed_out());
    }

    #[test]
    fn orphans_are_killed_after_a_normal_exit() {
        // sh exits at once, leaving the background sleep on the pipes
        let process = spawn_process("sh", &sh("sleep 30 &\necho x"), &uncontained()).unwrap();
        let start = Instant::now();
        let output = process
            .wait_with_deadline(Some(Duration::from_secs(20)))
            .unwrap();
        assert!(!output.timed_out());
        assert_eq!(output.stdout, "x\n");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn children_carry_the_tree_tag() {
        let process = spawn_process("sh", &sh("echo \"$LUX_TUNER_MATCH\""), &uncontained()).unwrap();
        let output = process.wait_with_deadline(None).unwrap();
        assert!(output.stdout.trim().starts_with(&format!("{}_", std::process::id())));
    }

    #[test]
    fn missing_command_is_an_error() {
        assert!(spawn_process("./definitely-not-a-simulator", &[], &uncontained()).is_err());
    }
}
