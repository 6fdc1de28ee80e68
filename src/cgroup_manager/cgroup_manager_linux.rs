use std::{
    process::Child,
    time::{Duration, Instant},
};

use anyhow::{self, Context};
use cgroups_rs::Cgroup;

use super::{create_process, kill_tree, new_tree_tag};

fn get_current_user_id() -> anyhow::Result<String> {
    let output = std::process::Command::new("id")
        .arg("-u")
        .output()
        .context("Could not launch 'id -u'")?;
    let stdout = output.stdout;
    let untrimed_id = std::str::from_utf8(&stdout).context("id is not a valid string")?;
    Ok(untrimed_id.trim().to_string())
}

fn get_cgroup_path(user_id: &str, group_name: &str) -> String {
    format!("user.slice/user-{user_id}.slice/user@{user_id}.service/{group_name}")
}

/// Create an unrestricted cgroup at `path`, used only to kill a match's process tree at once.
fn create_cgroup(path: &str) -> anyhow::Result<Cgroup> {
    cgroups_rs::cgroup_builder::CgroupBuilder::new(path)
        .build(cgroups_rs::hierarchies::auto())
        .context("could not create cgroup")
}

#[derive(Debug)]
struct TimeoutError {}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Timeout Error")
    }
}

impl std::error::Error for TimeoutError {}

fn wait_for_process_cleanup(
    cgroup: &Cgroup,
    pid: u64,
    max_duration: Duration,
) -> Result<(), TimeoutError> {
    let deadline = Instant::now() + max_duration;
    while cgroup.tasks().iter().any(|cpid| cpid.pid == pid) {
        if Instant::now() > deadline {
            return Err(TimeoutError {});
        }

        std::thread::sleep(std::cmp::min(Duration::from_millis(10), max_duration / 10));
    }
    Ok(())
}

fn create_process_in_cgroup(
    command: &str,
    args: &[String],
    tag: &str,
    group: &Cgroup,
) -> anyhow::Result<Child> {
    let mut child = create_process(command, args, tag)?;

    let pid = child.id() as u64;
    let addition = group.add_task_by_tgid(cgroups_rs::CgroupPid { pid });
    if addition.is_err() {
        let kill = child.kill();
        let _ = child.wait();

        addition.with_context(|| {
            if let Err(err) = kill {
                format!(
                    "could not add process to cgroup, and process could not be killed either ({err})"
                )
            } else {
                "could not add process to cgroup".to_string()
            }
        })?;
    }
    Ok(child)
}

/// A child process whose whole tree can be killed: the simulator and both agents.
#[derive(Debug)]
pub struct LimitedProcess {
    pub child: Child,
    tag: String,
    cgroup: Option<Cgroup>,
    cleaned_up: bool,
}

impl LimitedProcess {
    /// Launch `command` inside a fresh cgroup.
    pub fn launch(command: &str, args: &[String]) -> anyhow::Result<LimitedProcess> {
        let user_id = get_current_user_id().context("could not get user id")?;
        let tag = new_tree_tag();
        // one cgroup per match
        let path = get_cgroup_path(&user_id, &format!("LUX_MATCH_{tag}"));
        let group = create_cgroup(&path)?;
        let child = create_process_in_cgroup(command, args, &tag, &group).with_context(|| {
            let _ = group.delete();
            "could not create process in cgroup"
        })?;

        Ok(LimitedProcess {
            child,
            tag,
            cgroup: Some(group),
            cleaned_up: false,
        })
    }

    /// Kill every process still alive in the tree and release the cgroup.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        match &mut self.cgroup {
            Some(cgroup) => {
                cgroup.kill().context("could not kill process")?;
                wait_for_process_cleanup(cgroup, self.child.id() as u64, max_duration)
                    .context("process cleanup timed out")?;
                // at this point, the process is killed. Even so the cgroup cleanup fail, it is
                // 'safe' (probably) to continue
                self.cleaned_up = true;
                let _ = self.child.wait();
                if let Err(e) = cgroup.delete() {
                    tracing::warn!("Failed to remove cgroup. If this happens a lot, it may slow down the computer. {e}");
                }
                Ok(())
            }
            None => {
                kill_tree(self.child.id(), &self.tag);
                if self.child.try_wait().context("could not poll child")?.is_none() {
                    self.child.kill().context("could not kill process")?;
                }
                let _ = self.child.wait();
                self.cleaned_up = true;
                Ok(())
            }
        }
    }

    /// Launch `command` as a plain child process.
    pub fn launch_without_container(
        command: &str,
        args: &[String],
    ) -> anyhow::Result<LimitedProcess> {
        let tag = new_tree_tag();
        let child = create_process(command, args, &tag).context("could not create process")?;

        Ok(LimitedProcess {
            child,
            tag,
            cgroup: None,
            cleaned_up: false,
        })
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        static CLEANUP_DURATION: Duration = Duration::from_millis(100);
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(CLEANUP_DURATION) {
                tracing::error!("could not kill process {} on drop: {e:#}", self.child.id());
            }
        }
    }
}
