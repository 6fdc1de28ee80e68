use std::{process::Child, time::Duration};

use anyhow::{self, bail, Context};

use super::{create_process, kill_tree, new_tree_tag};

/// A child process whose whole tree can be killed: the simulator and both agents.
#[derive(Debug)]
pub struct LimitedProcess {
    pub child: Child,
    tag: String,
    cleaned_up: bool,
}

impl LimitedProcess {
    pub fn launch(_command: &str, _args: &[String]) -> anyhow::Result<LimitedProcess> {
        bail!("cgroups only available on linux")
    }

    /// Kill every process still alive in the tree.
    pub fn try_kill(&mut self, _max_duration: Duration) -> anyhow::Result<()> {
        kill_tree(self.child.id(), &self.tag);
        if self.child.try_wait().context("could not poll child")?.is_none() {
            self.child.kill().context("could not kill process")?;
        }
        let _ = self.child.wait();
        self.cleaned_up = true;
        Ok(())
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
            cleaned_up: false,
        })
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        static CLEANUP_DURATION: Duration = Duration::from_secs(1);
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(CLEANUP_DURATION) {
                tracing::error!("could not kill process {} on drop: {e:#}", self.child.id());
            }
        }
    }
}
