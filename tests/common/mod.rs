//! Fake simulators written as shell scripts into a temporary directory.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use lux_tuner::configuration::Configuration;
use tracing::{Level, Metadata};
use tracing_subscriber::{
    fmt,
    layer::{Context, Filter, SubscriberExt},
    Layer, Registry,
};

pub const WIN_OUTPUT: &str =
    "{ ranks: [ { rank: 1, agentID: 0, name: 'a' }, { rank: 2, agentID: 1, name: 'b' }, ], replayFile: 'replays/1.json', seed: 1 }";

struct DebugOnly;
impl<S> Filter<S> for DebugOnly {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        meta.level() <= &Level::DEBUG
    }
}

pub fn init_debug_logger() {
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_thread_names(true)
        .with_target(false);

    let reg = Registry::default().with(fmt::layer().event_format(format).with_filter(DebugOnly));

    let _ = tracing::subscriber::set_global_default(reg);
}

/// Write an executable `sh` script called `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Quiet, uncontained configuration running `simulator`.
pub fn config_for(simulator: &Path, logs_root: &Path) -> Configuration {
    Configuration::new()
        .with_contained(false)
        .with_silent(true)
        .with_simulator(simulator.to_string_lossy())
        .with_logs_root(logs_root)
}

pub fn agents() -> [PathBuf; 2] {
    [PathBuf::from("bot_a"), PathBuf::from("bot_b")]
}
