use std::fs::File;

use anyhow::Context;
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Install a file logger named `<prefix>_<date>_log.txt` in the current directory.
///
/// Installing a second subscriber is not an error: the call is ignored and a message is
/// printed on stderr.
pub fn init_logger(prefix: &str) -> anyhow::Result<()> {
    let file_name = get_log_file_name(prefix)?;
    let file =
        File::create(&file_name).with_context(|| format!("could not create log file {file_name}"))?;
    let writer = BoxMakeWriter::new(file);
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid time format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    if set_global_default(subscriber).is_err() {
        eprintln!("a tracing subscriber is already set, {file_name} will stay empty");
    }
    Ok(())
}

fn get_log_file_name(prefix: &str) -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]")
        .context("invalid time format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = now.format(&format).context("could not format current time")?;
    Ok(format!("{prefix}_{stamp}_log.txt"))
}
