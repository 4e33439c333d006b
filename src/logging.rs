//! Run logging: console on stderr plus a debug-level copy in the output
//! directory.
//!
//! Both sinks are `env_logger` loggers sharing one line format. The console
//! honors `RUST_LOG` (default `info`); the file always records `debug`.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use env_logger::fmt::Formatter;
use env_logger::{Builder, Env, Logger, Target};
use log::{LevelFilter, Log, Metadata, Record};

use crate::artifacts::LOG_FILE;

struct TeeLogger {
    console: Logger,
    file: Option<Logger>,
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata)
            || self.file.as_ref().is_some_and(|file| file.enabled(metadata))
    }

    fn log(&self, record: &Record<'_>) {
        if self.console.matches(record) {
            self.console.log(record);
        }
        if let Some(file) = &self.file {
            if file.matches(record) {
                file.log(record);
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            file.flush();
        }
    }
}

fn format_line(buf: &mut Formatter, record: &Record<'_>) -> std::io::Result<()> {
    writeln!(
        buf,
        "{} [{:>5}] {}",
        buf.timestamp_millis(),
        record.level(),
        record.args()
    )
}

/// Install the process logger. When `output_dir` is given, `detect.log` is
/// created (truncated) inside it.
pub fn init(output_dir: Option<&Path>) -> Result<()> {
    let console = Builder::from_env(Env::default().default_filter_or("info"))
        .format(format_line)
        .target(Target::Stderr)
        .build();

    let file = match output_dir {
        Some(dir) => {
            let path = dir.join(LOG_FILE);
            let handle = File::create(&path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            Some(
                Builder::new()
                    .filter_level(LevelFilter::Debug)
                    .format(format_line)
                    .target(Target::Pipe(Box::new(handle)))
                    .build(),
            )
        }
        None => None,
    };

    let max_level = file
        .as_ref()
        .map_or(console.filter(), |file| file.filter().max(console.filter()));
    log::set_boxed_logger(Box::new(TeeLogger { console, file }))
        .context("logger already initialized")?;
    log::set_max_level(max_level);
    Ok(())
}
