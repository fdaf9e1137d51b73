//! Stderr logger for the `log` facade

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Writes `LEVEL [target] message` lines to stderr.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:<5} [{}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Level for `-v` repeated `count` times. Warnings always show.
pub fn level_for(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the logger. A second call only changes the level.
pub fn init(verbosity: u8) {
    // set_logger fails only when a logger is already installed
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level_for(verbosity));
    log::debug!("log level {}", level_for(verbosity).to_level().unwrap_or(Level::Warn));
}
