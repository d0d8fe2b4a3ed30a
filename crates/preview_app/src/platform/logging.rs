//! Log setup for preview_app.
//!
//! Stdout carries the rendered document, so terminal logging goes to stderr.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub(crate) enum LogDestination {
    File,
    #[default]
    Terminal,
    Both,
}

/// The `log` section of `preview.ron`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LogOptions {
    pub destination: LogDestination,
    /// Truncated on every start.
    pub file: PathBuf,
    /// Debug output, including every coalesced or discarded parse.
    pub verbose: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            destination: LogDestination::default(),
            file: PathBuf::from("preview.log"),
            verbose: false,
        }
    }
}

impl LogOptions {
    fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

pub(crate) fn initialize(options: &LogOptions) {
    let level = options.level();
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    if matches!(
        options.destination,
        LogDestination::Terminal | LogDestination::Both
    ) {
        loggers.push(TermLogger::new(
            level,
            build_config(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }
    if matches!(
        options.destination,
        LogDestination::File | LogDestination::Both
    ) {
        if let Some(file_logger) = create_file_logger(&options.file, level) {
            loggers.push(file_logger);
        }
    }
    if loggers.is_empty() {
        return;
    }

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    // Thread names tell the parse worker's lines apart from the UI thread's.
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .set_thread_level(LevelFilter::Error)
        .set_thread_mode(simplelog::ThreadLogMode::Names)
        .build()
}

fn create_file_logger(path: &Path, level: LevelFilter) -> Option<Box<WriteLogger<File>>> {
    match File::create(path) {
        Ok(file) => Some(WriteLogger::new(level, build_config(), file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", path, err);
            None
        }
    }
}
