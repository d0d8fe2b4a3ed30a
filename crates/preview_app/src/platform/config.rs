use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use preview_engine::{Annotator, LineNumberAnnotator, PreviewSettings, ProcessAnnotator};
use preview_logging::{preview_info, preview_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::logging::LogOptions;

pub(crate) const CONFIG_FILENAME: &str = "preview.ron";

/// Argument that puts the binary into annotator subprocess mode.
pub(crate) const ANNOTATE_COMMAND: &str = "annotate";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum AnnotatorChoice {
    InProcess,
    /// Runs `program` once per parse. No program means this binary in
    /// `annotate` mode.
    Process {
        program: Option<PathBuf>,
        args: Vec<String>,
    },
}

impl Default for AnnotatorChoice {
    fn default() -> Self {
        Self::Process {
            program: None,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub debounce_ms: u64,
    pub poll_ms: u64,
    pub refresh_ms: u64,
    pub render_timeout_ms: u64,
    pub annotator: AnnotatorChoice,
    pub log: LogOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        let settings = PreviewSettings::default();
        Self {
            debounce_ms: settings.debounce_interval.as_millis() as u64,
            poll_ms: settings.poll_interval.as_millis() as u64,
            refresh_ms: settings.refresh_interval.as_millis() as u64,
            render_timeout_ms: 10_000,
            annotator: AnnotatorChoice::default(),
            log: LogOptions::default(),
        }
    }
}

impl AppConfig {
    pub fn preview_settings(&self) -> PreviewSettings {
        PreviewSettings {
            debounce_interval: Duration::from_millis(self.debounce_ms),
            poll_interval: Duration::from_millis(self.poll_ms),
            refresh_interval: Duration::from_millis(self.refresh_ms),
        }
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn build_annotator(&self) -> Box<dyn Annotator> {
        match &self.annotator {
            AnnotatorChoice::InProcess => Box::new(LineNumberAnnotator),
            AnnotatorChoice::Process {
                program: Some(program),
                args,
            } => Box::new(ProcessAnnotator::new(program.clone(), args.clone())),
            AnnotatorChoice::Process {
                program: None,
                args,
            } => match std::env::current_exe() {
                Ok(exe) => {
                    let mut args = args.clone();
                    args.insert(0, ANNOTATE_COMMAND.to_string());
                    Box::new(ProcessAnnotator::new(exe, args))
                }
                Err(err) => {
                    preview_warn!(
                        "Cannot locate own executable ({}); annotating in process",
                        err
                    );
                    Box::new(LineNumberAnnotator)
                }
            },
        }
    }
}

pub(crate) fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads `path`, or `preview.ron` in the working directory. Never fails.
pub(crate) fn load_config(path: Option<&Path>) -> AppConfig {
    let path = path.map_or_else(|| PathBuf::from(CONFIG_FILENAME), Path::to_path_buf);
    match read_config(&path) {
        Ok(config) => {
            preview_info!("Loaded config from {:?}", path);
            config
        }
        Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            AppConfig::default()
        }
        Err(err) => {
            preview_warn!("{}; using defaults", err);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::logging::LogDestination;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join(CONFIG_FILENAME)));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.preview_settings(), PreviewSettings::default());
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &path,
            "(debounce_ms: 250, annotator: InProcess, render_timeout_ms: 500)",
        )
        .unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.annotator, AnnotatorChoice::InProcess);
        assert_eq!(config.render_timeout(), Duration::from_millis(500));
        assert_eq!(
            config.preview_settings().debounce_interval,
            Duration::from_millis(250)
        );
        assert_eq!(config.poll_ms, 10);
    }

    #[test]
    fn process_annotator_is_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &path,
            "(annotator: Process(program: Some(\"/usr/bin/tidy\"), args: [\"-q\"]))",
        )
        .unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(
            config.annotator,
            AnnotatorChoice::Process {
                program: Some(PathBuf::from("/usr/bin/tidy")),
                args: vec!["-q".to_string()],
            }
        );
    }

    #[test]
    fn log_section_is_nested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, "(log: (destination: Both, verbose: true))").unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.log.destination, LogDestination::Both);
        assert!(config.log.verbose);
        assert_eq!(config.log.file, PathBuf::from("preview.log"));
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, "(debounce_ms: \"soon\")").unwrap();

        assert!(matches!(read_config(&path), Err(ConfigError::Parse { .. })));
        assert_eq!(load_config(Some(&path)), AppConfig::default());
    }

    #[test]
    fn saved_defaults_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let text =
            ron::ser::to_string_pretty(&AppConfig::default(), ron::ser::PrettyConfig::new())
                .unwrap();
        fs::write(&path, text).unwrap();
        assert_eq!(read_config(&path).unwrap(), AppConfig::default());
    }
}
