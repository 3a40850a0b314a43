//! Layered configuration composition.
//!
//! A [`Config`] is one layer of settings. Layers compose by deep merge:
//! worker option schema defaults, then the global layer, then the local
//! layer, then inline overrides, with later layers winning. File parsing
//! is limited to an optional `.image_optim.toml` next to the images being
//! processed; everything a file can say can also be built in code.
//!
//! Worker entries accept two shapes, mirroring the common "toggle or
//! table" convention:
//!
//! ```toml
//! [workers]
//! pngcrush = false            # disable, keep everything else at defaults
//!
//! [workers.jpegoptim]         # enable with options
//! allow_lossy = true
//! max_quality = 85
//! ```
//!
//! Validation is eager and split in two: unknown *worker* names surface
//! here when the engine walks the registry; unknown or mistyped *options*
//! surface from the per-worker schema in [`crate::worker::options`]. Both
//! are fatal [`ConfigError`]s, per the rule that a configuration the user
//! wrote must never be silently ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::resolver::ResolveError;

/// File name probed by [`Config::load`].
pub const CONFIG_FILE_NAME: &str = ".image_optim.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown worker `{0}`")]
    UnknownWorker(String),
    #[error("unknown option `{option}` for worker `{worker}`")]
    UnknownOption { worker: String, option: String },
    #[error("option `{option}` for worker `{worker}` expects {expected}, got {got}")]
    BadOptionType {
        worker: String,
        option: String,
        expected: String,
        got: String,
    },
    #[error("worker `{worker}` is explicitly enabled but unusable: {source}")]
    WorkerUnavailable {
        worker: String,
        #[source]
        source: ResolveError,
    },
}

/// One configuration layer. An empty layer means "all workers enabled with
/// their schema defaults".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parallel driver width. `None` means available CPU parallelism.
    pub threads: Option<usize>,
    /// Directory searched for optimizer binaries before PATH (vendored
    /// binaries, test stubs).
    pub bin_dir: Option<PathBuf>,
    /// Wall-clock budget per worker invocation, in seconds. `None` or 0
    /// means no limit. A worker's own `timeout` option takes precedence.
    pub timeout: Option<f64>,
    /// Per-worker toggles and options, keyed by worker name.
    pub workers: BTreeMap<String, WorkerToggle>,
}

/// A worker entry: a bare bool toggles the worker with defaults, a table
/// enables it with options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerToggle {
    Enabled(bool),
    Options(serde_json::Map<String, serde_json::Value>),
}

/// Flattened view of one worker's configuration, resolved across layers.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub enabled: bool,
    /// The user named this worker in config (as `true` or a table), so a
    /// missing or broken binary is a hard error rather than a skip.
    pub explicit: bool,
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl Config {
    /// Load one layer from `dir/.image_optim.toml`; an absent file is the
    /// empty layer.
    pub fn load(dir: &Path) -> Result<Config, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Config::default());
        }
        Config::from_toml_file(&path)
    }

    pub fn from_toml_file(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        Config::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Merge `over` onto `self`, `over` winning. Scalars replace when set;
    /// worker tables merge key-wise so a later layer can adjust one option
    /// without restating the rest.
    pub fn merge(mut self, over: Config) -> Config {
        if over.threads.is_some() {
            self.threads = over.threads;
        }
        if over.bin_dir.is_some() {
            self.bin_dir = over.bin_dir;
        }
        if over.timeout.is_some() {
            self.timeout = over.timeout;
        }
        for (name, toggle) in over.workers {
            let merged = match (self.workers.remove(&name), toggle) {
                (Some(WorkerToggle::Options(mut base)), WorkerToggle::Options(over)) => {
                    for (key, value) in over {
                        base.insert(key, value);
                    }
                    WorkerToggle::Options(base)
                }
                (_, toggle) => toggle,
            };
            self.workers.insert(name, merged);
        }
        self
    }

    /// Compose layers left to right (later layers override earlier ones).
    pub fn compose(layers: impl IntoIterator<Item = Config>) -> Config {
        layers
            .into_iter()
            .fold(Config::default(), |acc, layer| acc.merge(layer))
    }

    /// Resolve the settings for one worker by name.
    pub fn worker_settings(&self, name: &str) -> WorkerSettings {
        match self.workers.get(name) {
            None => WorkerSettings {
                enabled: true,
                explicit: false,
                options: serde_json::Map::new(),
            },
            Some(WorkerToggle::Enabled(enabled)) => WorkerSettings {
                enabled: *enabled,
                explicit: *enabled,
                options: serde_json::Map::new(),
            },
            Some(WorkerToggle::Options(options)) => WorkerSettings {
                enabled: true,
                explicit: true,
                options: options.clone(),
            },
        }
    }

    /// Reject worker names that no registered class answers to.
    pub fn check_worker_names<'a>(
        &self,
        known: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        let known: Vec<&str> = known.into_iter().collect();
        for name in self.workers.keys() {
            if !known.contains(&name.as_str()) {
                return Err(ConfigError::UnknownWorker(name.clone()));
            }
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        duration_from_secs(self.timeout)
    }
}

/// Shared seconds-to-duration rule: absent, zero, or negative means none.
pub(crate) fn duration_from_secs(secs: Option<f64>) -> Option<Duration> {
    secs.filter(|s| *s > 0.0).map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_layer_enables_everything_implicitly() {
        let config = Config::default();
        let settings = config.worker_settings("jpegoptim");
        assert!(settings.enabled);
        assert!(!settings.explicit);
        assert!(settings.options.is_empty());
    }

    #[test]
    fn parses_bool_and_table_toggles() {
        let config = Config::from_toml_str(
            r#"
threads = 2

[workers]
pngcrush = false

[workers.jpegoptim]
allow_lossy = true
max_quality = 85
"#,
        )
        .unwrap();

        assert_eq!(config.threads, Some(2));
        assert!(!config.worker_settings("pngcrush").enabled);

        let jpegoptim = config.worker_settings("jpegoptim");
        assert!(jpegoptim.enabled);
        assert!(jpegoptim.explicit);
        assert_eq!(
            jpegoptim.options.get("max_quality"),
            Some(&serde_json::json!(85))
        );
    }

    #[test]
    fn merge_overrides_scalars_and_merges_options() {
        let global = Config::from_toml_str(
            r#"
threads = 4

[workers.optipng]
level = 7
interlace = false
"#,
        )
        .unwrap();
        let local = Config::from_toml_str(
            r#"
threads = 1

[workers.optipng]
level = 2
"#,
        )
        .unwrap();

        let merged = global.merge(local);
        assert_eq!(merged.threads, Some(1));

        let optipng = merged.worker_settings("optipng");
        // Overridden by the later layer.
        assert_eq!(optipng.options.get("level"), Some(&serde_json::json!(2)));
        // Preserved from the earlier layer.
        assert_eq!(
            optipng.options.get("interlace"),
            Some(&serde_json::json!(false))
        );
    }

    #[test]
    fn later_bool_replaces_earlier_table() {
        let base = Config::from_toml_str("[workers.svgo]\nprecision = 3\n").unwrap();
        let over = Config::from_toml_str("[workers]\nsvgo = false\n").unwrap();

        let merged = base.merge(over);
        assert!(!merged.worker_settings("svgo").enabled);
    }

    #[test]
    fn compose_applies_layers_in_order() {
        let a = Config::from_toml_str("threads = 8\n").unwrap();
        let b = Config::from_toml_str("threads = 2\n").unwrap();
        assert_eq!(Config::compose([a, b]).threads, Some(2));
    }

    #[test]
    fn unknown_worker_names_are_rejected() {
        let config = Config::from_toml_str("[workers]\nimagemagick = true\n").unwrap();
        let err = config
            .check_worker_names(["jpegoptim", "optipng"])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownWorker(name) if name == "imagemagick"));
    }

    #[test]
    fn load_missing_file_is_empty_layer() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert!(config.workers.is_empty());
        assert_eq!(config.threads, None);
    }

    #[test]
    fn load_reads_dotfile() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "threads = 3\n").unwrap();
        assert_eq!(Config::load(tmp.path()).unwrap().threads, Some(3));
    }

    #[test]
    fn timeout_zero_means_none() {
        let mut config = Config::default();
        config.timeout = Some(0.0);
        assert_eq!(config.timeout_duration(), None);
        config.timeout = Some(1.5);
        assert_eq!(config.timeout_duration(), Some(Duration::from_millis(1500)));
    }
}
