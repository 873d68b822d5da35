//! Configuration for the usage index and its `tracing` setup.
//!
//! ```toml
//! [logging]
//! level = "info,jref.usages.scan=debug"
//! json = false
//!
//! [index]
//! usages = "refs"      # basic | refs | all
//! idents = "exported"  # none | exported | all
//! full_index = false
//! priority_wait_ms = 200
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use thiserror::Error;

mod logging;

pub use logging::init_tracing;

pub const JREF_CONFIG_ENV_VAR: &str = "JREF_CONFIG_PATH";
pub const JREF_FULL_INDEX_ENV_VAR: &str = "JREF_FULL_INDEX";
pub const JREF_USAGES_LEVEL_ENV_VAR: &str = "JREF_USAGES_LEVEL";
pub const JREF_IDENT_LEVEL_ENV_VAR: &str = "JREF_IDENT_LEVEL";

/// How much of a class file the binary analyser turns into usages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UsagesLevel {
    /// Supertypes, class signature, top-level annotations and member names.
    #[serde(rename = "basic")]
    Basic,
    /// Adds constant-pool field and method reference owners.
    #[default]
    #[serde(rename = "refs")]
    ExecVarRefs,
    /// Adds the deep annotation walk, member signatures, local variables and
    /// every remaining class constant.
    #[serde(rename = "all")]
    All,
}

impl UsagesLevel {
    pub fn name(self) -> &'static str {
        match self {
            UsagesLevel::Basic => "basic",
            UsagesLevel::ExecVarRefs => "refs",
            UsagesLevel::All => "all",
        }
    }

    pub fn for_name(name: &str) -> Option<Self> {
        match name.trim() {
            "basic" => Some(UsagesLevel::Basic),
            "refs" => Some(UsagesLevel::ExecVarRefs),
            "all" => Some(UsagesLevel::All),
            _ => None,
        }
    }
}

/// Which member names become feature idents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentLevel {
    #[serde(rename = "none")]
    None,
    /// Non-private members only.
    #[default]
    #[serde(rename = "exported")]
    Visible,
    #[serde(rename = "all")]
    All,
}

impl IdentLevel {
    pub fn name(self) -> &'static str {
        match self {
            IdentLevel::None => "none",
            IdentLevel::Visible => "exported",
            IdentLevel::All => "all",
        }
    }

    pub fn for_name(name: &str) -> Option<Self> {
        match name.trim() {
            "none" => Some(IdentLevel::None),
            "exported" => Some(IdentLevel::Visible),
            "all" => Some(IdentLevel::All),
            _ => None,
        }
    }

    pub fn accepts(self, is_private: bool) -> bool {
        match self {
            IdentLevel::None => false,
            IdentLevel::Visible => !is_private,
            IdentLevel::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path. If the file cannot be opened, file
    /// logging is disabled while stderr logging remains active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level merged with `RUST_LOG`.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    #[serde(default)]
    pub usages: UsagesLevel,

    #[serde(default)]
    pub idents: IdentLevel,

    /// Forces `usages = "all"`.
    #[serde(default)]
    pub full_index: bool,

    /// Root of the per-classpath-root cache directories. Defaults to `~/.jref/cache`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Longest time a reader waits behind a writer that is queued for the index.
    #[serde(default = "IndexConfig::default_priority_wait_ms")]
    pub priority_wait_ms: u64,

    /// Fraction of the memory budget above which scans flush early.
    #[serde(default = "IndexConfig::default_low_memory_threshold")]
    pub low_memory_threshold: f64,

    /// Memory budget used by the low-memory watcher. Defaults to total system memory.
    #[serde(default)]
    pub memory_budget_bytes: Option<u64>,
}

impl IndexConfig {
    fn default_priority_wait_ms() -> u64 {
        200
    }

    fn default_low_memory_threshold() -> f64 {
        0.9
    }

    /// The level the binary analyser runs at once `full_index` is applied.
    pub fn usages_level(&self) -> UsagesLevel {
        if self.full_index {
            UsagesLevel::All
        } else {
            self.usages
        }
    }

    pub fn priority_wait(&self) -> Duration {
        Duration::from_millis(self.priority_wait_ms)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            usages: UsagesLevel::default(),
            idents: IdentLevel::default(),
            full_index: false,
            cache_dir: None,
            priority_wait_ms: Self::default_priority_wait_ms(),
            low_memory_threshold: Self::default_low_memory_threshold(),
            memory_budget_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JrefConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl JrefConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Applies the `JREF_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        let _guard = config_env_lock().lock();
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from `lookup`. Unknown level names keep the configured value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(JREF_FULL_INDEX_ENV_VAR) {
            let value = value.trim();
            self.index.full_index = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Some(value) = lookup(JREF_USAGES_LEVEL_ENV_VAR) {
            match UsagesLevel::for_name(&value) {
                Some(level) => self.index.usages = level,
                None => tracing::warn!(
                    target: "jref.config",
                    value = %value,
                    "ignoring unknown usages level"
                ),
            }
        }
        if let Some(value) = lookup(JREF_IDENT_LEVEL_ENV_VAR) {
            match IdentLevel::for_name(&value) {
                Some(level) => self.index.idents = level,
                None => tracing::warn!(
                    target: "jref.config",
                    value = %value,
                    "ignoring unknown ident level"
                ),
            }
        }
    }
}

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that temporarily set `JREF_*` variables wrap the mutation and the
/// config discovery in this helper so concurrent tests do not observe it.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Locate the config file for a workspace root.
///
/// 1) `JREF_CONFIG_PATH` (absolute or relative to `workspace_root`)
/// 2) `jref.toml` in `workspace_root`
/// 3) `.jref.toml` in `workspace_root`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(JREF_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path);
    }

    ["jref.toml", ".jref.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
}

/// Load the configuration for a workspace root with environment overrides applied.
///
/// Without a config file this returns [`JrefConfig::default`] and `None`.
pub fn load_for_workspace(workspace_root: &Path) -> Result<(JrefConfig, Option<PathBuf>)> {
    let _guard = config_env_lock().lock();
    let path = discover_config_path(workspace_root);
    let mut config = match &path {
        Some(path) => JrefConfig::load_from_path(path)?,
        None => JrefConfig::default(),
    };
    config.apply_env_overrides();
    Ok((config, path))
}
