//! Versioned TOML configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const CONFIG_VERSION: i64 = 1;
const APP_NAME: &str = "formflow";
/// Environment variable naming the config file, overriding the default path.
pub const CONFIG_ENV: &str = "FORMFLOW_CONFIG";

/// Errors raised while locating or reading the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine config directory; set {}", CONFIG_ENV)]
    NoConfigDir,

    #[error("could not determine XDG data directory")]
    NoDataDir,

    #[error("could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{} is missing `version = {}`", .path.display(), CONFIG_VERSION)]
    Unversioned { path: PathBuf },

    #[error("unsupported config version {found} in {}; expected {}", .path.display(), CONFIG_VERSION)]
    UnsupportedVersion { path: PathBuf, found: i64 },

    #[error("invalid {key} in {}: {message}", .path.display())]
    Invalid {
        path: PathBuf,
        key: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            engine: Engine::default(),
            storage: Storage::default(),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Engine {
    /// `<N>ms`, `<N>s` or `<N>m`; absent means lookups never time out.
    pub lookup_timeout: Option<String>,
    /// Artificial delay for the reference lookups in the terminal host.
    pub simulated_latency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub filter: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            filter: Some("info".to_owned()),
        }
    }
}

impl Config {
    /// `$FORMFLOW_CONFIG`, else `<config dir>/formflow/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let root = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(root.join(APP_NAME).join("config.toml"))
    }

    /// Loads and validates `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: toml::Value = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| ConfigError::Unversioned {
                path: path.to_path_buf(),
            })?;
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: version,
            });
        }

        let config: Config = value.try_into().map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |key, message: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            key,
            message,
        };
        if let Some(raw) = &self.engine.lookup_timeout {
            let timeout = parse_duration(raw).map_err(|m| invalid("engine.lookup_timeout", m))?;
            if timeout.is_zero() {
                return Err(invalid(
                    "engine.lookup_timeout",
                    format!("must be positive, got {raw}"),
                ));
            }
        }
        if let Some(raw) = &self.engine.simulated_latency {
            parse_duration(raw).map_err(|m| invalid("engine.simulated_latency", m))?;
        }
        if let Some(filter) = &self.logging.filter
            && filter.trim().is_empty()
        {
            return Err(invalid("logging.filter", "must not be empty".to_owned()));
        }
        Ok(())
    }

    /// Lookup timeout; `None` when unset. Validated by [`Config::load`].
    pub fn lookup_timeout(&self) -> Option<Duration> {
        self.engine
            .lookup_timeout
            .as_deref()
            .and_then(|raw| parse_duration(raw).ok())
    }

    pub fn simulated_latency(&self) -> Duration {
        self.engine
            .simulated_latency
            .as_deref()
            .and_then(|raw| parse_duration(raw).ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Configured data directory, else `<data dir>/formflow`.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(APP_NAME))
                .ok_or(ConfigError::NoDataDir),
        }
    }

    pub fn log_filter(&self) -> &str {
        self.logging.filter.as_deref().unwrap_or("info")
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# formflow config\n# Place this file at: {}\n\nversion = {CONFIG_VERSION}\n\n[engine]\n# lookup_timeout = \"5s\"\nsimulated_latency = \"300ms\"\n\n[storage]\n# Optional. Default is the platform data dir (for example ~/.local/share/formflow)\n# data_dir = \"/absolute/path\"\n\n[logging]\nfilter = \"info\"\n",
            path.display(),
        )
    }
}

/// Parses `<N>ms`, `<N>s` or `<N>m`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let invalid = || {
        format!("invalid duration {raw:?}; use <N>ms, <N>s or <N>m (for example 500ms or 5s)")
    };
    if let Some(value) = raw.strip_suffix("ms") {
        return value.parse().map(Duration::from_millis).map_err(|_| invalid());
    }
    if let Some(value) = raw.strip_suffix('s') {
        return value.parse().map(Duration::from_secs).map_err(|_| invalid());
    }
    if let Some(value) = raw.strip_suffix('m') {
        return value
            .parse::<u64>()
            .map(|mins| Duration::from_secs(mins * 60))
            .map_err(|_| invalid());
    }
    Err(invalid())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (temp, path)
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::load(&temp.path().join("missing.toml")).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.lookup_timeout(), None);
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn full_config_parses() {
        let (_temp, path) = write_config(
            "version = 1\n[engine]\nlookup_timeout = \"2s\"\nsimulated_latency = \"250ms\"\n[storage]\ndata_dir = \"/tmp/ff\"\n[logging]\nfilter = \"formflow=debug\"\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.lookup_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.simulated_latency(), Duration::from_millis(250));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/ff"));
        assert_eq!(config.log_filter(), "formflow=debug");
    }

    #[test]
    fn unversioned_config_is_rejected() {
        let (_temp, path) = write_config("[engine]\nlookup_timeout = \"2s\"\n");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Unversioned { .. }));
        assert!(err.to_string().contains("version = 1"));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let (_temp, path) = write_config("version = 7\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::UnsupportedVersion { found: 7, .. })
        ));
    }

    #[test]
    fn malformed_toml_names_the_file() {
        let (_temp, path) = write_config("version = \n");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let (_temp, path) = write_config("version = 1\n[engine]\nlookup_timeout = \"soon\"\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Invalid { key: "engine.lookup_timeout", .. })
        ));

        let (_temp, path) = write_config("version = 1\n[engine]\nlookup_timeout = \"0s\"\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Invalid { key: "engine.lookup_timeout", .. })
        ));
    }

    #[test]
    fn empty_log_filter_is_rejected() {
        let (_temp, path) = write_config("version = 1\n[logging]\nfilter = \" \"\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Invalid { key: "logging.filter", .. })
        ));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_duration("5h").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn default_path_honors_env_override() {
        let _guard = env_lock();
        let temp = tempfile::tempdir().unwrap();
        let override_path = temp.path().join("custom.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var(CONFIG_ENV, &override_path);
        }
        let resolved = Config::default_path();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var(CONFIG_ENV);
        }
        assert_eq!(resolved.unwrap(), override_path);
    }

    #[test]
    fn example_config_loads() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path)).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.simulated_latency(), Duration::from_millis(300));
    }
}
