//! Engine configuration
//!
//! Defaults, then `~/.config/larets/config.yaml` (or an explicit file), then
//! `LARETS_*` environment variables.

use larets_core::Format;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RepoError, Result};

/// Default cache lifetime of proxied artifacts: 1440 minutes
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(1440 * 60);

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Root of all repository storage
    pub storage_path: PathBuf,

    /// SQLite database file, `<storagePath>/larets.db` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Public URL of this server, used in generated chart indexes
    pub base_url: String,

    #[serde(with = "humantime_serde")]
    pub default_cache_ttl: Duration,

    /// Bound on a single origin download
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Bound on a single git invocation
    #[serde(with = "humantime_serde")]
    pub tool_timeout: Duration,

    pub formats: FormatToggles,

    /// Carried for front-ends; the engine does not enforce authentication
    pub enable_auth: bool,
}

/// Which formats are served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatToggles {
    pub docker: bool,
    pub git: bool,
    pub helm: bool,
}

impl Default for FormatToggles {
    fn default() -> Self {
        Self {
            docker: true,
            git: true,
            helm: true,
        }
    }
}

impl FormatToggles {
    pub fn is_enabled(&self, format: Format) -> bool {
        match format {
            Format::Docker => self.docker,
            Format::Git => self.git,
            Format::Helm => self.helm,
        }
    }

    fn set(&mut self, format: Format, enabled: bool) {
        match format {
            Format::Docker => self.docker = enabled,
            Format::Git => self.git = enabled,
            Format::Helm => self.helm = enabled,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./storage"),
            database_path: None,
            base_url: "http://localhost:8080".to_string(),
            default_cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: Duration::from_secs(5 * 60),
            tool_timeout: Duration::from_secs(10 * 60),
            formats: FormatToggles::default(),
            enable_auth: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration: defaults, then the file, then the environment
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from(path)?,
            None => match Self::default_path() {
                Ok(path) if path.exists() => Self::load_from(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RepoError::InvalidConfig {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        serde_yaml::from_str(&content).map_err(|e| RepoError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let io_err = |e: std::io::Error| RepoError::InvalidConfig {
            message: format!("cannot write {}: {}", path.display(), e),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(io_err)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("larets").join("config.yaml"))
    }

    /// Apply `LARETS_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LARETS_STORAGE_PATH") {
            self.storage_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("LARETS_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LARETS_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("LARETS_DEFAULT_CACHE_TTL") {
            self.default_cache_ttl = parse_ttl("LARETS_DEFAULT_CACHE_TTL", &v)?;
        }
        if let Some(v) = lookup("LARETS_FETCH_TIMEOUT") {
            self.fetch_timeout = parse_duration("LARETS_FETCH_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("LARETS_TOOL_TIMEOUT") {
            self.tool_timeout = parse_duration("LARETS_TOOL_TIMEOUT", &v)?;
        }
        for format in Format::ALL {
            let key = format!("LARETS_ENABLE_{}", format.as_str().to_uppercase());
            if let Some(v) = lookup(&key) {
                self.formats.set(format, parse_bool(&v));
            }
        }
        if let Some(v) = lookup("LARETS_ENABLE_AUTH") {
            self.enable_auth = parse_bool(&v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| RepoError::InvalidConfig {
            message: format!("baseUrl '{}': {}", self.base_url, e),
        })?;
        if self.fetch_timeout.is_zero() || self.tool_timeout.is_zero() {
            return Err(RepoError::InvalidConfig {
                message: "timeouts must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Database file, defaulting to `<storagePath>/larets.db`
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.storage_path.join("larets.db"))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| RepoError::InvalidConfig {
        message: format!("{}='{}': {}", key, value, e),
    })
}

/// A humantime duration, or a bare number of minutes
fn parse_ttl(key: &str, value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(minutes) => Ok(Duration::from_secs(minutes * 60)),
        Err(_) => parse_duration(key, value),
    }
}
