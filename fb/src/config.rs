//! fusionbridge configuration types and loading

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::{COMMAND_FILE_NAME, ChannelPaths, CompletionMode, PollTiming, RESPONSE_FILE_NAME};
use crate::dispatch::DispatcherConfig;

/// Main fusionbridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level when `--log-level` is not given
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// File channel shared with the host
    pub channel: ChannelConfig,

    /// Dispatcher limits
    pub dispatch: DispatcherConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            channel: ChannelConfig::default(),
            dispatch: DispatcherConfig::default(),
        }
    }
}

impl Config {
    /// Reject settings the dispatcher cannot run with
    pub fn validate(&self) -> Result<()> {
        let channel = &self.channel;
        if channel.poll_interval_ms == 0 {
            bail!("channel.poll-interval-ms must be greater than zero");
        }
        if channel.response_timeout_ms == 0 {
            bail!("channel.response-timeout-ms must be greater than zero");
        }
        if channel.command_path == channel.response_path {
            bail!(
                "channel.command-path and channel.response-path must differ (both are {})",
                channel.command_path.display()
            );
        }
        if self.dispatch.queue_capacity == 0 {
            bail!("dispatch.queue-capacity must be greater than zero");
        }
        if self.dispatch.max_macro_depth == 0 {
            bail!("dispatch.max-macro-depth must be greater than zero");
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load and validate. Otherwise the first usable
    /// file from [`search_paths`](Self::search_paths) wins, and unusable ones
    /// are skipped with a warning.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!(path = %candidate.display(), error = %e, "Skipping unusable config"),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// `.fusionbridge.yml`, then `<config_dir>/fusionbridge/fusionbridge.yml`
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".fusionbridge.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("fusionbridge").join("fusionbridge.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid configuration")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// File channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// File the host reads commands from
    #[serde(rename = "command-path")]
    pub command_path: PathBuf,

    /// File the host writes responses to
    #[serde(rename = "response-path")]
    pub response_path: PathBuf,

    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Pause between seeing content and reading it
    #[serde(rename = "settle-delay-ms")]
    pub settle_delay_ms: u64,

    #[serde(rename = "response-timeout-ms")]
    pub response_timeout_ms: u64,

    /// How a finished response is recognised
    pub completion: CompletionMode,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        let dir = ChannelPaths::default_dir();
        Self {
            command_path: dir.join(COMMAND_FILE_NAME),
            response_path: dir.join(RESPONSE_FILE_NAME),
            poll_interval_ms: 100,
            settle_delay_ms: 50,
            response_timeout_ms: 60_000,
            completion: CompletionMode::Settle,
        }
    }
}

impl ChannelConfig {
    pub fn paths(&self) -> ChannelPaths {
        ChannelPaths::new(expand_home(&self.command_path), expand_home(&self.response_path))
    }

    pub fn timing(&self) -> PollTiming {
        PollTiming {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            completion: self.completion,
        }
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.channel.poll_interval_ms, 100);
        assert_eq!(config.channel.settle_delay_ms, 50);
        assert_eq!(config.channel.response_timeout_ms, 60_000);
        assert_eq!(config.channel.completion, CompletionMode::Settle);
        assert_eq!(config.dispatch.max_macro_depth, 10);
        assert!(config.channel.command_path.ends_with("Documents/fusion_command.txt"));
        config.validate().unwrap();
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fb.yml");
        fs::write(
            &path,
            r#"
log-level: debug
channel:
  command-path: /tmp/x/cmd.txt
  response-path: /tmp/x/resp.txt
  response-timeout-ms: 5000
  completion: marker
dispatch:
  max-macro-depth: 4
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.channel.command_path, PathBuf::from("/tmp/x/cmd.txt"));
        assert_eq!(config.channel.response_timeout(), Duration::from_secs(5));
        assert_eq!(config.channel.poll_interval_ms, 100);
        assert_eq!(config.channel.timing().completion, CompletionMode::Marker);
        assert_eq!(config.dispatch.max_macro_depth, 4);
        assert_eq!(config.dispatch.queue_capacity, 64);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = Config::load(Some(&PathBuf::from("/nonexistent/fb.yml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fb.yml"));
    }

    #[test]
    fn test_load_rejects_file_that_fails_validation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fb.yml");
        fs::write(&path, "channel:\n  command-path: /tmp/same.txt\n  response-path: /tmp/same.txt\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("Invalid configuration"), "{}", chain);
        assert!(chain.contains("must differ"), "{}", chain);
    }

    #[test]
    fn test_search_paths_prefer_project_local() {
        let paths = Config::search_paths();
        assert_eq!(paths[0], PathBuf::from(".fusionbridge.yml"));
        if paths.len() > 1 {
            assert!(paths[1].ends_with("fusionbridge/fusionbridge.yml"));
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.channel.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.channel.response_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.channel.response_path = config.channel.command_path.clone();
        assert!(config.validate().unwrap_err().to_string().contains("must differ"));

        let mut config = Config::default();
        config.dispatch.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.dispatch.max_macro_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths_expand_home() {
        let config = ChannelConfig {
            command_path: PathBuf::from("~/cad/cmd.txt"),
            ..ChannelConfig::default()
        };
        let paths = config.paths();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(paths.command, home.join("cad/cmd.txt"));
        }
    }
}
