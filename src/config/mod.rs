//! Gateway configuration (layered: defaults < file < environment).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_HEARTBEAT_SECS: u64 = 15;
const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:8100";

/// Upstream agent-runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
            model: None,
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Development mode: skip verification, use a fixed test user.
    pub disabled: bool,
    /// Comma-separated accepted JWT audiences; empty accepts any.
    pub audience: Option<String>,
}

/// Full gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub bind_addr: String,
    pub heartbeat_secs: u64,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub knowledge_root: Option<PathBuf>,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            upstream: UpstreamConfig::default(),
            auth: AuthConfig::default(),
            knowledge_root: None,
        }
    }
}

impl SwitchboardConfig {
    /// Load configuration: the TOML file (explicit path, or the platform
    /// config dir when present), then environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            SwitchboardError::Configuration(format!(
                "cannot read config file {}: {error}",
                path.display()
            ))
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(value) = non_empty_env("SWITCHBOARD_BIND") {
            self.bind_addr = value;
        }
        if let Some(value) = non_empty_env("AGENT_RUNTIME_URL") {
            self.upstream.base_url = value;
        }
        if let Ok(value) = std::env::var("SWITCHBOARD_HEARTBEAT_SECS") {
            if let Ok(secs) = value.trim().parse::<u64>() {
                self.heartbeat_secs = secs;
            }
        }
        if let Some(value) = non_empty_env("AGENT_RUNTIME_API_KEY") {
            self.upstream.api_key = Some(value);
        }
        if let Some(value) = non_empty_env("AGENT_RUNTIME_MODEL") {
            self.upstream.model = Some(value);
        }
        if let Ok(value) = std::env::var("SWITCHBOARD_DISABLE_AUTH") {
            self.auth.disabled = parse_bool(&value);
        }
        if let Some(value) = non_empty_env("SWITCHBOARD_JWT_AUDIENCE") {
            self.auth.audience = Some(value);
        }
        if let Some(value) = non_empty_env("SWITCHBOARD_KNOWLEDGE_ROOT") {
            self.knowledge_root = Some(PathBuf::from(value));
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "switchboard")
        .map(|dirs| dirs.config_dir().join("switchboard.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = SwitchboardConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.heartbeat(), Duration::from_secs(15));
        assert!(!config.auth.disabled);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "bind_addr = \"127.0.0.1:9000\"\nheartbeat_secs = 5\n\n\
             [upstream]\nbase_url = \"http://runtime:8100\"\nmodel = \"gpt-4o-mini\"\n\n\
             [auth]\ndisabled = true"
        )
        .expect("write");
        let config = SwitchboardConfig::from_file(file.path()).expect("parse");
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.heartbeat_secs, 5);
        assert_eq!(config.upstream.base_url, "http://runtime:8100");
        assert_eq!(config.upstream.model.as_deref(), Some("gpt-4o-mini"));
        assert!(config.auth.disabled);
    }

    #[test]
    fn mistyped_file_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "bind_addr = 12").expect("write");
        assert!(SwitchboardConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for value in ["1", "true", "YES", " on "] {
            assert!(parse_bool(value));
        }
        for value in ["0", "false", "off", "nonsense"] {
            assert!(!parse_bool(value));
        }
    }
}
