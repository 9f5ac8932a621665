//! User configuration stored as TOML, by default under `<config_dir>/clicra/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::extract::UnfencedPolicy;
use crate::io::model::DEFAULT_ENDPOINT;

pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_MAX_CHARS: usize = 2000;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "CLICRA_CONFIG";
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

/// clicra configuration (TOML).
///
/// Missing fields default to the values the CLI would use without a file.
/// Command-line flags take precedence over anything set here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClicraConfig {
    /// Model name passed to the inference endpoint.
    pub model: String,

    /// Base URL of the Ollama-compatible endpoint.
    pub endpoint: String,

    /// Per-request timeout for model calls in seconds; 0 waits indefinitely.
    pub request_timeout_secs: u64,

    /// Character budget for reference context and for each output stream
    /// embedded in analysis prompts.
    pub max_chars: usize,

    /// Shell used for reference commands and generated artifacts.
    pub shell: String,

    /// Byte cap on captured stdout/stderr of executed artifacts.
    pub capture_limit_bytes: usize,

    /// Handling of completions without a fenced code block.
    pub unfenced: UnfencedPolicy,
}

impl Default for ClicraConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: 0,
            max_chars: DEFAULT_MAX_CHARS,
            shell: "bash".to_string(),
            capture_limit_bytes: 1_000_000,
            unfenced: UnfencedPolicy::default(),
        }
    }
}

impl ClicraConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("endpoint must be non-empty"));
        }
        if self.max_chars == 0 {
            return Err(anyhow!("max_chars must be > 0"));
        }
        if self.shell.trim().is_empty() {
            return Err(anyhow!("shell must be non-empty"));
        }
        if self.capture_limit_bytes == 0 {
            return Err(anyhow!("capture_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Apply `OLLAMA_HOST`, which the Ollama tooling uses to locate the server.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var(OLLAMA_HOST_ENV)
            && !host.trim().is_empty()
        {
            self.endpoint = host;
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Resolve which config file to read: explicit path, then `$CLICRA_CONFIG`,
/// then the platform config directory.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("clicra").join("config.toml"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ClicraConfig::default()`.
pub fn load_config(path: &Path) -> Result<ClicraConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        let cfg = ClicraConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ClicraConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ClicraConfig::default());
        assert_eq!(cfg.max_chars, 2000);
        assert_eq!(cfg.model, "llama3");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "model = \"llama3:70b\"\nunfenced = \"reject\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.model, "llama3:70b");
        assert_eq!(cfg.unfenced, UnfencedPolicy::Reject);
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn zero_max_chars_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_chars = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_chars"));
    }

    #[test]
    fn timeout_zero_means_none() {
        let mut cfg = ClicraConfig::default();
        assert_eq!(cfg.request_timeout(), None);
        cfg.request_timeout_secs = 90;
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/tmp/custom.toml");
        assert_eq!(config_path(Some(path)), Some(path.to_path_buf()));
    }
}
