use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum cached URLs; unbounded when absent.
    #[serde(default)]
    pub cache_capacity: Option<usize>,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

/// Rewrites sandbox preview-proxy URLs to a locally reachable base.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub host_suffix: String,
    pub local_base: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            access_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            cache_capacity: None,
            proxy: None,
            log_dir: default_log_dir(),
        }
    }
}

impl PreviewConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config at {}: {}", path.display(), e))?;
        let config: PreviewConfig = serde_json::from_str(&data)
            .map_err(|e| anyhow!("Failed to parse config JSON at {}: {}", path.display(), e))?;
        config.normalized()
    }

    /// Load the config file if it exists, then apply environment overrides.
    pub fn load_default() -> Result<(Self, PathBuf)> {
        let path = resolve_config_path();
        let config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };
        Ok((config.with_env_overrides()?, path))
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var("TSBX_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(token) = std::env::var("TSBX_TOKEN") {
            self.access_token = Some(token);
        }
        self.normalized()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn normalized(mut self) -> Result<Self> {
        self.backend_url = self.backend_url.trim().trim_end_matches('/').to_string();
        if self.backend_url.is_empty() {
            self.backend_url = default_backend_url();
        }

        self.access_token = self
            .access_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than zero"));
        }

        if let Some(proxy) = self.proxy.as_mut() {
            proxy.host_suffix = proxy.host_suffix.trim().trim_start_matches('.').to_string();
            proxy.local_base = proxy.local_base.trim().trim_end_matches('/').to_string();
            if proxy.host_suffix.is_empty() || proxy.local_base.is_empty() {
                return Err(anyhow!(
                    "proxy requires both host_suffix and local_base to be set"
                ));
            }
        }

        self.log_dir = self.log_dir.trim().to_string();
        if self.log_dir.is_empty() {
            self.log_dir = default_log_dir();
        }

        Ok(self)
    }
}

fn default_backend_url() -> String {
    "http://localhost:9000/api/v0".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_dir() -> String {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tsbx")
        .join("logs")
        .to_string_lossy()
        .into_owned()
}

pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("TSBX_PREVIEW_CONFIG_PATH") {
        return expand_path(path);
    }

    default_config_path()
}

fn expand_path(input: String) -> PathBuf {
    if let Some(stripped) = input.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(input)
}

fn default_config_path() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tsbx")
        .join("preview.json")
}

fn home_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        std::env::var_os("USERPROFILE").map(PathBuf::from)
    } else {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}
