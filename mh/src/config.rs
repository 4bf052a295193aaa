//! mfehost configuration types and loading

use eyre::{Context, Result};
use fragbus::Capabilities;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::loader::LoadRequest;

/// Main mfehost configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR); CLI --log-level wins
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Module loader settings
    pub loader: LoaderConfig,

    /// Host orchestrator settings
    pub host: HostConfig,

    /// Fragments known to the host
    pub fragments: Vec<FragmentConfig>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Fragment names must be unique and every fragment needs a code URL.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for fragment in &self.fragments {
            if fragment.name.trim().is_empty() {
                return Err(eyre::eyre!("Fragment with code URL {} has an empty name", fragment.code_url));
            }
            if fragment.code_url.trim().is_empty() {
                return Err(eyre::eyre!("Fragment '{}' has no code-url", fragment.name));
            }
            if !seen.insert(fragment.name.as_str()) {
                return Err(eyre::eyre!("Fragment '{}' is declared more than once", fragment.name));
            }
        }
        if self.host.message_log_capacity == 0 {
            return Err(eyre::eyre!("host.message-log-capacity must be at least 1"));
        }
        Ok(())
    }

    /// Find a fragment by name
    pub fn fragment(&self, name: &str) -> Option<&FragmentConfig> {
        self.fragments.iter().find(|f| f.name == name)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidate_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed: the full load reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(path) => Some(path.clone()),
            None => Self::candidate_paths().into_iter().find(|p| p.exists()),
        }?;
        let content = fs::read_to_string(path).ok()?;
        let config: Self = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }

    /// Project-local `.mfehost.yml`, then `~/.config/mfehost/mfehost.yml`
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".mfehost.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("mfehost").join("mfehost.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Module loader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Per-request timeout for asset fetches in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// User agent sent with asset requests
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Largest accepted asset body in bytes
    #[serde(rename = "max-asset-bytes")]
    pub max_asset_bytes: usize,

    /// Keep a fragment whose code loaded but whose style failed
    ///
    /// Off by default: the whole fragment is retried on the next load.
    #[serde(rename = "mark-loaded-on-style-failure")]
    pub mark_loaded_on_style_failure: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: format!("mfehost/{} (module loader)", env!("CARGO_PKG_VERSION")),
            max_asset_bytes: 5_000_000,
            mark_loaded_on_style_failure: false,
        }
    }
}

/// Host orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Name seeded into the `userInfo` state key
    #[serde(rename = "user-name")]
    pub user_name: String,

    /// Role seeded into the `userInfo` state key
    #[serde(rename = "user-role")]
    pub user_role: String,

    /// Initial `theme` state value
    pub theme: String,

    /// Number of bus messages the host keeps for display
    #[serde(rename = "message-log-capacity")]
    pub message_log_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            user_name: "Kumar Shan".to_string(),
            user_role: "Admin".to_string(),
            theme: "light".to_string(),
            message_log_capacity: 10,
        }
    }
}

/// One fragment the host knows how to load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentConfig {
    /// Unique fragment name
    pub name: String,

    /// URL of the executable code artifact
    #[serde(rename = "code-url")]
    pub code_url: String,

    /// URL of the stylesheet, loaded only after the code succeeded
    #[serde(rename = "style-url", default)]
    pub style_url: Option<String>,

    /// Element tag the fragment registers (informational)
    #[serde(rename = "tag-name", default)]
    pub tag_name: Option<String>,

    /// What the fragment's bus handle may do
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl FragmentConfig {
    pub fn to_request(&self) -> LoadRequest {
        let mut request = LoadRequest::new(&self.name, &self.code_url).with_capabilities(self.capabilities);
        if let Some(style_url) = &self.style_url {
            request = request.with_style(style_url);
        }
        request
    }
}
