/*!
common/src/lib.rs

Shared configuration types for newsdesk.

This file provides:
- Config data structures (deserialized from TOML)
- Async loaders for a single config file or a default + override pair
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Source credibility lists. Entries are bare domains or domain suffixes
/// (`"gov"` covers every `.gov` host).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub credible: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

/// One news sector and the search tags used to find trending topics for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorConfig {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Sector rotation state location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Path to the JSON rotation state file (e.g. "data/sector_rotation.json")
    pub state_path: String,
}

/// Chat session settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// First assistant message of a session opened with article context
    pub greeting: Option<String>,
}

/// Remote LLM endpoint config (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// LLM top-level config grouping the fallback endpoint and task-specific ones
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    // Fallback: single remote config
    pub remote: Option<RemoteLlmConfig>,
    // Task-specific configs
    pub chat: Option<RemoteLlmConfig>,
    pub search: Option<RemoteLlmConfig>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub sectors: Vec<SectorConfig>,
    pub rotation: Option<RotationConfig>,
    pub sessions: Option<SessionsConfig>,
    pub llm: Option<LlmConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    /// Missing files are skipped, so two `None`s yield an empty configuration.
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Greeting configured for new context sessions, if any
    pub fn greeting(&self) -> Option<&str> {
        self.sessions.as_ref().and_then(|s| s.greeting.as_deref())
    }
}

/// Deep-merge `b` into `a`. Tables merge key by key; any other value
/// (arrays included) is replaced wholesale.
fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}
