//! Configuration for the routing coordinator.
//!
//! # File permissions
//!
//! `from_file` refuses world-writable files and world-readable files that
//! hold an API key, and warns when a key sits in a group-readable file.

use crate::catalog::CatalogConfig;
use medirouter_llm::LlmConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Main coordinator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Classifier provider and transport settings
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    /// Agent endpoints keyed by capability name. Empty means dispatches
    /// are only logged.
    #[serde(default)]
    pub agents: HashMap<String, AgentEndpointConfig>,

    /// Replaces the built-in medical catalog when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Upper bound on one classification, in milliseconds
    #[serde(default = "default_classify_timeout_ms")]
    pub classify_timeout_ms: u64,

    /// Upper bound on one sink call, in milliseconds
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Open conversations allowed at once; opening more is refused
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
}

fn default_classify_timeout_ms() -> u64 {
    30_000
}

fn default_dispatch_timeout_ms() -> u64 {
    15_000
}

fn default_max_conversations() -> usize {
    1_000
}

fn default_temperature() -> f32 {
    crate::request::DEFAULT_TEMPERATURE
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            classify_timeout_ms: default_classify_timeout_ms(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            temperature: default_temperature(),
            max_conversations: default_max_conversations(),
        }
    }
}

impl RoutingConfig {
    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndpointConfig {
    /// URL the dispatch sink POSTs routed calls to
    pub endpoint: String,
}

impl CoordinatorConfig {
    /// Load configuration from a TOML file, checking its permissions first
    /// on Unix.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let config = Self::from_file_unchecked(path)?;

        if config.llm.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            warn!(
                "API key found in config file '{}'. Prefer GEMINI_API_KEY or OPENAI_API_KEY.",
                path.display()
            );
        }

        Ok(config)
    }

    /// Load configuration without permission checks.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {e}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {e}", path.display()))?;
        Ok(config)
    }

    /// Endpoints for the HTTP sink, keyed by capability.
    pub fn agent_endpoints(&self) -> HashMap<String, String> {
        self.agents
            .iter()
            .map(|(name, agent)| (name.clone(), agent.endpoint.clone()))
            .collect()
    }
}

/// Heuristic for "this file carries a credential".
fn mentions_api_key(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim_start();
        !line.starts_with('#')
            && line.starts_with("api_key")
            && line
                .split_once('=')
                .is_some_and(|(_, value)| !value.trim().trim_matches('"').is_empty())
    })
}

#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {e}", path.display()))?;

    if !metadata.is_file() {
        anyhow::bail!("Config path '{}' is not a regular file", path.display());
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path).unwrap_or_default();
    if !mentions_api_key(&content) {
        return Ok(());
    }

    if permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o})",
            path.display(),
            permission_bits
        );
    }

    Ok(())
}
