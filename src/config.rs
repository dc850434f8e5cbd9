//! Optimizer configuration.
//!
//! Defines [`OptimizerConfig`], validated once at manager construction time
//! (see [`crate::manager::OptimizerManager::new`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, OptimizerResult};

fn default_true() -> bool {
    true
}

fn default_semantic_ratio() -> f32 {
    0.7
}

fn default_max_tools() -> u32 {
    10
}

fn default_embedding_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_find_tool_name() -> String {
    "find_tool".to_string()
}

fn default_call_tool_name() -> String {
    "call_tool".to_string()
}

fn default_token_divisor() -> i64 {
    4
}

/// Top-level configuration for the vMCP tool optimizer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptimizerConfig {
    /// Master switch. When false, [`crate::manager::OptimizerManager`] is a no-op.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to a SQLite database file for the tool store. Empty means in-memory.
    #[serde(default)]
    pub persist_path: String,

    /// Base URL of the remote embedding service. Empty disables the HTTP client.
    #[serde(default)]
    pub embedding_service_url: String,

    /// Request timeout for the embedding service.
    #[serde(default = "default_embedding_timeout")]
    pub embedding_service_timeout: Duration,

    /// When > 0, activates the deterministic fake embedding client at this
    /// dimensionality instead of the HTTP client. Intended for tests.
    #[serde(default)]
    pub embedding_dimension: usize,

    /// Blend factor between the semantic and keyword legs of hybrid search.
    /// Forced to 0.0 when no embedding client is configured.
    #[serde(default = "default_semantic_ratio")]
    pub hybrid_semantic_ratio: f32,

    /// Maximum number of results `find_tool` will return. 0 means unset
    /// (the handler falls back to its own default of 10).
    #[serde(default = "default_max_tools")]
    pub max_tools_to_return: u32,

    /// Optional cosine-distance cutoff (`1 - similarity`); candidates beyond
    /// this distance are dropped from the semantic leg. 0.0 disables it.
    #[serde(default)]
    pub semantic_distance_threshold: f32,

    /// Divisor used by the character-based token counter heuristic.
    #[serde(default = "default_token_divisor")]
    pub token_divisor: i64,

    /// Public name of the tool-discovery meta-tool.
    #[serde(default = "default_find_tool_name")]
    pub find_tool_name: String,

    /// Public name of the tool-invocation meta-tool.
    #[serde(default = "default_call_tool_name")]
    pub call_tool_name: String,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            persist_path: String::new(),
            embedding_service_url: String::new(),
            embedding_service_timeout: default_embedding_timeout(),
            embedding_dimension: 0,
            hybrid_semantic_ratio: default_semantic_ratio(),
            max_tools_to_return: default_max_tools(),
            semantic_distance_threshold: 0.0,
            token_divisor: default_token_divisor(),
            find_tool_name: default_find_tool_name(),
            call_tool_name: default_call_tool_name(),
        }
    }
}

impl OptimizerConfig {
    /// Load configuration from a YAML file on disk.
    pub async fn from_yaml_file(path: &str) -> OptimizerResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| OptimizerError::Config(format!("failed to read {path}: {e}")))?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> OptimizerResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| OptimizerError::Config(format!("invalid config YAML: {e}")))
    }

    /// Validate field ranges. Called once by the manager; never panics on
    /// bad input.
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.max_tools_to_return > 50 {
            return Err(OptimizerError::invalid(
                "max_tools_to_return must be in [1, 50] (0 = unset)",
            ));
        }
        if !(0.0..=1.0).contains(&self.hybrid_semantic_ratio) {
            return Err(OptimizerError::invalid(
                "hybrid_semantic_ratio must be in [0.0, 1.0]",
            ));
        }
        if !(0.0..=2.0).contains(&self.semantic_distance_threshold) {
            return Err(OptimizerError::invalid(
                "semantic_distance_threshold must be in [0.0, 2.0]",
            ));
        }
        if self.find_tool_name.trim().is_empty() || self.call_tool_name.trim().is_empty() {
            return Err(OptimizerError::invalid(
                "find_tool_name and call_tool_name must be non-empty",
            ));
        }
        Ok(())
    }

    /// Clamp a caller-supplied `limit` to the configured bound, defaulting
    /// to 10 when unset or omitted.
    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        let ceiling = if self.max_tools_to_return == 0 {
            50
        } else {
            self.max_tools_to_return
        };
        requested.unwrap_or(10).clamp(1, ceiling)
    }

    pub fn has_embedding_client(&self) -> bool {
        !self.embedding_service_url.is_empty() || self.embedding_dimension > 0
    }

    /// Effective semantic ratio: 0.0 whenever no embedding client exists,
    /// regardless of the configured value.
    pub fn effective_ratio(&self) -> f32 {
        if self.has_embedding_client() {
            self.hybrid_semantic_ratio
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(OptimizerConfig::default().validate().is_ok());
    }

    #[test]
    fn from_yaml_str_overrides_only_given_fields() {
        let cfg = OptimizerConfig::from_yaml_str("enabled: false\nfind_tool_name: locate_tool\n").unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.find_tool_name, "locate_tool");
        assert_eq!(cfg.call_tool_name, "call_tool");
    }

    #[test]
    fn from_yaml_str_rejects_malformed_yaml() {
        assert!(OptimizerConfig::from_yaml_str(": not valid :: yaml").is_err());
    }

    #[tokio::test]
    async fn from_yaml_file_reports_missing_file_as_config_error() {
        let err = OptimizerConfig::from_yaml_file("/nonexistent/optimizer.yaml")
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizerError::Config(_)));
    }

    #[test]
    fn rejects_bad_ratio() {
        let mut cfg = OptimizerConfig::default();
        cfg.hybrid_semantic_ratio = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_max_tools() {
        let mut cfg = OptimizerConfig::default();
        cfg.max_tools_to_return = 51;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn clamp_limit_defaults_to_ten() {
        let cfg = OptimizerConfig::default();
        assert_eq!(cfg.clamp_limit(None), 10);
        assert_eq!(cfg.clamp_limit(Some(100)), 10);
        assert_eq!(cfg.clamp_limit(Some(3)), 3);
    }

    #[test]
    fn ratio_forced_to_zero_without_embedding_client() {
        let cfg = OptimizerConfig::default();
        assert_eq!(cfg.effective_ratio(), 0.0);
    }

    #[test]
    fn ratio_active_with_fake_embedding_dimension() {
        let mut cfg = OptimizerConfig::default();
        cfg.embedding_dimension = 16;
        assert_eq!(cfg.effective_ratio(), 0.7);
    }
}
