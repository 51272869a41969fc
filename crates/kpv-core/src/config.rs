use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{KpvError, KpvResult};

/// Top-level engine configuration (loaded from kpvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub keystream: KeystreamConfig,
    pub protector: ProtectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystreamConfig {
    /// ChaCha round count: 8, 12 or 20 (default: 20)
    pub rounds: u32,
}

impl Default for KeystreamConfig {
    fn default() -> Self {
        Self { rounds: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectorConfig {
    /// Hold the process key in the platform secure store when available
    /// (default: false, software protector)
    pub prefer_platform: bool,
}

impl Default for ProtectorConfig {
    fn default() -> Self {
        Self {
            prefer_platform: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> KpvResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> KpvResult<Self> {
        toml::from_str(content).map_err(|e| KpvError::Format(format!("config parse: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.keystream.rounds, 20);
        assert!(!config.protector.prefer_platform);
    }

    #[test]
    fn parse_partial_toml() {
        let config = EngineConfig::parse(
            r#"
            [keystream]
            rounds = 12
            "#,
        )
        .unwrap();
        assert_eq!(config.keystream.rounds, 12);
        assert!(!config.protector.prefer_platform);
    }

    #[test]
    fn parse_rejects_bad_toml() {
        let result = EngineConfig::parse("[keystream\nrounds = 12");
        assert!(matches!(result, Err(KpvError::Format(_))));
    }
}
