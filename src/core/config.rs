use serde::{Deserialize, Serialize};

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: Option<u32>,
    pub connection_timeout_seconds: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/vault.db?mode=rwc".to_string(),
            max_connections: Some(10),
            connection_timeout_seconds: Some(30),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,

    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    /// Per-request timeout (seconds)
    #[serde(default = "ServerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        8200
    }
    fn default_request_timeout() -> u64 {
        30
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

/// Derivation path configuration
///
/// Receiving addresses are derived at m/44'/coin_type'/account'/0/index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivationConfig {
    /// Cryptocurrency type (0 = BTC)
    #[serde(default = "DerivationConfig::default_coin_type")]
    pub coin_type: u32,

    /// Account index
    #[serde(default = "DerivationConfig::default_account")]
    pub account: u32,
}

impl DerivationConfig {
    fn default_coin_type() -> u32 {
        0
    }
    fn default_account() -> u32 {
        0
    }
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            coin_type: Self::default_coin_type(),
            account: Self::default_account(),
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub derivation: DerivationConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.server.port, 8200);
        assert_eq!(config.derivation.coin_type, 0);
        assert!(config.storage.database_url.starts_with("sqlite:"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: VaultConfig = toml::from_str(
            r#"
            [server]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.derivation.account, 0);
    }
}
