use serde::Deserialize;
use std::env;

const DEV_SECRET_PREFIX: &str = "dev-only-";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub shipping: ShippingConfig,
    #[serde(default)]
    pub resiliency: ResiliencyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
    /// Log a signed admin token at start-up. Off unless set explicitly.
    #[serde(default)]
    pub log_dev_admin_token: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayProvider {
    Mock,
    Razorpay,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub provider: GatewayProvider,
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub key_secret: String,
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
}

fn default_gateway_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_gateway_timeout() -> u64 {
    10
}

/// Major currency units, as written by operators
#[derive(Debug, Deserialize, Clone)]
pub struct ShippingConfig {
    pub free_shipping_threshold: f64,
    pub flat_rate: f64,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold: 50.0,
            flat_rate: 50.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResiliencyConfig {
    pub failure_threshold: u32,
    pub reset_timeout_seconds: u64,
}

impl Default for ResiliencyConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_seconds: 30,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // KILN__GATEWAY__KEY_SECRET=... sets gateway.key_secret
            .add_source(config::Environment::with_prefix("KILN").separator("__"))
            .build()?;

        let config: Config = s.try_deserialize()?;
        config.validate(&run_mode)?;
        Ok(config)
    }

    /// Refuse settings that must never reach a production deployment
    pub fn validate(&self, run_mode: &str) -> Result<(), config::ConfigError> {
        if self.gateway.provider == GatewayProvider::Razorpay
            && (self.gateway.key_id.trim().is_empty() || self.gateway.key_secret.trim().is_empty())
        {
            return Err(config::ConfigError::Message(
                "gateway.key_id and gateway.key_secret are required for the razorpay provider"
                    .to_string(),
            ));
        }

        if run_mode == "production" {
            if self.auth.log_dev_admin_token {
                return Err(config::ConfigError::Message(
                    "auth.log_dev_admin_token cannot be enabled in production".to_string(),
                ));
            }
            if self.auth.jwt_secret.starts_with(DEV_SECRET_PREFIX) {
                return Err(config::ConfigError::Message(
                    "auth.jwt_secret is a development secret".to_string(),
                ));
            }
            if self.gateway.key_secret.starts_with(DEV_SECRET_PREFIX) {
                return Err(config::ConfigError::Message(
                    "gateway.key_secret is a development secret".to_string(),
                ));
            }
            if self.gateway.provider == GatewayProvider::Mock {
                return Err(config::ConfigError::Message(
                    "the mock payment gateway cannot run in production".to_string(),
                ));
            }
            if self.storage.backend == StorageBackend::Memory {
                return Err(config::ConfigError::Message(
                    "the memory storage backend cannot run in production".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> Config {
        Config {
            server: ServerConfig { port: 3000 },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/kiln".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig {
                jwt_secret: "dev-only-change-me".to_string(),
                jwt_expiration_seconds: 3600,
                log_dev_admin_token: false,
            },
            gateway: GatewayConfig {
                provider: GatewayProvider::Mock,
                key_id: String::new(),
                key_secret: String::new(),
                base_url: default_gateway_url(),
                currency: default_currency(),
                timeout_seconds: 10,
            },
            shipping: ShippingConfig::default(),
            resiliency: ResiliencyConfig::default(),
        }
    }

    #[test]
    fn test_dev_defaults_pass_outside_production() {
        assert!(dev_config().validate("development").is_ok());
    }

    #[test]
    fn test_production_refuses_dev_settings() {
        let config = dev_config();
        assert!(config.validate("production").is_err());

        let mut config = dev_config();
        config.auth.jwt_secret = "a-real-secret".to_string();
        config.storage.backend = StorageBackend::Postgres;
        // Still on the mock gateway
        assert!(config.validate("production").is_err());

        config.gateway.provider = GatewayProvider::Razorpay;
        config.gateway.key_id = "rzp_live_abc".to_string();
        config.gateway.key_secret = "live-secret".to_string();
        assert!(config.validate("production").is_ok());

        config.auth.log_dev_admin_token = true;
        assert!(config.validate("production").is_err());
        assert!(config.validate("development").is_ok());
    }

    #[test]
    fn test_razorpay_needs_credentials() {
        let mut config = dev_config();
        config.gateway.provider = GatewayProvider::Razorpay;
        config.gateway.key_id = "rzp_test_abc".to_string();
        assert!(config.validate("development").is_err());
    }

    #[test]
    fn test_layered_sources_deserialize() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 3000
                [storage]
                backend = "postgres"
                [database]
                url = "postgres://localhost/kiln"
                [auth]
                jwt_secret = "dev-only-secret"
                jwt_expiration_seconds = 3600
                [gateway]
                provider = "mock"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let config: Config = s.try_deserialize().unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.gateway.currency, "INR");
        assert_eq!(config.shipping.flat_rate, 50.0);
        assert_eq!(config.resiliency.failure_threshold, 5);
        assert!(!config.auth.log_dev_admin_token);
    }
}
