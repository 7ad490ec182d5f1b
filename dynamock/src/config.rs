//! Configuration management

use dynamock_dynamodb::DynamoDBConfig;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dynamodb: DynamoDBConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Config {
    /// Load configuration from a file and `DYNAMOCK_*` environment variables
    ///
    /// Without an explicit path, an optional `dynamock.{toml,json,yaml}` in the
    /// working directory is used.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("dynamock").required(false),
        };
        Self::from_builder(config::Config::builder().add_source(file))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        let config = builder
            .add_source(config::Environment::with_prefix("DYNAMOCK").separator("__"))
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    #[test]
    fn test_defaults() {
        let config = Config::from_builder(config::Config::builder()).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.dynamodb.region, "us-east-1");
    }

    #[test]
    fn test_file_overrides() {
        let toml = r#"
            [server]
            port = 9000

            [dynamodb]
            region = "eu-west-1"
        "#;
        let builder = config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        let config = Config::from_builder(builder).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.dynamodb.region, "eu-west-1");
        assert_eq!(config.dynamodb.account_id, "000000000000");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(Config::load(Some(Path::new("/nonexistent/dynamock.toml"))).is_err());
    }
}
