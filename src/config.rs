use crate::payments::providers::EpaycoConfig;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub epayco: EpaycoApiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Public URL ePayco calls back on
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpaycoApiConfig {
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Reject notifications whose echoed customer id does not match
    pub reject_invalid_parameters: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub json: bool,
}

impl EpaycoApiConfig {
    pub fn client_config(&self) -> EpaycoConfig {
        EpaycoConfig {
            base_url: self.api_base_url.clone(),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{} not set", key));
        let defaulted =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server = ServerConfig {
            host: defaulted("HOST", "0.0.0.0"),
            port: required("PORT")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: defaulted("ENVIRONMENT", "development"),
            base_url: required("BASE_URL")?,
        };

        let database = DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: defaulted("DATABASE_MAX_CONNECTIONS", "20")
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let epayco = EpaycoApiConfig {
            api_base_url: defaulted("EPAYCO_API_BASE_URL", "https://secure.epayco.co"),
            timeout_secs: defaulted("EPAYCO_TIMEOUT_SECS", "30")
                .parse()
                .context("EPAYCO_TIMEOUT_SECS must be a valid number")?,
            max_retries: defaulted("EPAYCO_MAX_RETRIES", "3")
                .parse()
                .context("EPAYCO_MAX_RETRIES must be a valid number")?,
            reject_invalid_parameters: defaulted("EPAYCO_REJECT_INVALID_PARAMETERS", "false")
                .parse()
                .context("EPAYCO_REJECT_INVALID_PARAMETERS must be true or false")?,
        };

        let logging = LoggingConfig {
            json: defaulted("LOG_FORMAT", "text") == "json",
        };

        let config = Config {
            server,
            database,
            epayco,
            logging,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            return Err(anyhow!(
                "BASE_URL must be an http(s) URL, got {}",
                self.server.base_url
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.epayco.api_base_url.trim().is_empty() {
            return Err(anyhow!("EPAYCO_API_BASE_URL cannot be empty"));
        }

        if self.epayco.timeout_secs == 0 {
            return Err(anyhow!("EPAYCO_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(())
    }
}
