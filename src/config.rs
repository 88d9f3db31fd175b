use std::{net::SocketAddr, path::Path};

use anyhow::{anyhow, Result};
use blob_store::BlobStorageConfig;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const LOCAL_ENV: &str = "local";
const ENV_PREFIX: &str = "RELEASE_SERVER_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub blob_storage: BlobStorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_env() -> String {
    LOCAL_ENV.to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8787".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            env: default_env(),
            listen_addr: default_listen_addr(),
            blob_storage: Default::default(),
            telemetry: Default::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then the YAML file if given, then `RELEASE_SERVER_*`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<ServerConfig> {
        let mut figment = Figment::from(Serialized::defaults(ServerConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file_exact(path));
        }
        let mut config: ServerConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        if config.telemetry.instance_id.is_none() {
            config.telemetry.instance_id = Some(format!("{}-{}", config.env, Uuid::new_v4()));
        }
        Ok(config)
    }

    #[cfg(test)]
    fn from_yaml_str(config_str: &str) -> Result<ServerConfig> {
        let config: ServerConfig = Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Yaml::string(config_str))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow!("invalid listen address: {}", self.listen_addr));
        }
        if self.blob_storage.path.is_empty() {
            return Err(anyhow!("blob_storage.path must not be empty"));
        }
        if self.blob_storage.tag_fetch_concurrency == 0 {
            return Err(anyhow!(
                "blob_storage.tag_fetch_concurrency must be at least 1"
            ));
        }
        Ok(())
    }

    pub fn structured_logging(&self) -> bool {
        self.env != LOCAL_ENV
    }

    pub fn instance_id(&self) -> &str {
        self.telemetry.instance_id.as_deref().unwrap_or(&self.env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    // Export spans over OTLP.
    #[serde(default)]
    pub enable_tracing: bool,
    // OTLP collector endpoint; the exporter default is used when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
}
