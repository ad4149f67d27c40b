//! Configuration management for Aura Gate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::{GateError, Result};
use crate::flip::FlipConfig;
use crate::ratelimit::{EndpointRules, DEFAULT_SWEEP_PROBABILITY};

/// Prefix for environment overrides, e.g. `AURA_GATE__SERVER__HTTP_ADDR`.
pub const ENV_PREFIX: &str = "AURA_GATE";

/// Main configuration for the Aura Gate service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Daily flip quota
    #[serde(default)]
    pub flips: FlipConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Chance that a quota check also sweeps expired windows
    #[serde(default = "default_sweep_probability")]
    pub sweep_probability: f64,

    /// Default and per-endpoint quotas
    #[serde(default)]
    pub rules: EndpointRules,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            sweep_probability: default_sweep_probability(),
            rules: EndpointRules::default(),
        }
    }
}

fn default_sweep_probability() -> f64 {
    DEFAULT_SWEEP_PROBABILITY
}

impl GateConfig {
    /// Load configuration from an optional YAML file layered under
    /// `AURA_GATE__`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let config: GateConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that serde alone cannot.
    pub fn validate(&self) -> Result<()> {
        let p = self.rate_limiting.sweep_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(GateError::Config(format!(
                "sweep_probability must be within [0, 1], got {}",
                p
            )));
        }
        self.rate_limiting.rules.validate()
    }
}
