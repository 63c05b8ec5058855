//! Configuration (C8): listen/bus addresses, signing key, and bus backend
//! selection, layered as CLI flags over environment-variable overrides
//! over built-in defaults.

use clap::{Parser, ValueEnum};

use crate::env::Environment;

/// Bundled signing key used only when `GATEWAY_ENV=dev`, so a developer
/// can mint tokens locally with `/token` without provisioning a real key.
const DEV_SIGNING_KEY: &str = "dev-only-insecure-signing-key-do-not-use-in-production";

/// Which `BusClient` implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusBackend {
    /// In-process `tokio::sync::broadcast`-backed bus. No external
    /// dependency; state does not survive a restart.
    Memory,
    /// Redis pub/sub. The production backend.
    Redis,
}

/// CLI flags, each mirrored by an environment variable override.
#[derive(Debug, Parser)]
#[command(name = "gateway")]
#[command(about = "WebSocket fan-out pooler gateway")]
pub struct Cli {
    /// Address to bind the HTTP/WebSocket listener on.
    #[arg(long, env = "GATEWAY_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// Bus backend to use.
    #[arg(long, value_enum, env = "GATEWAY_BUS_BACKEND")]
    pub bus_backend: Option<BusBackend>,

    /// Redis URL (only used when `bus_backend` is `redis`).
    #[arg(long, env = "GATEWAY_BUS_ADDR")]
    pub bus_addr: Option<String>,

    /// HMAC signing key used to verify bearer tokens.
    #[arg(long, env = "GATEWAY_SIGNING_KEY")]
    pub signing_key: Option<String>,
}

/// Resolved configuration the rest of the gateway runs on.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub bus_backend: BusBackend,
    pub bus_addr: String,
    pub signing_key: String,
    pub environment: Environment,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            bus_backend: BusBackend::Memory,
            bus_addr: "redis://127.0.0.1:6379".to_string(),
            signing_key: String::new(),
            environment: Environment::Production,
        }
    }
}

impl Config {
    /// Resolve configuration from parsed CLI flags (already merged with
    /// environment variables by `clap`'s `env` attribute), falling back to
    /// defaults, and applying the development signing key when running in
    /// `GATEWAY_ENV=dev` with no explicit key provided.
    ///
    /// # Errors
    ///
    /// Returns an error if running in production with no signing key
    /// configured — the gateway must not boot able to accept any bearer
    /// token as valid.
    pub fn resolve(cli: Cli) -> anyhow::Result<Self> {
        let environment = Environment::current();
        let mut config = Self {
            environment,
            ..Self::default()
        };

        if let Some(listen_addr) = cli.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(bus_backend) = cli.bus_backend {
            config.bus_backend = bus_backend;
        }
        if let Some(bus_addr) = cli.bus_addr {
            config.bus_addr = bus_addr;
        }
        if let Some(signing_key) = cli.signing_key {
            config.signing_key = signing_key;
        }

        if config.signing_key.is_empty() {
            if environment.is_development() {
                log::warn!(target: "gateway::config", "using the compiled-in development signing key");
                config.signing_key = DEV_SIGNING_KEY.to_string();
            } else {
                anyhow::bail!("GATEWAY_SIGNING_KEY must be set in production");
            }
        }

        Ok(config)
    }

    /// Whether the dev-only `/token` endpoint should be mounted.
    #[must_use]
    pub fn dev_token_endpoint_enabled(&self) -> bool {
        self.environment.is_development()
    }
}
