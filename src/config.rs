//! Gateway configuration.
//!
//! Loaded from a JSON file (credentials, endpoints, server port, trading
//! defaults, engine sizing), then overridable from the environment so
//! deployments can tweak knobs without editing the file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::market::EngineConfig;

const PLACEHOLDER_CLIENT_ID: &str = "YOUR_CLIENT_ID_HERE";
const PLACEHOLDER_CLIENT_SECRET: &str = "YOUR_CLIENT_SECRET_HERE";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub ws_url: String,
    pub server: ServerSection,
    pub trading: TradingSection,
    pub engine: EngineSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub websocket_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingSection {
    pub default_currency: String,
    pub default_instrument: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub num_workers: usize,
    pub queue_capacity: usize,
    pub max_latency_samples: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            base_url: "https://test.deribit.com/api/v2".to_string(),
            ws_url: "wss://test.deribit.com/ws/api/v2".to_string(),
            server: ServerSection::default(),
            trading: TradingSection::default(),
            engine: EngineSection::default(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            websocket_port: 8080,
        }
    }
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            default_currency: "BTC".to_string(),
            default_instrument: "BTC-PERPETUAL".to_string(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            num_workers: engine.num_workers,
            queue_capacity: engine.queue_capacity,
            max_latency_samples: engine.max_latency_samples,
        }
    }
}

impl GatewayConfig {
    /// Load from a JSON file. Credentials must be present and not the
    /// placeholder values shipped in the example config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        let config: GatewayConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.is_empty()
            || self.client_secret.is_empty()
            || self.client_id == PLACEHOLDER_CLIENT_ID
            || self.client_secret == PLACEHOLDER_CLIENT_SECRET
        {
            bail!("invalid credentials in config; set client_id and client_secret to your exchange API keys");
        }
        Ok(())
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("GATEWAY_CLIENT_ID") {
            self.client_id = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_CLIENT_SECRET") {
            self.client_secret = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_WS_URL") {
            self.ws_url = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_WS_PORT") {
            if let Ok(port) = v.parse() {
                self.server.websocket_port = port;
            }
        }
        if let Ok(v) = std::env::var("GATEWAY_WORKERS") {
            if let Ok(n) = v.parse() {
                self.engine.num_workers = n;
            }
        }
        if let Ok(v) = std::env::var("GATEWAY_QUEUE_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.engine.queue_capacity = n;
            }
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            num_workers: self.engine.num_workers,
            queue_capacity: self.engine.queue_capacity,
            max_latency_samples: self.engine.max_latency_samples,
        }
    }
}
