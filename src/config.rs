use anyhow::{Context, bail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::core_types::ClientId;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// PostgreSQL connection URL for the ledger
    #[serde(default)]
    pub postgres_url: Option<String>,
    /// Clients loaded into the in-memory ledger (`--memory`)
    #[serde(default)]
    pub seed_clients: Vec<SeedClient>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Sequencing and worker pool settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub workers: usize,
    /// Per-client FIFO capacity
    pub fifo_capacity: usize,
    pub intake_capacity: usize,
    pub dispatch_capacity: usize,
    pub idle_grace_ms: u64,
    pub reap_interval_ms: u64,
    /// Simulated processing time per transfer (0 disables)
    pub execution_delay_ms: u64,
    pub liveness_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            fifo_capacity: 3,
            intake_capacity: 10,
            dispatch_capacity: 10,
            idle_grace_ms: 15_000,
            reap_interval_ms: 5_000,
            execution_delay_ms: 0,
            liveness_interval_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn idle_grace(&self) -> Duration {
        Duration::from_millis(self.idle_grace_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn execution_delay(&self) -> Duration {
        Duration::from_millis(self.execution_delay_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            bail!("engine.workers must be at least 1");
        }
        if self.fifo_capacity == 0 || self.intake_capacity == 0 || self.dispatch_capacity == 0 {
            bail!("engine queue capacities must be at least 1");
        }
        if self.reap_interval_ms == 0 || self.liveness_interval_ms == 0 {
            bail!("engine intervals must be non-zero");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeedClient {
    pub id: ClientId,
    pub name: String,
    pub token: String,
    pub balance: Decimal,
}

impl AppConfig {
    /// Read `config/<env>.yaml`, apply environment overrides and validate
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config yaml")
    }

    /// `WORKER_NUMBER` and `DATABASE_URL` take precedence over the file
    pub fn apply_overrides<F>(&mut self, var: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(workers) = var("WORKER_NUMBER") {
            self.engine.workers = workers
                .trim()
                .parse()
                .with_context(|| format!("Invalid WORKER_NUMBER: {}", workers))?;
        }
        if let Some(url) = var("DATABASE_URL").filter(|u| !u.is_empty()) {
            self.postgres_url = Some(url);
        }
        Ok(())
    }
}
