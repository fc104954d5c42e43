//! Engine configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. `LOTKEEPER__*` environment variables (`__` separates nesting levels,
//!    e.g. `LOTKEEPER__DEFAULTS__AUTHORIZATION_THRESHOLD=250`)

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use lotkeeper_core::TenantId;
use lotkeeper_inventory::{InventoryPolicy, ReorderPoint};

pub const ENV_PREFIX: &str = "LOTKEEPER";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Policy for tenants without an override.
    pub defaults: InventoryPolicy,
    /// Per-tenant policy overrides.
    pub tenants: HashMap<TenantId, InventoryPolicy>,
    pub reorder_points: Vec<ReorderPoint>,
    pub sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            defaults: InventoryPolicy::default(),
            tenants: HashMap::new(),
            reorder_points: Vec::new(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl EngineConfig {
    /// Load from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("failed to build engine configuration")?;

        let engine: EngineConfig = config
            .try_deserialize()
            .context("failed to deserialize engine configuration")?;
        engine.validate()?;

        info!(
            tenant_overrides = engine.tenants.len(),
            reorder_points = engine.reorder_points.len(),
            sweep_interval_secs = engine.sweep_interval_secs,
            "engine configuration loaded"
        );
        Ok(engine)
    }

    /// Parse an embedded TOML document (no environment overlay).
    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        let engine: EngineConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .context("failed to parse engine configuration")?
            .try_deserialize()
            .context("failed to deserialize engine configuration")?;
        engine.validate()?;
        Ok(engine)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.defaults.validate().context("invalid default policy")?;
        for (tenant_id, policy) in &self.tenants {
            policy
                .validate()
                .with_context(|| format!("invalid policy for tenant {tenant_id}"))?;
        }
        for point in &self.reorder_points {
            point
                .validate()
                .with_context(|| format!("invalid reorder point for product {}", point.product_id))?;
        }
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be positive");
        }
        Ok(())
    }

    /// Tenant override, else the defaults.
    pub fn policy_for(&self, tenant_id: TenantId) -> &InventoryPolicy {
        self.tenants.get(&tenant_id).unwrap_or(&self.defaults)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
