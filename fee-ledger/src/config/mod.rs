use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Engine tunables.
///
/// The two debounce windows rate-limit the read-path reconciliation sweep
/// per coaching tenant. Debounce state lives in process memory and resets
/// on restart.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_heal_debounce_secs")]
    pub heal_debounce_secs: u64,

    #[serde(default = "default_overdue_debounce_secs")]
    pub overdue_debounce_secs: u64,

    /// Upper bound on records touched by a single sweep pass.
    #[serde(default = "default_sweep_batch_limit")]
    pub sweep_batch_limit: usize,
}

fn default_heal_debounce_secs() -> u64 {
    60
}

fn default_overdue_debounce_secs() -> u64 {
    300
}

fn default_sweep_batch_limit() -> usize {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heal_debounce_secs: default_heal_debounce_secs(),
            overdue_debounce_secs: default_overdue_debounce_secs(),
            sweep_batch_limit: default_sweep_batch_limit(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("FEELEDGER").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
