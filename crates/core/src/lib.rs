pub mod config;
pub mod freshness;
pub mod inventory;
pub mod ledger;
pub mod manual;
pub mod metrics;
pub mod normalize;
pub mod orchestrator;
pub mod probe;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LedgerBackend,
    SanitizedConfig,
};
pub use freshness::{is_stale, FreshnessPolicy};
pub use inventory::{Inventory, InventoryError, InventorySnapshot, LidarrClient};
pub use ledger::{open_ledger, LedgerError, LedgerStats, LedgerStore};
pub use normalize::normalize;
pub use orchestrator::{ForceOverrides, OrchestratorError, RunPlan, RunSummary, WarmingOrchestrator};
pub use probe::{HttpProber, Phase, PhaseSummary, Prober, StopHandle};
