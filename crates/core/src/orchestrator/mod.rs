//! Warming orchestrator.
//!
//! Sequences one run's phases:
//! - **Artist**: direct lookups, always runs
//! - **Text search**: name searches, optional, off during discovery mode
//! - **Release group**: album lookups, optional, only for artists cached after the artist phase

mod config;
mod runner;
mod types;
mod workset;

pub use config::{ForceOverrides, PhaseBudgets, RunSettings};
pub use runner::WarmingOrchestrator;
pub use types::{OrchestratorError, PlannedPhase, RunPlan, RunSummary, SkipReason, SkippedPhase};
pub use workset::{
    cached_artist_ids, select_artists, select_release_groups, select_text_searches,
    text_search_query,
};
