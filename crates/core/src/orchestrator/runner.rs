//! Warming orchestrator implementation.
//!
//! One run: decide discovery mode from ledger emptiness, merge manual
//! entries, sync the inventory, then run the artist, text-search and
//! release-group phases in order. Which artists unlock the later phases is
//! evaluated once, right after the artist phase.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::inventory::{sync_inventory, Inventory, InventorySnapshot, SyncStats};
use crate::ledger::{ArtistRecord, LedgerError, LedgerFilter, LedgerStore, SqliteLedger};
use crate::manual::{load_manual_entries, merge_manual_entries, ManualEntriesError, MergeStats};
use crate::metrics;
use crate::probe::{EngineSettings, Phase, PhaseSummary, ProbeEngine, Prober, SelectionCounts, StopHandle, WorkItem};

use super::config::{ForceOverrides, RunSettings};
use super::types::{OrchestratorError, PlannedPhase, RunPlan, RunSummary, SkipReason, SkippedPhase};
use super::workset::{cached_artist_ids, select_artists, select_release_groups, select_text_searches};

/// Drives warming runs against a ledger and a prober.
pub struct WarmingOrchestrator {
    config: Config,
    ledger: Arc<dyn LedgerStore>,
    engine: ProbeEngine,
    overrides: ForceOverrides,
}

impl WarmingOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: Config,
        ledger: Arc<dyn LedgerStore>,
        prober: Arc<dyn Prober>,
        stop: StopHandle,
    ) -> Self {
        let engine = ProbeEngine::new(prober, EngineSettings::from_config(&config), stop);
        Self {
            config,
            ledger,
            engine,
            overrides: ForceOverrides::default(),
        }
    }

    /// Apply command-line force flags to every run.
    pub fn with_overrides(mut self, overrides: ForceOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.engine.stop_handle()
    }

    /// Fetch the inventory this orchestrator's runs need.
    pub async fn fetch_inventory(
        &self,
        inventory: &dyn Inventory,
    ) -> Result<InventorySnapshot, OrchestratorError> {
        Ok(InventorySnapshot::fetch(inventory, self.config.run.process_release_groups).await?)
    }

    /// Fetch the inventory and run.
    pub async fn run_from(&self, inventory: &dyn Inventory) -> Result<RunSummary, OrchestratorError> {
        let snapshot = self.fetch_inventory(inventory).await?;
        self.run(&snapshot).await
    }

    /// Execute one warming run.
    pub async fn run(&self, snapshot: &InventorySnapshot) -> Result<RunSummary, OrchestratorError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        let settings = RunSettings::for_run(&self.config, self.overrides, self.ledger.is_empty()?);
        info!(
            run_id = %run_id,
            backend = self.ledger.backend_name(),
            discovery = settings.discovery,
            text_search = settings.process_text_search,
            release_groups = settings.process_release_groups,
            "Starting warming run"
        );
        if settings.discovery {
            info!("Ledger is empty: discovery mode, one attempt per entity and no text search");
        }

        let (manual, sync) = self.prepare(self.ledger.as_ref(), snapshot, &settings)?;
        let ledger = self.ledger.as_ref();
        let stop = self.engine.stop_handle();
        let artist_filter = LedgerFilter::new().excluding_default_artists();

        let mut phases = Vec::new();
        let mut skipped = Vec::new();

        let artists = ledger.list_artists(&artist_filter)?;
        let items = select_artists(&artists, &settings, Utc::now());
        let summary = self.engine.run_phase(Phase::Artist, items, ledger).await?;
        if summary.was_aborted() && !stop.is_stopped() {
            warn!("Artist phase aborted, later phases use the state persisted so far");
        }
        phases.push(summary);

        let artists = ledger.list_artists(&artist_filter)?;
        let cached = cached_artist_ids(&artists);
        info!(cached_artists = cached.len(), "Artist phase finished");

        match self.skip_reason(Phase::TextSearch, &settings, stop.is_stopped()) {
            Some(reason) => skipped.push(skipped_phase(Phase::TextSearch, reason)),
            None => {
                let items = text_search_items(&artists, &cached, &settings);
                let summary = self.engine.run_phase(Phase::TextSearch, items, ledger).await?;
                phases.push(summary);
            }
        }

        match self.skip_reason(Phase::ReleaseGroup, &settings, stop.is_stopped()) {
            Some(reason) => skipped.push(skipped_phase(Phase::ReleaseGroup, reason)),
            None => {
                let items = release_group_items(ledger, &cached, &settings)?;
                let summary = self.engine.run_phase(Phase::ReleaseGroup, items, ledger).await?;
                phases.push(summary);
            }
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            discovery: settings.discovery,
            manual,
            sync,
            phases,
            skipped,
        };

        let mode = if summary.discovery { "discovery" } else { "normal" };
        metrics::RUNS_COMPLETED.with_label_values(&[mode]).inc();
        log_run_summary(&summary);

        Ok(summary)
    }

    /// Compute the next run's work-sets without probing or writing.
    ///
    /// Manual entries and the inventory are merged into an in-memory copy of
    /// the ledger so that entities new this run are counted.
    pub fn plan(&self, snapshot: &InventorySnapshot) -> Result<RunPlan, OrchestratorError> {
        let settings = RunSettings::for_run(&self.config, self.overrides, self.ledger.is_empty()?);

        let scratch = SqliteLedger::in_memory()?;
        let current = self.ledger.load()?;
        for artist in current.artists {
            scratch.upsert_artist(artist)?;
        }
        for rg in current.release_groups {
            scratch.upsert_release_group(rg)?;
        }
        scratch.commit_batch()?;

        let (manual, sync) = self.prepare(&scratch, snapshot, &settings)?;
        let artist_filter = LedgerFilter::new().excluding_default_artists();
        let artists = scratch.list_artists(&artist_filter)?;
        let cached = cached_artist_ids(&artists);

        let mut phases = vec![planned(
            Phase::Artist,
            &select_artists(&artists, &settings, Utc::now()),
        )];
        let mut skipped = Vec::new();

        match self.skip_reason(Phase::TextSearch, &settings, false) {
            Some(reason) => skipped.push(skipped_phase(Phase::TextSearch, reason)),
            None => phases.push(planned(
                Phase::TextSearch,
                &text_search_items(&artists, &cached, &settings),
            )),
        }
        match self.skip_reason(Phase::ReleaseGroup, &settings, false) {
            Some(reason) => skipped.push(skipped_phase(Phase::ReleaseGroup, reason)),
            None => phases.push(planned(
                Phase::ReleaseGroup,
                &release_group_items(&scratch, &cached, &settings)?,
            )),
        }

        Ok(RunPlan {
            discovery: settings.discovery,
            manual,
            sync,
            phases,
            skipped,
        })
    }

    /// Merge manual entries and sync the inventory, then commit.
    fn prepare(
        &self,
        ledger: &dyn LedgerStore,
        snapshot: &InventorySnapshot,
        settings: &RunSettings,
    ) -> Result<(Option<MergeStats>, SyncStats), LedgerError> {
        let manual = if settings.process_manual_entries {
            match self.load_manual_entries() {
                Some(entries) => {
                    let stats = merge_manual_entries(ledger, &entries)?;
                    // Sync reads committed rows only.
                    ledger.commit_batch()?;
                    Some(stats)
                }
                None => None,
            }
        } else {
            None
        };

        let sync = sync_inventory(ledger, snapshot)?;
        ledger.commit_batch()?;
        Ok((manual, sync))
    }

    /// Load the manual entries file. Problems are logged and the file skipped.
    fn load_manual_entries(&self) -> Option<crate::manual::ManualEntries> {
        let path = &self.config.manual.entries_file;
        match load_manual_entries(path) {
            Ok(entries) => {
                info!(
                    path = %path.display(),
                    artists = entries.artists.len(),
                    release_groups = entries.release_group_count(),
                    "Loaded manual entries"
                );
                Some(entries)
            }
            Err(ManualEntriesError::NotFound(_)) => {
                info!(path = %path.display(), "No manual entries file, skipping");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring manual entries file");
                None
            }
        }
    }

    fn skip_reason(&self, phase: Phase, settings: &RunSettings, stopped: bool) -> Option<SkipReason> {
        if !settings.phase_enabled(phase) {
            let discovery_only = phase == Phase::TextSearch
                && settings.discovery
                && self.config.run.process_artist_textsearch;
            return Some(if discovery_only {
                SkipReason::DiscoveryMode
            } else {
                SkipReason::Disabled
            });
        }
        stopped.then_some(SkipReason::Stopped)
    }
}

fn text_search_items(
    artists: &[ArtistRecord],
    cached: &HashSet<String>,
    settings: &RunSettings,
) -> Vec<WorkItem> {
    let gate = settings.textsearch_requires_artist_success.then_some(cached);
    select_text_searches(artists, gate, settings, Utc::now())
}

fn release_group_items(
    ledger: &dyn LedgerStore,
    cached: &HashSet<String>,
    settings: &RunSettings,
) -> Result<Vec<WorkItem>, LedgerError> {
    let filter = LedgerFilter::new()
        .excluding_default_artists()
        .owned_by(cached.iter().cloned());
    let release_groups = ledger.list_release_groups(&filter)?;
    Ok(select_release_groups(&release_groups, cached, settings, Utc::now()))
}

fn skipped_phase(phase: Phase, reason: SkipReason) -> SkippedPhase {
    info!(phase = %phase, reason = ?reason, "Skipping phase");
    SkippedPhase { phase, reason }
}

fn planned(phase: Phase, items: &[WorkItem]) -> PlannedPhase {
    PlannedPhase {
        phase,
        selected: items.len(),
        selection: SelectionCounts::from_items(items),
    }
}

fn log_run_summary(summary: &RunSummary) {
    for phase in &summary.phases {
        log_phase(phase);
    }
    if summary.was_aborted() {
        warn!(
            run_id = %summary.run_id,
            probes = summary.total_probes(),
            elapsed_secs = format!("{:.1}", summary.elapsed_secs()),
            "Warming run ended early"
        );
    } else {
        info!(
            run_id = %summary.run_id,
            probes = summary.total_probes(),
            elapsed_secs = format!("{:.1}", summary.elapsed_secs()),
            "Warming run complete"
        );
    }
}

fn log_phase(phase: &PhaseSummary) {
    info!(
        phase = %phase.phase,
        selected = phase.selected,
        succeeded = phase.succeeded,
        failed = phase.failed,
        success_rate = format!("{:.1}%", phase.success_rate()),
        aborted = phase.was_aborted(),
        "Phase summary"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CacheStatus, VARIOUS_ARTISTS_ID};
    use crate::probe::{ProbeOutcome, ProbeTarget};
    use crate::testing::{fixtures, FailingLedger, MockProber};

    fn snapshot() -> InventorySnapshot {
        let mut snapshot = InventorySnapshot {
            artists: vec![
                fixtures::inventory_artist("a1", "Artist One"),
                fixtures::inventory_artist("a2", "Artist Two"),
            ],
            ..Default::default()
        };
        snapshot.release_groups.insert(
            "a1".into(),
            vec![fixtures::inventory_release_group("rg1", "First")],
        );
        snapshot.release_groups.insert(
            "a2".into(),
            vec![fixtures::inventory_release_group("rg2", "Second")],
        );
        snapshot
    }

    fn orchestrator(
        config: Config,
        ledger: Arc<dyn LedgerStore>,
        prober: Arc<MockProber>,
    ) -> WarmingOrchestrator {
        WarmingOrchestrator::new(config, ledger, prober, StopHandle::new())
    }

    #[tokio::test]
    async fn test_first_run_is_discovery() {
        let mut config = fixtures::config();
        config.run.process_release_groups = true;
        let ledger: Arc<dyn LedgerStore> = Arc::new(SqliteLedger::in_memory().unwrap());
        let prober = Arc::new(MockProber::with_default(ProbeOutcome::Status(503)));
        prober
            .always(ProbeTarget::artist("a1"), ProbeOutcome::Status(200))
            .await;

        let summary = orchestrator(config, Arc::clone(&ledger), Arc::clone(&prober))
            .run(&snapshot())
            .await
            .unwrap();

        assert!(summary.discovery);
        assert_eq!(
            summary.skipped,
            vec![SkippedPhase {
                phase: Phase::TextSearch,
                reason: SkipReason::DiscoveryMode
            }]
        );
        // One attempt each: a1, a2, then rg1 (a1 cached).
        assert_eq!(prober.call_count().await, 3);
        assert_eq!(prober.calls_for(&ProbeTarget::release_group("rg2")).await, 0);

        let loaded = ledger.load().unwrap();
        assert_eq!(loaded.artist("a2").unwrap().status, CacheStatus::Failed);
        assert_eq!(loaded.artist("a2").unwrap().attempts, 1);
        assert_eq!(loaded.release_group("rg1").unwrap().status, CacheStatus::Failed);
        assert_eq!(loaded.release_group("rg2").unwrap().status, CacheStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_run_uses_full_budget_and_text_search() {
        let mut config = fixtures::config();
        config.probe.max_attempts_per_artist = 3;
        let ledger: Arc<dyn LedgerStore> = Arc::new(SqliteLedger::in_memory().unwrap());
        let prober = Arc::new(MockProber::with_default(ProbeOutcome::Status(503)));
        prober
            .always(ProbeTarget::artist("a1"), ProbeOutcome::Status(200))
            .await;
        prober
            .always(ProbeTarget::text_search("Artist One"), ProbeOutcome::Status(200))
            .await;

        let orchestrator = orchestrator(config, Arc::clone(&ledger), Arc::clone(&prober));
        orchestrator.run(&snapshot()).await.unwrap();
        prober.clear_calls().await;

        let summary = orchestrator.run(&snapshot()).await.unwrap();
        assert!(!summary.discovery);
        assert_eq!(prober.calls_for(&ProbeTarget::artist("a1")).await, 0);
        assert_eq!(prober.calls_for(&ProbeTarget::artist("a2")).await, 3);
        assert_eq!(prober.calls_for(&ProbeTarget::text_search("Artist One")).await, 1);
        assert_eq!(prober.calls_for(&ProbeTarget::text_search("Artist Two")).await, 0);
        assert_eq!(
            summary.skipped,
            vec![SkippedPhase {
                phase: Phase::ReleaseGroup,
                reason: SkipReason::Disabled
            }]
        );

        let a1 = ledger.load().unwrap().artist("a1").cloned().unwrap();
        assert!(a1.text_search_attempted);
        assert!(a1.text_search_success);
    }

    #[tokio::test]
    async fn test_plan_does_not_write() {
        let mut config = fixtures::config();
        config.run.process_release_groups = true;
        let ledger: Arc<dyn LedgerStore> = Arc::new(SqliteLedger::in_memory().unwrap());
        let prober = Arc::new(MockProber::new());
        let orchestrator = orchestrator(config, Arc::clone(&ledger), Arc::clone(&prober));

        let mut inventory = snapshot();
        inventory
            .artists
            .push(fixtures::inventory_artist(VARIOUS_ARTISTS_ID, "Various Artists"));

        let plan = orchestrator.plan(&inventory).unwrap();
        assert!(plan.discovery);
        assert_eq!(plan.sync.artists_new, 2);
        assert_eq!(plan.phase(Phase::Artist).unwrap().selected, 2);
        assert_eq!(plan.phase(Phase::Artist).unwrap().selection.new, 2);
        assert_eq!(plan.phase(Phase::ReleaseGroup).unwrap().selected, 0);
        assert!(plan.phase(Phase::TextSearch).is_none());

        assert!(ledger.is_empty().unwrap());
        assert_eq!(prober.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_before_run_skips_later_phases() {
        let mut config = fixtures::config();
        config.run.process_release_groups = true;
        let ledger: Arc<dyn LedgerStore> = Arc::new(SqliteLedger::in_memory().unwrap());
        let prober = Arc::new(MockProber::new());
        let orchestrator = orchestrator(config, Arc::clone(&ledger), Arc::clone(&prober));

        orchestrator.stop_handle().stop();
        let summary = orchestrator.run(&snapshot()).await.unwrap();

        assert_eq!(prober.call_count().await, 0);
        let artist_phase = summary.phase(Phase::Artist).unwrap();
        assert_eq!(artist_phase.not_dispatched, 2);
        assert!(summary.was_aborted());
        assert!(summary
            .skipped
            .iter()
            .any(|s| s.phase == Phase::ReleaseGroup && s.reason == SkipReason::Stopped));

        // Inventory sync is committed even though nothing was probed.
        assert_eq!(ledger.load().unwrap().artists.len(), 2);
    }

    #[tokio::test]
    async fn test_commit_failure_fails_the_run() {
        let mut config = fixtures::config();
        config.run.process_release_groups = true;
        config.run.batch_write_frequency = 1;
        let failing = Arc::new(FailingLedger::in_memory().unwrap());
        failing.fail_commits_after(1);
        let ledger: Arc<dyn LedgerStore> = failing.clone();
        let prober = Arc::new(MockProber::new());

        let result = orchestrator(config, ledger, Arc::clone(&prober))
            .run(&snapshot())
            .await;

        assert!(matches!(result, Err(OrchestratorError::Ledger(_))));
        assert_eq!(failing.commit_attempts(), 2);
        assert_eq!(prober.calls_for(&ProbeTarget::release_group("rg1")).await, 0);
        assert_eq!(prober.calls_for(&ProbeTarget::release_group("rg2")).await, 0);
        assert!(prober
            .recorded_calls()
            .await
            .iter()
            .all(|target| matches!(target, ProbeTarget::Artist { .. })));
    }

    #[tokio::test]
    async fn test_sync_sees_merged_manual_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = fixtures::config_in(dir.path(), crate::config::LedgerBackend::Sqlite);
        config.run.process_manual_entries = true;
        std::fs::write(
            &config.manual.entries_file,
            "5b11f4ce-a62d-471e-81fc-a69a8278c7da:\n  name: Hidden Gem\n  release-groups:\n    - 1b022e01-4da6-387b-8658-8678046e4cef\n",
        )
        .unwrap();
        let ledger: Arc<dyn LedgerStore> = Arc::new(SqliteLedger::in_memory().unwrap());
        let orchestrator = orchestrator(config, Arc::clone(&ledger), Arc::new(MockProber::new()));

        let mut inventory = snapshot();
        inventory.artists.push(fixtures::inventory_artist(
            "5b11f4ce-a62d-471e-81fc-a69a8278c7da",
            "Hidden Gem",
        ));

        let settings =
            RunSettings::for_run(orchestrator.config(), ForceOverrides::default(), true);
        let (manual, sync) = orchestrator
            .prepare(ledger.as_ref(), &inventory, &settings)
            .unwrap();

        assert_eq!(manual.unwrap().artists_new, 1);
        // The manual artist already exists when the inventory is synced.
        assert_eq!(sync.artists_new, 2);
        assert_eq!(sync.artists_renamed, 0);
        assert_eq!(ledger.pending_writes().unwrap(), 0);

        let loaded = ledger.load().unwrap();
        let release_group = loaded
            .release_group("1b022e01-4da6-387b-8658-8678046e4cef")
            .unwrap();
        assert_eq!(release_group.artist_id, "5b11f4ce-a62d-471e-81fc-a69a8278c7da");
        assert_eq!(release_group.artist_name.as_deref(), Some("Hidden Gem"));
    }
}
