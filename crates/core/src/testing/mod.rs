//! Testing utilities and mock implementations.
//!
//! Mocks for the two external collaborators (the probed API and the upstream
//! inventory) let whole warming runs execute without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use warmer_core::testing::{fixtures, MockInventory, MockProber};
//!
//! let inventory = MockInventory::new();
//! inventory.add_artist(fixtures::inventory_artist("a1", "Artist One")).await;
//!
//! let prober = MockProber::with_default(ProbeOutcome::Status(503));
//! // Run a WarmingOrchestrator against them...
//! ```

mod failing_ledger;
mod mock_inventory;
mod mock_prober;
mod stub_server;

pub use failing_ledger::FailingLedger;
pub use mock_inventory::MockInventory;
pub use mock_prober::MockProber;
pub use stub_server::{StubRequest, StubResponse, StubServer};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use chrono::{DateTime, Utc};

    use crate::config::{Config, LedgerBackend, LidarrConfig};
    use crate::inventory::{InventoryArtist, InventoryReleaseGroup};
    use crate::ledger::{ArtistRecord, CacheStatus, ReleaseGroupRecord};

    /// Create an upstream artist.
    pub fn inventory_artist(id: &str, name: &str) -> InventoryArtist {
        InventoryArtist {
            id: id.to_string(),
            name: Some(name.to_string()),
        }
    }

    /// Create an upstream release group.
    pub fn inventory_release_group(id: &str, title: &str) -> InventoryReleaseGroup {
        InventoryReleaseGroup {
            id: id.to_string(),
            title: Some(title.to_string()),
        }
    }

    /// Create a never-probed artist record.
    pub fn artist(id: &str, name: &str) -> ArtistRecord {
        ArtistRecord::pending(id, Some(name.to_string()))
    }

    /// Create an artist record whose lookup succeeded at `checked`.
    pub fn cached_artist(id: &str, name: &str, checked: DateTime<Utc>) -> ArtistRecord {
        ArtistRecord {
            status: CacheStatus::Success,
            attempts: 1,
            last_status_code: Some("200".to_string()),
            last_checked: Some(checked),
            ..artist(id, name)
        }
    }

    /// Create an artist record that exhausted its attempts at `checked`.
    pub fn failed_artist(id: &str, name: &str, attempts: u32, checked: DateTime<Utc>) -> ArtistRecord {
        ArtistRecord {
            status: CacheStatus::Failed,
            attempts,
            last_status_code: Some("503".to_string()),
            last_checked: Some(checked),
            ..artist(id, name)
        }
    }

    /// Create a never-probed release group record.
    pub fn release_group(id: &str, artist_id: &str, title: &str) -> ReleaseGroupRecord {
        ReleaseGroupRecord::pending(id, artist_id, None, Some(title.to_string()))
    }

    /// A valid configuration tuned for fast tests: no delays, high rate limit.
    pub fn config() -> Config {
        let mut config = Config {
            lidarr: LidarrConfig {
                base_url: "http://lidarr.test:8686".to_string(),
                api_key: "test-key".to_string(),
                verify_ssl: true,
                timeout_secs: 5,
            },
            probe: Default::default(),
            ledger: Default::default(),
            run: Default::default(),
            manual: Default::default(),
            schedule: Default::default(),
            monitoring: Default::default(),
        };
        config.probe.target_base_url = "http://api.test".to_string();
        config.probe.delay_between_attempts_ms = 0;
        config.probe.rate_limit_per_second = 10_000.0;
        config.probe.max_concurrent_requests = 4;
        config.monitoring.log_progress_every_n = 0;
        config
    }

    /// Test configuration with the ledger stored under `dir`.
    pub fn config_in(dir: &Path, backend: LedgerBackend) -> Config {
        let mut config = config();
        config.ledger.backend = backend;
        config.ledger.artists_csv_path = dir.join("mbid-artists.csv");
        config.ledger.release_groups_csv_path = dir.join("mbid-releasegroups.csv");
        config.ledger.db_path = dir.join("mbid_cache.db");
        config.manual.entries_file = dir.join("manual_entries.yml");
        config
    }
}
