//! Per-run settings derived from the loaded configuration.

use serde::Serialize;

use crate::config::Config;
use crate::freshness::FreshnessPolicy;
use crate::probe::Phase;

/// Force flags given on the command line. They add to the configured flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceOverrides {
    pub artists: bool,
    pub release_groups: bool,
    pub text_search: bool,
}

/// Attempt budget per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseBudgets {
    pub artist: u32,
    pub text_search: u32,
    pub release_group: u32,
}

impl PhaseBudgets {
    pub fn for_phase(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Artist => self.artist,
            Phase::TextSearch => self.text_search,
            Phase::ReleaseGroup => self.release_group,
        }
    }
}

/// Settings for one run.
///
/// Derived from an immutable [`Config`] every run; discovery mode and force
/// overrides never write back into the configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSettings {
    /// The ledger was empty at startup.
    pub discovery: bool,
    pub process_text_search: bool,
    pub process_release_groups: bool,
    pub process_manual_entries: bool,
    pub force_artists: bool,
    pub force_release_groups: bool,
    pub force_text_search: bool,
    pub budgets: PhaseBudgets,
    #[serde(skip)]
    pub freshness: FreshnessPolicy,
    pub textsearch_lowercase: bool,
    pub textsearch_remove_symbols: bool,
    pub textsearch_requires_artist_success: bool,
}

impl RunSettings {
    pub fn for_run(config: &Config, overrides: ForceOverrides, ledger_empty: bool) -> Self {
        let budgets = if ledger_empty {
            PhaseBudgets {
                artist: 1,
                text_search: 1,
                release_group: 1,
            }
        } else {
            PhaseBudgets {
                artist: config.probe.max_attempts_per_artist.max(1),
                text_search: config.probe.max_attempts_per_artist_textsearch.max(1),
                release_group: config.probe.max_attempts_per_rg.max(1),
            }
        };

        Self {
            discovery: ledger_empty,
            process_text_search: config.run.process_artist_textsearch && !ledger_empty,
            process_release_groups: config.run.process_release_groups,
            process_manual_entries: config.run.process_manual_entries,
            force_artists: config.run.force_artists || overrides.artists,
            force_release_groups: config.run.force_rg || overrides.release_groups,
            force_text_search: config.run.force_text_search || overrides.text_search,
            budgets,
            freshness: FreshnessPolicy::new(config.run.cache_recheck_hours),
            textsearch_lowercase: config.run.artist_textsearch_lowercase,
            textsearch_remove_symbols: config.run.artist_textsearch_remove_symbols,
            textsearch_requires_artist_success: config.run.textsearch_requires_artist_success,
        }
    }

    pub fn force_for(&self, phase: Phase) -> bool {
        match phase {
            Phase::Artist => self.force_artists,
            Phase::TextSearch => self.force_text_search,
            Phase::ReleaseGroup => self.force_release_groups,
        }
    }

    pub fn phase_enabled(&self, phase: Phase) -> bool {
        match phase {
            Phase::Artist => true,
            Phase::TextSearch => self.process_text_search,
            Phase::ReleaseGroup => self.process_release_groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_normal_run_uses_configured_budgets() {
        let mut config = fixtures::config();
        config.run.process_release_groups = true;

        let settings = RunSettings::for_run(&config, ForceOverrides::default(), false);
        assert!(!settings.discovery);
        assert_eq!(settings.budgets.artist, 25);
        assert_eq!(settings.budgets.text_search, 25);
        assert_eq!(settings.budgets.release_group, 15);
        assert!(settings.phase_enabled(Phase::TextSearch));
        assert!(settings.phase_enabled(Phase::ReleaseGroup));
        assert_eq!(settings.freshness.recheck_hours(), 72);
    }

    #[test]
    fn test_discovery_mode_overrides() {
        let mut config = fixtures::config();
        config.run.process_artist_textsearch = true;
        config.run.process_release_groups = true;

        let settings = RunSettings::for_run(&config, ForceOverrides::default(), true);
        assert!(settings.discovery);
        assert_eq!(settings.budgets.for_phase(Phase::Artist), 1);
        assert_eq!(settings.budgets.for_phase(Phase::ReleaseGroup), 1);
        assert!(!settings.phase_enabled(Phase::TextSearch));
        assert!(settings.phase_enabled(Phase::ReleaseGroup));

        // The config itself is untouched.
        assert!(config.run.process_artist_textsearch);
        assert_eq!(config.probe.max_attempts_per_artist, 25);
    }

    #[test]
    fn test_cli_overrides_add_to_config() {
        let mut config = fixtures::config();
        config.run.force_rg = true;

        let overrides = ForceOverrides {
            artists: true,
            ..Default::default()
        };
        let settings = RunSettings::for_run(&config, overrides, false);
        assert!(settings.force_for(Phase::Artist));
        assert!(settings.force_for(Phase::ReleaseGroup));
        assert!(!settings.force_for(Phase::TextSearch));
    }
}
