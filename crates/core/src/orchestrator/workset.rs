//! Work-set selection for each phase.
//!
//! Pure functions over ledger records: an entity is selected when it is not
//! cached yet, when its phase is forced, or when its cached result is stale.
//! Excluded artists and everything they own are never selected.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::RunSettings;
use crate::ledger::{is_excluded_artist, ArtistRecord, CacheStatus, ReleaseGroupRecord};
use crate::normalize::normalize;
use crate::probe::{Phase, SelectionReason, WorkItem, WorkSubject};

/// Why an entity needs a probe this run, if it does.
///
/// A stale entry is re-discovered with the full budget even when its phase
/// is also forced.
fn selection_reason(
    status: CacheStatus,
    last_checked: Option<DateTime<Utc>>,
    force: bool,
    settings: &RunSettings,
    now: DateTime<Utc>,
) -> Option<SelectionReason> {
    match status {
        CacheStatus::Pending => Some(SelectionReason::New),
        CacheStatus::Failed => Some(SelectionReason::FailedRetry),
        CacheStatus::Success if settings.freshness.is_stale(last_checked, now) => {
            Some(SelectionReason::Stale)
        }
        CacheStatus::Success if force => Some(SelectionReason::Forced),
        CacheStatus::Success => None,
    }
}

/// Attempt budget for an item. Forced lookups are a one-shot refresh; forced
/// text searches keep the full budget.
fn budget_for(phase: Phase, reason: SelectionReason, settings: &RunSettings) -> u32 {
    let budget = settings.budgets.for_phase(phase);
    if reason == SelectionReason::Forced && phase != Phase::TextSearch {
        1
    } else {
        budget
    }
}

fn item(subject: WorkSubject, reason: SelectionReason, settings: &RunSettings) -> WorkItem {
    let mut item = WorkItem {
        subject,
        reason,
        budget: 0,
    };
    item.budget = budget_for(item.phase(), reason, settings);
    item
}

/// Phase 1: direct artist lookups.
pub fn select_artists(
    artists: &[ArtistRecord],
    settings: &RunSettings,
    now: DateTime<Utc>,
) -> Vec<WorkItem> {
    artists
        .iter()
        .filter(|artist| !is_excluded_artist(&artist.id))
        .filter_map(|artist| {
            let reason = selection_reason(
                artist.status,
                artist.last_checked,
                settings.force_artists,
                settings,
                now,
            )?;
            Some(item(
                WorkSubject::ArtistLookup(artist.clone()),
                reason,
                settings,
            ))
        })
        .collect()
}

/// Search query for an artist name, or `None` when nothing searchable is left.
///
/// A name made only of characters the symbol filter drops (for example a
/// non-Latin script) falls back to the unfiltered name.
pub fn text_search_query(name: &str, settings: &RunSettings) -> Option<String> {
    let query = normalize(
        name,
        settings.textsearch_lowercase,
        settings.textsearch_remove_symbols,
    );
    let query = if query.is_empty() && settings.textsearch_remove_symbols {
        normalize(name, settings.textsearch_lowercase, false)
    } else {
        query
    };
    (!query.is_empty()).then_some(query)
}

/// Phase 2: free-text searches by artist name.
///
/// When `cached_artists` is given, only those artists are eligible.
pub fn select_text_searches(
    artists: &[ArtistRecord],
    cached_artists: Option<&HashSet<String>>,
    settings: &RunSettings,
    now: DateTime<Utc>,
) -> Vec<WorkItem> {
    artists
        .iter()
        .filter(|artist| !is_excluded_artist(&artist.id))
        .filter(|artist| cached_artists.is_none_or(|ids| ids.contains(&artist.id)))
        .filter_map(|artist| {
            let status = if artist.text_search_success {
                CacheStatus::Success
            } else if artist.text_search_attempted {
                CacheStatus::Failed
            } else {
                CacheStatus::Pending
            };
            let reason = selection_reason(
                status,
                artist.text_search_last_checked,
                settings.force_text_search,
                settings,
                now,
            )?;
            let query = text_search_query(artist.search_name()?, settings)?;
            Some(item(
                WorkSubject::TextSearch {
                    artist: artist.clone(),
                    query,
                },
                reason,
                settings,
            ))
        })
        .collect()
}

/// Phase 3: release group lookups, limited to groups owned by `cached_artists`.
pub fn select_release_groups(
    release_groups: &[ReleaseGroupRecord],
    cached_artists: &HashSet<String>,
    settings: &RunSettings,
    now: DateTime<Utc>,
) -> Vec<WorkItem> {
    release_groups
        .iter()
        .filter(|rg| !is_excluded_artist(&rg.artist_id))
        .filter(|rg| cached_artists.contains(&rg.artist_id))
        .filter_map(|rg| {
            let reason = selection_reason(
                rg.status,
                rg.last_checked,
                settings.force_release_groups,
                settings,
                now,
            )?;
            Some(item(WorkSubject::ReleaseGroup(rg.clone()), reason, settings))
        })
        .collect()
}

/// Ids of artists whose lookup is cached.
pub fn cached_artist_ids(artists: &[ArtistRecord]) -> HashSet<String> {
    artists
        .iter()
        .filter(|a| a.status == CacheStatus::Success && !is_excluded_artist(&a.id))
        .map(|a| a.id.clone())
        .collect()
}
