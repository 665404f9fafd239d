//! Manually declared artists and release groups.
//!
//! Lets users warm entities that the upstream inventory does not list. The
//! declaration is a YAML mapping:
//!
//! ```yaml
//! 1a2b3c4d-0000-4000-8000-000000000001:
//!   name: "Some Artist"
//!   release-groups:
//!     - 5e6f7a8b-0000-4000-8000-000000000002
//! ```

mod loader;
mod merge;

pub use loader::{is_valid_mbid, load_manual_entries, parse_manual_entries};
pub use merge::{merge_manual_entries, MergeStats};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManualEntriesError {
    #[error("Manual entries file not found: {0}")]
    NotFound(String),

    #[error("Failed to read manual entries: {0}")]
    Io(String),

    #[error("Invalid YAML in manual entries: {0}")]
    Yaml(String),

    #[error("Manual entries failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// One declared artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualArtist {
    /// Lowercased artist MBID.
    pub id: String,
    pub name: String,
    /// Lowercased release group MBIDs, in declaration order.
    pub release_groups: Vec<String>,
}

/// Validated declarations, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualEntries {
    pub artists: Vec<ManualArtist>,
}

impl ManualEntries {
    pub fn is_empty(&self) -> bool {
        self.artists.is_empty()
    }

    pub fn release_group_count(&self) -> usize {
        self.artists.iter().map(|a| a.release_groups.len()).sum()
    }
}
