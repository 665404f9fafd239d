use std::path::PathBuf;

use clap::{Parser, Subcommand};
use warmer_core::ForceOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "lidarr-cache-warmer",
    version,
    about = "Warm the Lidarr metadata API cache for every artist and album in a Lidarr library"
)]
pub struct Args {
    /// Configuration file
    #[arg(long, env = "WARMER_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Re-probe artists whose lookup is already cached (one attempt each)
    #[arg(long)]
    pub force_artists: bool,

    /// Re-probe release groups that are already cached (one attempt each)
    #[arg(long)]
    pub force_rg: bool,

    /// Re-run text searches that already succeeded
    #[arg(long)]
    pub force_text_search: bool,

    /// Show what the next run would probe, without probing or writing
    #[arg(long)]
    pub dry_run: bool,

    /// Repeat runs on the configured interval
    #[arg(long, conflicts_with = "dry_run")]
    pub schedule: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print ledger statistics and exit
    Stats,
}

impl Args {
    pub fn overrides(&self) -> ForceOverrides {
        ForceOverrides {
            artists: self.force_artists,
            release_groups: self.force_rg,
            text_search: self.force_text_search,
        }
    }
}
