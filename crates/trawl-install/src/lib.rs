//! # trawl-install
//!
//! Materializes chosen modules on disk: plans artifact sets, diffs them
//! against the persisted state of previous runs, transfers content with
//! retry and digest verification, cleans up orphans, and writes the new
//! state atomically.

pub mod installer;
pub mod state;
pub mod transfer;

pub use installer::{InstallReport, Installer, InstallerConfig};
pub use state::{InstallState, StateRecord};
pub use transfer::{Transfer, TransferConfig};
