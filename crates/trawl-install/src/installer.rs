//! The artifact installer.
//!
//! Given the chosen modules' artifacts, the installer plans the target file
//! set, diffs it against the persisted state of the previous run, transfers
//! what changed with bounded concurrency, preserves volatile files the user
//! has edited, deletes orphans, and writes the new state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camino::Utf8PathBuf;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use trawl_core::{Artifact, DigestAlgorithm, ModuleIdentifier, Notifier, TrawlError, TrawlResult};

use crate::state::InstallState;
use crate::transfer::{Transfer, TransferConfig};

/// Installer settings
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Directory artifacts are laid out under
    pub root: Utf8PathBuf,
    /// Path of the persisted state file
    pub state_file: Utf8PathBuf,
    /// Concurrent transfer limit
    pub workers: usize,
    /// Re-install everything regardless of digests
    pub overwrite: bool,
    pub algorithm: DigestAlgorithm,
    pub transfer: TransferConfig,
}

impl InstallerConfig {
    pub fn new(root: Utf8PathBuf) -> Self {
        let state_file = root.join(".trawl-state");
        Self {
            root,
            state_file,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            overwrite: false,
            algorithm: DigestAlgorithm::default(),
            transfer: TransferConfig::default(),
        }
    }
}

/// What a run did to each artifact
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<Artifact>,
    pub skipped: Vec<Artifact>,
    pub failed: Vec<(Artifact, TrawlError)>,
    pub removed: Vec<Artifact>,
}

impl InstallReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Disposition {
    Install,
    /// Present and unchanged, or volatile and preserved
    Keep,
}

/// Materializes chosen modules under a root directory
pub struct Installer {
    config: InstallerConfig,
    transfer: Arc<Transfer>,
}

impl Installer {
    pub fn new(config: InstallerConfig) -> TrawlResult<Self> {
        let transfer = Arc::new(Transfer::new(config.algorithm, config.transfer.clone())?);
        Ok(Self { config, transfer })
    }

    /// Run the full plan/diff/transfer/cleanup/persist pipeline.
    pub async fn install(
        &self,
        modules: &[(ModuleIdentifier, Vec<Artifact>)],
        notifier: Arc<dyn Notifier>,
        cancel: Arc<AtomicBool>,
    ) -> TrawlResult<InstallReport> {
        let planned = self.plan(modules)?;
        let previous = self.load_previous(notifier.as_ref());
        let mut report = InstallReport::default();

        // Classify against the previous run
        let mut to_install = Vec::new();
        for mut artifact in planned {
            if let Some(record) = previous.get(&artifact.relative_file(&self.config.root)) {
                artifact.digest = record.digest.clone();
            }
            match self.classify(&artifact)? {
                Disposition::Install => to_install.push(artifact),
                Disposition::Keep => {
                    let mut kept = artifact;
                    // Volatile files keep the user's content; the digest
                    // follows whatever is on disk now
                    kept.update_digest(self.config.algorithm)?;
                    report.skipped.push(kept);
                }
            }
        }

        // Orphans from the previous run
        let planned_files: std::collections::HashSet<Utf8PathBuf> = to_install
            .iter()
            .chain(report.skipped.iter())
            .map(|artifact| artifact.relative_file(&self.config.root))
            .collect();
        let mut orphans = Vec::new();
        for record in previous.records() {
            if !planned_files.contains(&record.file) {
                orphans.push(record.to_artifact(&self.config.root)?);
            }
        }

        // Transfer concurrently
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks: JoinSet<Result<Artifact, (Artifact, TrawlError)>> = JoinSet::new();
        for mut artifact in to_install {
            let semaphore = Arc::clone(&semaphore);
            let transfer = Arc::clone(&self.transfer);
            let notifier = Arc::clone(&notifier);
            let cancel = Arc::clone(&cancel);
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await;
                if cancel.load(Ordering::Relaxed) {
                    return Err((artifact, TrawlError::Cancelled));
                }
                match transfer
                    .fetch(&artifact, notifier.as_ref(), cancel.as_ref())
                    .await
                {
                    Ok(digest) => {
                        artifact.digest = Some(digest);
                        Ok(artifact)
                    }
                    Err(error) => Err((artifact, error)),
                }
            });
        }
        // Keep joining even after a cancellation so every worker observes
        // the flag and removes its own temp file
        let mut cancelled = false;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| TrawlError::Network {
                message: format!("Install worker panicked: {}", e),
                source: None,
            })?;
            match outcome {
                Ok(artifact) => report.installed.push(artifact),
                Err((_, TrawlError::Cancelled)) => cancelled = true,
                Err((artifact, error)) => {
                    notifier.error(&format!("Failed to install {}: {}", artifact.file, error));
                    report.failed.push((artifact, error));
                }
            }
        }
        if cancelled || cancel.load(Ordering::Relaxed) {
            return Err(TrawlError::Cancelled);
        }

        // Cleanup orphans left by previous runs
        for orphan in orphans {
            match orphan.delete(&self.config.root) {
                Ok(_) => {
                    notifier.info(&format!("Deleted {}", orphan.file));
                    report.removed.push(orphan);
                }
                Err(error) => {
                    notifier.warn(&format!("Could not delete {}: {}", orphan.file, error));
                }
            }
        }

        // Persist the new state, sorted by file path
        let state = InstallState::from_artifacts(
            report.installed.iter().chain(report.skipped.iter()),
            &self.config.root,
        );
        state.write(&self.config.state_file)?;

        tracing::info!(
            installed = report.installed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            removed = report.removed.len(),
            "install finished"
        );
        Ok(report)
    }

    /// Collect the planned artifact set; a file claimed by two modules is a
    /// planning error.
    fn plan(&self, modules: &[(ModuleIdentifier, Vec<Artifact>)]) -> TrawlResult<Vec<Artifact>> {
        let mut owners: HashMap<Utf8PathBuf, &ModuleIdentifier> = HashMap::new();
        let mut planned = Vec::new();
        for (module, artifacts) in modules {
            for artifact in artifacts {
                if let Some(first) = owners.insert(artifact.file.clone(), module) {
                    return Err(TrawlError::DuplicateArtifact {
                        file: artifact.file.to_string(),
                        first: first.to_string(),
                        second: module.to_string(),
                    });
                }
                planned.push(artifact.clone());
            }
        }
        Ok(planned)
    }

    fn load_previous(&self, notifier: &dyn Notifier) -> InstallState {
        match InstallState::load(&self.config.state_file) {
            Ok(Some(state)) => state,
            Ok(None) => InstallState::default(),
            Err(error) => {
                notifier.warn(&format!(
                    "Ignoring unreadable state file {}: {}",
                    self.config.state_file, error
                ));
                InstallState::default()
            }
        }
    }

    fn classify(&self, artifact: &Artifact) -> TrawlResult<Disposition> {
        if !artifact.exists() {
            return Ok(Disposition::Install);
        }
        // A volatile file that is already present belongs to the user now
        if artifact.volatile {
            return Ok(Disposition::Keep);
        }
        if self.config.overwrite {
            return Ok(Disposition::Install);
        }
        if !artifact.was_modified(self.config.algorithm)? {
            return Ok(Disposition::Keep);
        }
        // The file differs from what the last run recorded (or there is no
        // record at all), but when the repository publishes a content
        // digest and the file already matches it, adopt it as-is
        if let Some(source_digest) = &artifact.source_digest {
            if !artifact.is_different(self.config.algorithm, source_digest)? {
                return Ok(Disposition::Keep);
            }
        }
        Ok(Disposition::Install)
    }
}
