//! Reconciliation engine: drives one client at a time from search to ledger.
//!
//! For each pending client the engine clears the staging area, searches the
//! platform, retrieves and parses the manifest, then runs the single- or
//! bulk-download strategy and reconciles what landed on disk against the
//! manifest. Every document and client outcome is written to the ledger; a
//! failure for one document never aborts the rest of its client, and a
//! failure for one client never aborts the batch unless the consecutive
//! failure valve trips.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::archive;
use crate::config::RunConfig;
use crate::ledger::{ClientRow, DownloadStatus, Ledger, LedgerError, RunStatus};
use crate::manifest::{self, DocumentRecord};
use crate::placement;
use crate::session::{BrowserSession, SearchOutcome};
use crate::staging::{ArtifactKind, StagingArea, WatchError};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Batch-fatal engine errors. Per-client and per-document problems are
/// recorded in the ledger instead of surfacing here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The ledger could not be read or written.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The staging directory could not be prepared.
    #[error("staging error: {0}")]
    Staging(#[from] WatchError),

    /// The consecutive client failure valve tripped.
    #[error("batch aborted after {count} consecutive client failures")]
    TooManyFailures { count: u32 },
}

/// Counters from one batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    /// Clients taken from the pending backlog.
    pub processed: usize,
    /// Clients that finished with every document accounted for.
    pub succeeded: usize,
    /// Clients that finished with gaps (missing documents, ambiguity).
    pub warnings: usize,
    /// Clients that failed outright (no match, manifest failure).
    pub failed: usize,
}

/// Terminal result for one client run.
#[derive(Debug)]
struct ClientOutcome {
    status: RunStatus,
    description: String,
    total_documents: Option<i64>,
    files_downloaded: i64,
    folder_path: Option<PathBuf>,
}

impl ClientOutcome {
    fn error(description: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            description: description.into(),
            total_documents: None,
            files_downloaded: 0,
            folder_path: None,
        }
    }

    fn warning(description: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Warning,
            description: description.into(),
            total_documents: None,
            files_downloaded: 0,
            folder_path: None,
        }
    }
}

/// Per-document tallies from one strategy pass.
#[derive(Debug, Default, Clone, Copy)]
struct StrategyStats {
    moved: usize,
    already_present: usize,
    failed: usize,
}

impl StrategyStats {
    fn satisfied(self) -> usize {
        self.moved + self.already_present
    }
}

/// Orchestrates the per-client download and reconciliation pipeline.
#[derive(Debug)]
pub struct ReconciliationEngine {
    config: RunConfig,
    ledger: Ledger,
    staging: StagingArea,
}

impl ReconciliationEngine {
    /// Creates the engine over a ledger and run configuration, opening the
    /// staging area at the configured download root.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Staging`] if the download root cannot be created.
    pub fn new(config: RunConfig, ledger: Ledger) -> Result<Self> {
        let staging =
            StagingArea::new(&config.download_root)?.with_poll_interval(config.poll_interval());
        Ok(Self {
            config,
            ledger,
            staging,
        })
    }

    /// The staging area the engine watches.
    #[must_use]
    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Processes every pending client in the backlog, oldest first.
    ///
    /// Each client gets exactly one terminal ledger status this run. The
    /// batch stops early only when the configured number of consecutive
    /// client failures is reached.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Ledger`] if the ledger fails, or
    /// [`EngineError::TooManyFailures`] when the failure valve trips.
    #[instrument(skip_all)]
    pub async fn process_batch<S: BrowserSession>(&self, session: &mut S) -> Result<BatchStats> {
        let pending = self.ledger.pending_clients().await?;
        info!(clients = pending.len(), "starting batch");

        let mut stats = BatchStats::default();
        let mut consecutive_errors: u32 = 0;

        for client in pending {
            let outcome = self.process_client(session, &client).await?;
            info!(
                client = %client.client_name,
                status = %outcome.status,
                description = %outcome.description,
                "client finished"
            );

            self.ledger
                .record_client_outcome(
                    client.id,
                    outcome.status,
                    &outcome.description,
                    outcome.total_documents,
                    outcome.files_downloaded,
                    outcome.folder_path.as_deref(),
                )
                .await?;

            stats.processed += 1;
            match outcome.status {
                RunStatus::Error => {
                    stats.failed += 1;
                    consecutive_errors += 1;
                }
                RunStatus::Warning => {
                    stats.warnings += 1;
                    consecutive_errors = 0;
                }
                _ => {
                    stats.succeeded += 1;
                    consecutive_errors = 0;
                }
            }

            if consecutive_errors >= self.config.max_consecutive_errors {
                warn!(count = consecutive_errors, "consecutive failure valve tripped");
                return Err(EngineError::TooManyFailures {
                    count: consecutive_errors,
                });
            }
        }

        info!(?stats, "batch finished");
        Ok(stats)
    }

    /// Runs one client through search, manifest, strategy, reconciliation.
    ///
    /// Only ledger failures propagate; every other problem becomes this
    /// client's terminal outcome.
    #[instrument(skip_all, fields(client = %client.client_name, number = %client.client_number))]
    async fn process_client<S: BrowserSession>(
        &self,
        session: &mut S,
        client: &ClientRow,
    ) -> std::result::Result<ClientOutcome, LedgerError> {
        if let Err(err) = self.staging.clear_loose_files() {
            return Ok(ClientOutcome::error(format!(
                "could not clear staging area: {err}"
            )));
        }

        let total_documents = match session
            .search_client(&client.client_name, &client.client_number)
            .await
        {
            Ok(SearchOutcome::NoMatch) => {
                return Ok(ClientOutcome::error("client not found on platform"));
            }
            Ok(SearchOutcome::Found { total_documents }) => total_documents,
            Err(err) => {
                return Ok(ClientOutcome::error(format!("search failed: {err}")));
            }
        };

        if total_documents == 0 {
            return Ok(ClientOutcome::warning("no documents in file room"));
        }

        let client_root = self
            .config
            .client_root(&client.client_name, &client.client_number);
        if let Err(err) = std::fs::create_dir_all(&client_root) {
            return Ok(ClientOutcome::error(format!(
                "could not create client folder: {err}"
            )));
        }

        self.ledger
            .mark_client_in_progress(client.id, i64::from(total_documents), &client_root)
            .await?;

        let manifest = match self.fetch_manifest(session, client).await {
            Ok(manifest) => manifest,
            Err(outcome) => return Ok(*outcome),
        };
        if manifest.is_empty() {
            return Ok(ClientOutcome::warning("manifest contained no documents"));
        }

        // One ledger row per manifest entry, before any download attempt.
        let mut handles = BTreeMap::new();
        for (document_id, record) in &manifest {
            let handle = self.ledger.upsert_document(record).await?;
            handles.insert(document_id.clone(), handle);
        }

        let stats = if total_documents == 1 {
            self.run_single_strategy(session, &manifest, &handles, &client_root)
                .await?
        } else {
            self.run_bulk_strategy(session, client, &manifest, &handles, &client_root)
                .await?
        };

        let expected = manifest.len();
        let satisfied = stats.satisfied();
        let moved = i64::try_from(stats.moved).unwrap_or(i64::MAX);
        let summary = if stats.already_present > 0 {
            format!(
                "{satisfied} of {expected} documents available ({} pre-existing)",
                stats.already_present
            )
        } else {
            format!("{satisfied} of {expected} documents available")
        };

        Ok(ClientOutcome {
            status: if satisfied == expected {
                RunStatus::Success
            } else {
                RunStatus::Warning
            },
            description: summary,
            total_documents: Some(i64::from(total_documents)),
            files_downloaded: moved,
            folder_path: Some(client_root),
        })
    }

    /// Exports, awaits, parses, validates, and archives the manifest.
    ///
    /// On failure returns the client's terminal outcome (boxed to keep the
    /// happy path lean).
    async fn fetch_manifest<S: BrowserSession>(
        &self,
        session: &mut S,
        client: &ClientRow,
    ) -> std::result::Result<BTreeMap<String, DocumentRecord>, Box<ClientOutcome>> {
        if let Err(err) = session.trigger_manifest_export().await {
            return Err(Box::new(ClientOutcome::error(format!(
                "manifest export failed: {err}"
            ))));
        }

        let artifact = match self
            .staging
            .await_artifact(ArtifactKind::Manifest, self.config.artifact_timeout())
            .await
        {
            Ok(path) => path,
            Err(err @ WatchError::Ambiguous { .. }) => {
                return Err(Box::new(ClientOutcome::warning(err.to_string())));
            }
            Err(err) => {
                return Err(Box::new(ClientOutcome::error(format!(
                    "manifest did not arrive: {err}"
                ))));
            }
        };

        let manifest = match manifest::parse_file(&artifact) {
            Ok(manifest) => manifest,
            Err(err) => {
                return Err(Box::new(ClientOutcome::error(format!(
                    "manifest parse failed: {err}"
                ))));
            }
        };

        // The manifest must describe the client we searched for; a mismatch
        // means the platform returned someone else's file room.
        if let Some(record) = manifest
            .values()
            .find(|r| r.client_number != client.client_number)
        {
            return Err(Box::new(ClientOutcome::error(format!(
                "manifest client number mismatch: expected {}, found {}",
                client.client_number, record.client_number
            ))));
        }

        let archived_name = format!(
            "Search_{}.csv",
            placement::client_folder_name(&client.client_name, &client.client_number)
        );
        match placement::relocate_to_holding(
            &artifact,
            &self.config.manifest_holding_dir(),
            &archived_name,
        ) {
            Ok(path) => debug!(path = %path.display(), "manifest archived"),
            Err(err) => warn!(error = %err, "could not archive manifest, leaving it in staging"),
        }

        Ok(manifest)
    }

    /// Downloads the one document directly, skipping the download when the
    /// expected file is already in place.
    async fn run_single_strategy<S: BrowserSession>(
        &self,
        session: &mut S,
        manifest: &BTreeMap<String, DocumentRecord>,
        handles: &BTreeMap<String, i64>,
        client_root: &std::path::Path,
    ) -> std::result::Result<StrategyStats, LedgerError> {
        let mut stats = StrategyStats::default();

        // Strategy selection guarantees one document; tolerate a manifest
        // that disagrees by handling each row the same way.
        for (document_id, record) in manifest {
            let Some(&handle) = handles.get(document_id) else {
                continue;
            };
            let expected = placement::expected_base_name(record);
            let final_name = placement::final_file_name(record);

            let destination =
                match placement::placement_path(client_root, &record.year, &final_name) {
                    Ok(path) => path,
                    Err(err) => {
                        self.record_failure(handle, &format!("cannot resolve placement: {err}"))
                            .await?;
                        stats.failed += 1;
                        continue;
                    }
                };

            if destination.exists() {
                self.ledger
                    .record_download_outcome(
                        handle,
                        DownloadStatus::Success,
                        "file already present on disk",
                        Some(&final_name),
                        Some(&destination),
                    )
                    .await?;
                stats.already_present += 1;
                continue;
            }

            if let Err(err) = self.staging.clear_loose_files() {
                self.record_failure(handle, &format!("could not clear staging: {err}"))
                    .await?;
                stats.failed += 1;
                continue;
            }
            if let Err(err) = session.trigger_single_document_export(document_id).await {
                self.record_failure(handle, &format!("export failed: {err}"))
                    .await?;
                stats.failed += 1;
                continue;
            }

            let artifact = match self
                .staging
                .await_artifact(ArtifactKind::Document, self.config.artifact_timeout())
                .await
            {
                Ok(path) => path,
                Err(err) => {
                    self.record_failure(handle, &err.to_string()).await?;
                    stats.failed += 1;
                    continue;
                }
            };

            let observed = artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !placement::base_name_compatible(&observed, &expected, document_id) {
                // A stray download of the wrong document must not linger in
                // staging and poison the next watch.
                if let Err(err) = std::fs::remove_file(&artifact) {
                    warn!(error = %err, "could not remove mismatched download");
                }
                self.record_failure(
                    handle,
                    &format!("downloaded file '{observed}' does not match expected '{expected}'"),
                )
                .await?;
                stats.failed += 1;
                continue;
            }

            match placement::place_file(&artifact, client_root, &record.year, &final_name) {
                Ok(path) => {
                    self.ledger
                        .record_download_outcome(
                            handle,
                            DownloadStatus::Success,
                            "file downloaded successfully",
                            Some(&final_name),
                            Some(&path),
                        )
                        .await?;
                    stats.moved += 1;
                }
                Err(err) => {
                    self.record_failure(handle, &format!("placement failed: {err}"))
                        .await?;
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Pages through bulk exports, accumulating archives into the client's
    /// scratch folder, then reconciles the whole manifest at once.
    async fn run_bulk_strategy<S: BrowserSession>(
        &self,
        session: &mut S,
        client: &ClientRow,
        manifest: &BTreeMap<String, DocumentRecord>,
        handles: &BTreeMap<String, i64>,
        client_root: &std::path::Path,
    ) -> std::result::Result<StrategyStats, LedgerError> {
        let scratch = self
            .config
            .scratch_dir(&client.client_name, &client.client_number);
        let page_count = manifest.len().div_ceil(self.config.page_size as usize);

        for page in 1..=page_count {
            // Skipping the page here would leave the local counter behind
            // the remote pagination, so a staging failure ends collection;
            // the missing documents surface at resolution.
            if let Err(err) = self.staging.clear_loose_files() {
                warn!(page, error = %err, "could not clear staging, stopping collection");
                break;
            }
            if let Err(err) = session.trigger_page_bulk_export().await {
                warn!(page, error = %err, "bulk export trigger failed, skipping page");
            } else {
                match self
                    .staging
                    .await_artifact(ArtifactKind::Archive, self.config.artifact_timeout())
                    .await
                {
                    Ok(artifact) => self.ingest_archive(&artifact, &scratch),
                    // Missing pages surface later as per-document resolution
                    // failures; keep collecting the remaining pages.
                    Err(err) => warn!(page, error = %err, "page archive did not arrive"),
                }
            }

            if page < page_count {
                match session.has_next_page().await {
                    Ok(true) => {
                        if let Err(err) = session.advance_page().await {
                            warn!(page, error = %err, "could not advance page, stopping early");
                            break;
                        }
                    }
                    Ok(false) => {
                        warn!(page, expected = page_count, "ran out of pages early");
                        break;
                    }
                    Err(err) => {
                        warn!(page, error = %err, "page probe failed, stopping early");
                        break;
                    }
                }
            }
        }

        // One resolution pass over the full manifest, regardless of which
        // page each file arrived on.
        let resolution = match archive::resolve_documents(&scratch, manifest, client_root) {
            Ok(resolution) => resolution,
            Err(err) => {
                // Every document gets a terminal row, and the scratch folder
                // is left in place for inspection.
                warn!(error = %err, "scratch folder unreadable");
                let reason = format!("scratch folder unreadable: {err}");
                let mut stats = StrategyStats::default();
                for &handle in handles.values() {
                    self.record_failure(handle, &reason).await?;
                    stats.failed += 1;
                }
                return Ok(stats);
            }
        };

        let mut stats = StrategyStats::default();
        let mut resolved = std::collections::BTreeSet::new();

        for (document_id, path) in &resolution.moved {
            if let Some(&handle) = handles.get(document_id) {
                self.record_success(handle, "file downloaded successfully", path)
                    .await?;
            }
            resolved.insert(document_id.clone());
            stats.moved += 1;
        }
        for (document_id, path) in &resolution.already_present {
            if let Some(&handle) = handles.get(document_id) {
                self.record_success(handle, "file already present on disk", path)
                    .await?;
            }
            resolved.insert(document_id.clone());
            stats.already_present += 1;
        }
        for (document_id, reason) in &resolution.failures {
            if let Some(&handle) = handles.get(document_id) {
                self.record_failure(handle, reason).await?;
            }
            resolved.insert(document_id.clone());
            stats.failed += 1;
        }
        // resolve_documents covers the whole manifest; anything missing from
        // its report is still a failure for accounting purposes.
        for document_id in manifest.keys() {
            if !resolved.contains(document_id) {
                stats.failed += 1;
            }
        }

        if scratch.exists()
            && let Err(err) = std::fs::remove_dir_all(&scratch)
        {
            warn!(error = %err, "could not remove scratch folder");
        }

        Ok(stats)
    }

    fn ingest_archive(&self, artifact: &std::path::Path, scratch: &std::path::Path) {
        match archive::extract_into(artifact, scratch) {
            Ok(extracted) => debug!(extracted, "page archive extracted"),
            Err(err) => {
                warn!(error = %err, "page archive extraction failed");
                return;
            }
        }
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export.zip".to_string());
        if let Err(err) =
            placement::relocate_to_holding(artifact, &self.config.archive_holding_dir(), &name)
        {
            warn!(error = %err, "could not archive bulk export");
        }
    }

    async fn record_success(
        &self,
        handle: i64,
        description: &str,
        path: &std::path::Path,
    ) -> std::result::Result<(), LedgerError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.ledger
            .record_download_outcome(
                handle,
                DownloadStatus::Success,
                description,
                Some(&file_name),
                Some(path),
            )
            .await
    }

    async fn record_failure(
        &self,
        handle: i64,
        reason: &str,
    ) -> std::result::Result<(), LedgerError> {
        self.ledger
            .record_download_outcome(handle, DownloadStatus::Error, reason, None, None)
            .await
    }
}
