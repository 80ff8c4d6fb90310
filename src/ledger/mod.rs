//! Ledger module: idempotent dual-table record keeping.
//!
//! The ledger is the audit trail for the batch: one table holds the client
//! backlog and per-client run summaries, the other holds one row per manifest
//! entry with its download outcome. All writes go through the upsert/record
//! contracts here; rows are never deleted.
//!
//! # Overview
//!
//! - [`Ledger`] - Main interface for ledger operations
//! - [`ClientRow`] - One client backlog entry with run summary
//! - [`DocumentRow`] - One per-manifest-entry download record
//! - [`RunStatus`] / [`DownloadStatus`] - Lifecycle states
//! - [`LedgerError`] - Operation error types
//!
//! # Example
//!
//! ```ignore
//! use archiver_core::ledger::{Ledger, DownloadStatus};
//! use archiver_core::Database;
//!
//! let db = Database::new(Path::new("archiver.db")).await?;
//! let ledger = Ledger::new(db);
//!
//! for client in ledger.pending_clients().await? {
//!     // ... process the client ...
//! }
//! ```

mod entry;
mod error;

pub use entry::{ClientRow, DocumentRow, DownloadStatus, RunStatus};
pub use error::{LedgerDbErrorKind, LedgerError};

use std::path::Path;

use sqlx::Row;
use tracing::instrument;

use crate::db::Database;
use crate::manifest::DocumentRecord;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Returns `Ok(())` if at least one row was affected; otherwise the given error.
fn check_affected(rows_affected: u64, missing: LedgerError) -> Result<()> {
    if rows_affected == 0 { Err(missing) } else { Ok(()) }
}

/// Ledger manager for client and document records.
///
/// Backed by `SQLite` with WAL mode. Safe to re-run: document rows are keyed
/// on (client name, client number, document id, year, file type) and are
/// updated in place on repeated attempts.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
}

impl Ledger {
    /// Creates a new ledger over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds a client to the backlog with pending status.
    ///
    /// Returns `Some(id)` when a new row was created, `None` when a row for
    /// this (name, number) pair already exists (the existing row is left
    /// untouched, including its status).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the insert fails.
    #[instrument(skip(self), fields(client = %client_name, number = %client_number))]
    pub async fn add_client(
        &self,
        client_name: &str,
        client_number: &str,
        client_email: Option<&str>,
    ) -> Result<Option<i64>> {
        let row = sqlx::query(
            r"INSERT INTO clients (client_name, client_number, client_email)
              VALUES (?, ?, ?)
              ON CONFLICT (client_name, client_number) DO NOTHING
              RETURNING id",
        )
        .bind(client_name)
        .bind(client_number)
        .bind(client_email)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|r| r.get("id")))
    }

    /// Returns the pending backlog, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn pending_clients(&self) -> Result<Vec<ClientRow>> {
        let rows = sqlx::query_as::<_, ClientRow>(
            r"SELECT * FROM clients WHERE status = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(RunStatus::Pending.as_str())
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    /// Gets a client row by id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_client(&self, id: i64) -> Result<Option<ClientRow>> {
        let row = sqlx::query_as::<_, ClientRow>(r"SELECT * FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row)
    }

    /// Marks a client as in progress once search has resolved its document count.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ClientNotFound`] if no row exists with the given id.
    /// Returns [`LedgerError::Database`] if the update fails.
    #[instrument(skip(self, folder_path))]
    pub async fn mark_client_in_progress(
        &self,
        id: i64,
        total_documents: i64,
        folder_path: &Path,
    ) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE clients
              SET status = ?,
                  description = 'downloading documents',
                  total_documents = ?,
                  folder_path = ?,
                  updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(RunStatus::InProgress.as_str())
        .bind(total_documents)
        .bind(folder_path.to_string_lossy().as_ref())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(result.rows_affected(), LedgerError::ClientNotFound(id))
    }

    /// Records a client's terminal outcome for this run.
    ///
    /// Called exactly once per client run, after every document has been
    /// dispositioned one way or another.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ClientNotFound`] if no row exists with the given id.
    /// Returns [`LedgerError::Database`] if the update fails.
    #[instrument(skip(self, description, folder_path), fields(status = %status))]
    pub async fn record_client_outcome(
        &self,
        id: i64,
        status: RunStatus,
        description: &str,
        total_documents: Option<i64>,
        files_downloaded: i64,
        folder_path: Option<&Path>,
    ) -> Result<()> {
        let folder_path = folder_path.map(|p| p.to_string_lossy().into_owned());
        let result = sqlx::query(
            r"UPDATE clients
              SET status = ?,
                  description = ?,
                  total_documents = COALESCE(?, total_documents),
                  files_downloaded = ?,
                  folder_path = COALESCE(?, folder_path),
                  updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(description)
        .bind(total_documents)
        .bind(files_downloaded)
        .bind(folder_path)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(result.rows_affected(), LedgerError::ClientNotFound(id))
    }

    /// Looks up or appends the document row for a manifest record.
    ///
    /// The dedup key is (client name, client number, document id, year, file
    /// type). When a row already exists its handle is returned without any
    /// write, so manifest rows logged on a previous run are never duplicated;
    /// a later [`Ledger::record_download_outcome`] may still overwrite the
    /// prior attempt's status.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the lookup or insert fails.
    #[instrument(skip(self, record), fields(doc_id = %record.document_id))]
    pub async fn upsert_document(&self, record: &DocumentRecord) -> Result<i64> {
        let existing = sqlx::query(
            r"SELECT id FROM documents
              WHERE client_name = ? AND client_number = ?
                AND document_id = ? AND year = ? AND file_type = ?",
        )
        .bind(&record.client_name)
        .bind(&record.client_number)
        .bind(&record.document_id)
        .bind(&record.year)
        .bind(&record.file_type)
        .fetch_optional(self.db.pool())
        .await?;

        if let Some(row) = existing {
            return Ok(row.get("id"));
        }

        let row = sqlx::query(
            r"INSERT INTO documents (
                client_name,
                client_number,
                document_id,
                year,
                file_type,
                section,
                document_type,
                description,
                document_date,
                file_size,
                download_status
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(&record.client_name)
        .bind(&record.client_number)
        .bind(&record.document_id)
        .bind(&record.year)
        .bind(&record.file_type)
        .bind(&record.section)
        .bind(&record.document_type)
        .bind(&record.description)
        .bind(&record.document_date)
        .bind(&record.file_size)
        .bind(DownloadStatus::Pending.as_str())
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("id"))
    }

    /// Records the outcome of a download attempt for a document row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DocumentNotFound`] if no row exists with the given id.
    /// Returns [`LedgerError::Database`] if the update fails.
    #[instrument(skip(self, description, file_name, file_path), fields(status = %status))]
    pub async fn record_download_outcome(
        &self,
        id: i64,
        status: DownloadStatus,
        description: &str,
        file_name: Option<&str>,
        file_path: Option<&Path>,
    ) -> Result<()> {
        let file_path = file_path.map(|p| p.to_string_lossy().into_owned());
        let result = sqlx::query(
            r"UPDATE documents
              SET download_status = ?,
                  download_description = ?,
                  file_name = COALESCE(?, file_name),
                  file_path = COALESCE(?, file_path),
                  downloaded_at = datetime('now')
              WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(description)
        .bind(file_name)
        .bind(file_path)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(result.rows_affected(), LedgerError::DocumentNotFound(id))
    }

    /// Gets a document row by id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_document(&self, id: i64) -> Result<Option<DocumentRow>> {
        let row = sqlx::query_as::<_, DocumentRow>(r"SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row)
    }

    /// Lists all document rows for a client, in manifest ingest order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn documents_for_client(
        &self,
        client_name: &str,
        client_number: &str,
    ) -> Result<Vec<DocumentRow>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r"SELECT * FROM documents
              WHERE client_name = ? AND client_number = ?
              ORDER BY id ASC",
        )
        .bind(client_name)
        .bind(client_number)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    /// Counts clients grouped by status.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn client_counts_by_status(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r"SELECT status, COUNT(*) as count FROM clients GROUP BY status ORDER BY status",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("status"), r.get("count")))
            .collect())
    }

    /// Lists document rows whose last attempt failed, most recent first.
    ///
    /// Used for auditing a failed run without re-running it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn failed_documents(&self, limit: i64) -> Result<Vec<DocumentRow>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r"SELECT * FROM documents
              WHERE download_status = ?
              ORDER BY downloaded_at DESC, id DESC
              LIMIT ?",
        )
        .bind(DownloadStatus::Error.as_str())
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }
}
