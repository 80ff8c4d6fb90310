//! Ledger row types and status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Terminal (or in-flight) status of a client run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting in the backlog.
    Pending,
    /// Currently being processed.
    InProgress,
    /// All documents accounted for.
    Success,
    /// Completed with some documents missing or skipped.
    Warning,
    /// Aborted before documents could be dispositioned.
    Error,
}

impl RunStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            _ => Err(format!("invalid run status: {s}")),
        }
    }
}

/// Per-document download status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Logged from the manifest, not yet attempted or not yet resolved.
    Pending,
    /// File placed at its final path.
    Success,
    /// Retrieval or placement failed for this document.
    Error,
}

impl DownloadStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(format!("invalid download status: {s}")),
        }
    }
}

/// One unit of work: a client from the backlog.
#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    /// Unique identifier.
    pub id: i64,
    /// Current run status (stored as text, parsed via [`ClientRow::status`]).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Human-readable outcome description for the last run.
    pub description: String,
    /// Client name as it appears in the remote application.
    pub client_name: String,
    /// External client number.
    pub client_number: String,
    /// Contact email, when known.
    pub client_email: Option<String>,
    /// Total document count resolved by search; NULL until search completes.
    pub total_documents: Option<i64>,
    /// Running count of files actually placed in the archive.
    pub files_downloaded: i64,
    /// Client archive folder; NULL until the first successful placement run.
    pub folder_path: Option<String>,
    /// When the row was created.
    pub created_at: String,
    /// When the row was last updated.
    pub updated_at: String,
}

impl ClientRow {
    /// Parses the stored status string.
    ///
    /// # Errors
    ///
    /// Returns an error string for an unrecognized stored value.
    pub fn status(&self) -> Result<RunStatus, String> {
        self.status_str.parse()
    }
}

/// One persisted row per manifest entry.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    /// Unique identifier (the row handle returned by upsert).
    pub id: i64,
    /// Client name (dedup key component).
    pub client_name: String,
    /// Client number (dedup key component).
    pub client_number: String,
    /// Document id, unique within a client manifest (dedup key component).
    pub document_id: String,
    /// Document year, empty when the manifest carries none (dedup key component).
    pub year: String,
    /// File extension reported by the manifest (dedup key component).
    pub file_type: String,
    /// Manifest section.
    pub section: String,
    /// Manifest document type.
    pub document_type: String,
    /// Free-text description.
    pub description: String,
    /// Document date as reported.
    pub document_date: String,
    /// Reported size as text.
    pub file_size: String,
    /// Download status (stored as text, parsed via [`DocumentRow::status`]).
    #[sqlx(rename = "download_status")]
    pub download_status_str: String,
    /// Human-readable description of the last download attempt.
    pub download_description: String,
    /// Final file name when placed.
    pub file_name: Option<String>,
    /// Final file path when placed.
    pub file_path: Option<String>,
    /// Timestamp of the last recorded download outcome.
    pub downloaded_at: Option<String>,
    /// When the row was created.
    pub created_at: String,
}

impl DocumentRow {
    /// Parses the stored download status string.
    ///
    /// # Errors
    ///
    /// Returns an error string for an unrecognized stored value.
    pub fn status(&self) -> Result<DownloadStatus, String> {
        self.download_status_str.parse()
    }
}
