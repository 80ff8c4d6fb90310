//! Browser session facade: the export actions the engine drives.
//!
//! The engine never talks to the document platform directly. Every remote
//! action goes through [`BrowserSession`], which a driver implements against
//! whatever browser automation is in use. The engine only cares that each
//! trigger eventually makes a file appear in the staging area; completion
//! detection stays with the staging watcher.

use async_trait::async_trait;
use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by a browser session driver.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The search step could not be completed.
    #[error("client search failed: {0}")]
    SearchFailed(String),

    /// An export trigger could not be delivered to the platform.
    #[error("export action failed: {0}")]
    ActionFailed(String),

    /// The session ended or the operator aborted it.
    #[error("session closed: {0}")]
    Closed(String),
}

/// Outcome of searching for a client on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// No matching client was found.
    NoMatch,
    /// The client was found with this many documents in its file room.
    Found { total_documents: u32 },
}

/// The export actions a browser driver must provide.
///
/// Methods take `&mut self`: a session holds one browser with one staging
/// directory, and the engine is its single writer. Every `trigger_*` method
/// returns once the action has been issued, not once the download finishes.
#[async_trait]
pub trait BrowserSession: Send {
    /// Searches the platform for a client by name and number.
    async fn search_client(&mut self, client_name: &str, client_number: &str)
        -> Result<SearchOutcome>;

    /// Triggers export of the document manifest for the current client.
    async fn trigger_manifest_export(&mut self) -> Result<()>;

    /// Triggers download of one document by its id.
    async fn trigger_single_document_export(&mut self, document_id: &str) -> Result<()>;

    /// Selects all documents on the current page and triggers a bulk export.
    async fn trigger_page_bulk_export(&mut self) -> Result<()>;

    /// Whether another page of documents exists after the current one.
    async fn has_next_page(&mut self) -> Result<bool>;

    /// Advances to the next page of documents.
    async fn advance_page(&mut self) -> Result<()>;
}
