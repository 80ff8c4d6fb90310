//! Archiver Core Library
//!
//! This library implements batch retrieval and reconciliation of client
//! document archives: it drives a browser-based export platform one client
//! at a time, detects completed downloads in a staging directory, resolves
//! bulk archives against an exported manifest, and rebuilds each client's
//! folder taxonomy on disk with an idempotent ledger of every outcome.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`ledger`] - Client backlog and per-document outcome records
//! - [`staging`] - Download staging area and artifact detection
//! - [`manifest`] - Manifest export parsing
//! - [`archive`] - Bulk archive extraction and manifest resolution
//! - [`placement`] - Deterministic file naming and folder layout
//! - [`session`] - Browser session facade the engine drives
//! - [`engine`] - Per-client reconciliation orchestrator
//! - [`config`] - Run configuration and file config loading

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod config;
pub mod db;
pub mod engine;
pub mod ledger;
pub mod manifest;
pub mod placement;
pub mod session;
pub mod staging;

// Re-export commonly used types
pub use config::{LoadedConfig, RunConfig, load_default_file_config};
pub use db::Database;
pub use engine::{BatchStats, EngineError, ReconciliationEngine};
pub use ledger::{ClientRow, DocumentRow, DownloadStatus, Ledger, LedgerError, RunStatus};
pub use manifest::{DocumentRecord, ParseError};
pub use session::{BrowserSession, SearchOutcome, SessionError};
pub use staging::{ArtifactKind, StagingArea, WatchError};
