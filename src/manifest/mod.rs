//! Manifest parsing: delimited export files into document records.
//!
//! The platform's export produces a comma-delimited file with a header row.
//! Fields may contain embedded commas inside double quotes, and some exports
//! append a trailing empty column. Parsing is hand-rolled and quote-aware
//! rather than pulled in as a dependency; the format is narrow and stable.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Result type for manifest parsing.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors from reading or parsing a manifest file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest has no header row.
    #[error("manifest is empty")]
    Empty,

    /// A required column is missing from the header row.
    #[error("manifest header is missing column '{0}'")]
    MissingColumn(&'static str),

    /// A data row's field count does not match the header.
    #[error("malformed manifest row at line {line}: expected {expected} fields, found {found}")]
    MalformedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// One manifest row: the platform's description of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub client_name: String,
    pub client_number: String,
    pub section: String,
    pub document_type: String,
    pub description: String,
    pub year: String,
    pub document_date: String,
    pub file_size: String,
    pub document_id: String,
    pub file_type: String,
}

const COLUMNS: [&str; 10] = [
    "Client Name",
    "Client Number",
    "File Section",
    "Document Type",
    "Description",
    "Year",
    "Document Date",
    "File Size",
    "Document ID",
    "File Type",
];

/// Parses a manifest file into a mapping keyed by document id.
///
/// One entry per row; when two rows share a document id the later row wins.
///
/// # Errors
///
/// Returns [`ParseError::Io`] if the file cannot be read, or a parse error
/// per [`parse_str`].
pub fn parse_file(path: &Path) -> Result<BTreeMap<String, DocumentRecord>> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parses manifest content into a mapping keyed by document id.
///
/// # Errors
///
/// Returns [`ParseError::Empty`] for content with no header row,
/// [`ParseError::MissingColumn`] if the header lacks a required column, or
/// [`ParseError::MalformedRow`] if a data row's field count does not match
/// the header after quote-aware splitting.
pub fn parse_str(content: &str) -> Result<BTreeMap<String, DocumentRecord>> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines.next().ok_or(ParseError::Empty)?;
    let header = split_delimited(header_line);
    let indices = resolve_columns(&header)?;

    let mut records = BTreeMap::new();
    for (line_index, line) in lines {
        let mut fields = split_delimited(line);
        // Some exports terminate every row with a dangling delimiter.
        if fields.len() == header.len() + 1 && fields.last().is_some_and(String::is_empty) {
            fields.pop();
        }
        if fields.len() != header.len() {
            return Err(ParseError::MalformedRow {
                line: line_index + 1,
                expected: header.len(),
                found: fields.len(),
            });
        }

        let field = |i: usize| fields[indices[i]].trim().to_string();
        let record = DocumentRecord {
            client_name: field(0),
            client_number: field(1),
            section: field(2),
            document_type: field(3),
            description: field(4),
            year: field(5),
            document_date: field(6),
            file_size: field(7),
            document_id: field(8),
            file_type: field(9),
        };

        if records
            .insert(record.document_id.clone(), record)
            .is_some()
        {
            warn!(line = line_index + 1, "duplicate document id in manifest, later row wins");
        }
    }

    debug!(documents = records.len(), "parsed manifest");
    Ok(records)
}

fn resolve_columns(header: &[String]) -> Result<[usize; 10]> {
    let mut indices = [0usize; 10];
    for (slot, name) in COLUMNS.iter().enumerate() {
        let position = header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or(ParseError::MissingColumn(name))?;
        indices[slot] = position;
    }
    Ok(indices)
}

/// Splits one delimited line, honoring double quotes around fields and `""`
/// as an escaped quote inside a quoted field.
pub fn split_delimited(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
