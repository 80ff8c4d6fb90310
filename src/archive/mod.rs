//! Bulk archive handling: extraction and manifest resolution.
//!
//! Bulk exports arrive as zip archives, one per page. Each archive is
//! extracted into a per-client scratch folder that accumulates across pages;
//! after the last page, [`resolve_documents`] runs once over the entire
//! manifest against that folder, so a document retrieved on any page matches
//! regardless of page boundaries. The manifest, not the archive listing, is
//! the source of truth for what should exist.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::manifest::DocumentRecord;
use crate::placement;

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors from unpacking a bulk export archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive or scratch folder could not be accessed.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive is corrupt or not a zip file.
    #[error("invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Extracts every file entry of an archive into the scratch folder.
///
/// Directory entries and entries whose names escape the scratch folder are
/// skipped. Returns the number of files written.
///
/// # Errors
///
/// Returns [`ArchiveError::Zip`] for a corrupt archive and
/// [`ArchiveError::Io`] when the scratch folder cannot be written.
#[instrument(skip_all, fields(archive = %archive_path.display()))]
pub fn extract_into(archive_path: &Path, scratch_dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(scratch_dir)?;

    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };

        let dest = scratch_dir.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        std::io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }

    debug!(extracted, "archive extracted");
    Ok(extracted)
}

/// Outcome of resolving a manifest against the extraction folder.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Documents placed into the client folder this run: (document id, path).
    pub moved: Vec<(String, PathBuf)>,
    /// Documents whose final file already existed on disk: (document id, path).
    pub already_present: Vec<(String, PathBuf)>,
    /// Documents that could not be resolved: (document id, reason).
    pub failures: Vec<(String, String)>,
}

/// Resolves every manifest entry against the files in the scratch folder.
///
/// A file matches a record when its name carries the document id as a
/// trailing token. Matched files are placed into the client folder under the
/// record's year with the deterministic id-suffixed name. A record whose
/// final file already exists on disk is reported as already present without
/// touching the scratch copy. Per-document failures never abort the pass.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] only when the scratch folder itself cannot
/// be listed; individual placement errors are reported in the resolution.
#[instrument(skip_all, fields(scratch = %scratch_dir.display(), documents = manifest.len()))]
pub fn resolve_documents(
    scratch_dir: &Path,
    manifest: &BTreeMap<String, DocumentRecord>,
    client_root: &Path,
) -> Result<Resolution> {
    let available = walk_files(scratch_dir)?;
    let mut resolution = Resolution::default();

    for (document_id, record) in manifest {
        let file_name = placement::final_file_name(record);

        match placement::placement_path(client_root, &record.year, &file_name) {
            Ok(dest) if dest.exists() => {
                resolution.already_present.push((document_id.clone(), dest));
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                resolution
                    .failures
                    .push((document_id.clone(), format!("cannot create client folder: {err}")));
                continue;
            }
        }

        let matched = available.iter().find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| placement::stem_matches_document_id(name, document_id))
        });

        let Some(source) = matched else {
            resolution.failures.push((
                document_id.clone(),
                "no extracted file carries this document id".to_string(),
            ));
            continue;
        };

        match placement::place_file(source, client_root, &record.year, &file_name) {
            Ok(dest) => resolution.moved.push((document_id.clone(), dest)),
            Err(err) => {
                warn!(document_id = %document_id, error = %err, "placement failed");
                resolution
                    .failures
                    .push((document_id.clone(), format!("placement failed: {err}")));
            }
        }
    }

    Ok(resolution)
}

fn walk_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
