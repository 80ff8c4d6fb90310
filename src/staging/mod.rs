//! Download staging area: polling-based artifact detection.
//!
//! The browser drops files into a staging directory with no completion
//! callback, so completion is inferred from directory state: a download is
//! done when exactly one loose file is present, it carries no partial-write
//! marker extension, and its size has held steady across two consecutive
//! polls. Subdirectories of the staging root are holding areas and scratch
//! folders; only plain files count as loose.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Result type for staging operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Extensions browsers use for files still being written.
const PARTIAL_MARKERS: [&str; 4] = ["crdownload", "tmp", "part", "download"];

/// Errors from watching the staging directory.
#[derive(Debug, Error)]
pub enum WatchError {
    /// No artifact appeared before the deadline.
    #[error("no download appeared within {}s", waited.as_secs())]
    Timeout { waited: Duration },

    /// More than one loose file was observed; the staging directory was not
    /// pristine or multiple downloads are in flight.
    #[error("ambiguous staging state: {count} loose files present")]
    Ambiguous { count: usize },

    /// A completed file appeared but is not the kind of artifact expected.
    #[error("unexpected artifact '{file}', expected {expected}")]
    UnexpectedArtifact { file: String, expected: ArtifactKind },

    /// The staging directory could not be read.
    #[error("staging directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// The kind of file a watch is expecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A delimited manifest export (`.csv`).
    Manifest,
    /// A bulk export archive (`.zip`).
    Archive,
    /// A single document of any type.
    Document,
}

impl ArtifactKind {
    fn accepts(self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match self {
            Self::Manifest => ext.as_deref() == Some("csv"),
            Self::Archive => ext.as_deref() == Some("zip"),
            Self::Document => true,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => write!(f, "a manifest (.csv)"),
            Self::Archive => write!(f, "an archive (.zip)"),
            Self::Document => write!(f, "a document"),
        }
    }
}

/// Handle on the staging directory the browser downloads into.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
    poll_interval: Duration,
}

impl StagingArea {
    /// Opens the staging area, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] if the directory cannot be created.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            poll_interval: Duration::from_secs(2),
        })
    }

    /// Overrides the poll interval (default two seconds).
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The staging root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists loose files: plain files directly under the staging root.
    /// Subdirectories are not loose.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] if the directory cannot be read.
    pub fn loose_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Deletes every loose file, returning how many were removed.
    ///
    /// Called before any triggering action so that detection starts from a
    /// pristine directory.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] if listing or deletion fails.
    #[instrument(skip(self))]
    pub fn clear_loose_files(&self) -> Result<usize> {
        let files = self.loose_files()?;
        let count = files.len();
        if count > 0 {
            warn!(count, "clearing stale files from staging");
        }
        for file in files {
            std::fs::remove_file(file)?;
        }
        Ok(count)
    }

    /// Waits for exactly one completed artifact of the given kind.
    ///
    /// Polls the loose-file set at the configured interval. Succeeds when a
    /// single file is present, has no partial-write marker, and its size is
    /// unchanged between two consecutive polls.
    ///
    /// # Errors
    ///
    /// - [`WatchError::Ambiguous`] as soon as more than one loose file is seen.
    /// - [`WatchError::UnexpectedArtifact`] if the completed file is not of
    ///   the expected kind.
    /// - [`WatchError::Timeout`] if the deadline passes first.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn await_artifact(&self, kind: ArtifactKind, timeout: Duration) -> Result<PathBuf> {
        let deadline = Instant::now() + timeout;
        let mut previous: Option<(PathBuf, u64)> = None;

        loop {
            let files = self.loose_files()?;
            match files.len() {
                0 => previous = None,
                1 => {
                    let path = &files[0];
                    if is_partial(path) {
                        previous = None;
                    } else {
                        let size = std::fs::metadata(path)?.len();
                        if previous
                            .as_ref()
                            .is_some_and(|(p, s)| p == path && *s == size)
                        {
                            if !kind.accepts(path) {
                                return Err(WatchError::UnexpectedArtifact {
                                    file: file_name_of(path),
                                    expected: kind,
                                });
                            }
                            debug!(file = %path.display(), size, "artifact complete");
                            return Ok(path.clone());
                        }
                        previous = Some((path.clone(), size));
                    }
                }
                count => return Err(WatchError::Ambiguous { count }),
            }

            if Instant::now() >= deadline {
                return Err(WatchError::Timeout { waited: timeout });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            PARTIAL_MARKERS
                .iter()
                .any(|marker| ext.eq_ignore_ascii_case(marker))
        })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staging(temp: &TempDir) -> StagingArea {
        StagingArea::new(temp.path())
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_loose_files_ignores_directories() {
        let temp = TempDir::new().unwrap();
        let area = staging(&temp);
        std::fs::write(temp.path().join("doc.pdf"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("0_csv_")).unwrap();

        let files = area.loose_files().unwrap();
        assert_eq!(files, vec![temp.path().join("doc.pdf")]);
    }

    #[test]
    fn test_clear_loose_files_keeps_directories() {
        let temp = TempDir::new().unwrap();
        let area = staging(&temp);
        std::fs::write(temp.path().join("a.pdf"), b"x").unwrap();
        std::fs::write(temp.path().join("b.tmp"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("Acme Co_1042_zip")).unwrap();

        assert_eq!(area.clear_loose_files().unwrap(), 2);
        assert!(area.loose_files().unwrap().is_empty());
        assert!(temp.path().join("Acme Co_1042_zip").is_dir());
    }

    #[tokio::test]
    async fn test_await_artifact_finds_stable_file() {
        let temp = TempDir::new().unwrap();
        let area = staging(&temp);
        std::fs::write(temp.path().join("doc.pdf"), b"content").unwrap();

        let path = area
            .await_artifact(ArtifactKind::Document, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(path, temp.path().join("doc.pdf"));
    }

    #[tokio::test]
    async fn test_await_artifact_times_out_on_empty_dir() {
        let temp = TempDir::new().unwrap();
        let area = staging(&temp);

        let err = area
            .await_artifact(ArtifactKind::Document, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_await_artifact_two_files_is_ambiguous() {
        let temp = TempDir::new().unwrap();
        let area = staging(&temp);
        std::fs::write(temp.path().join("a.pdf"), b"x").unwrap();
        std::fs::write(temp.path().join("b.pdf"), b"y").unwrap();

        let err = area
            .await_artifact(ArtifactKind::Document, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Ambiguous { count: 2 }));
    }

    #[tokio::test]
    async fn test_await_artifact_waits_out_partial_marker() {
        let temp = TempDir::new().unwrap();
        let area = staging(&temp);
        let partial = temp.path().join("doc.pdf.crdownload");
        std::fs::write(&partial, b"half").unwrap();

        let root = temp.path().to_path_buf();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            std::fs::rename(root.join("doc.pdf.crdownload"), root.join("doc.pdf")).unwrap();
        });

        let path = area
            .await_artifact(ArtifactKind::Document, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(path, temp.path().join("doc.pdf"));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_await_artifact_rejects_wrong_kind() {
        let temp = TempDir::new().unwrap();
        let area = staging(&temp);
        std::fs::write(temp.path().join("export.pdf"), b"x").unwrap();

        let err = area
            .await_artifact(ArtifactKind::Manifest, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::UnexpectedArtifact { .. }));
    }

    #[tokio::test]
    async fn test_await_artifact_accepts_csv_for_manifest() {
        let temp = TempDir::new().unwrap();
        let area = staging(&temp);
        std::fs::write(temp.path().join("export.csv"), b"a,b").unwrap();

        let path = area
            .await_artifact(ArtifactKind::Manifest, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(path, temp.path().join("export.csv"));
    }
}
