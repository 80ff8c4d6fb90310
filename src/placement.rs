//! Deterministic file naming and archive folder layout.
//!
//! All names placed into the archive are derived from manifest fields, so a
//! re-run reconstructs the same paths and can detect files that are already
//! in place. Layout: `downloadRoot/<client>_<number>/[<year>/]<name>_<id>.<ext>`.

use std::io;
use std::path::{Path, PathBuf};

use crate::manifest::DocumentRecord;

/// Strips characters that are invalid on common filesystems:
/// / \ : * ? " < > | and control characters.
///
/// Characters are removed rather than replaced so that the result matches
/// names produced by earlier runs of the tool.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .filter(|c| {
            !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') && !c.is_control()
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Builds the archive folder name for a client: `<name>_<number>`, sanitized.
#[must_use]
pub fn client_folder_name(client_name: &str, client_number: &str) -> String {
    sanitize_component(&format!("{client_name}_{client_number}"))
}

/// File extension for a manifest record, defaulting to `pdf` when the
/// manifest leaves the file type blank.
#[must_use]
pub fn record_extension(record: &DocumentRecord) -> &str {
    let ext = record.file_type.trim();
    if ext.is_empty() { "pdf" } else { ext }
}

/// Expected file name for a record before any id suffix:
/// non-empty parts of (client name, year, document type, description)
/// joined with `_`, plus the extension.
///
/// Example: `Acme Co_2019_OTHER_W-2 Form.pdf`.
#[must_use]
pub fn expected_base_name(record: &DocumentRecord) -> String {
    let stem = [
        record.client_name.as_str(),
        record.year.as_str(),
        record.document_type.as_str(),
        record.description.as_str(),
    ]
    .iter()
    .map(|part| sanitize_component(part))
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("_");

    format!("{stem}.{}", record_extension(record))
}

/// Final placed file name: the expected base name with the document id
/// appended before the extension.
///
/// Example: `Acme Co_2019_OTHER_W-2 Form_ABC123.pdf`.
#[must_use]
pub fn final_file_name(record: &DocumentRecord) -> String {
    let base = expected_base_name(record);
    let id = sanitize_component(&record.document_id);
    match base.rfind('.') {
        Some(pos) => format!("{}_{id}{}", &base[..pos], &base[pos..]),
        None => format!("{base}_{id}"),
    }
}

/// Checks whether a retrieved file's name is compatible with the expected
/// base name, ignoring case and the document id suffix the platform may or
/// may not append before the extension.
#[must_use]
pub fn base_name_compatible(observed: &str, expected: &str, document_id: &str) -> bool {
    if observed.eq_ignore_ascii_case(expected) {
        return true;
    }
    let (expected_stem, expected_ext) = split_extension(expected);
    let (observed_stem, observed_ext) = split_extension(observed);
    observed_ext.eq_ignore_ascii_case(expected_ext)
        && observed_stem.eq_ignore_ascii_case(&format!("{expected_stem}_{document_id}"))
}

/// Checks whether a file name carries the document id as a trailing token.
///
/// The id must be the whole stem, or appear at the end of the stem preceded
/// by a non-alphanumeric separator. `Report_ABC123.pdf` matches `ABC123`;
/// `ABC123Report.pdf` does not.
#[must_use]
pub fn stem_matches_document_id(file_name: &str, document_id: &str) -> bool {
    if document_id.is_empty() {
        return false;
    }
    let (stem, _) = split_extension(file_name);
    if stem == document_id {
        return true;
    }
    let Some(prefix) = stem.strip_suffix(document_id) else {
        return false;
    };
    prefix
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_alphanumeric())
}

fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => (&file_name[..pos], &file_name[pos..]),
        _ => (file_name, ""),
    }
}

/// Resolves the placement path for a file: `clientRoot/<year>/<fileName>`
/// when the year is non-empty, else `clientRoot/<fileName>`. Creates any
/// missing directories.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn placement_path(client_root: &Path, year: &str, file_name: &str) -> io::Result<PathBuf> {
    let dir = if year.trim().is_empty() {
        client_root.to_path_buf()
    } else {
        client_root.join(sanitize_component(year))
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(file_name))
}

/// Moves a file to its placement path, renaming when possible and falling
/// back to copy-and-remove across filesystems.
///
/// # Errors
///
/// Returns an error if directory creation or the move fails.
pub fn place_file(
    src: &Path,
    client_root: &Path,
    year: &str,
    file_name: &str,
) -> io::Result<PathBuf> {
    let dest = placement_path(client_root, year, file_name)?;
    move_file(src, &dest)?;
    Ok(dest)
}

/// Relocates a file into a holding directory, appending a unix-seconds
/// suffix to the stem when the name is already taken.
///
/// # Errors
///
/// Returns an error if directory creation or the move fails.
pub fn relocate_to_holding(src: &Path, holding_dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    std::fs::create_dir_all(holding_dir)?;
    let mut dest = holding_dir.join(file_name);
    if dest.exists() {
        let (stem, ext) = split_extension(file_name);
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        dest = holding_dir.join(format!("{stem}_{timestamp}{ext}"));
    }
    move_file(src, &dest)?;
    Ok(dest)
}

fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    // Rename fails across mount points; staging and archive may live on
    // different filesystems.
    std::fs::copy(src, dest)?;
    std::fs::remove_file(src)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record() -> DocumentRecord {
        DocumentRecord {
            client_name: "Acme Co".to_string(),
            client_number: "1042".to_string(),
            section: "Permanent".to_string(),
            document_type: "OTHER".to_string(),
            description: "W-2 Form".to_string(),
            year: "2019".to_string(),
            document_date: "01/15/2019".to_string(),
            file_size: "120 KB".to_string(),
            document_id: "ABC123".to_string(),
            file_type: "pdf".to_string(),
        }
    }

    #[test]
    fn test_sanitize_component_removes_invalid_chars() {
        assert_eq!(sanitize_component("A/B\\C:D*E?F\"G<H>I|J"), "ABCDEFGHIJ");
        assert_eq!(sanitize_component("W-2 Form"), "W-2 Form");
    }

    #[test]
    fn test_sanitize_component_trims_and_drops_control_chars() {
        assert_eq!(sanitize_component("  Acme\tCo  "), "AcmeCo");
    }

    #[test]
    fn test_client_folder_name() {
        assert_eq!(client_folder_name("Acme Co", "1042"), "Acme Co_1042");
        assert_eq!(client_folder_name("A/B Corp", "7"), "AB Corp_7");
    }

    #[test]
    fn test_expected_base_name_joins_nonempty_parts() {
        assert_eq!(expected_base_name(&record()), "Acme Co_2019_OTHER_W-2 Form.pdf");

        let mut no_year = record();
        no_year.year = String::new();
        assert_eq!(expected_base_name(&no_year), "Acme Co_OTHER_W-2 Form.pdf");
    }

    #[test]
    fn test_expected_base_name_defaults_extension_to_pdf() {
        let mut rec = record();
        rec.file_type = String::new();
        assert!(expected_base_name(&rec).ends_with(".pdf"));
    }

    #[test]
    fn test_final_file_name_inserts_id_before_extension() {
        assert_eq!(
            final_file_name(&record()),
            "Acme Co_2019_OTHER_W-2 Form_ABC123.pdf"
        );
    }

    #[test]
    fn test_base_name_compatible_with_and_without_id_suffix() {
        let expected = "Acme Co_2019_OTHER_W-2 Form.pdf";
        assert!(base_name_compatible(expected, expected, "ABC123"));
        assert!(base_name_compatible(
            "Acme Co_2019_OTHER_W-2 Form_ABC123.pdf",
            expected,
            "ABC123"
        ));
        assert!(!base_name_compatible(
            "Something Else.pdf",
            expected,
            "ABC123"
        ));
    }

    #[test]
    fn test_base_name_compatible_ignores_case() {
        let expected = "Acme Co_2019_OTHER_W-2 Form.pdf";
        assert!(base_name_compatible(
            "ACME CO_2019_other_w-2 form.PDF",
            expected,
            "ABC123"
        ));
        assert!(base_name_compatible(
            "acme co_2019_other_w-2 form_abc123.pdf",
            expected,
            "ABC123"
        ));
    }

    #[test]
    fn test_stem_matches_document_id_requires_trailing_token() {
        assert!(stem_matches_document_id("Report_ABC123.pdf", "ABC123"));
        assert!(stem_matches_document_id("ABC123.pdf", "ABC123"));
        assert!(stem_matches_document_id("W-2 Form-ABC123.pdf", "ABC123"));
        assert!(!stem_matches_document_id("ABC123Report.pdf", "ABC123"));
        assert!(!stem_matches_document_id("ReportABC123.pdf", "ABC123"));
        assert!(!stem_matches_document_id("Report_ABC123_v2.pdf", "ABC123"));
        assert!(!stem_matches_document_id("Report.pdf", ""));
    }

    #[test]
    fn test_placement_path_with_year_creates_subfolder() {
        let temp = TempDir::new().unwrap();
        let path = placement_path(temp.path(), "2019", "doc.pdf").unwrap();
        assert_eq!(path, temp.path().join("2019").join("doc.pdf"));
        assert!(temp.path().join("2019").is_dir());
    }

    #[test]
    fn test_placement_path_without_year() {
        let temp = TempDir::new().unwrap();
        let path = placement_path(temp.path(), "  ", "doc.pdf").unwrap();
        assert_eq!(path, temp.path().join("doc.pdf"));
    }

    #[test]
    fn test_place_file_moves_into_year_folder() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("incoming.pdf");
        std::fs::write(&src, b"content").unwrap();
        let client_root = temp.path().join("Acme Co_1042");

        let dest = place_file(&src, &client_root, "2019", "final.pdf").unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read(dest).unwrap(), b"content");
    }

    #[test]
    fn test_relocate_to_holding_keeps_both_files_on_collision() {
        let temp = TempDir::new().unwrap();
        let holding = temp.path().join("0_csv_");

        let first = temp.path().join("a.csv");
        std::fs::write(&first, b"one").unwrap();
        relocate_to_holding(&first, &holding, "Search_Acme.csv").unwrap();

        let second = temp.path().join("b.csv");
        std::fs::write(&second, b"two").unwrap();
        let moved = relocate_to_holding(&second, &holding, "Search_Acme.csv").unwrap();

        assert!(holding.join("Search_Acme.csv").exists());
        assert_ne!(moved, holding.join("Search_Acme.csv"));
        assert_eq!(std::fs::read(moved).unwrap(), b"two");
    }
}
