// 📦 Archive Extractor
//
// Opens a compressed result archive, extracts everything into a private
// temporary directory and locates the single result document (`*.hy3`).
// The temporary directory belongs to the returned `ExtractedDocument` and is
// removed when it is dropped, on success and error paths alike.

use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::audit::{AuditEntry, AuditKind};
use crate::error::{IngestError, Result};

/// File extension of the result document inside an archive.
pub const RESULT_DOCUMENT_EXTENSION: &str = "hy3";

/// A result document materialised on disk for the duration of one item.
#[derive(Debug)]
pub struct ExtractedDocument {
    workdir: TempDir,
    document: PathBuf,
    warnings: Vec<AuditEntry>,
}

impl ExtractedDocument {
    pub fn path(&self) -> &Path {
        &self.document
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Non-fatal findings made while extracting.
    pub fn warnings(&self) -> &[AuditEntry] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<AuditEntry> {
        std::mem::take(&mut self.warnings)
    }

    /// Read the document as lines, decoding invalid UTF-8 lossily.
    pub fn read_lines(&self) -> Result<Vec<String>> {
        let bytes = std::fs::read(&self.document)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(text.lines().map(|line| line.to_string()).collect())
    }
}

fn is_result_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(RESULT_DOCUMENT_EXTENSION))
        .unwrap_or(false)
}

/// Extract `archive_path` into a fresh directory under the system temp dir
/// and find its result document.
pub fn extract_result_document(archive_path: &Path) -> Result<ExtractedDocument> {
    extract_with(archive_path, None)
}

/// Same as `extract_result_document`, with the working directory created
/// under `parent`.
pub fn extract_result_document_in(archive_path: &Path, parent: &Path) -> Result<ExtractedDocument> {
    extract_with(archive_path, Some(parent))
}

fn extract_with(archive_path: &Path, parent: Option<&Path>) -> Result<ExtractedDocument> {
    let unreadable = |reason: String| IngestError::ArchiveUnreadable {
        path: archive_path.to_path_buf(),
        reason,
    };

    let file = File::open(archive_path).map_err(|e| unreadable(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| unreadable(e.to_string()))?;

    let entries: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();

    let mut builder = tempfile::Builder::new();
    builder.prefix("hy3_");
    let workdir = match parent {
        Some(parent) => builder.tempdir_in(parent)?,
        None => builder.tempdir()?,
    };
    archive
        .extract(workdir.path())
        .map_err(|e| unreadable(e.to_string()))?;

    let mut candidates: Vec<PathBuf> = WalkDir::new(workdir.path())
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_result_document(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    candidates.sort();

    let mut warnings = Vec::new();
    let document = match candidates.len() {
        0 => {
            return Err(IngestError::MissingResultDocument {
                path: archive_path.to_path_buf(),
                entries,
            });
        }
        1 => candidates.remove(0),
        n => {
            let names: Vec<String> = candidates
                .iter()
                .filter_map(|p| p.strip_prefix(workdir.path()).ok())
                .map(|p| p.display().to_string())
                .collect();
            tracing::warn!(
                archive = %archive_path.display(),
                count = n,
                "Multiple result documents, using the first"
            );
            warnings.push(
                AuditEntry::new(
                    AuditKind::MultipleResultDocuments,
                    format!("{} result documents found; parsing {}", n, names[0]),
                )
                .with_context(serde_json::json!({
                    "archive": archive_path.display().to_string(),
                    "files": names,
                })),
            );
            candidates.remove(0)
        }
    };

    tracing::debug!(
        archive = %archive_path.display(),
        document = %document.display(),
        "Extracted result document"
    );

    Ok(ExtractedDocument {
        workdir,
        document,
        warnings,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::path::Path;

    /// Write a zip at `path` holding the given (name, contents) entries.
    pub fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, contents) in files {
            zip.start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::write_zip;
    use super::*;

    #[test]
    fn test_finds_single_document() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("meet.zip");
        write_zip(
            &archive,
            &[("Meet Results.HY3", "B1 line\n"), ("Meet Results.cl2", "x")],
        );

        let extracted = extract_result_document(&archive).unwrap();
        assert!(extracted.path().ends_with("Meet Results.HY3"));
        assert_eq!(extracted.read_lines().unwrap(), vec!["B1 line".to_string()]);
        assert!(extracted.warnings().is_empty());
    }

    #[test]
    fn test_missing_document_is_structural_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("meet.zip");
        write_zip(&archive, &[("readme.txt", "nothing here")]);

        match extract_result_document(&archive) {
            Err(IngestError::MissingResultDocument { entries, .. }) => {
                assert_eq!(entries, vec!["readme.txt".to_string()]);
            }
            other => panic!("expected MissingResultDocument, got {:?}", other),
        }
    }

    #[test]
    fn test_not_a_zip_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        assert!(matches!(
            extract_result_document(&archive),
            Err(IngestError::ArchiveUnreadable { .. })
        ));
    }

    #[test]
    fn test_workdir_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("meet.zip");
        write_zip(&archive, &[("results/a.hy3", "B1\n")]);

        let extracted = extract_result_document(&archive).unwrap();
        let workdir = extracted.workdir().to_path_buf();
        assert!(workdir.exists());

        drop(extracted);
        assert!(!workdir.exists());
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[test]
    fn test_workdir_removed_when_document_missing() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let archive = dir.path().join("meet.zip");
        write_zip(&archive, &[("notes/readme.txt", "nothing here")]);

        let result = extract_result_document_in(&archive, scratch.path());
        assert!(matches!(result, Err(IngestError::MissingResultDocument { .. })));
        assert!(is_empty_dir(scratch.path()));
    }

    #[test]
    fn test_workdir_removed_when_extraction_fails() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let archive = dir.path().join("meet.zip");
        // First entry lands in the workdir, the second escapes it and is refused
        write_zip(&archive, &[("first.hy3", "B1\n"), ("../escape.hy3", "B1\n")]);

        let result = extract_result_document_in(&archive, scratch.path());
        assert!(matches!(result, Err(IngestError::ArchiveUnreadable { .. })));
        assert!(is_empty_dir(scratch.path()));
    }

    #[test]
    fn test_workdir_created_under_parent() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let archive = dir.path().join("meet.zip");
        write_zip(&archive, &[("a.hy3", "B1\n")]);

        let extracted = extract_result_document_in(&archive, scratch.path()).unwrap();
        assert!(extracted.workdir().starts_with(scratch.path()));
        assert!(!is_empty_dir(scratch.path()));

        drop(extracted);
        assert!(is_empty_dir(scratch.path()));
    }

    #[test]
    fn test_multiple_documents_warns_and_uses_first() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("meet.zip");
        write_zip(&archive, &[("b.hy3", "second"), ("a.hy3", "first")]);

        let extracted = extract_result_document(&archive).unwrap();
        assert!(extracted.path().ends_with("a.hy3"));
        assert_eq!(extracted.warnings().len(), 1);
        assert_eq!(
            extracted.warnings()[0].kind,
            AuditKind::MultipleResultDocuments
        );
    }
}
