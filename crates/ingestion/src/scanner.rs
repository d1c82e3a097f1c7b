//! Source document discovery

use crate::errors::IngestionError;
use std::path::Path;
use tracing::{debug, warn};

/// One document to vectorize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub filename: String,
    pub text: String,
}

/// Read every non-empty file with `extension` directly under `dir`
///
/// Documents are returned sorted by filename. Unreadable files are skipped.
/// Finding none is an error.
pub fn scan_directory(dir: &Path, extension: &str) -> Result<Vec<SourceDocument>, IngestionError> {
    let mut documents = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if !path.is_file() || path.extension().map_or(true, |e| e != extension) {
            continue;
        }

        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => debug!(%filename, "Skipping empty file"),
            Ok(text) => documents.push(SourceDocument { filename, text }),
            Err(e) => warn!(%filename, error = %e, "Skipping unreadable file"),
        }
    }

    if documents.is_empty() {
        return Err(IngestionError::NoSourceFiles {
            dir: dir.display().to_string(),
            extension: extension.to_string(),
        });
    }

    documents.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("oncorag-scan-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = scratch_dir("filters");
        std::fs::write(dir.join("b_breast.txt"), "Tamoxifen for ER-positive disease.").unwrap();
        std::fs::write(dir.join("a_lung.txt"), "Lobectomy for stage II.").unwrap();
        std::fs::write(dir.join("empty.txt"), "  \n").unwrap();
        std::fs::write(dir.join("notes.md"), "# not ingested").unwrap();
        std::fs::create_dir_all(dir.join("nested.txt")).unwrap();

        let documents = scan_directory(&dir, "txt").unwrap();
        let names: Vec<_> = documents.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a_lung.txt", "b_breast.txt"]);
        assert_eq!(documents[0].text, "Lobectomy for stage II.");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_scan_without_documents_is_error() {
        let dir = scratch_dir("none");
        std::fs::write(dir.join("empty.txt"), "").unwrap();

        assert!(matches!(
            scan_directory(&dir, "txt"),
            Err(IngestionError::NoSourceFiles { .. })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = std::env::temp_dir().join("oncorag-scan-does-not-exist");
        assert!(matches!(scan_directory(&dir, "txt"), Err(IngestionError::Io(_))));
    }
}
