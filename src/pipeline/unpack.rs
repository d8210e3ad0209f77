//! Result unpacking: persist the service archive and pull the structured data out of it.
//!
//! The archive is a zip container. Only the first entry whose name contains
//! `structuredData.json` is parsed; rendered table and figure images stay in
//! the archive on disk for anyone who wants them.

use crate::error::DeckError;
use crate::model::Document;
use crate::pipeline::extract::ServiceResult;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name fragment identifying the structured-content entry.
pub const STRUCTURED_DATA_ENTRY: &str = "structuredData.json";

/// Save `result` at `destination` and parse its structured data.
///
/// Any file already at `destination` is replaced. Returns `Ok(None)` when the
/// archive holds no structured-data entry.
pub async fn unpack(
    result: &ServiceResult,
    destination: &Path,
) -> Result<Option<Document>, DeckError> {
    if tokio::fs::try_exists(destination).await.unwrap_or(false) {
        debug!("Replacing existing archive {}", destination.display());
        tokio::fs::remove_file(destination)
            .await
            .map_err(|e| DeckError::OutputWriteFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;
    }
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DeckError::OutputWriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    result
        .save_as(destination)
        .await
        .map_err(|e| DeckError::OutputWriteFailed {
            path: destination.to_path_buf(),
            source: e,
        })?;

    let path = destination.to_path_buf();
    tokio::task::spawn_blocking(move || read_structured_data(&path))
        .await
        .map_err(|e| DeckError::Internal(format!("Unpack task panicked: {e}")))?
}

/// Parse the structured-data entry of the zip archive at `path`.
pub fn read_structured_data(path: &Path) -> Result<Option<Document>, DeckError> {
    let file = std::fs::File::open(path).map_err(|e| archive_error(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| archive_error(path, e))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| archive_error(path, e))?;
        if !entry.name().contains(STRUCTURED_DATA_ENTRY) {
            continue;
        }
        debug!("Reading '{}' from {}", entry.name(), path.display());
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| archive_error(path, e))?;
        return Document::from_slice(&bytes).map(Some);
    }

    warn!(
        "No {} entry in {} ({} entries)",
        STRUCTURED_DATA_ENTRY,
        path.display(),
        archive.len()
    );
    Ok(None)
}

/// Names of every entry in the archive at `path`, in archive order.
pub fn entry_names(path: &Path) -> Result<Vec<String>, DeckError> {
    let file = std::fs::File::open(path).map_err(|e| archive_error(path, e))?;
    let archive = zip::ZipArchive::new(file).map_err(|e| archive_error(path, e))?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Where the archive for `base_name` is persisted under `dir`.
pub fn archive_path(dir: &Path, base_name: &str) -> PathBuf {
    dir.join(format!("{base_name}-output.zip"))
}

fn archive_error(path: &Path, e: impl std::fmt::Display) -> DeckError {
    DeckError::Archive {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    /// Build an in-memory zip with the given `(name, contents)` entries.
    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const STRUCTURED: &[u8] =
        br#"{"version":{"json_export":"1.0"},"elements":[{"Path":"//Document/H1","Text":"Acme Robotics ","Page":1,"Bounds":[10,700,300,740]}]}"#;

    #[tokio::test]
    async fn unpacks_structured_data() {
        let dir = tempfile::tempdir().unwrap();
        let dest = archive_path(dir.path(), "acme");
        let result = ServiceResult::new(
            None,
            zip_bytes(&[
                ("tables/fileoutpart0.png", b"\x89PNG"),
                (STRUCTURED_DATA_ENTRY, STRUCTURED),
            ]),
        );

        let doc = unpack(&result, &dest).await.unwrap().unwrap();
        assert_eq!(doc.elements.len(), 1);
        assert_eq!(doc.elements[0].text.as_deref(), Some("Acme Robotics "));
        assert!(dest.exists());
        assert_eq!(entry_names(&dest).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_entry_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.zip");
        let result = ServiceResult::new(None, zip_bytes(&[("figures/f1.png", b"img")]));

        assert!(unpack(&result, &dest).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn existing_destination_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.zip");
        std::fs::write(&dest, b"stale bytes from an earlier run").unwrap();

        let result = ServiceResult::new(None, zip_bytes(&[(STRUCTURED_DATA_ENTRY, STRUCTURED)]));
        let doc = unpack(&result, &dest).await.unwrap();
        assert!(doc.is_some());
        assert_eq!(std::fs::read(&dest).unwrap(), result.archive());
    }

    #[test]
    fn first_matching_entry_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.zip");
        std::fs::write(
            &path,
            zip_bytes(&[
                ("a/structuredData.json", br#"{"elements":[{"Text":"first"}]}"#),
                ("b/structuredData.json", br#"{"elements":[{"Text":"second"}]}"#),
            ]),
        )
        .unwrap();

        let doc = read_structured_data(&path).unwrap().unwrap();
        assert_eq!(doc.elements[0].text.as_deref(), Some("first"));
    }

    #[test]
    fn corrupt_archive_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let err = read_structured_data(&path).unwrap_err();
        assert!(matches!(err, DeckError::Archive { .. }));
    }

    #[test]
    fn unparseable_payload_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.zip");
        std::fs::write(&path, zip_bytes(&[(STRUCTURED_DATA_ENTRY, b"{not json")])).unwrap();

        let err = read_structured_data(&path).unwrap_err();
        assert!(matches!(err, DeckError::Schema(_)));
    }
}
