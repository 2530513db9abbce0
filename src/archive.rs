//! Artifact packaging
//!
//! Compresses a request's capture directory into a single zip archive.
//! Entries are flat (no directory prefix) and written at maximum
//! Deflate compression. The archive is flushed and synced to disk
//! before this module returns; callers must not publish an archive path
//! until `package` has completed.

use crate::error::{ArchiveError, Error, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Compress every regular file in `dir` into a zip at `archive_path`.
///
/// Entry order is sorted by name so identical directories produce
/// identical archives. The zip work runs on the blocking pool.
#[instrument]
pub async fn package(dir: &Path, archive_path: &Path) -> Result<()> {
    let dir = dir.to_path_buf();
    let archive_path = archive_path.to_path_buf();

    tokio::task::spawn_blocking(move || write_zip(&dir, &archive_path))
        .await
        .map_err(|e| Error::Archive(ArchiveError::WriteFailed(e.to_string())))??;

    Ok(())
}

fn write_zip(dir: &Path, archive_path: &Path) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| ArchiveError::ReadDirFailed(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    let file =
        File::create(archive_path).map_err(|e| ArchiveError::WriteFailed(e.to_string()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    for path in &entries {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ArchiveError::WriteFailed(format!("unrepresentable name: {:?}", path)))?;

        zip.start_file(name, options)
            .map_err(|e| ArchiveError::WriteFailed(e.to_string()))?;
        let mut input =
            File::open(path).map_err(|e| ArchiveError::WriteFailed(e.to_string()))?;
        io::copy(&mut input, &mut zip).map_err(|e| ArchiveError::WriteFailed(e.to_string()))?;
        debug!("Packed {}", name);
    }

    let mut writer = zip
        .finish()
        .map_err(|e| ArchiveError::WriteFailed(e.to_string()))?;
    writer
        .flush()
        .map_err(|e| ArchiveError::WriteFailed(e.to_string()))?;
    // Durable before handoff: the download path serves this file the
    // moment the index is updated.
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| ArchiveError::WriteFailed(e.to_string()))?;

    info!(
        entries = entries.len(),
        archive = %archive_path.display(),
        "Archive written"
    );
    Ok(())
}
