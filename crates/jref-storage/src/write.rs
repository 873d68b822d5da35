use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::header::{ArtifactKind, Compression, StorageHeader, HEADER_LEN};
use crate::read::{content_hash, StorageError};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Serializes `value` and atomically replaces `path` with the new archive.
///
/// The archive is written to a unique sibling temp file, synced, then renamed
/// over the destination so readers observe either the old or the new file.
pub fn write_archive_atomic<T>(
    path: &Path,
    kind: ArtifactKind,
    schema_version: u32,
    value: &T,
    compression: Compression,
) -> Result<(), StorageError>
where
    T: rkyv::Archive + rkyv::Serialize<rkyv::ser::serializers::AllocSerializer<256>>,
{
    let parent = path
        .parent()
        .ok_or(StorageError::InvalidHeader("missing parent directory"))?;
    fs::create_dir_all(parent)?;

    let archived =
        rkyv::to_bytes::<_, 256>(value).map_err(|e| StorageError::Validation(e.to_string()))?;
    let uncompressed = archived.as_slice();
    let payload = match compression {
        Compression::None => uncompressed.to_vec(),
        Compression::Zstd => zstd::bulk::compress(uncompressed, 0)
            .map_err(|e| StorageError::Decompression(e.to_string()))?,
    };

    let header = StorageHeader::new(
        kind,
        schema_version,
        compression,
        payload.len() as u64,
        uncompressed.len() as u64,
        content_hash(uncompressed),
    );

    let (tmp_path, mut file) = open_unique_tmp_file(path, parent)?;
    let result = (|| -> Result<(), StorageError> {
        file.write_all(&header.encode())?;
        file.write_all(&payload)?;
        file.sync_all()?;
        drop(file);
        rename_overwrite(&tmp_path, path)?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    tracing::trace!(
        target: "jref.storage",
        path = %path.display(),
        bytes = HEADER_LEN + payload.len(),
        "wrote archive"
    );
    Ok(())
}

fn rename_overwrite(tmp_path: &Path, dest: &Path) -> io::Result<()> {
    const MAX_RENAME_ATTEMPTS: usize = 1024;
    let mut attempts = 0usize;

    loop {
        match fs::rename(tmp_path, dest) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists || dest.exists() => {
                // Windows `rename` does not overwrite.
                let _ = fs::remove_file(dest);
                attempts += 1;
                if attempts >= MAX_RENAME_ATTEMPTS {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}
