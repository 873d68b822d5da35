use std::path::Path;

use rkyv::Deserialize;
use thiserror::Error;

use crate::header::{ArtifactKind, Compression, StorageHeader, HEADER_LEN};

/// Trait alias for archived roots that can be validated with `rkyv`.
pub trait CheckableArchived:
    for<'a> rkyv::bytecheck::CheckBytes<rkyv::validation::validators::DefaultValidator<'a>>
{
}

impl<T> CheckableArchived for T where
    T: for<'a> rkyv::bytecheck::CheckBytes<rkyv::validation::validators::DefaultValidator<'a>>
{
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("incompatible artifact kind: expected {expected:?}, found {found:?}")]
    WrongArtifact {
        expected: ArtifactKind,
        found: ArtifactKind,
    },
    #[error("incompatible schema version: expected {expected}, found {found}")]
    WrongSchema { expected: u32, found: u32 },
    #[error("incompatible crate version: expected {expected}, found {found}")]
    WrongVersion { expected: String, found: String },
    #[error("incompatible target layout (endianness or pointer width)")]
    WrongTarget,
    #[error("truncated file: expected at least {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("archive validation failed: {0}")]
    Validation(String),
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error("unsupported compression tag {0}")]
    UnsupportedCompression(u8),
    #[error("payload size {payload_len} does not fit into addressable memory")]
    OversizedPayload { payload_len: u64 },
    #[error("payload hash mismatch: expected {expected}, found {found}")]
    HashMismatch { expected: u64, found: u64 },
}

/// Reads, validates and deserializes the archive at `path`.
pub fn read_archive<T>(
    path: &Path,
    expected_kind: ArtifactKind,
    expected_schema: u32,
) -> Result<T, StorageError>
where
    T: rkyv::Archive,
    rkyv::Archived<T>: CheckableArchived + Deserialize<T, rkyv::de::deserializers::SharedDeserializeMap>,
{
    let bytes = std::fs::read(path)?;
    let header = StorageHeader::decode(&bytes)?;
    validate_header(&header, expected_kind, expected_schema)?;

    let payload_offset = header.payload_offset as usize;
    let payload_len: usize =
        header
            .payload_len
            .try_into()
            .map_err(|_| StorageError::OversizedPayload {
                payload_len: header.payload_len,
            })?;
    let end = payload_offset
        .checked_add(payload_len)
        .ok_or(StorageError::InvalidHeader("payload offset overflow"))?;
    if bytes.len() < end {
        return Err(StorageError::Truncated {
            expected: end,
            found: bytes.len(),
        });
    }

    let payload = &bytes[payload_offset..end];
    let mut aligned = rkyv::util::AlignedVec::with_capacity(header.uncompressed_len as usize);
    match header.compression {
        Compression::None => aligned.extend_from_slice(payload),
        Compression::Zstd => aligned.extend_from_slice(&decompress(payload, header.uncompressed_len)?),
    }

    let found = content_hash(&aligned);
    if found != header.content_hash {
        return Err(StorageError::HashMismatch {
            expected: header.content_hash,
            found,
        });
    }

    let archived = rkyv::check_archived_root::<T>(&aligned)
        .map_err(|e| StorageError::Validation(e.to_string()))?;
    let mut deserializer = rkyv::de::deserializers::SharedDeserializeMap::default();
    archived
        .deserialize(&mut deserializer)
        .map_err(|e| StorageError::Validation(e.to_string()))
}

/// Like [`read_archive`], returning `Ok(None)` when the file does not exist.
pub fn read_archive_optional<T>(
    path: &Path,
    expected_kind: ArtifactKind,
    expected_schema: u32,
) -> Result<Option<T>, StorageError>
where
    T: rkyv::Archive,
    rkyv::Archived<T>: CheckableArchived + Deserialize<T, rkyv::de::deserializers::SharedDeserializeMap>,
{
    match read_archive(path, expected_kind, expected_schema) {
        Ok(value) => Ok(Some(value)),
        Err(StorageError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn validate_header(
    header: &StorageHeader,
    expected_kind: ArtifactKind,
    expected_schema: u32,
) -> Result<(), StorageError> {
    if header.kind != expected_kind {
        return Err(StorageError::WrongArtifact {
            expected: expected_kind,
            found: header.kind,
        });
    }
    if header.schema_version != expected_schema {
        return Err(StorageError::WrongSchema {
            expected: expected_schema,
            found: header.schema_version,
        });
    }
    let expected_version = env!("CARGO_PKG_VERSION");
    if header.crate_version != expected_version {
        return Err(StorageError::WrongVersion {
            expected: expected_version.to_string(),
            found: header.crate_version.clone(),
        });
    }
    if header.little_endian != cfg!(target_endian = "little")
        || header.pointer_width as u32 != usize::BITS / 8
    {
        return Err(StorageError::WrongTarget);
    }
    if header.payload_offset as usize != HEADER_LEN {
        return Err(StorageError::InvalidHeader("unexpected payload offset"));
    }
    Ok(())
}

fn decompress(payload: &[u8], uncompressed_len: u64) -> Result<Vec<u8>, StorageError> {
    let len: usize = uncompressed_len
        .try_into()
        .map_err(|_| StorageError::OversizedPayload {
            payload_len: uncompressed_len,
        })?;
    zstd::bulk::decompress(payload, len).map_err(|e| StorageError::Decompression(e.to_string()))
}

pub(crate) fn content_hash(payload: &[u8]) -> u64 {
    let hash = blake3::hash(payload);
    let mut first = [0u8; 8];
    first.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(first)
}
