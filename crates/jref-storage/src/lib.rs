//! Validated on-disk archives for jref's persisted index segments.
//!
//! ## Format
//! Each artifact is stored as:
//! - a fixed-size header (64 bytes, little-endian)
//! - a payload containing an `rkyv` archived root object
//!
//! The header records the artifact kind, schema version, producing crate
//! version, endianness and pointer width, the compression flag, and a blake3
//! derived content hash of the uncompressed payload. Any mismatch makes the
//! artifact unreadable rather than silently wrong.

mod header;
mod read;
mod write;

pub use header::{ArtifactKind, Compression, StorageHeader, HEADER_LEN};
pub use read::{read_archive, read_archive_optional, CheckableArchived, StorageError};
pub use write::write_archive_atomic;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
    #[archive(check_bytes)]
    struct Sample {
        a: u32,
        b: String,
        values: Vec<u64>,
    }

    fn sample() -> Sample {
        Sample {
            a: 42,
            b: "hello".to_string(),
            values: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn round_trip_both_compressions() {
        let dir = tempfile::TempDir::new().unwrap();
        for (name, compression) in [("plain.bin", Compression::None), ("z.bin", Compression::Zstd)] {
            let path = dir.path().join(name);
            write_archive_atomic(&path, ArtifactKind::DocumentSegment, 3, &sample(), compression)
                .unwrap();
            let loaded: Sample = read_archive(&path, ArtifactKind::DocumentSegment, 3).unwrap();
            assert_eq!(loaded, sample());
        }
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let loaded: Option<Sample> = read_archive_optional(
            &dir.path().join("absent.bin"),
            ArtifactKind::DocumentSegment,
            1,
        )
        .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sample.bin");
        write_archive_atomic(&path, ArtifactKind::DocumentSegment, 1, &sample(), Compression::None)
            .unwrap();
        let err = read_archive::<Sample>(&path, ArtifactKind::DocumentSegment, 2).unwrap_err();
        assert!(matches!(err, StorageError::WrongSchema { expected: 2, found: 1 }));
    }

    #[test]
    fn truncated_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sample.bin");
        write_archive_atomic(&path, ArtifactKind::DocumentSegment, 1, &sample(), Compression::None)
            .unwrap();

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len((HEADER_LEN - 1) as u64).unwrap();

        let err = read_archive::<Sample>(&path, ArtifactKind::DocumentSegment, 1).unwrap_err();
        assert!(matches!(err, StorageError::Truncated { .. }), "{err:?}");
    }

    #[test]
    fn flipped_payload_byte_is_hash_mismatch() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sample.bin");
        write_archive_atomic(&path, ArtifactKind::DocumentSegment, 1, &sample(), Compression::None)
            .unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        // The string "hello" sits inline in the payload; corrupt its first byte.
        let pos = bytes
            .windows(5)
            .position(|w| w == b"hello")
            .expect("payload contains string");
        bytes[pos] = b'j';
        std::fs::write(&path, &bytes).unwrap();

        let err = read_archive::<Sample>(&path, ArtifactKind::DocumentSegment, 1).unwrap_err();
        assert!(matches!(err, StorageError::HashMismatch { .. }), "{err:?}");
    }
}
