use byteorder::{ByteOrder, LittleEndian};

use crate::read::StorageError;

pub const HEADER_LEN: usize = 64;

const MAGIC: &[u8; 8] = b"JREFARC\0";
const HEADER_VERSION: u16 = 1;
const VERSION_FIELD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArtifactKind {
    /// Snapshot of one root's inverted document index.
    DocumentSegment = 1,
}

impl ArtifactKind {
    fn from_u16(value: u16) -> Result<Self, StorageError> {
        match value {
            1 => Ok(ArtifactKind::DocumentSegment),
            _ => Err(StorageError::InvalidHeader("unknown artifact kind")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    Zstd = 1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHeader {
    pub kind: ArtifactKind,
    pub schema_version: u32,
    pub crate_version: String,
    pub little_endian: bool,
    pub pointer_width: u8,
    pub compression: Compression,
    pub payload_offset: u32,
    pub payload_len: u64,
    pub uncompressed_len: u64,
    pub content_hash: u64,
}

impl StorageHeader {
    pub fn new(
        kind: ArtifactKind,
        schema_version: u32,
        compression: Compression,
        payload_len: u64,
        uncompressed_len: u64,
        content_hash: u64,
    ) -> Self {
        Self {
            kind,
            schema_version,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            little_endian: cfg!(target_endian = "little"),
            pointer_width: (usize::BITS / 8) as u8,
            compression,
            payload_offset: HEADER_LEN as u32,
            payload_len,
            uncompressed_len,
            content_hash,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..8].copy_from_slice(MAGIC);
        LittleEndian::write_u16(&mut out[8..10], HEADER_VERSION);
        LittleEndian::write_u16(&mut out[10..12], self.kind as u16);
        LittleEndian::write_u32(&mut out[12..16], self.schema_version);
        let version = self.crate_version.as_bytes();
        let len = version.len().min(VERSION_FIELD_LEN);
        out[16..16 + len].copy_from_slice(&version[..len]);
        out[32] = u8::from(!self.little_endian);
        out[33] = self.pointer_width;
        out[34] = self.compression as u8;
        LittleEndian::write_u32(&mut out[36..40], self.payload_offset);
        LittleEndian::write_u64(&mut out[40..48], self.payload_len);
        LittleEndian::write_u64(&mut out[48..56], self.uncompressed_len);
        LittleEndian::write_u64(&mut out[56..64], self.content_hash);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < HEADER_LEN {
            return Err(StorageError::Truncated {
                expected: HEADER_LEN,
                found: bytes.len(),
            });
        }
        if &bytes[0..8] != MAGIC {
            return Err(StorageError::InvalidHeader("bad magic"));
        }
        if LittleEndian::read_u16(&bytes[8..10]) != HEADER_VERSION {
            return Err(StorageError::InvalidHeader("unsupported header version"));
        }
        let version_field = &bytes[16..16 + VERSION_FIELD_LEN];
        let version_end = version_field
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(VERSION_FIELD_LEN);
        let crate_version = std::str::from_utf8(&version_field[..version_end])
            .map_err(|_| StorageError::InvalidHeader("version is not utf-8"))?
            .to_string();
        let compression = match bytes[34] {
            0 => Compression::None,
            1 => Compression::Zstd,
            other => return Err(StorageError::UnsupportedCompression(other)),
        };

        Ok(Self {
            kind: ArtifactKind::from_u16(LittleEndian::read_u16(&bytes[10..12]))?,
            schema_version: LittleEndian::read_u32(&bytes[12..16]),
            crate_version,
            little_endian: bytes[32] == 0,
            pointer_width: bytes[33],
            compression,
            payload_offset: LittleEndian::read_u32(&bytes[36..40]),
            payload_len: LittleEndian::read_u64(&bytes[40..48]),
            uncompressed_len: LittleEndian::read_u64(&bytes[48..56]),
            content_hash: LittleEndian::read_u64(&bytes[56..64]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = StorageHeader::new(ArtifactKind::DocumentSegment, 7, Compression::Zstd, 10, 20, 99);
        let decoded = StorageHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn bad_magic() {
        let mut bytes =
            StorageHeader::new(ArtifactKind::DocumentSegment, 1, Compression::None, 0, 0, 0).encode();
        bytes[0] = b'X';
        assert!(matches!(
            StorageHeader::decode(&bytes),
            Err(StorageError::InvalidHeader("bad magic"))
        ));
    }
}
