//! Integrity framing for `SessionStore` state dumps.
//!
//! A `SessionStore` adapter that persists `ResearchState` as an opaque blob
//! (e.g. bincode) can wrap it with [`CheckpointWithIntegrity::wrap`] before
//! writing and unwrap with [`CheckpointWithIntegrity::unwrap`] on read to
//! detect truncated writes or bit-level corruption. This scheme — magic
//! bytes, format version, CRC32, declared length — mirrors the core engine's
//! own checkpoint file format one-for-one.

use thiserror::Error;

const MAGIC: &[u8; 4] = b"RSCH";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 20;

/// Integrity failure detected while unwrapping a state dump.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum CheckpointIntegrityError {
    /// The blob is too small to contain a valid header.
    #[error("state dump too small: {size} bytes (minimum {minimum})")]
    FileTooSmall {
        /// Actual size in bytes.
        size: usize,
        /// Minimum required size.
        minimum: usize,
    },
    /// Magic bytes don't match.
    #[error("invalid state dump magic: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: [u8; 4],
        /// Magic bytes actually found.
        found: [u8; 4],
    },
    /// Format version newer than this build understands.
    #[error("unsupported state dump version: found {found}, supported up to {supported}")]
    UnsupportedVersion {
        /// Version found.
        found: u32,
        /// Highest version this build supports.
        supported: u32,
    },
    /// CRC32 mismatch: payload corrupted.
    #[error("state dump checksum mismatch: expected 0x{expected:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch {
        /// Checksum stored in the header.
        expected: u32,
        /// Checksum computed over the payload.
        computed: u32,
    },
    /// Declared payload length disagrees with actual length.
    #[error("state dump length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch {
        /// Length declared in the header.
        declared: u64,
        /// Actual payload length.
        actual: u64,
    },
}

/// Wraps/unwraps a byte payload with a fixed 20-byte integrity header:
/// magic(4) + version(4) + crc32(4) + length(8).
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointWithIntegrity;

impl CheckpointWithIntegrity {
    /// Prepend an integrity header to `data`.
    pub fn wrap(data: &[u8]) -> Vec<u8> {
        let checksum = crc32fast::hash(data);
        let length = data.len() as u64;

        let mut out = Vec::with_capacity(HEADER_SIZE + data.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    /// Verify and strip the integrity header, returning the payload.
    pub fn unwrap(data: &[u8]) -> Result<&[u8], CheckpointIntegrityError> {
        if data.len() < HEADER_SIZE {
            return Err(CheckpointIntegrityError::FileTooSmall {
                size: data.len(),
                minimum: HEADER_SIZE,
            });
        }

        let magic: [u8; 4] = data[0..4]
            .try_into()
            .map_err(|_| CheckpointIntegrityError::FileTooSmall { size: data.len(), minimum: HEADER_SIZE })?;
        if &magic != MAGIC {
            return Err(CheckpointIntegrityError::InvalidMagic {
                expected: *MAGIC,
                found: magic,
            });
        }

        let version = u32::from_le_bytes(data[4..8].try_into().unwrap_or_default());
        if version > FORMAT_VERSION {
            return Err(CheckpointIntegrityError::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }

        let stored_checksum = u32::from_le_bytes(data[8..12].try_into().unwrap_or_default());
        let declared_length = u64::from_le_bytes(data[12..20].try_into().unwrap_or_default());

        let payload = &data[HEADER_SIZE..];
        let actual_length = payload.len() as u64;
        if declared_length != actual_length {
            return Err(CheckpointIntegrityError::LengthMismatch {
                declared: declared_length,
                actual: actual_length,
            });
        }

        let computed = crc32fast::hash(payload);
        if computed != stored_checksum {
            return Err(CheckpointIntegrityError::ChecksumMismatch {
                expected: stored_checksum,
                computed,
            });
        }

        Ok(payload)
    }
}
