//! Decoded consent records and their encoders.
//!
//! The two incompatible string layouts are kept apart as a tagged union:
//! [`TcString::V1`] wraps the single-segment legacy format, [`TcString::V2`]
//! the multi-segment format. An accessor that only exists in one version
//! lives on that variant's record type, so "unsupported in this version" is
//! a compile-time property rather than a runtime failure.
//!
//! Records decode lazily: constructing one reads nothing but the version
//! field, and each accessor resolves just the layout it needs, memoized per
//! record. [`TcString::decode_eager`] forces every field immediately
//! instead, so the returned record never touches its memo again and can be
//! shared freely.

use crate::core::bits::{BitSource, BitWriter, BitsError};
use crate::core::idset::IdSetError;
use crate::core::layout::LayoutError;
use crate::segments::{split_segments, SegmentError};
use std::str::FromStr;
use thiserror::Error;

pub mod v1;
pub mod v2;

use v1::TcfV1Record;
use v2::TcfV2Record;

const VERSION_WIDTH: u32 = 6;
const TIMESTAMP_WIDTH: u32 = 36;

/// The error type for TC string decoding operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Bits(#[from] BitsError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    IdSet(#[from] IdSetError),
    /// The version field names a layout this crate has no catalog for;
    /// nothing past the version field is read.
    #[error("unsupported version {found}")]
    UnsupportedVersion { found: u8 },
    /// A version 1 string carries exactly one segment.
    #[error("version 1 strings are single-segment, found {found} segments")]
    UnexpectedSegments { found: usize },
}

/// The error type for TC string encoding operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EncodeError {
    #[error(transparent)]
    Bits(#[from] BitsError),
    #[error(transparent)]
    IdSet(#[from] IdSetError),
    /// A timestamp whose decisecond representation exceeds 36 bits.
    #[error("timestamp {seconds}s does not fit the 36-bit decisecond field")]
    TimestampOutOfRange { seconds: u64 },
    /// A language or country code that is not exactly two letters.
    #[error("invalid 2-letter code {code:?}")]
    InvalidCode { code: String },
}

/// A decoded TC string, either layout.
#[derive(Debug)]
pub enum TcString {
    V1(TcfV1Record),
    V2(TcfV2Record),
}

impl TcString {
    /// Decodes a record lazily: segments are split and classified, the
    /// version is read, and everything else waits for its accessor.
    pub fn decode(s: &str) -> Result<Self, DecodeError> {
        let segments = split_segments(s)?;
        let core = &segments[0].buf;
        let version = core.read(0, VERSION_WIDTH)? as u8;
        match version {
            1 => {
                if segments.len() > 1 {
                    return Err(DecodeError::UnexpectedSegments {
                        found: segments.len(),
                    });
                }
                let mut segments = segments;
                Ok(Self::V1(TcfV1Record::new(segments.remove(0).buf)))
            }
            2 => Ok(Self::V2(TcfV2Record::from_segments(segments)?)),
            found => Err(DecodeError::UnsupportedVersion { found }),
        }
    }

    /// Decodes and forces every field immediately.
    ///
    /// This is a shareability feature more than a performance one: a fully
    /// forced record never writes to its resolution memo again, so it can
    /// be handed to other threads as plain read-only data.
    pub fn decode_eager(s: &str) -> Result<Self, DecodeError> {
        let record = Self::decode(s)?;
        match &record {
            Self::V1(r) => r.force()?,
            Self::V2(r) => r.force()?,
        }
        Ok(record)
    }

    pub fn version(&self) -> u8 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    pub fn as_v1(&self) -> Option<&TcfV1Record> {
        match self {
            Self::V1(r) => Some(r),
            Self::V2(_) => None,
        }
    }

    pub fn as_v2(&self) -> Option<&TcfV2Record> {
        match self {
            Self::V1(_) => None,
            Self::V2(r) => Some(r),
        }
    }

    pub fn created(&self) -> Result<u64, DecodeError> {
        match self {
            Self::V1(r) => r.created(),
            Self::V2(r) => r.created(),
        }
    }

    pub fn last_updated(&self) -> Result<u64, DecodeError> {
        match self {
            Self::V1(r) => r.last_updated(),
            Self::V2(r) => r.last_updated(),
        }
    }

    pub fn cmp_id(&self) -> Result<u16, DecodeError> {
        match self {
            Self::V1(r) => r.cmp_id(),
            Self::V2(r) => r.cmp_id(),
        }
    }

    pub fn consent_language(&self) -> Result<String, DecodeError> {
        match self {
            Self::V1(r) => r.consent_language(),
            Self::V2(r) => r.consent_language(),
        }
    }

    pub fn vendor_consents(&self) -> Result<crate::core::idset::IdSet, DecodeError> {
        match self {
            Self::V1(r) => r.vendor_consents(),
            Self::V2(r) => r.vendor_consents(),
        }
    }
}

impl FromStr for TcString {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Writes a Unix-seconds timestamp as 36 bits of deciseconds.
pub(crate) fn write_timestamp(w: &mut BitWriter, seconds: u64) -> Result<(), EncodeError> {
    let deciseconds = seconds
        .checked_mul(10)
        .filter(|&ds| ds < 1 << TIMESTAMP_WIDTH)
        .ok_or(EncodeError::TimestampOutOfRange { seconds })?;
    w.write(deciseconds, TIMESTAMP_WIDTH)?;
    Ok(())
}

/// Writes a 2-letter uppercase code as two 6-bit values.
pub(crate) fn write_code(w: &mut BitWriter, code: &str) -> Result<(), EncodeError> {
    if code.chars().count() != 2 {
        return Err(EncodeError::InvalidCode {
            code: code.to_string(),
        });
    }
    w.write_letters(code).map_err(|e| match e {
        BitsError::InvalidLetter(_) => EncodeError::InvalidCode {
            code: code.to_string(),
        },
        other => EncodeError::Bits(other),
    })
}

/// Reads a 36-bit decisecond timestamp back to Unix seconds.
pub(crate) fn read_timestamp(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
    Ok(src.read(offset, TIMESTAMP_WIDTH)? / 10)
}
