//! Multi-segment framing.
//!
//! A TCF record is a `.`-separated sequence of independently
//! base64url-encoded segments. The first segment is positionally the core;
//! every other segment self-identifies through a leading 3-bit tag. Parsing
//! is a single forward pass producing an explicit list of classified
//! segments; lookup by tag is a linear scan (at most three optional
//! segments exist).

use crate::core::base64::{encode_base64_url, DecodeExt};
use crate::core::bits::{BitBuffer, BitSource, BitWriter, BitsError};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::collections::BTreeSet;
use strum_macros::Display;
use thiserror::Error;

/// Width of the tag carried by every non-core segment.
pub const SEGMENT_TYPE_WIDTH: u32 = 3;

/// The self-identifying tag of a segment.
///
/// `Core` is reserved: it never appears standalone, the core segment is
/// identified by position alone.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash, FromPrimitive)]
pub enum SegmentType {
    Core = 0,
    DisclosedVendors = 1,
    AllowedVendors = 2,
    PublisherPurposes = 3,
}

/// The error type for segment framing.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SegmentError {
    #[error("unable to decode segment")]
    Base64(#[from] base64::DecodeError),
    #[error(transparent)]
    Bits(#[from] BitsError),
    #[error("unknown segment type {segment_type}")]
    UnknownSegmentType { segment_type: u8 },
    #[error("duplicate segment type {segment_type}")]
    DuplicateSegmentType { segment_type: SegmentType },
}

/// One decoded, classified segment.
#[derive(Debug)]
pub struct RawSegment {
    pub segment_type: SegmentType,
    pub buf: BitBuffer,
}

/// Splits a record on `.`, base64url-decodes every piece and classifies it.
///
/// Segment 0 becomes [`SegmentType::Core`] without looking at its content;
/// each later segment is classified by its leading tag. A standalone core
/// tag or a repeated tag rejects the whole record.
pub fn split_segments(s: &str) -> Result<Vec<RawSegment>, SegmentError> {
    let mut segments = Vec::new();
    let mut seen = BTreeSet::new();

    for (i, piece) in s.split('.').enumerate() {
        let buf = BitBuffer::new(piece.decode_base64_url()?);
        let segment_type = if i == 0 {
            SegmentType::Core
        } else {
            let tag = buf.read(0, SEGMENT_TYPE_WIDTH)? as u8;
            match SegmentType::from_u8(tag) {
                None | Some(SegmentType::Core) => {
                    return Err(SegmentError::UnknownSegmentType { segment_type: tag })
                }
                Some(t) => t,
            }
        };
        if !seen.insert(segment_type as u8) {
            return Err(SegmentError::DuplicateSegmentType { segment_type });
        }
        segments.push(RawSegment { segment_type, buf });
    }

    Ok(segments)
}

/// Finds the segment carrying `segment_type`, if present.
///
/// Absence is not an error: every field an absent segment would carry reads
/// as empty.
pub fn find(segments: &[RawSegment], segment_type: SegmentType) -> Option<&BitBuffer> {
    segments
        .iter()
        .find(|s| s.segment_type == segment_type)
        .map(|s| &s.buf)
}

/// Joins the core and the supplied optional segments into one record.
///
/// Each optional payload receives its 3-bit tag here; callers pass only
/// segments that actually carry content, so an all-default segment is
/// omitted rather than emitted as padding. Every part is base64url-encoded
/// independently and joined with `.`, core first.
pub fn compose(
    core: BitWriter,
    extras: Vec<(SegmentType, BitWriter)>,
) -> Result<String, BitsError> {
    let mut parts = vec![encode_base64_url(&core.into_bytes())];
    for (segment_type, payload) in extras {
        let mut w = BitWriter::new();
        w.write(segment_type as u64, SEGMENT_TYPE_WIDTH)?;
        w.append(&payload)?;
        parts.push(encode_base64_url(&w.into_bytes()));
    }
    Ok(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn segment(tag: u8) -> String {
        let mut w = BitWriter::new();
        w.write(u64::from(tag), SEGMENT_TYPE_WIDTH).unwrap();
        w.write(0, 21).unwrap();
        encode_base64_url(&w.into_bytes())
    }

    #[test]
    fn classifies_core_positionally() {
        // a core whose leading bits would misread as tag 3 elsewhere
        let core = encode_base64_url(&[0b0110_0000]);
        let segments = split_segments(&core).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment_type, SegmentType::Core);
    }

    #[test]
    fn classifies_optional_segments_by_tag() {
        let s = format!("{}.{}.{}", segment(0b010), segment(3), segment(1));
        let types = split_segments(&s)
            .unwrap()
            .iter()
            .map(|s| s.segment_type)
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                SegmentType::Core,
                SegmentType::PublisherPurposes,
                SegmentType::DisclosedVendors
            ]
        );
    }

    #[test_case(4)]
    #[test_case(0)]
    fn rejects_bad_standalone_tags(tag: u8) {
        let s = format!("{}.{}", segment(1), segment(tag));
        assert!(matches!(
            split_segments(&s).unwrap_err(),
            SegmentError::UnknownSegmentType { segment_type } if segment_type == tag
        ));
    }

    #[test]
    fn rejects_duplicate_tags() {
        let s = format!("{}.{}.{}", segment(0), segment(2), segment(2));
        assert!(matches!(
            split_segments(&s).unwrap_err(),
            SegmentError::DuplicateSegmentType {
                segment_type: SegmentType::AllowedVendors
            }
        ));
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            split_segments("????").unwrap_err(),
            SegmentError::Base64(_)
        ));
    }

    #[test]
    fn find_reports_absence_as_none() {
        let segments = split_segments(&segment(0)).unwrap();
        assert!(find(&segments, SegmentType::DisclosedVendors).is_none());
        assert!(find(&segments, SegmentType::Core).is_some());
    }

    #[test]
    fn compose_tags_and_joins() {
        let mut core = BitWriter::new();
        core.write(2, 6).unwrap();

        let mut payload = BitWriter::new();
        payload.write(0b10101, 5).unwrap();

        let s = compose(core, vec![(SegmentType::PublisherPurposes, payload)]).unwrap();
        let segments = split_segments(&s).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].segment_type, SegmentType::PublisherPurposes);
        assert_eq!(segments[1].buf.read(3, 5).unwrap(), 0b10101);
    }

    #[test]
    fn compose_without_extras_is_a_single_segment() {
        let mut core = BitWriter::new();
        core.write(1, 6).unwrap();
        let s = compose(core, vec![]).unwrap();
        assert!(!s.contains('.'));
    }
}
