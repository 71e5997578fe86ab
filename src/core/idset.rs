//! Sparse ID set codec.
//!
//! Vendor and purpose fields carry a set of positive 1-based integer IDs in
//! one of two interchangeable physical representations: a bitfield of
//! exactly `max_id` bits (bit *i* is ID *i+1*), or a list of
//! singleton/interval range entries. The encoder computes both candidate
//! sizes and emits the smaller one; decoders accept either.
//!
//! Range entries are validated strictly: IDs below 1, inverted intervals,
//! or IDs above the declared maximum reject the whole field. Clamping would
//! silently alter consent semantics.

use crate::core::bits::{BitSource, BitWriter, BitsError};
use std::collections::BTreeSet;
use thiserror::Error;

/// A set of 1-based vendor or purpose IDs.
pub type IdSet = BTreeSet<u16>;

const MAX_ID_WIDTH: u32 = 16;
const NUM_ENTRIES_WIDTH: u32 = 12;
const ID_WIDTH: u32 = 16;

/// The error type for sparse ID set decoding and encoding.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IdSetError {
    #[error(transparent)]
    Bits(#[from] BitsError),
    /// A range entry with `start > end`, or an entry naming ID 0.
    #[error("invalid range entry {start}..={end}")]
    InvalidRange { start: u16, end: u16 },
    /// An ID above the declared maximum of the field.
    #[error("id {id} exceeds declared maximum {max_id}")]
    IdAboveMax { id: u16, max_id: u16 },
}

/// A decoded set together with the bit offset just past its encoding.
///
/// The end offset matters because these fields are variable-length and
/// parsing continues right after them.
#[derive(Debug, Eq, PartialEq)]
pub struct DecodedIdSet {
    pub ids: IdSet,
    pub end: u64,
}

/// Decodes the header form: `maxId:16`, `isRangeEncoded:1`, then either a
/// `maxId`-bit bitfield or a range entry list.
pub fn decode(src: &dyn BitSource, offset: u64) -> Result<DecodedIdSet, IdSetError> {
    let max_id = src.read(offset, MAX_ID_WIDTH)? as u16;
    let is_range = src.read_bit(offset + u64::from(MAX_ID_WIDTH))?;
    let body = offset + u64::from(MAX_ID_WIDTH) + 1;
    if is_range {
        decode_entries(src, body, Some(max_id))
    } else {
        decode_bitfield(src, body, max_id)
    }
}

/// Decodes the legacy (V1) vendor form.
///
/// Identical to [`decode`] except that in range mode a `defaultConsent` bit
/// precedes the entries; when set, the entries are the exception list and
/// membership is inverted over `[1, maxId]`.
pub fn decode_v1(src: &dyn BitSource, offset: u64) -> Result<DecodedIdSet, IdSetError> {
    let max_id = src.read(offset, MAX_ID_WIDTH)? as u16;
    let is_range = src.read_bit(offset + u64::from(MAX_ID_WIDTH))?;
    let body = offset + u64::from(MAX_ID_WIDTH) + 1;
    if !is_range {
        return decode_bitfield(src, body, max_id);
    }

    let default_consent = src.read_bit(body)?;
    let decoded = decode_entries(src, body + 1, Some(max_id))?;
    if !default_consent {
        return Ok(decoded);
    }
    Ok(DecodedIdSet {
        ids: (1..=max_id)
            .filter(|id| !decoded.ids.contains(id))
            .collect(),
        end: decoded.end,
    })
}

/// Decodes the headerless, always-range form used by publisher restriction
/// entries. No maximum is declared, so only entry-local validation applies.
pub fn decode_range_only(src: &dyn BitSource, offset: u64) -> Result<DecodedIdSet, IdSetError> {
    decode_entries(src, offset, None)
}

/// Decodes a fixed-width bitfield with no header (purpose flags and the
/// like): bit *i* set means ID *i+1* is present.
pub fn decode_fixed_bitfield(
    src: &dyn BitSource,
    offset: u64,
    bits: u16,
) -> Result<IdSet, BitsError> {
    Ok(decode_bitfield_ids(src, offset, bits)?)
}

fn decode_bitfield(src: &dyn BitSource, offset: u64, max_id: u16) -> Result<DecodedIdSet, IdSetError> {
    Ok(DecodedIdSet {
        ids: decode_bitfield_ids(src, offset, max_id)?,
        end: offset + u64::from(max_id),
    })
}

fn decode_bitfield_ids(src: &dyn BitSource, offset: u64, bits: u16) -> Result<IdSet, BitsError> {
    let mut ids = IdSet::new();
    let mut done = 0u64;
    while done < u64::from(bits) {
        let width = (u64::from(bits) - done).min(64) as u32;
        let chunk = src.read(offset + done, width)?;
        for j in 0..width {
            if chunk >> (width - 1 - j) & 1 == 1 {
                ids.insert((done + u64::from(j)) as u16 + 1);
            }
        }
        done += u64::from(width);
    }
    Ok(ids)
}

fn decode_entries(
    src: &dyn BitSource,
    offset: u64,
    max_id: Option<u16>,
) -> Result<DecodedIdSet, IdSetError> {
    let n = src.read(offset, NUM_ENTRIES_WIDTH)?;
    let mut cur = offset + u64::from(NUM_ENTRIES_WIDTH);
    let mut ids = IdSet::new();

    for _ in 0..n {
        let is_group = src.read_bit(cur)?;
        cur += 1;
        let start = src.read(cur, ID_WIDTH)? as u16;
        cur += u64::from(ID_WIDTH);
        let end = if is_group {
            let end = src.read(cur, ID_WIDTH)? as u16;
            cur += u64::from(ID_WIDTH);
            end
        } else {
            start
        };

        if start == 0 || start > end {
            return Err(IdSetError::InvalidRange { start, end });
        }
        if let Some(max) = max_id {
            if end > max {
                return Err(IdSetError::IdAboveMax { id: end, max_id: max });
            }
        }
        ids.extend(start..=end);
    }

    Ok(DecodedIdSet { ids, end: cur })
}

/// Structurally scans past a header-form set without building it, returning
/// the end offset. Used by layout width functions.
pub fn skip(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
    let max_id = src.read(offset, MAX_ID_WIDTH)?;
    let is_range = src.read_bit(offset + u64::from(MAX_ID_WIDTH))?;
    let body = offset + u64::from(MAX_ID_WIDTH) + 1;
    if is_range {
        skip_entries(src, body)
    } else {
        Ok(body + max_id)
    }
}

/// [`skip`] for the legacy form carrying a default-consent bit in range mode.
pub fn skip_v1(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
    let max_id = src.read(offset, MAX_ID_WIDTH)?;
    let is_range = src.read_bit(offset + u64::from(MAX_ID_WIDTH))?;
    let body = offset + u64::from(MAX_ID_WIDTH) + 1;
    if is_range {
        skip_entries(src, body + 1)
    } else {
        Ok(body + max_id)
    }
}

/// [`skip`] for the headerless range-only form.
pub fn skip_range_only(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
    skip_entries(src, offset)
}

fn skip_entries(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
    let n = src.read(offset, NUM_ENTRIES_WIDTH)?;
    let mut cur = offset + u64::from(NUM_ENTRIES_WIDTH);
    for _ in 0..n {
        let is_group = src.read_bit(cur)?;
        cur += 1 + u64::from(ID_WIDTH) * if is_group { 2 } else { 1 };
    }
    Ok(cur)
}

/// Encodes with the header form, choosing the representation with the
/// smaller fully-computed bit size (ties go to the bitfield; an empty set
/// with no explicit maximum is `maxId = 0` and an empty bitfield).
pub fn encode(w: &mut BitWriter, ids: &IdSet, max_id: Option<u16>) -> Result<(), IdSetError> {
    let max = effective_max(ids, max_id)?;
    let ranges = runs(ids);
    if range_bits(&ranges) < u64::from(max) {
        write_header(w, max, true)?;
        write_entries(w, &ranges)?;
    } else {
        write_header(w, max, false)?;
        write_bitfield(w, ids, max)?;
    }
    Ok(())
}

/// Encodes with the header form, forcing the bitfield representation.
pub fn encode_bitfield(w: &mut BitWriter, ids: &IdSet, max_id: Option<u16>) -> Result<(), IdSetError> {
    let max = effective_max(ids, max_id)?;
    write_header(w, max, false)?;
    write_bitfield(w, ids, max)
}

/// Encodes with the header form, forcing the range representation.
pub fn encode_ranges(w: &mut BitWriter, ids: &IdSet, max_id: Option<u16>) -> Result<(), IdSetError> {
    let max = effective_max(ids, max_id)?;
    write_header(w, max, true)?;
    write_entries(w, &runs(ids))
}

/// Encodes the headerless, always-range form.
pub fn encode_range_only(w: &mut BitWriter, ids: &IdSet) -> Result<(), IdSetError> {
    check_ids(ids, None)?;
    write_entries(w, &runs(ids))
}

/// Encodes the legacy (V1) vendor form: bitfield, or range with a leading
/// `defaultConsent` bit. The default is always emitted as 0; exception-list
/// encodings are accepted on decode but never produced.
pub fn encode_v1(w: &mut BitWriter, ids: &IdSet, max_id: Option<u16>) -> Result<(), IdSetError> {
    let max = effective_max(ids, max_id)?;
    let ranges = runs(ids);
    // the extra default bit counts against the range representation
    if range_bits(&ranges) + 1 < u64::from(max) {
        write_header(w, max, true)?;
        w.write_bit(false)?;
        write_entries(w, &ranges)?;
    } else {
        write_header(w, max, false)?;
        write_bitfield(w, ids, max)?;
    }
    Ok(())
}

/// Encodes a fixed-width headerless bitfield of exactly `bits` bits.
pub fn encode_fixed_bitfield(w: &mut BitWriter, ids: &IdSet, bits: u16) -> Result<(), IdSetError> {
    check_ids(ids, Some(bits))?;
    write_bitfield(w, ids, bits)
}

fn effective_max(ids: &IdSet, max_id: Option<u16>) -> Result<u16, IdSetError> {
    let last = ids.last().copied().unwrap_or(0);
    let max = max_id.unwrap_or(last);
    check_ids(ids, Some(max))?;
    Ok(max)
}

fn check_ids(ids: &IdSet, max_id: Option<u16>) -> Result<(), IdSetError> {
    if ids.contains(&0) {
        return Err(IdSetError::InvalidRange { start: 0, end: 0 });
    }
    if let (Some(max), Some(&last)) = (max_id, ids.last()) {
        if last > max {
            return Err(IdSetError::IdAboveMax { id: last, max_id: max });
        }
    }
    Ok(())
}

fn write_header(w: &mut BitWriter, max_id: u16, is_range: bool) -> Result<(), BitsError> {
    w.write(u64::from(max_id), MAX_ID_WIDTH)?;
    w.write_bit(is_range)
}

/// Maximal runs of consecutive IDs, ascending.
fn runs(ids: &IdSet) -> Vec<(u16, u16)> {
    let mut out: Vec<(u16, u16)> = Vec::new();
    for &id in ids {
        match out.last_mut() {
            Some((_, end)) if *end + 1 == id => *end = id,
            _ => out.push((id, id)),
        }
    }
    out
}

fn range_bits(runs: &[(u16, u16)]) -> u64 {
    u64::from(NUM_ENTRIES_WIDTH)
        + runs
            .iter()
            .map(|&(start, end)| 1 + u64::from(ID_WIDTH) * if start == end { 1 } else { 2 })
            .sum::<u64>()
}

fn write_entries(w: &mut BitWriter, runs: &[(u16, u16)]) -> Result<(), IdSetError> {
    w.write(runs.len() as u64, NUM_ENTRIES_WIDTH)?;
    for &(start, end) in runs {
        w.write_bit(start != end)?;
        w.write(u64::from(start), ID_WIDTH)?;
        if start != end {
            w.write(u64::from(end), ID_WIDTH)?;
        }
    }
    Ok(())
}

/// Emits a bitfield of exactly `bits` bits.
///
/// The bitfield is assembled in 64-bit chunks with the bit order reversed
/// within each chunk before emission, which is the reference encoder's
/// physical ordering; trailing chunks with no members are left to the
/// reserved-width padding.
fn write_bitfield(w: &mut BitWriter, ids: &IdSet, bits: u16) -> Result<(), IdSetError> {
    let mut sub = BitWriter::with_reserved(u64::from(bits));
    let last = ids.last().copied().unwrap_or(0);
    let chunks = (u64::from(last) + 63) / 64;
    for k in 0..chunks {
        let mut chunk = 0u64;
        let first_id = (k * 64 + 1) as u16;
        let last_id = ((k * 64 + 64).min(u64::from(bits))) as u16;
        for &id in ids.range(first_id..=last_id) {
            chunk |= 1 << (u64::from(id) - 1 - k * 64);
        }
        let rev = chunk.reverse_bits();
        let width = (u64::from(bits) - k * 64).min(64) as u32;
        sub.write(rev >> (64 - width), width)?;
    }
    w.append(&sub)?;
    Ok(())
}
