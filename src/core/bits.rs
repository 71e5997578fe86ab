//! Bit-level read and write primitives.
//!
//! TCF strings pack unsigned fields big-endian at arbitrary bit offsets with
//! no byte alignment. Reads go through [`BitSource`], implemented both by the
//! fully-buffered [`BitBuffer`] and by [`StreamBitReader`] which pulls bytes
//! from an [`io::Read`] source on demand. Writes accumulate in a
//! [`BitWriter`] and are flushed to bytes at the end.

use std::io;
use std::io::Read;
use std::sync::Mutex;
use thiserror::Error;

/// The error type for bit-level access failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BitsError {
    /// A read past the end of a fully-buffered record. The record is
    /// malformed: an earlier field announced more content than is present.
    #[error("read of {width} bits at offset {offset} exceeds buffer of {len} bits")]
    OutOfBounds { offset: u64, width: u32, len: u64 },
    /// A streaming source was exhausted before a read could be satisfied.
    /// Distinct from [`BitsError::OutOfBounds`]: the record is truncated,
    /// not necessarily malformed.
    #[error("source exhausted reading {width} bits at offset {offset}")]
    Underrun { offset: u64, width: u32 },
    /// A value does not fit the declared width of its field.
    #[error("value {value} does not fit in {width} bits")]
    Overflow { value: u64, width: u32 },
    /// A field width outside the supported 1..=64 range, or a letter width
    /// that is not a multiple of 6.
    #[error("unsupported field width {width}")]
    InvalidWidth { width: u32 },
    /// A character outside `A..=Z` in a 2-letter code.
    #[error("invalid letter {0:?}, expected A..=Z")]
    InvalidLetter(char),
    /// An I/O failure while pulling bytes from a streaming source.
    #[error("unable to read source: {0}")]
    Io(#[from] io::Error),
}

/// Extracts `width` bits at `offset` from `bytes`.
///
/// The caller guarantees the range is in bounds. A 64-bit read at an
/// arbitrary offset spans at most 9 bytes, so the bytes are accumulated
/// big-endian into a 128-bit register and shifted down in one go.
fn extract(bytes: &[u8], offset: u64, width: u32) -> u64 {
    let first = (offset / 8) as usize;
    let bit = (offset % 8) as u32;
    let nbytes = ((bit + width + 7) / 8) as usize;

    let mut acc = 0u128;
    for &b in &bytes[first..first + nbytes] {
        acc = (acc << 8) | u128::from(b);
    }

    let shift = nbytes as u32 * 8 - bit - width;
    let mask = if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    ((acc >> shift) as u64) & mask
}

/// Random access to an unsigned big-endian bit stream.
///
/// Receivers are shared (`&self`) so that lazily-decoded records can hand out
/// reads without exclusive access.
pub trait BitSource {
    /// Reads `width` bits (1..=64) starting at absolute bit `offset`.
    fn read(&self, offset: u64, width: u32) -> Result<u64, BitsError>;

    /// Reads a single bit at `offset`.
    fn read_bit(&self, offset: u64) -> Result<bool, BitsError> {
        Ok(self.read(offset, 1)? == 1)
    }

    /// Reads `width / 6` uppercase letters, each 6 bits mapped as `'A' + v`.
    ///
    /// `width` must be a multiple of 6; TCF uses this for 2-letter language
    /// and country codes.
    fn read_letters(&self, offset: u64, width: u32) -> Result<String, BitsError> {
        if width == 0 || width % 6 != 0 {
            return Err(BitsError::InvalidWidth { width });
        }
        (0..width / 6)
            .map(|i| {
                self.read(offset + u64::from(i) * 6, 6)
                    .map(|n| (n as u8 + b'A') as char)
            })
            .collect()
    }
}

/// A fixed, fully-buffered bit string owning its bytes.
///
/// Reads past the end are [`BitsError::OutOfBounds`].
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BitBuffer {
    bytes: Vec<u8>,
}

impl BitBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Total number of addressable bits.
    pub fn len_bits(&self) -> u64 {
        self.bytes.len() as u64 * 8
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for BitBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl BitSource for BitBuffer {
    fn read(&self, offset: u64, width: u32) -> Result<u64, BitsError> {
        if width == 0 || width > 64 {
            return Err(BitsError::InvalidWidth { width });
        }
        if offset + u64::from(width) > self.len_bits() {
            return Err(BitsError::OutOfBounds {
                offset,
                width,
                len: self.len_bits(),
            });
        }
        Ok(extract(&self.bytes, offset, width))
    }
}

struct Stream<R> {
    source: R,
    bytes: Vec<u8>,
    exhausted: bool,
}

/// A bit source filled incrementally from a blocking byte source.
///
/// Bytes are pulled the first time a read reaches past the already-buffered
/// prefix. Exhaustion of the source before a read is satisfied is
/// [`BitsError::Underrun`], never a zero-filled value.
pub struct StreamBitReader<R> {
    inner: Mutex<Stream<R>>,
}

impl<R: Read> StreamBitReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            inner: Mutex::new(Stream {
                source,
                bytes: Vec::new(),
                exhausted: false,
            }),
        }
    }
}

impl<R: Read> BitSource for StreamBitReader<R> {
    fn read(&self, offset: u64, width: u32) -> Result<u64, BitsError> {
        if width == 0 || width > 64 {
            return Err(BitsError::InvalidWidth { width });
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let needed = ((offset + u64::from(width) + 7) / 8) as usize;
        if inner.bytes.len() < needed && !inner.exhausted {
            let missing = (needed - inner.bytes.len()) as u64;
            let stream = &mut *inner;
            let pulled = (&mut stream.source)
                .take(missing)
                .read_to_end(&mut stream.bytes)?;
            if (pulled as u64) < missing {
                inner.exhausted = true;
            }
        }
        if inner.bytes.len() < needed {
            return Err(BitsError::Underrun { offset, width });
        }
        Ok(extract(&inner.bytes, offset, width))
    }
}

/// An append-only bit stream builder.
///
/// Bits accumulate left-aligned in a 64-bit pending register; full words are
/// flushed to a growable byte vector. A writer created with
/// [`BitWriter::with_reserved`] declares its intended total width up front:
/// zero padding up to that width is applied at flush regardless of how many
/// bits were actually written, which is how fixed-width sub-structures with
/// shorter logical content are emitted.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    pending: u64,
    pending_bits: u32,
    written: u64,
    reserved: Option<u64>,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer padded with zeroes to at least `bits` at flush time.
    pub fn with_reserved(bits: u64) -> Self {
        Self {
            reserved: Some(bits),
            ..Self::default()
        }
    }

    /// Logical length in bits, including reserved padding not yet emitted.
    pub fn len_bits(&self) -> u64 {
        self.written.max(self.reserved.unwrap_or(0))
    }

    /// Appends the low `width` bits of `value`.
    ///
    /// Rejects with [`BitsError::Overflow`] before emitting anything if the
    /// value does not fit.
    pub fn write(&mut self, value: u64, width: u32) -> Result<(), BitsError> {
        if width == 0 || width > 64 {
            return Err(BitsError::InvalidWidth { width });
        }
        if width < 64 && value >> width != 0 {
            return Err(BitsError::Overflow { value, width });
        }

        let space = 64 - self.pending_bits;
        if width <= space {
            self.pending |= value << (space - width);
            self.pending_bits += width;
            if self.pending_bits == 64 {
                self.flush_word();
            }
        } else {
            // split across the register boundary
            self.pending |= value >> (width - space);
            self.flush_word();
            let rem = width - space;
            self.pending = (value & ((1u64 << rem) - 1)) << (64 - rem);
            self.pending_bits = rem;
        }
        self.written += u64::from(width);
        Ok(())
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), BitsError> {
        self.write(u64::from(bit), 1)
    }

    /// Writes each character as a 6-bit `c - 'A'` value.
    pub fn write_letters(&mut self, s: &str) -> Result<(), BitsError> {
        for c in s.chars() {
            if !c.is_ascii_uppercase() {
                return Err(BitsError::InvalidLetter(c));
            }
            self.write(u64::from(c as u8 - b'A'), 6)?;
        }
        Ok(())
    }

    /// Appends another writer's full content, carrying partial trailing bits
    /// and applying the appended writer's own reserved padding.
    pub fn append(&mut self, other: &BitWriter) -> Result<(), BitsError> {
        let (bytes, nbits) = other.padded_parts();
        let src = BitBuffer::new(bytes);
        let mut offset = 0;
        while offset < nbits {
            let width = (nbits - offset).min(64) as u32;
            self.write(src.read(offset, width)?, width)?;
            offset += u64::from(width);
        }
        Ok(())
    }

    /// Flushes, zero-padding the final byte (and up to the reserved width).
    pub fn into_bytes(self) -> Vec<u8> {
        self.padded_parts().0
    }

    fn flush_word(&mut self) {
        self.bytes.extend_from_slice(&self.pending.to_be_bytes());
        self.pending = 0;
        self.pending_bits = 0;
    }

    fn padded_parts(&self) -> (Vec<u8>, u64) {
        let mut bytes = self.bytes.clone();
        if self.pending_bits > 0 {
            let nbytes = ((self.pending_bits + 7) / 8) as usize;
            bytes.extend_from_slice(&self.pending.to_be_bytes()[..nbytes]);
        }
        let total = self.len_bits();
        let need = ((total + 7) / 8) as usize;
        if bytes.len() < need {
            bytes.resize(need, 0);
        }
        (bytes, total)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use test_case::test_case;

    /// Transform a string of literal binary digits into a vector of bytes.
    /// Zeroes will be appended to fill missing bits.
    pub(crate) fn b(s: &str) -> Vec<u8> {
        let chars = s
            .chars()
            .filter(|&c| c == '1' || c == '0')
            .collect::<Vec<_>>();
        chars
            .chunks(8)
            .map(|c| (8 - c.len(), String::from_iter(c)))
            .map(|(l, s)| u8::from_str_radix(&s, 2).map(|n| n << l))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or(vec![])
    }

    #[test_case("00001000", 0, 6 => 2 ; "six bits at offset zero")]
    #[test_case("00001000", 4, 4 => 8 ; "nibble")]
    #[test_case("1", 0, 1 => 1 ; "single bit")]
    #[test_case("00000001 00000010", 0, 16 => 258 ; "two bytes")]
    #[test_case("000 101010101010", 3, 12 => 0b101010101010 ; "crossing byte boundary")]
    fn read(s: &str, offset: u64, width: u32) -> u64 {
        BitBuffer::new(b(s)).read(offset, width).unwrap()
    }

    #[test]
    fn read_64_bits_spanning_nine_bytes() {
        let mut bytes = vec![0u8; 9];
        bytes[0] = 0b0001_1111;
        for byte in bytes.iter_mut().skip(1).take(7) {
            *byte = 0xff;
        }
        bytes[8] = 0b1110_0000;
        let buf = BitBuffer::new(bytes);
        assert_eq!(buf.read(3, 64).unwrap(), u64::MAX);
    }

    #[test_case("101010 101011", 0, 12 => "KL")]
    #[test_case("00 000100 001101", 2, 12 => "EN")]
    fn read_letters(s: &str, offset: u64, width: u32) -> String {
        BitBuffer::new(b(s)).read_letters(offset, width).unwrap()
    }

    #[test]
    fn out_of_bounds_is_not_underrun() {
        let buf = BitBuffer::new(vec![0]);
        assert!(matches!(
            buf.read(3, 6),
            Err(BitsError::OutOfBounds {
                offset: 3,
                width: 6,
                len: 8
            })
        ));
    }

    #[test_case(0 => matches Err(BitsError::InvalidWidth { width: 0 }))]
    #[test_case(65 => matches Err(BitsError::InvalidWidth { width: 65 }))]
    #[test_case(64 => matches Err(BitsError::OutOfBounds { .. }))]
    fn invalid_widths(width: u32) -> Result<u64, BitsError> {
        BitBuffer::new(vec![0]).read(0, width)
    }

    #[test]
    fn stream_reader_pulls_on_demand() {
        let r = StreamBitReader::new(Cursor::new(b("00001000 11110000")));
        assert_eq!(r.read(0, 6).unwrap(), 2);
        assert_eq!(r.read(8, 4).unwrap(), 0b1111);
    }

    #[test]
    fn stream_reader_underrun_is_not_out_of_bounds() {
        let r = StreamBitReader::new(Cursor::new(vec![0u8]));
        assert!(matches!(
            r.read(4, 8),
            Err(BitsError::Underrun {
                offset: 4,
                width: 8
            })
        ));
        // already-buffered prefix stays readable after exhaustion
        assert_eq!(r.read(0, 8).unwrap(), 0);
    }

    #[test_case(1)]
    #[test_case(2)]
    #[test_case(3)]
    #[test_case(6)]
    #[test_case(12)]
    #[test_case(16)]
    #[test_case(24)]
    #[test_case(36)]
    #[test_case(64)]
    fn write_read_round_trip_at_every_alignment(width: u32) {
        let max = if width == 64 {
            u64::MAX
        } else {
            (1u64 << width) - 1
        };
        for offset in 0..8u64 {
            for value in [0, 1, max, max & 0xAAAA_AAAA_AAAA_AAAA] {
                let mut w = BitWriter::new();
                if offset > 0 {
                    w.write(0, offset as u32).unwrap();
                }
                w.write(value, width).unwrap();
                let buf = BitBuffer::new(w.into_bytes());
                assert_eq!(
                    buf.read(offset, width).unwrap(),
                    value,
                    "width {width} offset {offset}"
                );
            }
        }
    }

    #[test]
    fn write_rejects_overflow_before_emitting() {
        let mut w = BitWriter::new();
        assert!(matches!(
            w.write(4, 2),
            Err(BitsError::Overflow { value: 4, width: 2 })
        ));
        assert_eq!(w.len_bits(), 0);
        assert!(w.into_bytes().is_empty());
    }

    #[test]
    fn final_byte_is_zero_padded() {
        let mut w = BitWriter::new();
        w.write(0b101, 3).unwrap();
        assert_eq!(w.into_bytes(), vec![0b1010_0000]);
    }

    #[test]
    fn reserved_width_pads_at_flush() {
        let mut w = BitWriter::with_reserved(24);
        w.write(0xff, 8).unwrap();
        assert_eq!(w.len_bits(), 24);
        assert_eq!(w.into_bytes(), vec![0xff, 0, 0]);
    }

    #[test]
    fn append_carries_partial_trailing_bits() {
        let mut inner = BitWriter::new();
        inner.write(0b110, 3).unwrap();

        let mut w = BitWriter::new();
        w.write(0b10101, 5).unwrap();
        w.append(&inner).unwrap();
        assert_eq!(w.len_bits(), 8);
        assert_eq!(w.into_bytes(), vec![0b1010_1110]);
    }

    #[test]
    fn append_applies_the_appendee_reserved_padding() {
        let mut inner = BitWriter::with_reserved(6);
        inner.write(0b11, 2).unwrap();

        let mut w = BitWriter::new();
        w.write_bit(true).unwrap();
        w.append(&inner).unwrap();
        w.write_bit(true).unwrap();
        // 1 | 110000 | 1
        assert_eq!(w.into_bytes(), vec![0b1110_0001]);
    }

    #[test]
    fn append_long_content_crosses_words() {
        let mut inner = BitWriter::new();
        for i in 0..10u64 {
            inner.write(i, 7).unwrap();
        }
        let mut w = BitWriter::new();
        w.write(0b101, 3).unwrap();
        w.append(&inner).unwrap();
        let buf = BitBuffer::new(w.into_bytes());
        for i in 0..10u64 {
            assert_eq!(buf.read(3 + i * 7, 7).unwrap(), i);
        }
    }

    #[test]
    fn write_letters_round_trip() {
        let mut w = BitWriter::new();
        w.write_letters("EN").unwrap();
        let buf = BitBuffer::new(w.into_bytes());
        assert_eq!(buf.read_letters(0, 12).unwrap(), "EN");
    }

    #[test]
    fn write_letters_rejects_lowercase() {
        let mut w = BitWriter::new();
        assert!(matches!(
            w.write_letters("eN"),
            Err(BitsError::InvalidLetter('e'))
        ));
    }
}
