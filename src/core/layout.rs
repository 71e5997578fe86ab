//! Field layout resolution.
//!
//! Each segment format is described by a static schema: an ordered table of
//! field definitions. A field's offset is the end of its predecessor, except
//! for anchored segment-start fields; a field's width is either a constant
//! or computed by reading earlier, variable-length buffer content.
//!
//! Whether a field is *dynamic* (its span depends on buffer content, either
//! directly or through a predecessor) is a property of the schema, cached
//! process-wide. The resolved spans of dynamic fields are per-record values,
//! memoized in a [`LayoutSession`] bound to one decoded record.

use crate::core::bits::{BitSource, BitsError};
use fnv::FnvHashMap;
use std::sync::{OnceLock, RwLock};
use thiserror::Error;

/// The error type for layout queries.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LayoutError {
    #[error(transparent)]
    Bits(#[from] BitsError),
    /// The width of a dynamic field was queried without buffer context.
    #[error("width of dynamic field {field} requires buffer content")]
    DynamicWidth { field: &'static str },
    /// Offset/width queries are not defined for this field kind.
    #[error("field {field} does not support offset or width queries")]
    NotAddressable { field: &'static str },
}

/// Computes the width in bits of a field located at `offset`, by reading
/// the buffer content that precedes or begins the field.
pub type WidthFn = fn(&dyn BitSource, u64) -> Result<u64, BitsError>;

#[derive(Clone, Copy)]
pub enum FieldKind {
    /// Fixed width at a fixed offset from the segment start.
    Anchored { offset: u64, width: u32 },
    /// Fixed width, offset is the end of the previous field.
    Fixed { width: u32 },
    /// Offset is the end of the previous field; width is read from content.
    Computed { width: WidthFn },
    /// A reused sub-structure element (e.g. one range-list entry); it has no
    /// well-defined place in the segment and rejects all layout queries.
    NotAddressable,
}

pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// A resolved field location, in bits from the segment start.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldSpan {
    pub offset: u64,
    pub width: u64,
}

impl FieldSpan {
    pub fn end(&self) -> u64 {
        self.offset + self.width
    }
}

/// Per-record memo of resolved dynamic field spans.
///
/// Population is lazy and first-access-wins; an entry, once present, never
/// changes for the lifetime of the record. The lock keeps records shareable
/// across threads even while fields are still being resolved.
#[derive(Debug, Default)]
pub struct LayoutSession {
    memo: RwLock<FnvHashMap<usize, FieldSpan>>,
}

impl LayoutSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, field: usize) -> Option<FieldSpan> {
        self.memo
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&field)
            .copied()
    }

    fn put(&self, field: usize, span: FieldSpan) {
        self.memo
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(field)
            .or_insert(span);
    }
}

/// An ordered field table for one segment format.
pub struct Schema {
    defs: &'static [FieldDef],
    dynamic: OnceLock<Vec<bool>>,
}

impl Schema {
    pub const fn new(defs: &'static [FieldDef]) -> Self {
        Self {
            defs,
            dynamic: OnceLock::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn name(&self, field: usize) -> &'static str {
        self.defs[field].name
    }

    /// Whether resolving this field requires buffer content.
    ///
    /// Dynamic-ness is contagious forward through field order: a field is
    /// dynamic if its own width is computed, or if it chains from a dynamic
    /// predecessor. Anchored fields restart the chain.
    pub fn is_dynamic(&self, field: usize) -> bool {
        self.dynamics()[field]
    }

    /// The width of a static field, available without any buffer.
    pub fn static_width(&self, field: usize) -> Result<u64, LayoutError> {
        match self.defs[field].kind {
            FieldKind::Anchored { width, .. } | FieldKind::Fixed { width } => Ok(u64::from(width)),
            FieldKind::Computed { .. } => Err(LayoutError::DynamicWidth {
                field: self.name(field),
            }),
            FieldKind::NotAddressable => Err(LayoutError::NotAddressable {
                field: self.name(field),
            }),
        }
    }

    /// Resolves a field's absolute span within the segment.
    ///
    /// One forward pass from the segment start; static prefixes are cheap to
    /// recompute and bypass the session, dynamic spans are taken from the
    /// session memo or computed once and stored.
    pub fn resolve(
        &self,
        field: usize,
        src: &dyn BitSource,
        session: &LayoutSession,
    ) -> Result<FieldSpan, LayoutError> {
        if matches!(self.defs[field].kind, FieldKind::NotAddressable) {
            return Err(LayoutError::NotAddressable {
                field: self.name(field),
            });
        }
        if self.is_dynamic(field) {
            if let Some(span) = session.get(field) {
                return Ok(span);
            }
        }

        let mut cursor = 0u64;
        for (i, def) in self.defs.iter().enumerate().take(field + 1) {
            let span = match def.kind {
                FieldKind::NotAddressable => {
                    return Err(LayoutError::NotAddressable {
                        field: self.name(i),
                    })
                }
                FieldKind::Anchored { offset, width } => FieldSpan {
                    offset,
                    width: u64::from(width),
                },
                FieldKind::Fixed { width } => FieldSpan {
                    offset: cursor,
                    width: u64::from(width),
                },
                FieldKind::Computed { width } => match session.get(i) {
                    Some(span) => span,
                    None => FieldSpan {
                        offset: cursor,
                        width: width(src, cursor)?,
                    },
                },
            };
            if self.is_dynamic(i) {
                session.put(i, span);
            }
            cursor = span.end();
            if i == field {
                return Ok(span);
            }
        }
        unreachable!("field index {field} out of schema bounds");
    }

    /// Resolves every addressable field eagerly.
    ///
    /// After this, all dynamic spans are memoized and reads on the record
    /// are pure lookups; a fully-forced record is safe to share read-only.
    pub fn force_all(
        &self,
        src: &dyn BitSource,
        session: &LayoutSession,
    ) -> Result<(), LayoutError> {
        for i in 0..self.defs.len() {
            if !matches!(self.defs[i].kind, FieldKind::NotAddressable) {
                self.resolve(i, src, session)?;
            }
        }
        Ok(())
    }

    fn dynamics(&self) -> &[bool] {
        self.dynamic.get_or_init(|| {
            let mut out = Vec::with_capacity(self.defs.len());
            let mut chained = false;
            for def in self.defs {
                chained = match def.kind {
                    FieldKind::Anchored { .. } => false,
                    FieldKind::Fixed { .. } => chained,
                    FieldKind::Computed { .. } => true,
                    // not part of the chain; never resolvable anyway
                    FieldKind::NotAddressable => false,
                };
                out.push(chained);
            }
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bits::tests::b;
    use crate::core::bits::BitBuffer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // toy format: tag(4)@0, count(4), body of `count` nibbles, trailer(8)
    fn body_width(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
        // the count field sits right before the body
        Ok(src.read(offset - 4, 4)? * 4)
    }

    // same layout, but counting width computations; used by a single test so
    // the counter is not racy under parallel test runs
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counted_body_width(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
        CALLS.fetch_add(1, Ordering::SeqCst);
        body_width(src, offset)
    }

    static COUNTED_DEFS: [FieldDef; 4] = [
        FieldDef {
            name: "tag",
            kind: FieldKind::Anchored {
                offset: 0,
                width: 4,
            },
        },
        FieldDef {
            name: "count",
            kind: FieldKind::Fixed { width: 4 },
        },
        FieldDef {
            name: "body",
            kind: FieldKind::Computed {
                width: counted_body_width,
            },
        },
        FieldDef {
            name: "trailer",
            kind: FieldKind::Fixed { width: 8 },
        },
    ];

    static COUNTED: Schema = Schema::new(&COUNTED_DEFS);

    static TOY_DEFS: [FieldDef; 5] = [
        FieldDef {
            name: "tag",
            kind: FieldKind::Anchored {
                offset: 0,
                width: 4,
            },
        },
        FieldDef {
            name: "count",
            kind: FieldKind::Fixed { width: 4 },
        },
        FieldDef {
            name: "body",
            kind: FieldKind::Computed { width: body_width },
        },
        FieldDef {
            name: "trailer",
            kind: FieldKind::Fixed { width: 8 },
        },
        FieldDef {
            name: "body_element",
            kind: FieldKind::NotAddressable,
        },
    ];

    static TOY: Schema = Schema::new(&TOY_DEFS);

    #[test]
    fn dynamic_is_contagious_forward() {
        assert!(!TOY.is_dynamic(0));
        assert!(!TOY.is_dynamic(1));
        assert!(TOY.is_dynamic(2));
        assert!(TOY.is_dynamic(3)); // fixed width, dynamic offset
    }

    #[test]
    fn static_width_without_buffer() {
        assert_eq!(TOY.static_width(1).unwrap(), 4);
        assert!(matches!(
            TOY.static_width(2),
            Err(LayoutError::DynamicWidth { field: "body" })
        ));
        assert!(matches!(
            TOY.static_width(4),
            Err(LayoutError::NotAddressable {
                field: "body_element"
            })
        ));
    }

    #[test]
    fn resolves_through_dynamic_predecessors() {
        // tag=0b0001, count=2, body=2 nibbles, trailer=0xAB
        let buf = BitBuffer::new(b("0001 0010 1111 0000 10101011"));
        let session = LayoutSession::new();
        let span = TOY.resolve(3, &buf, &session).unwrap();
        assert_eq!(
            span,
            FieldSpan {
                offset: 16,
                width: 8
            }
        );
        assert_eq!(buf.read(span.offset, span.width as u32).unwrap(), 0xAB);
    }

    #[test]
    fn dynamic_spans_are_memoized_per_session() {
        let buf = BitBuffer::new(b("0001 0011 000000000000 11111111"));
        let session = LayoutSession::new();
        let before = CALLS.load(Ordering::SeqCst);
        let first = COUNTED.resolve(2, &buf, &session).unwrap();
        let again = COUNTED.resolve(2, &buf, &session).unwrap();
        COUNTED.resolve(3, &buf, &session).unwrap();
        assert_eq!(first, again);
        // one computation for the whole session, later fields reuse the memo
        assert_eq!(CALLS.load(Ordering::SeqCst) - before, 1);

        // a fresh session re-reads the buffer
        let fresh = LayoutSession::new();
        COUNTED.resolve(2, &buf, &fresh).unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst) - before, 2);
    }

    #[test]
    fn not_addressable_rejects_resolution() {
        let buf = BitBuffer::new(vec![0; 4]);
        let session = LayoutSession::new();
        assert!(matches!(
            TOY.resolve(4, &buf, &session),
            Err(LayoutError::NotAddressable {
                field: "body_element"
            })
        ));
    }

    #[test]
    fn force_all_resolves_every_addressable_field() {
        let buf = BitBuffer::new(b("0001 0001 1111 10101011"));
        let session = LayoutSession::new();
        TOY.force_all(&buf, &session).unwrap();
        let memo = session.memo.read().unwrap();
        assert!(memo.contains_key(&2) && memo.contains_key(&3));
    }
}
