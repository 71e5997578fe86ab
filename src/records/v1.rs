//! The legacy single-segment record.

use crate::core::bits::{BitBuffer, BitSource, BitWriter, BitsError};
use crate::core::idset::{self, IdSet};
use crate::core::layout::{FieldDef, FieldKind, FieldSpan, LayoutSession, Schema};
use crate::records::{read_timestamp, write_code, write_timestamp, DecodeError, EncodeError};
use crate::segments::compose;

const PURPOSES_WIDTH: u16 = 24;

/// Field indices into [`CORE`]; the discriminants are the table positions.
#[derive(Clone, Copy)]
enum Field {
    Version = 0,
    Created,
    LastUpdated,
    CmpId,
    CmpVersion,
    ConsentScreen,
    ConsentLanguage,
    VendorListVersion,
    PurposesAllowed,
    VendorConsents,
}

fn vendor_consents_width(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
    Ok(idset::skip_v1(src, offset)? - offset)
}

static CORE_DEFS: [FieldDef; 11] = [
    FieldDef {
        name: "version",
        kind: FieldKind::Anchored {
            offset: 0,
            width: 6,
        },
    },
    FieldDef {
        name: "created",
        kind: FieldKind::Fixed { width: 36 },
    },
    FieldDef {
        name: "lastUpdated",
        kind: FieldKind::Fixed { width: 36 },
    },
    FieldDef {
        name: "cmpId",
        kind: FieldKind::Fixed { width: 12 },
    },
    FieldDef {
        name: "cmpVersion",
        kind: FieldKind::Fixed { width: 12 },
    },
    FieldDef {
        name: "consentScreen",
        kind: FieldKind::Fixed { width: 6 },
    },
    FieldDef {
        name: "consentLanguage",
        kind: FieldKind::Fixed { width: 12 },
    },
    FieldDef {
        name: "vendorListVersion",
        kind: FieldKind::Fixed { width: 12 },
    },
    FieldDef {
        name: "purposesAllowed",
        kind: FieldKind::Fixed { width: 24 },
    },
    FieldDef {
        name: "vendorConsents",
        kind: FieldKind::Computed {
            width: vendor_consents_width,
        },
    },
    FieldDef {
        name: "vendorRangeEntry",
        kind: FieldKind::NotAddressable,
    },
];

static CORE: Schema = Schema::new(&CORE_DEFS);

/// A decoded legacy record. Fields are read on access and their variable
/// layout is memoized per record.
#[derive(Debug)]
pub struct TcfV1Record {
    buf: BitBuffer,
    session: LayoutSession,
}

impl TcfV1Record {
    pub(crate) fn new(buf: BitBuffer) -> Self {
        Self {
            buf,
            session: LayoutSession::new(),
        }
    }

    fn span(&self, field: Field) -> Result<FieldSpan, DecodeError> {
        Ok(CORE.resolve(field as usize, &self.buf, &self.session)?)
    }

    fn read(&self, field: Field) -> Result<u64, DecodeError> {
        let span = self.span(field)?;
        Ok(self.buf.read(span.offset, span.width as u32)?)
    }

    pub fn version(&self) -> Result<u8, DecodeError> {
        Ok(self.read(Field::Version)? as u8)
    }

    /// Creation time in Unix seconds.
    pub fn created(&self) -> Result<u64, DecodeError> {
        Ok(read_timestamp(&self.buf, self.span(Field::Created)?.offset)?)
    }

    /// Last-update time in Unix seconds.
    pub fn last_updated(&self) -> Result<u64, DecodeError> {
        Ok(read_timestamp(&self.buf, self.span(Field::LastUpdated)?.offset)?)
    }

    pub fn cmp_id(&self) -> Result<u16, DecodeError> {
        Ok(self.read(Field::CmpId)? as u16)
    }

    pub fn cmp_version(&self) -> Result<u16, DecodeError> {
        Ok(self.read(Field::CmpVersion)? as u16)
    }

    pub fn consent_screen(&self) -> Result<u8, DecodeError> {
        Ok(self.read(Field::ConsentScreen)? as u8)
    }

    pub fn consent_language(&self) -> Result<String, DecodeError> {
        let span = self.span(Field::ConsentLanguage)?;
        Ok(self.buf.read_letters(span.offset, span.width as u32)?)
    }

    pub fn vendor_list_version(&self) -> Result<u16, DecodeError> {
        Ok(self.read(Field::VendorListVersion)? as u16)
    }

    pub fn purposes_allowed(&self) -> Result<IdSet, DecodeError> {
        let span = self.span(Field::PurposesAllowed)?;
        Ok(idset::decode_fixed_bitfield(
            &self.buf,
            span.offset,
            span.width as u16,
        )?)
    }

    pub fn max_vendor_id(&self) -> Result<u16, DecodeError> {
        let span = self.span(Field::VendorConsents)?;
        Ok(self.buf.read(span.offset, 16)? as u16)
    }

    /// The set of vendors with consent; a default-consent range encoding is
    /// resolved to its effective membership here.
    pub fn vendor_consents(&self) -> Result<IdSet, DecodeError> {
        let span = self.span(Field::VendorConsents)?;
        Ok(idset::decode_v1(&self.buf, span.offset)?.ids)
    }

    /// Reads every field once, filling the layout memo.
    pub(crate) fn force(&self) -> Result<(), DecodeError> {
        self.version()?;
        self.created()?;
        self.last_updated()?;
        self.cmp_id()?;
        self.cmp_version()?;
        self.consent_screen()?;
        self.consent_language()?;
        self.vendor_list_version()?;
        self.purposes_allowed()?;
        self.vendor_consents()?;
        Ok(())
    }
}

/// Builder for legacy records.
///
/// Timestamps are Unix seconds; the vendor set picks its physical
/// representation by size, never emitting a default-consent exception list.
#[derive(Debug)]
pub struct V1Encoder {
    created: u64,
    last_updated: u64,
    cmp_id: u16,
    cmp_version: u16,
    consent_screen: u8,
    consent_language: String,
    vendor_list_version: u16,
    purposes_allowed: IdSet,
    vendor_consents: IdSet,
    max_vendor_id: Option<u16>,
}

impl Default for V1Encoder {
    fn default() -> Self {
        Self {
            created: 0,
            last_updated: 0,
            cmp_id: 0,
            cmp_version: 0,
            consent_screen: 0,
            consent_language: "EN".to_string(),
            vendor_list_version: 0,
            purposes_allowed: IdSet::new(),
            vendor_consents: IdSet::new(),
            max_vendor_id: None,
        }
    }
}

impl V1Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(mut self, seconds: u64) -> Self {
        self.created = seconds;
        self
    }

    pub fn last_updated(mut self, seconds: u64) -> Self {
        self.last_updated = seconds;
        self
    }

    pub fn cmp_id(mut self, id: u16) -> Self {
        self.cmp_id = id;
        self
    }

    pub fn cmp_version(mut self, version: u16) -> Self {
        self.cmp_version = version;
        self
    }

    pub fn consent_screen(mut self, screen: u8) -> Self {
        self.consent_screen = screen;
        self
    }

    pub fn consent_language(mut self, code: &str) -> Self {
        self.consent_language = code.to_string();
        self
    }

    pub fn vendor_list_version(mut self, version: u16) -> Self {
        self.vendor_list_version = version;
        self
    }

    pub fn purposes_allowed(mut self, ids: IdSet) -> Self {
        self.purposes_allowed = ids;
        self
    }

    pub fn vendor_consents(mut self, ids: IdSet) -> Self {
        self.vendor_consents = ids;
        self
    }

    /// Declares the vendor universe explicitly; defaults to the largest
    /// consenting vendor ID.
    pub fn max_vendor_id(mut self, max: u16) -> Self {
        self.max_vendor_id = Some(max);
        self
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        let mut w = BitWriter::new();
        w.write(1, 6)?;
        write_timestamp(&mut w, self.created)?;
        write_timestamp(&mut w, self.last_updated)?;
        w.write(u64::from(self.cmp_id), 12)?;
        w.write(u64::from(self.cmp_version), 12)?;
        w.write(u64::from(self.consent_screen), 6)?;
        write_code(&mut w, &self.consent_language)?;
        w.write(u64::from(self.vendor_list_version), 12)?;
        idset::encode_fixed_bitfield(&mut w, &self.purposes_allowed, PURPOSES_WIDTH)?;
        idset::encode_v1(&mut w, &self.vendor_consents, self.max_vendor_id)?;
        Ok(compose(w, vec![])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::TcString;
    use std::collections::BTreeSet;

    // a real-world CMP string: range-encoded vendors with one exclusion
    const SAMPLE: &str = "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA";

    fn sample() -> TcfV1Record {
        match TcString::decode(SAMPLE).unwrap() {
            TcString::V1(r) => r,
            TcString::V2(_) => panic!("sample is a version 1 string"),
        }
    }

    #[test]
    fn decodes_fixed_fields() {
        let r = sample();
        assert_eq!(r.version().unwrap(), 1);
        assert_eq!(r.created().unwrap(), 1510082155);
        assert_eq!(r.last_updated().unwrap(), 1510082155);
        assert_eq!(r.cmp_id().unwrap(), 7);
        assert_eq!(r.cmp_version().unwrap(), 1);
        assert_eq!(r.consent_screen().unwrap(), 3);
        assert_eq!(r.consent_language().unwrap(), "EN");
        assert_eq!(r.vendor_list_version().unwrap(), 8);
    }

    #[test]
    fn decodes_purpose_bitfield() {
        assert_eq!(
            sample().purposes_allowed().unwrap(),
            BTreeSet::from_iter([1, 2, 3])
        );
    }

    #[test]
    fn resolves_default_consent_vendor_list() {
        let r = sample();
        assert_eq!(r.max_vendor_id().unwrap(), 2011);
        let expected: IdSet = (1..=2011).filter(|&id| id != 9).collect();
        assert_eq!(r.vendor_consents().unwrap(), expected);
    }

    #[test]
    fn truncated_string_fails_on_access_not_decode() {
        // drop the tail of the vendor section
        let r = TcString::decode(&SAMPLE[..28]).unwrap();
        let r = r.as_v1().unwrap();
        assert_eq!(r.cmp_id().unwrap(), 7);
        assert!(r.vendor_consents().is_err());
    }

    #[test]
    fn encode_decode_round_trip() {
        let vendors: IdSet = BTreeSet::from_iter([3, 128, 129, 130, 1000]);
        let s = V1Encoder::new()
            .created(1510082155)
            .last_updated(1510082155)
            .cmp_id(7)
            .cmp_version(1)
            .consent_screen(3)
            .consent_language("FR")
            .vendor_list_version(8)
            .purposes_allowed(BTreeSet::from_iter([1, 3, 24]))
            .vendor_consents(vendors.clone())
            .encode()
            .unwrap();

        let r = TcString::decode(&s).unwrap();
        let r = r.as_v1().unwrap();
        assert_eq!(r.created().unwrap(), 1510082155);
        assert_eq!(r.consent_language().unwrap(), "FR");
        assert_eq!(r.purposes_allowed().unwrap(), BTreeSet::from_iter([1, 3, 24]));
        assert_eq!(r.vendor_consents().unwrap(), vendors);
        assert_eq!(r.max_vendor_id().unwrap(), 1000);
    }

    #[test]
    fn reencoding_a_decoded_record_preserves_fields() {
        let r = sample();
        let s = V1Encoder::new()
            .created(r.created().unwrap())
            .last_updated(r.last_updated().unwrap())
            .cmp_id(r.cmp_id().unwrap())
            .cmp_version(r.cmp_version().unwrap())
            .consent_screen(r.consent_screen().unwrap())
            .consent_language(&r.consent_language().unwrap())
            .vendor_list_version(r.vendor_list_version().unwrap())
            .purposes_allowed(r.purposes_allowed().unwrap())
            .vendor_consents(r.vendor_consents().unwrap())
            .max_vendor_id(r.max_vendor_id().unwrap())
            .encode()
            .unwrap();

        let again = TcString::decode(&s).unwrap();
        let again = again.as_v1().unwrap();
        assert_eq!(again.vendor_consents().unwrap(), r.vendor_consents().unwrap());
        assert_eq!(again.purposes_allowed().unwrap(), r.purposes_allowed().unwrap());
        assert_eq!(again.created().unwrap(), r.created().unwrap());
    }
}
