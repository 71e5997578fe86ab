//! The multi-segment record.
//!
//! The core segment is mandatory; disclosed vendors, allowed vendors and
//! publisher purposes are optional trailing segments. Every read of an
//! absent segment yields the empty set, so callers never branch on segment
//! presence.

use crate::core::bits::{BitBuffer, BitSource, BitWriter, BitsError};
use crate::core::idset::{self, IdSet};
use crate::core::layout::{FieldDef, FieldKind, FieldSpan, LayoutSession, Schema};
use crate::records::{read_timestamp, write_code, write_timestamp, DecodeError, EncodeError};
use crate::segments::{compose, RawSegment, SegmentType, SEGMENT_TYPE_WIDTH};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use strum_macros::Display;

const RESTRICTION_PURPOSE_WIDTH: u32 = 6;
const RESTRICTION_TYPE_WIDTH: u32 = 2;
const NUM_RESTRICTIONS_WIDTH: u32 = 12;
const PURPOSES_WIDTH: u16 = 24;
const SPECIAL_FEATURES_WIDTH: u16 = 12;
const NUM_CUSTOM_PURPOSES_WIDTH: u32 = 6;

#[derive(Clone, Copy)]
enum CoreField {
    Version = 0,
    Created,
    LastUpdated,
    CmpId,
    CmpVersion,
    ConsentScreen,
    ConsentLanguage,
    VendorListVersion,
    PolicyVersion,
    IsServiceSpecific,
    UseNonStandardStacks,
    SpecialFeatureOptins,
    PurposeConsents,
    PurposeLegitimateInterests,
    PurposeOneTreatment,
    PublisherCountryCode,
    VendorConsents,
    VendorLegitimateInterests,
    PublisherRestrictions,
}

fn vendor_set_width(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
    Ok(idset::skip(src, offset)? - offset)
}

fn restrictions_width(src: &dyn BitSource, offset: u64) -> Result<u64, BitsError> {
    let n = src.read(offset, NUM_RESTRICTIONS_WIDTH)?;
    let mut cur = offset + u64::from(NUM_RESTRICTIONS_WIDTH);
    for _ in 0..n {
        cur += u64::from(RESTRICTION_PURPOSE_WIDTH + RESTRICTION_TYPE_WIDTH);
        cur = idset::skip_range_only(src, cur)?;
    }
    Ok(cur - offset)
}

static CORE_DEFS: [FieldDef; 21] = [
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
        name: "policyVersion",
        kind: FieldKind::Fixed { width: 6 },
    },
    FieldDef {
        name: "isServiceSpecific",
        kind: FieldKind::Fixed { width: 1 },
    },
    FieldDef {
        name: "useNonStandardStacks",
        kind: FieldKind::Fixed { width: 1 },
    },
    FieldDef {
        name: "specialFeatureOptins",
        kind: FieldKind::Fixed { width: 12 },
    },
    FieldDef {
        name: "purposeConsents",
        kind: FieldKind::Fixed { width: 24 },
    },
    FieldDef {
        name: "purposeLegitimateInterests",
        kind: FieldKind::Fixed { width: 24 },
    },
    FieldDef {
        name: "purposeOneTreatment",
        kind: FieldKind::Fixed { width: 1 },
    },
    FieldDef {
        name: "publisherCountryCode",
        kind: FieldKind::Fixed { width: 12 },
    },
    FieldDef {
        name: "vendorConsents",
        kind: FieldKind::Computed {
            width: vendor_set_width,
        },
    },
    FieldDef {
        name: "vendorLegitimateInterests",
        kind: FieldKind::Computed {
            width: vendor_set_width,
        },
    },
    FieldDef {
        name: "publisherRestrictions",
        kind: FieldKind::Computed {
            width: restrictions_width,
        },
    },
    FieldDef {
        name: "vendorRangeEntry",
        kind: FieldKind::NotAddressable,
    },
    FieldDef {
        name: "publisherRestrictionEntry",
        kind: FieldKind::NotAddressable,
    },
];

static CORE: Schema = Schema::new(&CORE_DEFS);

#[derive(Clone, Copy)]
enum PpField {
    Consents = 1,
    LegitimateInterests,
    NumCustomPurposes,
    CustomConsents,
    CustomLegitimateInterests,
}

fn custom_purposes_width(src: &dyn BitSource, _offset: u64) -> Result<u64, BitsError> {
    // numCustomPurposes sits at a fixed position in the segment
    src.read(51, NUM_CUSTOM_PURPOSES_WIDTH)
}

static PP_DEFS: [FieldDef; 6] = [
    FieldDef {
        name: "segmentType",
        kind: FieldKind::Anchored {
            offset: 0,
            width: 3,
        },
    },
    FieldDef {
        name: "publisherConsents",
        kind: FieldKind::Fixed { width: 24 },
    },
    FieldDef {
        name: "publisherLegitimateInterests",
        kind: FieldKind::Fixed { width: 24 },
    },
    FieldDef {
        name: "numCustomPurposes",
        kind: FieldKind::Fixed { width: 6 },
    },
    FieldDef {
        name: "customPurposeConsents",
        kind: FieldKind::Computed {
            width: custom_purposes_width,
        },
    },
    FieldDef {
        name: "customPurposeLegitimateInterests",
        kind: FieldKind::Computed {
            width: custom_purposes_width,
        },
    },
];

static PP: Schema = Schema::new(&PP_DEFS);

/// How a publisher restricts one purpose for a set of vendors.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, FromPrimitive)]
pub enum RestrictionType {
    NotAllowed = 0,
    RequireConsent = 1,
    RequireLegitimateInterest = 2,
    Undefined = 3,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublisherRestriction {
    pub purpose_id: u8,
    pub restriction_type: RestrictionType,
    pub vendor_ids: IdSet,
}

/// A decoded multi-segment record.
///
/// The core and the publisher-purposes segment each carry their own layout
/// memo; the vendor segments are single variable-length sets and need none.
#[derive(Debug)]
pub struct TcfV2Record {
    core: BitBuffer,
    session: LayoutSession,
    disclosed_vendors: Option<BitBuffer>,
    allowed_vendors: Option<BitBuffer>,
    publisher_purposes: Option<(BitBuffer, LayoutSession)>,
}

impl TcfV2Record {
    pub(crate) fn from_segments(segments: Vec<RawSegment>) -> Result<Self, DecodeError> {
        let mut core = None;
        let mut disclosed_vendors = None;
        let mut allowed_vendors = None;
        let mut publisher_purposes = None;
        for seg in segments {
            match seg.segment_type {
                SegmentType::Core => core = Some(seg.buf),
                SegmentType::DisclosedVendors => disclosed_vendors = Some(seg.buf),
                SegmentType::AllowedVendors => allowed_vendors = Some(seg.buf),
                SegmentType::PublisherPurposes => {
                    publisher_purposes = Some((seg.buf, LayoutSession::new()))
                }
            }
        }
        // segment 0 is always classified as the core
        let core = core.ok_or(DecodeError::UnexpectedSegments { found: 0 })?;
        Ok(Self {
            core,
            session: LayoutSession::new(),
            disclosed_vendors,
            allowed_vendors,
            publisher_purposes,
        })
    }

    fn span(&self, field: CoreField) -> Result<FieldSpan, DecodeError> {
        Ok(CORE.resolve(field as usize, &self.core, &self.session)?)
    }

    fn read(&self, field: CoreField) -> Result<u64, DecodeError> {
        let span = self.span(field)?;
        Ok(self.core.read(span.offset, span.width as u32)?)
    }

    fn read_flag(&self, field: CoreField) -> Result<bool, DecodeError> {
        Ok(self.read(field)? == 1)
    }

    fn read_purpose_set(&self, field: CoreField) -> Result<IdSet, DecodeError> {
        let span = self.span(field)?;
        Ok(idset::decode_fixed_bitfield(
            &self.core,
            span.offset,
            span.width as u16,
        )?)
    }

    pub fn version(&self) -> Result<u8, DecodeError> {
        Ok(self.read(CoreField::Version)? as u8)
    }

    /// Creation time in Unix seconds.
    pub fn created(&self) -> Result<u64, DecodeError> {
        Ok(read_timestamp(
            &self.core,
            self.span(CoreField::Created)?.offset,
        )?)
    }

    /// Last-update time in Unix seconds.
    pub fn last_updated(&self) -> Result<u64, DecodeError> {
        Ok(read_timestamp(
            &self.core,
            self.span(CoreField::LastUpdated)?.offset,
        )?)
    }

    pub fn cmp_id(&self) -> Result<u16, DecodeError> {
        Ok(self.read(CoreField::CmpId)? as u16)
    }

    pub fn cmp_version(&self) -> Result<u16, DecodeError> {
        Ok(self.read(CoreField::CmpVersion)? as u16)
    }

    pub fn consent_screen(&self) -> Result<u8, DecodeError> {
        Ok(self.read(CoreField::ConsentScreen)? as u8)
    }

    pub fn consent_language(&self) -> Result<String, DecodeError> {
        let span = self.span(CoreField::ConsentLanguage)?;
        Ok(self.core.read_letters(span.offset, span.width as u32)?)
    }

    pub fn vendor_list_version(&self) -> Result<u16, DecodeError> {
        Ok(self.read(CoreField::VendorListVersion)? as u16)
    }

    pub fn policy_version(&self) -> Result<u8, DecodeError> {
        Ok(self.read(CoreField::PolicyVersion)? as u8)
    }

    pub fn is_service_specific(&self) -> Result<bool, DecodeError> {
        self.read_flag(CoreField::IsServiceSpecific)
    }

    pub fn use_non_standard_stacks(&self) -> Result<bool, DecodeError> {
        self.read_flag(CoreField::UseNonStandardStacks)
    }

    pub fn special_feature_optins(&self) -> Result<IdSet, DecodeError> {
        self.read_purpose_set(CoreField::SpecialFeatureOptins)
    }

    pub fn purpose_consents(&self) -> Result<IdSet, DecodeError> {
        self.read_purpose_set(CoreField::PurposeConsents)
    }

    pub fn purpose_legitimate_interests(&self) -> Result<IdSet, DecodeError> {
        self.read_purpose_set(CoreField::PurposeLegitimateInterests)
    }

    pub fn purpose_one_treatment(&self) -> Result<bool, DecodeError> {
        self.read_flag(CoreField::PurposeOneTreatment)
    }

    pub fn publisher_country_code(&self) -> Result<String, DecodeError> {
        let span = self.span(CoreField::PublisherCountryCode)?;
        Ok(self.core.read_letters(span.offset, span.width as u32)?)
    }

    pub fn max_vendor_id(&self) -> Result<u16, DecodeError> {
        let span = self.span(CoreField::VendorConsents)?;
        Ok(self.core.read(span.offset, 16)? as u16)
    }

    pub fn vendor_consents(&self) -> Result<IdSet, DecodeError> {
        let span = self.span(CoreField::VendorConsents)?;
        Ok(idset::decode(&self.core, span.offset)?.ids)
    }

    pub fn vendor_legitimate_interests(&self) -> Result<IdSet, DecodeError> {
        let span = self.span(CoreField::VendorLegitimateInterests)?;
        Ok(idset::decode(&self.core, span.offset)?.ids)
    }

    pub fn publisher_restrictions(&self) -> Result<Vec<PublisherRestriction>, DecodeError> {
        let span = self.span(CoreField::PublisherRestrictions)?;
        let n = self.core.read(span.offset, NUM_RESTRICTIONS_WIDTH)?;
        let mut cur = span.offset + u64::from(NUM_RESTRICTIONS_WIDTH);
        let mut out = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let purpose_id = self.core.read(cur, RESTRICTION_PURPOSE_WIDTH)? as u8;
            cur += u64::from(RESTRICTION_PURPOSE_WIDTH);
            let restriction_type =
                RestrictionType::from_u64(self.core.read(cur, RESTRICTION_TYPE_WIDTH)?)
                    .unwrap_or(RestrictionType::Undefined);
            cur += u64::from(RESTRICTION_TYPE_WIDTH);
            let decoded = idset::decode_range_only(&self.core, cur)?;
            cur = decoded.end;
            out.push(PublisherRestriction {
                purpose_id,
                restriction_type,
                vendor_ids: decoded.ids,
            });
        }
        Ok(out)
    }

    pub fn disclosed_vendors(&self) -> Result<IdSet, DecodeError> {
        Self::vendor_segment(&self.disclosed_vendors)
    }

    pub fn allowed_vendors(&self) -> Result<IdSet, DecodeError> {
        Self::vendor_segment(&self.allowed_vendors)
    }

    fn vendor_segment(seg: &Option<BitBuffer>) -> Result<IdSet, DecodeError> {
        match seg {
            None => Ok(IdSet::new()),
            Some(buf) => Ok(idset::decode(buf, u64::from(SEGMENT_TYPE_WIDTH))?.ids),
        }
    }

    fn pp_span(&self, field: PpField) -> Result<Option<(&BitBuffer, FieldSpan)>, DecodeError> {
        match &self.publisher_purposes {
            None => Ok(None),
            Some((buf, session)) => {
                let span = PP.resolve(field as usize, buf, session)?;
                Ok(Some((buf, span)))
            }
        }
    }

    fn pp_purpose_set(&self, field: PpField) -> Result<IdSet, DecodeError> {
        match self.pp_span(field)? {
            None => Ok(IdSet::new()),
            Some((buf, span)) => Ok(idset::decode_fixed_bitfield(
                buf,
                span.offset,
                span.width as u16,
            )?),
        }
    }

    pub fn publisher_purpose_consents(&self) -> Result<IdSet, DecodeError> {
        self.pp_purpose_set(PpField::Consents)
    }

    pub fn publisher_purpose_legitimate_interests(&self) -> Result<IdSet, DecodeError> {
        self.pp_purpose_set(PpField::LegitimateInterests)
    }

    pub fn num_custom_purposes(&self) -> Result<u8, DecodeError> {
        match self.pp_span(PpField::NumCustomPurposes)? {
            None => Ok(0),
            Some((buf, span)) => Ok(buf.read(span.offset, span.width as u32)? as u8),
        }
    }

    pub fn custom_purpose_consents(&self) -> Result<IdSet, DecodeError> {
        self.pp_purpose_set(PpField::CustomConsents)
    }

    pub fn custom_purpose_legitimate_interests(&self) -> Result<IdSet, DecodeError> {
        self.pp_purpose_set(PpField::CustomLegitimateInterests)
    }

    /// Reads every field of every present segment once, filling the memos.
    pub(crate) fn force(&self) -> Result<(), DecodeError> {
        self.version()?;
        self.created()?;
        self.last_updated()?;
        self.cmp_id()?;
        self.cmp_version()?;
        self.consent_screen()?;
        self.consent_language()?;
        self.vendor_list_version()?;
        self.policy_version()?;
        self.is_service_specific()?;
        self.use_non_standard_stacks()?;
        self.special_feature_optins()?;
        self.purpose_consents()?;
        self.purpose_legitimate_interests()?;
        self.purpose_one_treatment()?;
        self.publisher_country_code()?;
        self.vendor_consents()?;
        self.vendor_legitimate_interests()?;
        self.publisher_restrictions()?;
        self.disclosed_vendors()?;
        self.allowed_vendors()?;
        self.publisher_purpose_consents()?;
        self.publisher_purpose_legitimate_interests()?;
        self.num_custom_purposes()?;
        self.custom_purpose_consents()?;
        self.custom_purpose_legitimate_interests()?;
        Ok(())
    }
}

/// Content of the publisher-purposes segment, for encoding.
///
/// `num_custom_purposes` declares the width of both custom bitfields and is
/// never inferred from the sets.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PublisherPurposes {
    pub consents: IdSet,
    pub legitimate_interests: IdSet,
    pub num_custom_purposes: u8,
    pub custom_consents: IdSet,
    pub custom_legitimate_interests: IdSet,
}

/// Builder for multi-segment records.
///
/// Optional segments are emitted only when they carry content: vendor
/// segments when their set is non-empty, the publisher-purposes segment
/// when one was supplied.
#[derive(Debug)]
pub struct V2Encoder {
    created: u64,
    last_updated: u64,
    cmp_id: u16,
    cmp_version: u16,
    consent_screen: u8,
    consent_language: String,
    vendor_list_version: u16,
    policy_version: u8,
    is_service_specific: bool,
    use_non_standard_stacks: bool,
    special_feature_optins: IdSet,
    purpose_consents: IdSet,
    purpose_legitimate_interests: IdSet,
    purpose_one_treatment: bool,
    publisher_country_code: String,
    vendor_consents: IdSet,
    max_vendor_id: Option<u16>,
    vendor_legitimate_interests: IdSet,
    max_vendor_li_id: Option<u16>,
    publisher_restrictions: Vec<PublisherRestriction>,
    disclosed_vendors: IdSet,
    allowed_vendors: IdSet,
    publisher_purposes: Option<PublisherPurposes>,
}

impl Default for V2Encoder {
    fn default() -> Self {
        Self {
            created: 0,
            last_updated: 0,
            cmp_id: 0,
            cmp_version: 0,
            consent_screen: 0,
            consent_language: "EN".to_string(),
            vendor_list_version: 0,
            policy_version: 2,
            is_service_specific: false,
            use_non_standard_stacks: false,
            special_feature_optins: IdSet::new(),
            purpose_consents: IdSet::new(),
            purpose_legitimate_interests: IdSet::new(),
            purpose_one_treatment: false,
            publisher_country_code: "AA".to_string(),
            vendor_consents: IdSet::new(),
            max_vendor_id: None,
            vendor_legitimate_interests: IdSet::new(),
            max_vendor_li_id: None,
            publisher_restrictions: Vec::new(),
            disclosed_vendors: IdSet::new(),
            allowed_vendors: IdSet::new(),
            publisher_purposes: None,
        }
    }
}

impl V2Encoder {
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

    pub fn policy_version(mut self, version: u8) -> Self {
        self.policy_version = version;
        self
    }

    pub fn is_service_specific(mut self, v: bool) -> Self {
        self.is_service_specific = v;
        self
    }

    pub fn use_non_standard_stacks(mut self, v: bool) -> Self {
        self.use_non_standard_stacks = v;
        self
    }

    pub fn special_feature_optins(mut self, ids: IdSet) -> Self {
        self.special_feature_optins = ids;
        self
    }

    pub fn purpose_consents(mut self, ids: IdSet) -> Self {
        self.purpose_consents = ids;
        self
    }

    pub fn purpose_legitimate_interests(mut self, ids: IdSet) -> Self {
        self.purpose_legitimate_interests = ids;
        self
    }

    pub fn purpose_one_treatment(mut self, v: bool) -> Self {
        self.purpose_one_treatment = v;
        self
    }

    pub fn publisher_country_code(mut self, code: &str) -> Self {
        self.publisher_country_code = code.to_string();
        self
    }

    pub fn vendor_consents(mut self, ids: IdSet) -> Self {
        self.vendor_consents = ids;
        self
    }

    pub fn max_vendor_id(mut self, max: u16) -> Self {
        self.max_vendor_id = Some(max);
        self
    }

    pub fn vendor_legitimate_interests(mut self, ids: IdSet) -> Self {
        self.vendor_legitimate_interests = ids;
        self
    }

    pub fn max_vendor_li_id(mut self, max: u16) -> Self {
        self.max_vendor_li_id = Some(max);
        self
    }

    pub fn publisher_restriction(
        mut self,
        purpose_id: u8,
        restriction_type: RestrictionType,
        vendor_ids: IdSet,
    ) -> Self {
        self.publisher_restrictions.push(PublisherRestriction {
            purpose_id,
            restriction_type,
            vendor_ids,
        });
        self
    }

    pub fn disclosed_vendors(mut self, ids: IdSet) -> Self {
        self.disclosed_vendors = ids;
        self
    }

    pub fn allowed_vendors(mut self, ids: IdSet) -> Self {
        self.allowed_vendors = ids;
        self
    }

    pub fn publisher_purposes(mut self, pp: PublisherPurposes) -> Self {
        self.publisher_purposes = Some(pp);
        self
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        let mut w = BitWriter::new();
        w.write(2, 6)?;
        write_timestamp(&mut w, self.created)?;
        write_timestamp(&mut w, self.last_updated)?;
        w.write(u64::from(self.cmp_id), 12)?;
        w.write(u64::from(self.cmp_version), 12)?;
        w.write(u64::from(self.consent_screen), 6)?;
        write_code(&mut w, &self.consent_language)?;
        w.write(u64::from(self.vendor_list_version), 12)?;
        w.write(u64::from(self.policy_version), 6)?;
        w.write_bit(self.is_service_specific)?;
        w.write_bit(self.use_non_standard_stacks)?;
        idset::encode_fixed_bitfield(&mut w, &self.special_feature_optins, SPECIAL_FEATURES_WIDTH)?;
        idset::encode_fixed_bitfield(&mut w, &self.purpose_consents, PURPOSES_WIDTH)?;
        idset::encode_fixed_bitfield(&mut w, &self.purpose_legitimate_interests, PURPOSES_WIDTH)?;
        w.write_bit(self.purpose_one_treatment)?;
        write_code(&mut w, &self.publisher_country_code)?;
        idset::encode(&mut w, &self.vendor_consents, self.max_vendor_id)?;
        idset::encode(&mut w, &self.vendor_legitimate_interests, self.max_vendor_li_id)?;
        self.write_restrictions(&mut w)?;

        let mut extras = Vec::new();
        for (segment_type, ids) in [
            (SegmentType::DisclosedVendors, &self.disclosed_vendors),
            (SegmentType::AllowedVendors, &self.allowed_vendors),
        ] {
            if !ids.is_empty() {
                let mut seg = BitWriter::new();
                idset::encode(&mut seg, ids, None)?;
                extras.push((segment_type, seg));
            }
        }
        if let Some(pp) = &self.publisher_purposes {
            extras.push((SegmentType::PublisherPurposes, Self::encode_pp(pp)?));
        }
        Ok(compose(w, extras)?)
    }

    fn write_restrictions(&self, w: &mut BitWriter) -> Result<(), EncodeError> {
        w.write(self.publisher_restrictions.len() as u64, NUM_RESTRICTIONS_WIDTH)?;
        for r in &self.publisher_restrictions {
            w.write(u64::from(r.purpose_id), RESTRICTION_PURPOSE_WIDTH)?;
            w.write(r.restriction_type as u64, RESTRICTION_TYPE_WIDTH)?;
            idset::encode_range_only(w, &r.vendor_ids)?;
        }
        Ok(())
    }

    fn encode_pp(pp: &PublisherPurposes) -> Result<BitWriter, EncodeError> {
        let mut w = BitWriter::new();
        idset::encode_fixed_bitfield(&mut w, &pp.consents, PURPOSES_WIDTH)?;
        idset::encode_fixed_bitfield(&mut w, &pp.legitimate_interests, PURPOSES_WIDTH)?;
        w.write(u64::from(pp.num_custom_purposes), NUM_CUSTOM_PURPOSES_WIDTH)?;
        idset::encode_fixed_bitfield(
            &mut w,
            &pp.custom_consents,
            u16::from(pp.num_custom_purposes),
        )?;
        idset::encode_fixed_bitfield(
            &mut w,
            &pp.custom_legitimate_interests,
            u16::from(pp.num_custom_purposes),
        )?;
        Ok(w)
    }
}
