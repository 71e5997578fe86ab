//! This crate is an implementation of the IAB Transparency and Consent
//! Framework (TCF)
//! [Consent String Specification](https://github.com/InteractiveAdvertisingBureau/GDPR-Transparency-and-Consent-Framework),
//! covering both the legacy version 1 format and the multi-segment
//! version 2 format.
//!
//! NOTE: This is not an official IAB library.
//!
//! # Parsing TC strings
//!
//! A TC string is a `.`-separated list of base64url segments; the version
//! field of the first segment selects the record layout. [`TcString`]
//! dispatches on it:
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! use std::str::FromStr;
//! use iab_tcf::TcString;
//!
//! let s = "CPXxRfAPXxRfAAfKABENB-CgAAAAAAAAAAYgAAAAAAAA";
//! let tc = TcString::from_str(s)?;
//!
//! assert_eq!(tc.version(), 2);
//! assert_eq!(tc.cmp_id()?, 31);
//! assert_eq!(tc.consent_language()?, "EN");
//!
//! // version-specific fields live on the variant's record type
//! if let Some(v2) = tc.as_v2() {
//!     assert!(v2.is_service_specific()?);
//!     assert!(v2.vendor_consents()?.is_empty());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Records decode lazily: each accessor reads just the bits it needs, and
//! variable field positions are resolved once per record. Use
//! [`TcString::decode_eager`] to force everything up front.
//!
//! # Building TC strings
//!
//! The encoders are plain builders; set fields are validated and the
//! variable-length vendor sets pick their cheapest physical representation:
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! use std::collections::BTreeSet;
//! use iab_tcf::V2Encoder;
//!
//! let s = V2Encoder::new()
//!     .cmp_id(31)
//!     .consent_language("EN")
//!     .purpose_consents(BTreeSet::from_iter([1, 3]))
//!     .vendor_consents(BTreeSet::from_iter([2, 6, 8]))
//!     .encode()?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod records;
pub mod segments;

pub use crate::core::bits::{BitBuffer, BitSource, BitWriter, BitsError, StreamBitReader};
pub use crate::core::idset::{IdSet, IdSetError};
pub use crate::core::layout::{FieldSpan, LayoutError, LayoutSession, Schema};
pub use crate::records::v1::{TcfV1Record, V1Encoder};
pub use crate::records::v2::{
    PublisherPurposes, PublisherRestriction, RestrictionType, TcfV2Record, V2Encoder,
};
pub use crate::records::{DecodeError, EncodeError, TcString};
pub use crate::segments::{SegmentError, SegmentType};
