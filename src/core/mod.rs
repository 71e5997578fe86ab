//! Format-agnostic building blocks: bit-level access, base64url transport,
//! field layout resolution and the sparse ID set codec.

pub(crate) mod base64;
pub mod bits;
pub mod idset;
pub mod layout;
