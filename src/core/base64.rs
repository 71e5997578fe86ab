//! Base64url transport for individual segments.
//!
//! Segments use the URL-safe alphabet without padding. Decoding tolerates
//! trailing `=` padding produced by permissive encoders; encoding never
//! emits it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::{DecodeError, Engine};

pub(crate) trait DecodeExt {
    fn decode_base64_url(&self) -> Result<Vec<u8>, DecodeError>;
}

impl DecodeExt for str {
    fn decode_base64_url(&self) -> Result<Vec<u8>, DecodeError> {
        URL_SAFE_NO_PAD.decode(self.trim_end_matches('='))
    }
}

pub(crate) fn encode_base64_url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}
