//! Text-safe transport encoding for PCM payloads.
//!
//! Encoding always emits the standard alphabet with `=` padding. Decoding is
//! deliberately looser: padding may be present or absent, non-zero trailing
//! bits are tolerated, and ASCII whitespace is skipped. Only characters outside
//! the alphabet (or a length no encoder could have produced) are rejected.

use std::borrow::Cow;

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
        DecodePaddingMode,
    },
    Engine as _,
};

use crate::error::{JarvisError, Result};

const PERMISSIVE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encode raw bytes as padded standard base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64 text back to raw bytes.
///
/// # Errors
/// `JarvisError::MalformedEncoding` for characters outside the alphabet or an
/// impossible symbol count.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let compact: Cow<'_, str> = if text.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(text.chars().filter(|c| !c.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(text)
    };

    PERMISSIVE
        .decode(compact.as_bytes())
        .map_err(|e| JarvisError::MalformedEncoding(e.to_string()))
}
