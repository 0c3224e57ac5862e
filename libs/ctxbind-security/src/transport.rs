//! Text-safe transport encoding used for the session variable and the
//! explicit-token connection property.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::bin_codec::{SecTokenDecodeError, SecTokenEncodeError, decode_bin, encode_bin};
use crate::SecurityToken;

/// Encode a token as standard, padded base64 of its binary form.
///
/// The output never contains quote characters, so it can be embedded in a
/// single-quoted SQL literal as is.
///
/// # Errors
/// Returns `SecTokenEncodeError` if serialization fails.
pub fn encode_transport(token: &SecurityToken) -> Result<String, SecTokenEncodeError> {
    Ok(STANDARD.encode(encode_bin(token)?))
}

/// Decode a token produced by [`encode_transport`].
///
/// Surrounding whitespace is ignored.
///
/// # Errors
/// Returns `SecTokenDecodeError` if the text is not valid base64 or the
/// decoded payload is not a supported token.
pub fn decode_transport(encoded: &str) -> Result<SecurityToken, SecTokenDecodeError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    decode_bin(&bytes)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn transport_encoding_is_sql_literal_safe() {
        let token = SecurityToken::builder()
            .subject_id("o'brien")
            .authorizations(["U", "S"])
            .build();

        let encoded = encode_transport(&token).unwrap();
        assert!(!encoded.contains('\''));
        assert!(!encoded.contains('\\'));
    }

    #[test]
    fn decode_rejects_non_base64() {
        let err = decode_transport("not base64 at all!").unwrap_err();
        assert!(matches!(err, SecTokenDecodeError::Transport(_)));
    }

    #[test]
    fn decode_rejects_empty_payload() {
        let err = decode_transport("").unwrap_err();
        assert!(matches!(err, SecTokenDecodeError::Empty));
    }
}
