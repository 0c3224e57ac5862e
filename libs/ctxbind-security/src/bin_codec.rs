//! Versioned binary encoding of [`SecurityToken`].
//!
//! Layout: one version byte followed by the `postcard` body.

use thiserror::Error;

use crate::SecurityToken;

/// Current binary layout version.
pub const SECTOKEN_BIN_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum SecTokenEncodeError {
    #[error("failed to serialize security token: {0}")]
    Serialize(#[from] postcard::Error),
}

#[derive(Debug, Error)]
pub enum SecTokenDecodeError {
    #[error("empty security token payload")]
    Empty,

    #[error("unsupported sectoken version {found} (expected {expected})", expected = SECTOKEN_BIN_VERSION)]
    UnsupportedVersion { found: u8 },

    #[error("failed to deserialize security token: {0}")]
    Deserialize(#[from] postcard::Error),

    #[error("invalid transport encoding: {0}")]
    Transport(#[from] base64::DecodeError),
}

/// Encode a token into its versioned binary form.
///
/// # Errors
/// Returns `SecTokenEncodeError` if serialization fails.
pub fn encode_bin(token: &SecurityToken) -> Result<Vec<u8>, SecTokenEncodeError> {
    let mut out = vec![SECTOKEN_BIN_VERSION];
    out.extend(postcard::to_allocvec(token)?);
    Ok(out)
}

/// Decode a token from its versioned binary form.
///
/// # Errors
/// Returns `SecTokenDecodeError` on an empty payload, an unknown version byte,
/// or a malformed body.
pub fn decode_bin(bytes: &[u8]) -> Result<SecurityToken, SecTokenDecodeError> {
    let (&version, body) = bytes.split_first().ok_or(SecTokenDecodeError::Empty)?;
    if version != SECTOKEN_BIN_VERSION {
        return Err(SecTokenDecodeError::UnsupportedVersion { found: version });
    }
    Ok(postcard::from_bytes(body)?)
}
