#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
pub mod bin_codec;
pub mod token;
pub mod transport;

pub use token::{SecurityToken, SecurityTokenBuilder, SubjectType};

pub use bin_codec::{
    SECTOKEN_BIN_VERSION, SecTokenDecodeError, SecTokenEncodeError, decode_bin, encode_bin,
};
pub use transport::{decode_transport, encode_transport};
