//! Identity Service SDK
//!
//! This crate provides the contract the driver uses to obtain and check
//! security tokens:
//!
//! - [`IdentityServiceClient`] - Client trait implemented by identity service plugins
//! - [`IdentityServiceError`] - Error types
//!
//! ## Usage
//!
//! ```ignore
//! use identity_service_sdk::IdentityServiceClient;
//!
//! let token = identity.fetch_app_token().await?;
//! let refreshed = identity.validate_token(&token).await?;
//! ```

pub mod api;
pub mod error;

// Re-export main types at crate root
pub use api::IdentityServiceClient;
pub use error::IdentityServiceError;
