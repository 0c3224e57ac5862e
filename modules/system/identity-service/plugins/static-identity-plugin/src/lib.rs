#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Static Identity Service Plugin
//!
//! This plugin issues and validates security tokens from configuration, with no
//! network dependency. Intended for development, tests, and single-node setups.
//!
//! ## Modes
//!
//! - **`accept_all`** (default): Any non-empty principal receives a token carrying
//!   `default_authorizations`.
//!
//! - **`static_principals`**: Only principals listed in `principals` receive tokens,
//!   each with its own authorizations.
//!
//! ## Configuration
//!
//! ```yaml
//! identity:
//!   issuer: "ctxbind-static"
//!   application_id: "reports"
//!   token_ttl_secs: 3600
//!   mode: static_principals
//!   app_authorizations: ["U"]
//!   principals:
//!     - principal: "alice"
//!       authorizations: ["U", "S"]
//!   revoked_subjects: []
//! ```

pub mod config;
pub mod domain;

pub use config::StaticIdentityPluginConfig;
pub use domain::Service as StaticIdentityService;
