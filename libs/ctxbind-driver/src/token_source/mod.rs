//! Strategies for producing the caller's security token.
//!
//! One source is selected per connection when it is opened and is asked for a
//! fresh token before every execution. Sources never cache.

use async_trait::async_trait;
use ctxbind_security::SecurityToken;

use crate::error::TokenError;

pub mod ambient;
mod fixed;
mod registry;
mod service;

pub use ambient::{AmbientCaller, AmbientContextSource};
pub use fixed::FixedTokenSource;
pub use registry::{SourceContext, TokenSourceConstructor, TokenSourceRegistry};
pub use service::ServiceIdentitySource;

/// Selector of [`AmbientContextSource`]; the default.
pub const AMBIENT_CONTEXT_SOURCE: &str = "ctxbind::AmbientContextSource";

/// Selector of [`ServiceIdentitySource`].
pub const SERVICE_IDENTITY_SOURCE: &str = "ctxbind::ServiceIdentitySource";

/// Selector of [`FixedTokenSource`]. Requires the `token` property.
pub const FIXED_TOKEN_SOURCE: &str = "ctxbind::FixedTokenSource";

/// Produces the current security token, or fails.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Selector name this source was registered under.
    fn name(&self) -> &str;

    /// Resolve the token to bind for the next execution.
    ///
    /// # Errors
    /// [`TokenError::Unavailable`] when the lookup or the identity service
    /// fails, [`TokenError::Invalid`] when the identity service rejects the token.
    async fn resolve(&self) -> Result<SecurityToken, TokenError>;
}

impl std::fmt::Debug for dyn TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TokenSource").field(&self.name()).finish()
    }
}
