use std::collections::HashMap;
use std::sync::Arc;

use super::{
    AMBIENT_CONTEXT_SOURCE, AmbientContextSource, FIXED_TOKEN_SOURCE, FixedTokenSource,
    SERVICE_IDENTITY_SOURCE, ServiceIdentitySource, TokenSource,
};
use crate::error::Error;
use crate::identity::IdentityHandle;
use crate::properties::{Properties, TOKEN_PROPERTY, TOKEN_PROVIDER_PROPERTY};

/// What a token source constructor gets to work with.
pub struct SourceContext<'a> {
    /// Effective properties of the connection being opened.
    pub properties: &'a Properties,
    /// Shared identity service handle.
    pub identity: IdentityHandle,
}

pub type TokenSourceConstructor =
    Arc<dyn Fn(&SourceContext<'_>) -> Result<Arc<dyn TokenSource>, Error> + Send + Sync>;

/// Maps selector names to token source constructors.
#[derive(Clone)]
pub struct TokenSourceRegistry {
    constructors: HashMap<String, TokenSourceConstructor>,
    default_selector: String,
}

impl Default for TokenSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSourceRegistry {
    /// Registry with the three built-in sources; ambient context is the default.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty(AMBIENT_CONTEXT_SOURCE);
        registry.register(
            AMBIENT_CONTEXT_SOURCE,
            Arc::new(|ctx: &SourceContext<'_>| {
                Ok(Arc::new(AmbientContextSource::new(ctx.identity.clone())) as Arc<dyn TokenSource>)
            }),
        );
        registry.register(
            SERVICE_IDENTITY_SOURCE,
            Arc::new(|ctx: &SourceContext<'_>| {
                let identity = ctx.identity.client()?;
                Ok(Arc::new(ServiceIdentitySource::new(identity)) as Arc<dyn TokenSource>)
            }),
        );
        registry.register(
            FIXED_TOKEN_SOURCE,
            Arc::new(|ctx: &SourceContext<'_>| {
                let encoded = ctx.properties.get(TOKEN_PROPERTY).ok_or_else(|| {
                    Error::config(format!(
                        "{FIXED_TOKEN_SOURCE} requires the '{TOKEN_PROPERTY}' property"
                    ))
                })?;
                let identity = ctx.identity.client()?;
                Ok(Arc::new(FixedTokenSource::from_encoded(encoded, identity)?)
                    as Arc<dyn TokenSource>)
            }),
        );
        registry
    }

    /// Registry with no sources.
    #[must_use]
    pub fn empty(default_selector: &str) -> Self {
        Self {
            constructors: HashMap::new(),
            default_selector: default_selector.to_owned(),
        }
    }

    /// Register (or replace) the constructor for `selector`.
    pub fn register(&mut self, selector: &str, constructor: TokenSourceConstructor) {
        self.constructors.insert(selector.to_owned(), constructor);
    }

    /// Selector used when the properties name none.
    pub fn set_default_selector(&mut self, selector: &str) {
        selector.clone_into(&mut self.default_selector);
    }

    #[must_use]
    pub fn default_selector(&self) -> &str {
        &self.default_selector
    }

    #[must_use]
    pub fn contains(&self, selector: &str) -> bool {
        self.constructors.contains_key(selector)
    }

    /// Registered selector names, sorted.
    #[must_use]
    pub fn selectors(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the token source selected by `properties`.
    ///
    /// # Errors
    /// [`Error::Configuration`] for an unknown selector, a fixed-token
    /// selection without a valid token, or an identity service that cannot be
    /// constructed.
    pub fn select(
        &self,
        properties: &Properties,
        identity: IdentityHandle,
    ) -> Result<Arc<dyn TokenSource>, Error> {
        let selector = properties
            .get(TOKEN_PROVIDER_PROPERTY)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_selector.as_str());

        let constructor = self.constructors.get(selector).ok_or_else(|| {
            Error::config(format!("token provider '{selector}' not found"))
        })?;

        let source = constructor(&SourceContext {
            properties,
            identity,
        })?;
        tracing::debug!(token_provider = selector, "token source selected");
        Ok(source)
    }
}

impl std::fmt::Debug for TokenSourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSourceRegistry")
            .field("selectors", &self.selectors())
            .field("default_selector", &self.default_selector)
            .finish()
    }
}
