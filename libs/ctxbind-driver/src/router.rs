//! Connection factory for `ctxbind:` URLs.

use std::sync::Arc;

use async_trait::async_trait;
use identity_service_sdk::IdentityServiceClient;

use crate::backend::{Connection, Driver, DriverRegistry};
use crate::binder::ContextBinder;
use crate::config::DriverConfig;
use crate::connection::BoundConnection;
use crate::error::Error;
use crate::identity::{IdentityHandle, IdentityServiceCell};
use crate::properties::Properties;
use crate::token_source::TokenSourceRegistry;
use crate::url::{self, URL_PREFIX};

/// Opens real connections for `ctxbind:` URLs and binds the security
/// context before every statement executed on them.
pub struct BindingDriver {
    drivers: DriverRegistry,
    token_sources: TokenSourceRegistry,
    identity: Arc<IdentityServiceCell>,
    base_properties: Properties,
}

impl BindingDriver {
    #[must_use]
    pub fn builder() -> BindingDriverBuilder {
        BindingDriverBuilder::default()
    }

    /// Open a bound connection.
    ///
    /// Property precedence, lowest first: configured base properties,
    /// `properties`, URL query values.
    ///
    /// # Errors
    /// - `Configuration` if the URL lacks the prefix, no driver accepts it, or
    ///   the token source cannot be selected
    /// - `Driver` if the real driver fails to connect
    #[tracing::instrument(skip_all, fields(url = url::redacted(url)))]
    pub async fn open(&self, url: &str, properties: &Properties) -> Result<BoundConnection, Error> {
        if !url::has_prefix(url) {
            return Err(Error::config(format!(
                "URL must start with '{URL_PREFIX}': {}",
                url::redacted(url)
            )));
        }

        let overrides = url::query_overrides(url)?;
        let merged = self
            .base_properties
            .merged_with(properties)
            .merged_with(&overrides);

        let source = self.token_sources.select(
            &merged,
            IdentityHandle::new(self.identity.clone(), merged.clone()),
        )?;

        let real_url = url::real_url(url);
        let driver = self.drivers.driver_for(&real_url).ok_or_else(|| {
            Error::config(format!("no driver accepts '{}'", url::redacted(&real_url)))
        })?;
        let connection = driver
            .connect(&real_url, &merged.without_recognized())
            .await?;

        tracing::info!(
            driver = driver.name(),
            token_provider = source.name(),
            "bound connection opened"
        );
        Ok(BoundConnection::new(
            connection,
            Arc::new(ContextBinder::new(source)),
        ))
    }

    /// `true` if `url` carries the prefix and some driver accepts the rest.
    #[must_use]
    pub fn accepts_url(&self, url: &str) -> bool {
        url::has_prefix(url) && self.drivers.driver_for(&url::real_url(url)).is_some()
    }

    #[must_use]
    pub fn token_sources(&self) -> &TokenSourceRegistry {
        &self.token_sources
    }
}

#[async_trait]
impl Driver for BindingDriver {
    fn name(&self) -> &str {
        "ctxbind"
    }

    fn accepts_url(&self, url: &str) -> bool {
        BindingDriver::accepts_url(self, url)
    }

    async fn connect(
        &self,
        url: &str,
        properties: &Properties,
    ) -> Result<Arc<dyn Connection>, Error> {
        Ok(Arc::new(self.open(url, properties).await?))
    }
}

#[derive(Default)]
pub struct BindingDriverBuilder {
    drivers: DriverRegistry,
    token_sources: Option<TokenSourceRegistry>,
    identity: Option<Arc<IdentityServiceCell>>,
    config: DriverConfig,
}

impl BindingDriverBuilder {
    /// Register a real driver. Drivers are consulted in registration order.
    #[must_use]
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.drivers.register(driver);
        self
    }

    #[must_use]
    pub fn token_sources(mut self, registry: TokenSourceRegistry) -> Self {
        self.token_sources = Some(registry);
        self
    }

    /// Shared identity service cell, constructed lazily.
    #[must_use]
    pub fn identity(mut self, cell: Arc<IdentityServiceCell>) -> Self {
        self.identity = Some(cell);
        self
    }

    /// Ready-made identity service client.
    #[must_use]
    pub fn identity_client(self, client: Arc<dyn IdentityServiceClient>) -> Self {
        self.identity(Arc::new(IdentityServiceCell::with_client(client)))
    }

    #[must_use]
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// # Errors
    /// `Configuration` if the configured default token provider is not registered.
    pub fn build(self) -> Result<BindingDriver, Error> {
        let mut token_sources = self.token_sources.unwrap_or_default();
        if let Some(selector) = self.config.default_token_provider.as_deref() {
            if !token_sources.contains(selector) {
                return Err(Error::config(format!(
                    "default token provider '{selector}' not found"
                )));
            }
            token_sources.set_default_selector(selector);
        }
        if self.drivers.is_empty() {
            tracing::warn!("binding driver built without any real driver");
        }

        Ok(BindingDriver {
            drivers: self.drivers,
            token_sources,
            identity: self
                .identity
                .unwrap_or_else(|| Arc::new(IdentityServiceCell::unconfigured())),
            base_properties: self.config.base_properties(),
        })
    }
}
