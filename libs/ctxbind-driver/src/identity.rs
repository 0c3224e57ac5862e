//! Lazily constructed, process-shared identity service handle.

use std::sync::Arc;

use identity_service_sdk::IdentityServiceClient;
use parking_lot::Mutex;

use crate::error::Error;
use crate::properties::Properties;

/// Builds the identity service client from the effective connection properties.
pub type IdentityFactory =
    Arc<dyn Fn(&Properties) -> Result<Arc<dyn IdentityServiceClient>, Error> + Send + Sync>;

/// One-time-initialized identity service client.
///
/// The factory runs at most once, on the first connection that needs the
/// service. Concurrent first use is serialized by the mutex so no duplicate
/// clients are built. A failed construction leaves the cell empty and the
/// next caller tries again.
pub struct IdentityServiceCell {
    factory: IdentityFactory,
    client: Mutex<Option<Arc<dyn IdentityServiceClient>>>,
}

impl IdentityServiceCell {
    #[must_use]
    pub fn new(factory: IdentityFactory) -> Self {
        Self {
            factory,
            client: Mutex::new(None),
        }
    }

    /// Cell that already holds `client`.
    #[must_use]
    pub fn with_client(client: Arc<dyn IdentityServiceClient>) -> Self {
        let factory: IdentityFactory = {
            let client = client.clone();
            Arc::new(move |_: &Properties| Ok(client.clone()))
        };
        Self {
            factory,
            client: Mutex::new(Some(client)),
        }
    }

    /// Cell whose factory always fails. For drivers configured without an
    /// identity service; sources that never call it still work.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self::new(Arc::new(|_: &Properties| {
            Err(Error::config("no identity service configured"))
        }))
    }

    /// The client, constructing it on first use.
    ///
    /// # Errors
    /// Whatever the factory returns.
    pub fn get_or_init(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn IdentityServiceClient>, Error> {
        let mut slot = self.client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = (self.factory)(properties)?;
        tracing::info!("identity service client initialized");
        *slot = Some(client.clone());
        Ok(client)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.client.lock().is_some()
    }
}

impl std::fmt::Debug for IdentityServiceCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityServiceCell")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// Identity handle given to token source constructors: the shared cell plus
/// the properties of the connection being opened.
#[derive(Clone, Debug)]
pub struct IdentityHandle {
    cell: Arc<IdentityServiceCell>,
    properties: Properties,
}

impl IdentityHandle {
    #[must_use]
    pub fn new(cell: Arc<IdentityServiceCell>, properties: Properties) -> Self {
        Self { cell, properties }
    }

    /// # Errors
    /// Construction of the client failed.
    pub fn client(&self) -> Result<Arc<dyn IdentityServiceClient>, Error> {
        self.cell.get_or_init(&self.properties)
    }
}
