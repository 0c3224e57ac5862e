//! Driver configuration.
//!
//! Loaded with `figment` from an optional YAML file, then environment
//! variables prefixed `CTXBIND_` (nested keys separated by `__`). The driver
//! reads the `driver` section:
//!
//! ```yaml
//! driver:
//!   default_token_provider: "ctxbind::ServiceIdentitySource"
//!   properties:
//!     user: "reports"
//!     sslmode: "disable"
//! ```
//!
//! The same document may carry other sections (e.g. `identity`) for the
//! embedding application to extract from [`figment`].

use std::collections::BTreeMap;
use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;

use crate::error::Error;
use crate::properties::Properties;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CTXBIND_";

const DRIVER_SECTION: &str = "driver";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Token provider selector used when neither the caller nor the URL names one.
    pub default_token_provider: Option<String>,

    /// Base connection properties. Caller properties and URL query values
    /// override these.
    pub properties: BTreeMap<String, String>,
}

/// Layered configuration: YAML file (if any), then `CTXBIND_*` variables.
///
/// # Errors
/// `Configuration` if `path` is given but does not exist.
pub fn figment(path: Option<&Path>) -> Result<Figment, Error> {
    let mut figment = Figment::new();
    if let Some(path) = path {
        if !path.is_file() {
            return Err(Error::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        figment = figment.merge(Yaml::file(path));
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

impl DriverConfig {
    /// # Errors
    /// `Configuration` if the file is missing or the section does not parse.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        Self::from_figment(&figment(path)?)
    }

    /// Extract the `driver` section; an absent section yields defaults.
    ///
    /// # Errors
    /// `Configuration` if the section does not parse.
    pub fn from_figment(figment: &Figment) -> Result<Self, Error> {
        if !figment.contains(DRIVER_SECTION) {
            return Ok(Self::default());
        }
        figment
            .extract_inner(DRIVER_SECTION)
            .map_err(|e| Error::config(format!("invalid driver configuration: {e}")))
    }

    #[must_use]
    pub fn base_properties(&self) -> Properties {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}
