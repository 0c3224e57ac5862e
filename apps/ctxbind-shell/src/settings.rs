use std::path::Path;

use anyhow::{Context, Result};
use ctxbind_driver::{DriverConfig, config};
use static_identity_plugin::StaticIdentityPluginConfig;

const IDENTITY_SECTION: &str = "identity";

/// Everything the shell reads from its configuration file.
#[derive(Debug, Default)]
pub struct Settings {
    pub driver: DriverConfig,
    pub identity: StaticIdentityPluginConfig,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = config::figment(path)?;
        let driver = DriverConfig::from_figment(&figment)?;
        let identity = if figment.contains(IDENTITY_SECTION) {
            figment
                .extract_inner(IDENTITY_SECTION)
                .context("invalid identity configuration")?
        } else {
            StaticIdentityPluginConfig::default()
        };
        Ok(Self { driver, identity })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn both_sections_are_read() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(
            b"driver:\n  default_token_provider: ctxbind::ServiceIdentitySource\nidentity:\n  issuer: shell\n  application_id: reports\n",
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(
            settings.driver.default_token_provider.as_deref(),
            Some("ctxbind::ServiceIdentitySource")
        );
        assert_eq!(settings.identity.issuer, "shell");
        assert_eq!(settings.identity.application_id, "reports");
    }
}
