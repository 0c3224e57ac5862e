//! Configuration for the static identity service plugin.

use serde::Deserialize;

/// Plugin configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticIdentityPluginConfig {
    /// Issuer written into minted tokens and required on validation.
    pub issuer: String,

    /// Application id; also the subject of application tokens.
    pub application_id: String,

    /// Lifetime of minted tokens in seconds. `0` disables expiry.
    pub token_ttl_secs: u64,

    /// Principal lookup mode.
    pub mode: IdentityMode,

    /// Authorizations granted to any principal in `accept_all` mode.
    pub default_authorizations: Vec<String>,

    /// Authorizations carried by application tokens.
    pub app_authorizations: Vec<String>,

    /// Principal mappings for `static_principals` mode.
    pub principals: Vec<PrincipalMapping>,

    /// Subjects whose tokens fail validation.
    pub revoked_subjects: Vec<String>,
}

impl Default for StaticIdentityPluginConfig {
    fn default() -> Self {
        Self {
            issuer: "ctxbind-static".to_owned(),
            application_id: "ctxbind".to_owned(),
            token_ttl_secs: 3600,
            mode: IdentityMode::AcceptAll,
            default_authorizations: vec!["U".to_owned()],
            app_authorizations: vec!["U".to_owned()],
            principals: Vec::new(),
            revoked_subjects: Vec::new(),
        }
    }
}

/// Principal lookup mode.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// Accept any non-empty principal with the default authorizations.
    #[default]
    AcceptAll,
    /// Only principals listed in the configuration are known.
    StaticPrincipals,
}

/// Maps a principal to its visibility labels.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalMapping {
    pub principal: String,
    pub authorizations: Vec<String>,
}
