//! Service implementation for the static identity service plugin.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ctxbind_security::{SecurityToken, SubjectType};
use identity_service_sdk::IdentityServiceError;

use crate::config::{IdentityMode, StaticIdentityPluginConfig};

/// Source of the current time in unix seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Static identity service.
///
/// Mints tokens from configuration:
/// - `accept_all`: Any non-empty principal maps to the default authorizations
/// - `static_principals`: Only configured principals receive tokens
pub struct Service {
    issuer: String,
    application_id: String,
    token_ttl_secs: u64,
    mode: IdentityMode,
    default_authorizations: Vec<String>,
    app_authorizations: Vec<String>,
    principals: HashMap<String, Vec<String>>,
    revoked_subjects: HashSet<String>,
    clock: Clock,
}

impl Service {
    /// Create a service from plugin configuration, using the system clock.
    #[must_use]
    pub fn from_config(cfg: &StaticIdentityPluginConfig) -> Self {
        Self::with_clock(cfg, Arc::new(system_now))
    }

    /// Create a service from plugin configuration with an explicit clock.
    #[must_use]
    pub fn with_clock(cfg: &StaticIdentityPluginConfig, clock: Clock) -> Self {
        if cfg.mode == IdentityMode::AcceptAll {
            tracing::warn!(
                "Static identity service is running in `accept_all` mode; \
                 every principal receives a token. Do NOT use this mode in production."
            );
        }

        let principals = cfg
            .principals
            .iter()
            .map(|m| (m.principal.clone(), m.authorizations.clone()))
            .collect();

        Self {
            issuer: cfg.issuer.clone(),
            application_id: cfg.application_id.clone(),
            token_ttl_secs: cfg.token_ttl_secs,
            mode: cfg.mode.clone(),
            default_authorizations: cfg.default_authorizations.clone(),
            app_authorizations: cfg.app_authorizations.clone(),
            principals,
            revoked_subjects: cfg.revoked_subjects.iter().cloned().collect(),
            clock,
        }
    }

    /// Mint a user token for `principal`.
    ///
    /// # Errors
    /// `UnknownPrincipal` if the principal is empty, or not configured in
    /// `static_principals` mode.
    pub fn caller_token(&self, principal: &str) -> Result<SecurityToken, IdentityServiceError> {
        if principal.is_empty() {
            return Err(IdentityServiceError::UnknownPrincipal(String::new()));
        }

        let authorizations = match self.mode {
            IdentityMode::AcceptAll => &self.default_authorizations,
            IdentityMode::StaticPrincipals => self
                .principals
                .get(principal)
                .ok_or_else(|| IdentityServiceError::UnknownPrincipal(principal.to_owned()))?,
        };

        Ok(self.mint(principal, SubjectType::User, authorizations))
    }

    /// Mint a token for the configured application.
    #[must_use]
    pub fn app_token(&self) -> SecurityToken {
        self.mint(&self.application_id, SubjectType::App, &self.app_authorizations)
    }

    /// Check a token against issuer, revocation list, and expiry.
    ///
    /// # Errors
    /// `Rejected` with the reason if any check fails.
    pub fn validate(&self, token: &SecurityToken) -> Result<SecurityToken, IdentityServiceError> {
        if token.issuer() != self.issuer {
            return Err(IdentityServiceError::Rejected(format!(
                "issuer '{}' is not trusted",
                token.issuer()
            )));
        }
        if self.revoked_subjects.contains(token.subject_id()) {
            return Err(IdentityServiceError::Rejected(format!(
                "subject '{}' is revoked",
                token.subject_id()
            )));
        }
        if token.is_expired_at((self.clock)()) {
            return Err(IdentityServiceError::Rejected("token expired".to_owned()));
        }
        Ok(token.clone())
    }

    fn mint(&self, subject: &str, subject_type: SubjectType, labels: &[String]) -> SecurityToken {
        let now = (self.clock)();
        let expires_at = if self.token_ttl_secs == 0 {
            0
        } else {
            now.saturating_add(self.token_ttl_secs)
        };

        SecurityToken::builder()
            .subject_id(subject)
            .subject_type(subject_type)
            .application_id(&self.application_id)
            .authorizations(labels.iter().cloned())
            .issued_at(now)
            .expires_at(expires_at)
            .issuer(&self.issuer)
            .build()
    }
}

fn system_now() -> u64 {
    u64::try_from(time::OffsetDateTime::now_utc().unix_timestamp()).unwrap_or_default()
}
