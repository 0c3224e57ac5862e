use std::collections::BTreeSet;

/// Kind of principal a [`SecurityToken`] was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// An end user, possibly proxied by an application.
    #[default]
    User,
    /// The connecting application itself.
    App,
}

/// `SecurityToken` carries the authorization attributes of an authenticated principal.
///
/// Issued by the identity service and transported verbatim into the database session,
/// where row-level policies read the visibility labels in `authorizations`.
/// The token is immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SecurityToken {
    /// Subject identity (user principal or application security id).
    subject_id: String,
    subject_type: SubjectType,
    /// Application the token was issued to, if any.
    application_id: Option<String>,
    /// Visibility labels the subject is cleared for.
    #[serde(default)]
    authorizations: BTreeSet<String>,
    /// Issue time, unix seconds.
    issued_at: u64,
    /// Expiry time, unix seconds. `0` means the token never expires.
    expires_at: u64,
    issuer: String,
}

impl SecurityToken {
    /// Create a new `SecurityToken` builder
    #[must_use]
    pub fn builder() -> SecurityTokenBuilder {
        SecurityTokenBuilder::default()
    }

    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    #[must_use]
    pub fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    #[must_use]
    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    /// Visibility labels, in sorted order.
    #[must_use]
    pub fn authorizations(&self) -> &BTreeSet<String> {
        &self.authorizations
    }

    #[must_use]
    pub fn has_authorization(&self, label: &str) -> bool {
        self.authorizations.contains(label)
    }

    #[must_use]
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    #[must_use]
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Whether the token is past its expiry at `now` (unix seconds).
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at != 0 && now >= self.expires_at
    }
}

#[derive(Default)]
pub struct SecurityTokenBuilder {
    subject_id: String,
    subject_type: SubjectType,
    application_id: Option<String>,
    authorizations: BTreeSet<String>,
    issued_at: u64,
    expires_at: u64,
    issuer: String,
}

impl SecurityTokenBuilder {
    #[must_use]
    pub fn subject_id(mut self, subject_id: &str) -> Self {
        subject_id.clone_into(&mut self.subject_id);
        self
    }

    #[must_use]
    pub fn subject_type(mut self, subject_type: SubjectType) -> Self {
        self.subject_type = subject_type;
        self
    }

    #[must_use]
    pub fn application_id(mut self, application_id: &str) -> Self {
        self.application_id = Some(application_id.to_owned());
        self
    }

    #[must_use]
    pub fn authorizations<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorizations = labels.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn issued_at(mut self, issued_at: u64) -> Self {
        self.issued_at = issued_at;
        self
    }

    #[must_use]
    pub fn expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = expires_at;
        self
    }

    #[must_use]
    pub fn issuer(mut self, issuer: &str) -> Self {
        issuer.clone_into(&mut self.issuer);
        self
    }

    #[must_use]
    pub fn build(self) -> SecurityToken {
        SecurityToken {
            subject_id: self.subject_id,
            subject_type: self.subject_type,
            application_id: self.application_id,
            authorizations: self.authorizations,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            issuer: self.issuer,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_security_token_builder_full() {
        let token = SecurityToken::builder()
            .subject_id("alice")
            .subject_type(SubjectType::User)
            .application_id("reports")
            .authorizations(["U", "S"])
            .issued_at(1_000)
            .expires_at(2_000)
            .issuer("ctxbind-static")
            .build();

        assert_eq!(token.subject_id(), "alice");
        assert_eq!(token.subject_type(), SubjectType::User);
        assert_eq!(token.application_id(), Some("reports"));
        assert!(token.has_authorization("U"));
        assert!(token.has_authorization("S"));
        assert!(!token.has_authorization("TS"));
        assert_eq!(token.issued_at(), 1_000);
        assert_eq!(token.expires_at(), 2_000);
        assert_eq!(token.issuer(), "ctxbind-static");
    }

    #[test]
    fn test_security_token_builder_minimal() {
        let token = SecurityToken::builder().build();

        assert!(token.subject_id().is_empty());
        assert_eq!(token.subject_type(), SubjectType::User);
        assert!(token.application_id().is_none());
        assert!(token.authorizations().is_empty());
        assert!(!token.is_expired_at(u64::MAX));
    }

    #[test]
    fn test_security_token_authorizations_are_deduplicated_and_sorted() {
        let token = SecurityToken::builder()
            .authorizations(["TS", "U", "S", "U"])
            .build();

        let labels: Vec<&str> = token.authorizations().iter().map(String::as_str).collect();
        assert_eq!(labels, ["S", "TS", "U"]);
    }

    #[test]
    fn test_security_token_expiry_boundary() {
        let token = SecurityToken::builder().expires_at(100).build();

        assert!(!token.is_expired_at(99));
        assert!(token.is_expired_at(100));
        assert!(token.is_expired_at(101));
    }

    #[test]
    fn test_security_token_serialize_deserialize() {
        let original = SecurityToken::builder()
            .subject_id("svc-reports")
            .subject_type(SubjectType::App)
            .authorizations(["U"])
            .issuer("ctxbind-static")
            .build();

        let serialized = serde_json::to_string(&original).unwrap();
        assert!(serialized.contains("\"subject_type\":\"app\""));

        let deserialized: SecurityToken = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, original);
    }
}
