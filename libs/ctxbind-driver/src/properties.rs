//! Connection properties.

use std::collections::{BTreeMap, HashMap};

/// Selects the token source variant, e.g. `ctxbind::FixedTokenSource`.
pub const TOKEN_PROVIDER_PROPERTY: &str = "tokenProvider";

/// Transport-encoded security token for the fixed token source.
pub const TOKEN_PROPERTY: &str = "token";

/// Keys consumed by the binding layer and never forwarded to the real driver.
pub const RECOGNIZED_KEYS: [&str; 2] = [TOKEN_PROVIDER_PROPERTY, TOKEN_PROPERTY];

const REDACTED_KEYS: [&str; 2] = [TOKEN_PROPERTY, "password"];

/// String-keyed connection configuration.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Properties(HashMap<String, String>);

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert a property, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`Properties::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy of `self` with every entry of `overrides` applied on top.
    #[must_use]
    pub fn merged_with(&self, overrides: &Self) -> Self {
        let mut merged = self.clone();
        merged
            .0
            .extend(overrides.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Copy of `self` without the keys consumed by the binding layer.
    #[must_use]
    pub fn without_recognized(&self) -> Self {
        let mut out = self.clone();
        for key in RECOGNIZED_KEYS {
            out.0.remove(key);
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Properties {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl std::fmt::Debug for Properties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sorted: BTreeMap<&str, &str> = self
            .0
            .iter()
            .map(|(k, v)| {
                let shown = if REDACTED_KEYS.contains(&k.as_str()) {
                    "[REDACTED]"
                } else {
                    v.as_str()
                };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_map().entries(sorted).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_on_merge() {
        let base = Properties::new()
            .with(TOKEN_PROVIDER_PROPERTY, "ctxbind::AmbientContextSource")
            .with("user", "app");
        let overrides = Properties::new().with(TOKEN_PROVIDER_PROPERTY, "ctxbind::FixedTokenSource");

        let merged = base.merged_with(&overrides);
        assert_eq!(
            merged.get(TOKEN_PROVIDER_PROPERTY),
            Some("ctxbind::FixedTokenSource")
        );
        assert_eq!(merged.get("user"), Some("app"));
        // The inputs are untouched.
        assert_eq!(
            base.get(TOKEN_PROVIDER_PROPERTY),
            Some("ctxbind::AmbientContextSource")
        );
    }

    #[test]
    fn recognized_keys_are_stripped_for_the_real_driver() {
        let props = Properties::new()
            .with(TOKEN_PROVIDER_PROPERTY, "x")
            .with(TOKEN_PROPERTY, "y")
            .with("sslmode", "disable");

        let forwarded = props.without_recognized();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded.get("sslmode"), Some("disable"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let props = Properties::new()
            .with(TOKEN_PROPERTY, "c2VjcmV0")
            .with("password", "hunter2")
            .with("user", "app");

        let shown = format!("{props:?}");
        assert!(!shown.contains("c2VjcmV0"));
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("app"));
    }
}
