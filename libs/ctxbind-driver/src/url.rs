//! Connection URL handling.
//!
//! A binding URL is a real driver URL with [`URL_PREFIX`] in front:
//! `ctxbind:postgres://host:5432/db?tokenProvider=...&token=...`.

use crate::error::Error;
use crate::properties::{Properties, RECOGNIZED_KEYS};

/// Scheme segment marking URLs this layer intercepts.
pub const URL_PREFIX: &str = "ctxbind:";

#[must_use]
pub fn has_prefix(url: &str) -> bool {
    url.starts_with(URL_PREFIX)
}

/// Strip [`URL_PREFIX`]; URLs without it are returned unchanged.
#[must_use]
pub fn unwrap_url(url: &str) -> &str {
    url.strip_prefix(URL_PREFIX).unwrap_or(url)
}

fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    }
}

fn is_recognized(pair: &str) -> bool {
    pair.split_once('=')
        .is_some_and(|(k, _)| RECOGNIZED_KEYS.contains(&k))
}

/// Extract the recognized keys from the query string, percent-decoded.
///
/// Pairs without `=` and all other keys are ignored. `+` is kept literally so
/// unescaped base64 tokens survive.
///
/// # Errors
/// `Configuration` if a recognized value does not decode to UTF-8.
pub fn query_overrides(url: &str) -> Result<Properties, Error> {
    let (_, Some(query)) = split_query(url) else {
        return Ok(Properties::new());
    };

    let mut out = Properties::new();
    for pair in query.split('&') {
        let Some((key, raw)) = pair.split_once('=') else {
            continue;
        };
        if !RECOGNIZED_KEYS.contains(&key) {
            continue;
        }
        let value = urlencoding::decode(raw)
            .map_err(|e| Error::config(format!("query parameter '{key}' is not valid UTF-8: {e}")))?;
        out.set(key, value.into_owned());
    }
    Ok(out)
}

/// The URL handed to the real driver: prefix stripped, recognized query
/// parameters removed, every other parameter kept verbatim and in order.
#[must_use]
pub fn real_url(url: &str) -> String {
    let (base, query) = split_query(unwrap_url(url));
    let Some(query) = query else {
        return base.to_owned();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty() && !is_recognized(p))
        .collect();
    if kept.is_empty() {
        base.to_owned()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

/// URL safe to log: the query string is dropped since it may carry a token.
#[must_use]
pub fn redacted(url: &str) -> &str {
    split_query(url).0
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::properties::{TOKEN_PROPERTY, TOKEN_PROVIDER_PROPERTY};

    #[test]
    fn prefix_detection_and_unwrapping() {
        assert!(has_prefix("ctxbind:postgres://h:5432/db"));
        assert!(!has_prefix("postgres://h:5432/db"));
        assert!(!has_prefix("jdbc:ctxbind:postgres://h/db"));
        assert_eq!(unwrap_url("ctxbind:postgres://h:5432/db"), "postgres://h:5432/db");
        assert_eq!(unwrap_url("postgres://h/db"), "postgres://h/db");
    }

    #[test]
    fn only_recognized_keys_are_extracted() {
        let props = query_overrides(
            "ctxbind:postgres://h/db?sslmode=disable&tokenProvider=ctxbind%3A%3AFixedTokenSource&token=YWJj%2B%2Fw%3D%3D",
        )
        .unwrap();

        assert_eq!(props.len(), 2);
        assert_eq!(
            props.get(TOKEN_PROVIDER_PROPERTY),
            Some("ctxbind::FixedTokenSource")
        );
        assert_eq!(props.get(TOKEN_PROPERTY), Some("YWJj+/w=="));
    }

    #[test]
    fn plus_signs_are_preserved() {
        let props = query_overrides("ctxbind:postgres://h/db?token=ab+cd").unwrap();
        assert_eq!(props.get(TOKEN_PROPERTY), Some("ab+cd"));
    }

    #[test]
    fn pairs_without_value_are_ignored() {
        let props = query_overrides("ctxbind:postgres://h/db?token&tokenProvider=").unwrap();
        assert!(!props.contains(TOKEN_PROPERTY));
        assert_eq!(props.get(TOKEN_PROVIDER_PROPERTY), Some(""));
    }

    #[test]
    fn invalid_utf8_escape_is_a_configuration_error() {
        let err = query_overrides("ctxbind:postgres://h/db?token=%FF%FE").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn url_without_query_has_no_overrides() {
        assert!(query_overrides("ctxbind:postgres://h/db").unwrap().is_empty());
    }

    #[test]
    fn real_url_keeps_foreign_parameters() {
        assert_eq!(
            real_url("ctxbind:postgres://h/db?sslmode=disable&token=abc&application_name=x"),
            "postgres://h/db?sslmode=disable&application_name=x"
        );
        assert_eq!(real_url("ctxbind:postgres://h/db?token=abc"), "postgres://h/db");
        assert_eq!(real_url("ctxbind:postgres://h/db"), "postgres://h/db");
    }

    #[test]
    fn redacted_drops_query() {
        assert_eq!(redacted("ctxbind:postgres://h/db?token=abc"), "ctxbind:postgres://h/db");
    }
}
