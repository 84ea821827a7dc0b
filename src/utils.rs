//!
//! Utility functions shared by configuration loading and dispatch.
//!
//! This module provides:
//! - [`replace_handlebars_with_env`] - Template substitution for environment variables
//! - [`decode_param`] - Strict percent-decoding of captured path segments
//! - [`split_path_query`] - Splits a request target into path and query string
//! - [`encode_url`] - Percent-encodes a URL for a `Location` header, keeping existing escapes
//! - lock helpers that keep working after a handler panicked while holding a guard
//!

use {
    crate::{Error, Result},
    http::StatusCode,
    regex::{Captures, Regex},
    std::{
        env,
        sync::{LazyLock, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    },
};

/// Regular expression pattern for matching handlebars-style environment variable references.
/// Matches patterns like `{{ VAR_NAME }}` with optional whitespace around the variable name.
/// Variable names must be uppercase letters, digits, or underscores (standard env var naming).
static HANDLEBAR_REGEXP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Z0-9_]+)\s*\}\}").unwrap());

/// Replaces `{{ VAR_NAME }}` references with the value of the environment variable.
///
/// Missing variables are replaced with an empty string and logged at `warn` level.
///
/// # Examples
///
/// ```
/// use axum_relay::replace_handlebars_with_env;
///
/// // SAFETY: single-threaded doc test
/// unsafe { std::env::set_var("RELAY_DOC_PORT", "8080"); }
/// let result = replace_handlebars_with_env("bind_port = {{ RELAY_DOC_PORT }}");
/// assert_eq!(result, "bind_port = 8080");
///
/// // Missing variables become empty strings
/// let result = replace_handlebars_with_env("Value: {{ RELAY_DOC_MISSING }}");
/// assert_eq!(result, "Value: ");
/// ```
pub fn replace_handlebars_with_env(input: &str) -> String {
    HANDLEBAR_REGEXP
        .replace_all(input, |caps: &Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!(
                    variable = %var_name,
                    "Environment variable not found, substituting with empty string"
                );
                String::new()
            })
        })
        .to_string()
}

/// Percent-decodes a captured path parameter.
///
/// Unlike a lenient decoder, a `%` that is not followed by two hex digits, or
/// an escape sequence that does not decode to valid UTF-8, is rejected with a
/// `400 Bad Request` error naming the offending value. `+` is left untouched.
pub fn decode_param(val: &str) -> Result<String> {
    if val.is_empty() || !val.contains('%') {
        return Ok(val.to_string());
    }

    let malformed = || {
        Error::http(
            StatusCode::BAD_REQUEST,
            format!("Failed to decode param '{val}'"),
        )
    };

    let bytes = val.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(malformed());
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(val)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| malformed())
}

/// Splits a request target such as `/users/1?sort=asc` into `("/users/1", Some("sort=asc"))`.
pub fn split_path_query(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

/// Percent-encodes the characters of `url` that may not appear in a header
/// URL. Existing `%XX` escapes are kept, so encoding twice is harmless.
pub fn encode_url(url: &str) -> String {
    let bytes = url.as_bytes();
    let mut out = String::with_capacity(url.len());
    for (i, &b) in bytes.iter().enumerate() {
        let escape = b == b'%'
            && bytes
                .get(i + 1..i + 3)
                .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
        let allowed = matches!(b, 0x21 | 0x23..=0x3B | 0x3D | 0x3F..=0x5F | 0x61..=0x7A | 0x7C | 0x7E);
        if escape || (allowed && b != b'%') {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

// ===========================================================================
// Locks
// ===========================================================================

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn test_decode_param_plain() {
        assert_eq!(decode_param("hello").unwrap(), "hello");
        assert_eq!(decode_param("").unwrap(), "");
    }

    #[test]
    fn test_decode_param_escapes() {
        assert_eq!(decode_param("a%20b").unwrap(), "a b");
        assert_eq!(decode_param("caf%C3%A9").unwrap(), "café");
        assert_eq!(decode_param("a+b").unwrap(), "a+b");
    }

    #[test]
    fn test_decode_param_rejects_bad_escape() {
        let err = decode_param("100%").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Failed to decode param '100%'");

        assert!(decode_param("%zz").is_err());
        assert!(decode_param("%C3").is_err());
    }

    #[test]
    fn test_split_path_query() {
        assert_eq!(split_path_query("/a/b"), ("/a/b", None));
        assert_eq!(split_path_query("/a?x=1&y"), ("/a", Some("x=1&y")));
        assert_eq!(split_path_query("/a?"), ("/a", Some("")));
    }

    #[test]
    fn test_encode_url() {
        assert_eq!(encode_url("/a b/<c>"), "/a%20b/%3Cc%3E");
        assert_eq!(encode_url("/caf%C3%A9"), "/caf%C3%A9");
        assert_eq!(encode_url("/100%"), "/100%25");
        assert_eq!(encode_url("/café?q=1#top"), "/caf%C3%A9?q=1#top");
    }

    #[test]
    fn test_replace_handlebars_with_env_whitespace() {
        unsafe {
            env::set_var("RELAY_SPACED_VAR", "value");
        }

        let input = "{{RELAY_SPACED_VAR}} {{ RELAY_SPACED_VAR }} {{  RELAY_SPACED_VAR  }}";
        let output = replace_handlebars_with_env(input);
        assert_eq!(output, "value value value");

        unsafe {
            env::remove_var("RELAY_SPACED_VAR");
        }
    }

    proptest! {
        /// Strings without handlebars patterns should pass through unchanged
        #[test]
        fn handlebars_no_pattern_unchanged(s in "[^{}]*") {
            let result = replace_handlebars_with_env(&s);
            prop_assert_eq!(result, s);
        }

        /// Missing env vars should become empty strings
        #[test]
        fn handlebars_missing_var_empty(var_name in "[A-Z][A-Z0-9_]{5,15}") {
            let test_var = format!("PROPTEST_MISSING_{var_name}");
            unsafe { std::env::remove_var(&test_var); }

            let input = format!("value={{{{ {test_var} }}}}");
            let result = replace_handlebars_with_env(&input);

            prop_assert_eq!(result, "value=");
        }

        /// Decoding an encoded segment gives back the original text
        #[test]
        fn decode_param_inverts_encoding(s in "\\PC{0,24}") {
            let encoded = urlencoding::encode(&s);
            prop_assert_eq!(decode_param(&encoded).unwrap(), s);
        }

        /// Encoding an already encoded URL changes nothing
        #[test]
        fn encode_url_is_idempotent(s in "\\PC{0,24}") {
            let once = encode_url(&s);
            prop_assert_eq!(encode_url(&once), once.clone());
        }

        /// Values without '%' are returned verbatim
        #[test]
        fn decode_param_identity_without_percent(s in "[^%]{0,32}") {
            prop_assert_eq!(decode_param(&s).unwrap(), s);
        }
    }
}
