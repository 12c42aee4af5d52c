use std::string::FromUtf8Error;
use thiserror::Error;

/// Percent-decoding passes applied before giving up on a stable form.
const MAX_DECODE_PASSES: usize = 3;

#[derive(Error, Debug)]
pub enum UriError {
    #[error("invalid escape {0:?}")]
    BadEscape(String),

    #[error(transparent)]
    Utf8(#[from] FromUtf8Error),
}

/// Repeatedly percent-decodes `raw` until it stops changing, so `/a%2520b`,
/// `/a%20b` and `/a b` all count as the same key.
///
/// Every pass rejects a `%` not followed by two hex digits.
pub fn canonicalize_uri(raw: &str) -> Result<String, UriError> {
    let mut current = raw.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        check_escapes(&current)?;
        let decoded = urlencoding::decode(&current)?.into_owned();
        if decoded == current {
            break;
        }
        current = decoded;
    }
    Ok(current)
}

fn check_escapes(uri: &str) -> Result<(), UriError> {
    let bytes = uri.as_bytes();
    for (at, _) in uri.match_indices('%') {
        let valid = bytes
            .get(at + 1..at + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            let end = (at + 3).min(bytes.len());
            let escape = String::from_utf8_lossy(&bytes[at..end]).into_owned();
            return Err(UriError::BadEscape(escape));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths_are_unchanged() {
        assert_eq!(canonicalize_uri("/blog/index.html").unwrap(), "/blog/index.html");
    }

    #[test]
    fn test_nested_escapes_collapse() {
        assert_eq!(canonicalize_uri("/a%20b").unwrap(), "/a b");
        assert_eq!(canonicalize_uri("/a%2520b").unwrap(), "/a b");
        assert_eq!(canonicalize_uri("/a%252520b").unwrap(), "/a b");
    }

    #[test]
    fn test_decoding_stops_after_three_passes() {
        assert_eq!(canonicalize_uri("/a%25252520b").unwrap(), "/a%20b");
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        assert!(matches!(canonicalize_uri("/%ff%fe"), Err(UriError::Utf8(_))));
    }

    #[test]
    fn test_malformed_escapes_are_rejected() {
        for uri in ["/a%zz", "/a%2", "/trailing%", "/a%g1b"] {
            assert!(
                matches!(canonicalize_uri(uri), Err(UriError::BadEscape(_))),
                "{uri:?} should be rejected"
            );
        }
        // Surfaces only after the first pass decodes `%25`.
        assert!(matches!(canonicalize_uri("/a%25zz"), Err(UriError::BadEscape(_))));
    }
}
