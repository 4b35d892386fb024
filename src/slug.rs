//! URL slugification.
//!
//! Converts arbitrary record field values to URL-safe path segments.

use deunicode::deunicode;
use thiserror::Error;

/// Raised when a value slugifies to nothing (empty input, or input made
/// entirely of characters that carry no slug representation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value `{value}` produces an empty slug")]
pub struct EmptySlugError {
    /// The offending input value, verbatim.
    pub value: String,
}

/// Convert a field value to a URL-safe slug.
///
/// Non-ASCII letters and symbols are transliterated to their closest
/// ASCII equivalent ("♥" becomes "love", "Ü" becomes "U") before
/// lowercasing. Runs of whitespace and disallowed characters collapse
/// to a single dash; leading and trailing dashes are stripped.
///
/// The result contains only `[a-z0-9-]` and the function is idempotent:
/// slugifying a slug returns it unchanged.
///
/// # Examples
///
/// | Input | Output |
/// |-------|--------|
/// | `"My First Post"` | `"my-first-post"` |
/// | `"I ♥ Dogs"` | `"i-love-dogs"` |
/// | `"  --hello--  "` | `"hello"` |
/// Symbols whose common English reading differs from their Unicode
/// name transliteration (deunicode renders `♥` as "hearts").
fn symbol_word(c: char) -> Option<&'static str> {
    match c {
        '♥' | '❤' | '💕' | '💖' => Some("love"),
        _ => None,
    }
}

pub fn slugify(value: &str) -> Result<String, EmptySlugError> {
    let mut worded = String::with_capacity(value.len());
    for c in value.chars() {
        match symbol_word(c) {
            Some(word) => {
                worded.push(' ');
                worded.push_str(word);
                worded.push(' ');
            }
            None => worded.push(c),
        }
    }
    let ascii = deunicode(&worded);

    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for ch in ascii.chars() {
        match ch.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9') => {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c);
            }
            // Everything else separates words; runs collapse to one dash
            _ => pending_dash = true,
        }
    }

    if slug.is_empty() {
        return Err(EmptySlugError {
            value: value.to_owned(),
        });
    }

    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("My First Post").unwrap(), "my-first-post");
    }

    #[test]
    fn test_slugify_collapses_separator_runs() {
        assert_eq!(slugify("hello   --  world").unwrap(), "hello-world");
    }

    #[test]
    fn test_slugify_strips_edge_dashes() {
        assert_eq!(slugify("  --hello--  ").unwrap(), "hello");
    }

    #[test]
    fn test_slugify_transliterates() {
        assert_eq!(slugify("I ♥ Dogs").unwrap(), "i-love-dogs");
        assert_eq!(slugify("Über Älter").unwrap(), "uber-alter");
    }

    #[test]
    fn test_slugify_heart_symbols_read_as_love() {
        assert_eq!(slugify("♥").unwrap(), "love");
        assert_eq!(slugify("cats❤dogs").unwrap(), "cats-love-dogs");
    }

    #[test]
    fn test_slugify_preserves_digits() {
        assert_eq!(slugify("Post #42 (draft)").unwrap(), "post-42-draft");
    }

    #[test]
    fn test_slugify_empty_is_error() {
        assert!(slugify("").is_err());
        assert!(slugify("   ").is_err());
        assert!(slugify("!!!???").is_err());
    }

    #[test]
    fn test_slugify_error_carries_value() {
        let err = slugify("???").unwrap_err();
        assert_eq!(err.value, "???");
    }

    #[test]
    fn test_slugify_idempotent() {
        for input in ["My First Post", "I ♥ Dogs", "a--b", "Ünïcodé 99"] {
            let once = slugify(input).unwrap();
            let twice = slugify(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_slugify_alphabet() {
        let slug = slugify("Hello, Wörld! 123").unwrap();
        assert!(
            slug.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );
        assert!(!slug.starts_with('-'));
        assert!(!slug.ends_with('-'));
    }
}
