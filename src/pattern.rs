//! Route pattern grammar.
//!
//! A template file name like `blog/{Post.slug}` is parsed into an
//! ordered list of segments, each either a literal or a binding on a
//! record type and field. The binding syntax is an explicit grammar
//! parsed once per template, never re-sniffed at call sites.
//!
//! Parsing is pure: input is the template path relative to the routes
//! root with the extension already stripped; no filesystem access.

use std::fmt;
use thiserror::Error;

/// Characters that may not appear inside a type or field name.
const RESERVED_CHARS: &[char] = &['/', '\\', '#', '?', '*', ':', '<', '>', '|', ' '];

/// Malformed binding syntax in a template name.
///
/// Each variant names the offending segment so the report can point at
/// the exact part of the file name that needs fixing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unbalanced braces in segment `{0}`")]
    UnbalancedBraces(String),

    #[error("segment `{0}` must bind exactly `{{Type.field}}`")]
    MalformedBinding(String),

    #[error("missing field name in segment `{0}`")]
    MissingField(String),

    #[error("reserved character in binding name in segment `{0}`")]
    ReservedChar(String),

    #[error("more than one binding in segment `{0}`")]
    MultipleBindings(String),
}

/// One path segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Interpolated verbatim into the output path.
    Literal(String),

    /// Expanded once per record of `record_type`, interpolated as the
    /// slug of the record's value at `field_path`.
    Binding {
        record_type: String,
        /// Dotted path components, e.g. `["frontmatter", "slug"]`.
        field_path: Vec<String>,
    },
}

/// A parsed collection route: the structured form of a template name.
///
/// Immutable after parsing. Holds at least one binding (templates with
/// none are static pages and never produce a `RoutePattern`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parse a template path (relative to the routes root, extension
    /// stripped) into a route pattern.
    ///
    /// Returns `Ok(None)` when no segment uses binding syntax: the file
    /// is a static page and not this engine's concern.
    pub fn parse(route_path: &str) -> Result<Option<Self>, PatternError> {
        let mut segments = Vec::new();
        let mut bindings = 0usize;

        for raw in route_path.split('/').filter(|s| !s.is_empty()) {
            let segment = parse_segment(raw)?;
            if matches!(segment, Segment::Binding { .. }) {
                bindings += 1;
            }
            segments.push(segment);
        }

        if bindings == 0 {
            return Ok(None);
        }

        Ok(Some(Self { segments }))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The first (and in practice only) binding of this pattern.
    pub fn binding(&self) -> (&str, &[String]) {
        self.segments
            .iter()
            .find_map(|s| match s {
                Segment::Binding {
                    record_type,
                    field_path,
                } => Some((record_type.as_str(), field_path.as_slice())),
                Segment::Literal(_) => None,
            })
            .unwrap_or(("", &[]))
    }

    /// Whether this pattern binds records of the given type.
    pub fn binds_type(&self, type_name: &str) -> bool {
        self.segments.iter().any(|s| {
            matches!(s, Segment::Binding { record_type, .. } if record_type == type_name)
        })
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match segment {
                Segment::Literal(text) => f.write_str(text)?,
                Segment::Binding {
                    record_type,
                    field_path,
                } => write!(f, "{{{}.{}}}", record_type, field_path.join("."))?,
            }
        }
        Ok(())
    }
}

/// Parse a single path segment.
fn parse_segment(raw: &str) -> Result<Segment, PatternError> {
    let opens = raw.matches('{').count();
    let closes = raw.matches('}').count();

    if opens == 0 && closes == 0 {
        return Ok(Segment::Literal(raw.to_owned()));
    }
    if opens != closes {
        return Err(PatternError::UnbalancedBraces(raw.to_owned()));
    }
    if opens > 1 {
        return Err(PatternError::MultipleBindings(raw.to_owned()));
    }

    // Exactly one balanced brace pair: the segment must be the binding
    // alone, not mixed with literal text.
    let body = raw
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| PatternError::MalformedBinding(raw.to_owned()))?;
    if body.contains('{') || body.contains('}') {
        return Err(PatternError::UnbalancedBraces(raw.to_owned()));
    }

    let mut parts = body.split('.');
    let record_type = parts.next().unwrap_or("");
    let field_path: Vec<String> = parts.map(str::to_owned).collect();

    if record_type.is_empty() {
        return Err(PatternError::MalformedBinding(raw.to_owned()));
    }
    if field_path.is_empty() || field_path.iter().any(String::is_empty) {
        return Err(PatternError::MissingField(raw.to_owned()));
    }
    if body.contains(RESERVED_CHARS) {
        return Err(PatternError::ReservedChar(raw.to_owned()));
    }

    Ok(Segment::Binding {
        record_type: record_type.to_owned(),
        field_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_binding() {
        let pattern = RoutePattern::parse("{Post.slug}").unwrap().unwrap();
        assert_eq!(pattern.segments().len(), 1);
        assert_eq!(pattern.binding(), ("Post", &["slug".to_owned()][..]));
    }

    #[test]
    fn test_parse_literal_prefix() {
        let pattern = RoutePattern::parse("blog/{Post.slug}").unwrap().unwrap();
        assert_eq!(
            pattern.segments()[0],
            Segment::Literal("blog".to_owned())
        );
        assert!(matches!(pattern.segments()[1], Segment::Binding { .. }));
    }

    #[test]
    fn test_parse_nested_field_path() {
        let pattern = RoutePattern::parse("{Post.frontmatter.slug}")
            .unwrap()
            .unwrap();
        let (ty, path) = pattern.binding();
        assert_eq!(ty, "Post");
        assert_eq!(path, ["frontmatter", "slug"]);
    }

    #[test]
    fn test_parse_static_file_is_none() {
        assert_eq!(RoutePattern::parse("index").unwrap(), None);
        assert_eq!(RoutePattern::parse("about/contact").unwrap(), None);
    }

    #[test]
    fn test_parse_unbalanced_braces() {
        assert!(matches!(
            RoutePattern::parse("{Post.slug"),
            Err(PatternError::UnbalancedBraces(_))
        ));
        assert!(matches!(
            RoutePattern::parse("Post.slug}"),
            Err(PatternError::UnbalancedBraces(_))
        ));
    }

    #[test]
    fn test_parse_missing_field() {
        assert!(matches!(
            RoutePattern::parse("{Post}"),
            Err(PatternError::MissingField(ref s)) if s == "{Post}"
        ));
        assert!(matches!(
            RoutePattern::parse("{Post.}"),
            Err(PatternError::MissingField(_))
        ));
    }

    #[test]
    fn test_parse_reserved_chars() {
        assert!(matches!(
            RoutePattern::parse("{Po st.slug}"),
            Err(PatternError::ReservedChar(_))
        ));
        assert!(matches!(
            RoutePattern::parse("{Post.slu?g}"),
            Err(PatternError::ReservedChar(_))
        ));
    }

    #[test]
    fn test_parse_multiple_bindings_in_segment() {
        assert!(matches!(
            RoutePattern::parse("{A.b}{C.d}"),
            Err(PatternError::MultipleBindings(_))
        ));
    }

    #[test]
    fn test_parse_binding_mixed_with_literal_text() {
        assert!(matches!(
            RoutePattern::parse("post-{Post.slug}"),
            Err(PatternError::MalformedBinding(_))
        ));
    }

    #[test]
    fn test_parse_case_sensitive_type() {
        let pattern = RoutePattern::parse("{post.slug}").unwrap().unwrap();
        assert!(pattern.binds_type("post"));
        assert!(!pattern.binds_type("Post"));
    }

    #[test]
    fn test_display_round_trip() {
        let source = "blog/{Post.slug}";
        let pattern = RoutePattern::parse(source).unwrap().unwrap();
        assert_eq!(pattern.to_string(), source);
    }
}
