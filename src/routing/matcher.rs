//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile `/messages/{id}` style patterns once, at registration
//! - Match a request path against the whole pattern
//! - Return captured parameters by name
//!
//! # Design Decisions
//! - Segment-wise comparison, no regex, so matching is linear in the path
//! - A parameter captures exactly one non-empty path segment, optionally
//!   framed by literal text inside that segment (`{name}.png`)
//! - Patterns are anchored at both ends

use std::collections::HashMap;

use crate::routing::RouteError;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param {
        prefix: String,
        name: String,
        suffix: String,
    },
}

impl Segment {
    fn parse(pattern: &str, raw: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let Some(open) = raw.find('{') else {
            if raw.contains('}') {
                return Err(invalid("unbalanced parameter token"));
            }
            return Ok(Segment::Literal(raw.to_string()));
        };
        let close = raw[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| invalid("unbalanced parameter token"))?;

        let (prefix, name, suffix) = (&raw[..open], &raw[open + 1..close], &raw[close + 1..]);
        if prefix.contains('}') || suffix.contains('{') || suffix.contains('}') {
            return Err(invalid("one parameter per segment"));
        }
        if !is_identifier(name) {
            return Err(invalid("parameter names are identifiers"));
        }

        Ok(Segment::Param {
            prefix: prefix.to_string(),
            name: name.to_string(),
            suffix: suffix.to_string(),
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    segments: Vec<Segment>,
}

impl PathMatcher {
    /// Compile a pattern. Fails on duplicate parameter names or unbalanced braces.
    pub fn compile(pattern: &str) -> Result<Self, RouteError> {
        let segments = pattern
            .split('/')
            .map(|raw| Segment::parse(pattern, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen: Vec<&str> = Vec::new();
        for segment in &segments {
            if let Segment::Param { name, .. } = segment {
                if seen.contains(&name.as_str()) {
                    return Err(RouteError::DuplicateParam {
                        pattern: pattern.to_string(),
                        name: name.clone(),
                    });
                }
                seen.push(name);
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Match the full path, returning captured parameters on success.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param { prefix, name, suffix } => {
                    let value = part.strip_prefix(prefix.as_str())?.strip_suffix(suffix.as_str())?;
                    if value.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(params)
    }
}
