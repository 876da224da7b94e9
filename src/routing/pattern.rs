//! Segment-wise path patterns.
//!
//! # Responsibilities
//! - Parse `/literal/{name}` and `/literal/:name` templates
//! - Match concrete paths and bind named segments
//! - Decide whether two patterns can match the same concrete path
//! - Render downstream templates from bound segments
//!
//! # Design Decisions
//! - Literal segments match exactly (case-sensitive)
//! - A named segment matches exactly one non-empty segment, and never a dot
//!   segment or a value carrying an encoded `/` or `\`
//! - No regex, no multi-segment wildcards: overlap is decidable segment by segment
//! - Bound values are substituted raw, so percent-encoding survives the rewrite

use std::fmt;

/// One segment of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// Named segments bound while matching a concrete path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

/// Split a concrete request path into segments.
///
/// `/` yields no segments; a trailing slash yields a trailing empty segment,
/// which no pattern segment accepts.
pub fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl PathPattern {
    /// Parse a template. Errors describe the first problem found.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if !raw.starts_with('/') {
            return Err(format!("pattern `{}` must start with `/`", raw));
        }

        let mut segments = Vec::new();
        for part in split_path(raw) {
            if part.is_empty() {
                return Err(format!("pattern `{}` contains an empty segment", raw));
            }

            let param = part
                .strip_prefix('{')
                .and_then(|p| p.strip_suffix('}'))
                .or_else(|| part.strip_prefix(':'));

            let segment = match param {
                Some(name) if is_valid_param_name(name) => Segment::Param(name.to_string()),
                Some(name) => {
                    return Err(format!(
                        "pattern `{}` has invalid parameter name `{}`",
                        raw, name
                    ))
                }
                None if part.contains('{') || part.contains('}') => {
                    return Err(format!(
                        "pattern `{}` mixes braces into literal segment `{}`",
                        raw, part
                    ))
                }
                None => Segment::Literal(part.to_string()),
            };

            if let Segment::Param(name) = &segment {
                let duplicate = segments
                    .iter()
                    .any(|s| matches!(s, Segment::Param(existing) if existing == name));
                if duplicate {
                    return Err(format!(
                        "pattern `{}` binds parameter `{}` twice",
                        raw, name
                    ));
                }
            }
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Names of all parameters, in order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match pre-split path segments, binding parameters on success.
    pub fn match_segments(&self, path: &[&str]) -> Option<PathParams> {
        if path.len() != self.segments.len() {
            return None;
        }

        let mut bound = Vec::new();
        for (segment, value) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if !bindable(value) => return None,
                Segment::Param(name) => bound.push((name.clone(), value.to_string())),
            }
        }
        Some(PathParams(bound))
    }

    /// Returns a concrete path matched by both patterns, if one exists.
    pub fn overlap(&self, other: &PathPattern) -> Option<String> {
        if self.segments.len() != other.segments.len() {
            return None;
        }

        let mut witness = Vec::with_capacity(self.segments.len());
        for (a, b) in self.segments.iter().zip(&other.segments) {
            match (a, b) {
                (Segment::Literal(x), Segment::Literal(y)) if x == y => witness.push(x.as_str()),
                (Segment::Literal(_), Segment::Literal(_)) => return None,
                (Segment::Literal(x), Segment::Param(_))
                | (Segment::Param(_), Segment::Literal(x)) => witness.push(x.as_str()),
                (Segment::Param(_), Segment::Param(_)) => witness.push("1"),
            }
        }
        Some(format!("/{}", witness.join("/")))
    }

    /// Substitute bound values into this template.
    ///
    /// Returns the name of the first unbound parameter on failure.
    pub fn render(&self, params: &PathParams) -> Result<String, String> {
        let mut rendered = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            rendered.push('/');
            match segment {
                Segment::Literal(literal) => rendered.push_str(literal),
                Segment::Param(name) => match params.get(name) {
                    Some(value) => rendered.push_str(value),
                    None => return Err(name.clone()),
                },
            }
        }
        if rendered.is_empty() {
            rendered.push('/');
        }
        Ok(rendered)
    }
}

/// Whether a concrete segment may be bound to a named segment.
///
/// Rejected values would change the shape of the rendered downstream path.
fn bindable(value: &str) -> bool {
    if value.is_empty() || value.contains('\\') {
        return false;
    }
    let lower = value.to_ascii_lowercase();
    if lower.contains("%2f") || lower.contains("%5c") {
        return false;
    }
    let dots = lower.replace("%2e", ".");
    dots != "." && dots != ".."
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
