use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};

/// HTTP-style verb half of a route key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Put,
        Method::Post,
        Method::Delete,
        Method::Patch,
        Method::Head,
        Method::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RpcError;

    fn from_str(raw: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| RpcError::invalid_argument(format!("unsupported method: {raw}")))
    }
}

/// One `/`-separated piece of a path template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    pub fn is_param(&self) -> bool {
        matches!(self, Segment::Param(_))
    }
}

/// Normalized path template such as `/widgets/{id}`.
///
/// Empty segments are dropped, so `/widgets/{id}/` and `//widgets/{id}`
/// normalize to the same template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a descriptor path. Malformed placeholders are a `BadSpecification`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();

        for piece in split_path(raw) {
            let opens = piece.matches('{').count();
            let closes = piece.matches('}').count();
            if opens == 0 && closes == 0 {
                segments.push(Segment::Literal(piece.to_string()));
                continue;
            }

            let name = piece
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .filter(|_| opens == 1 && closes == 1)
                .ok_or_else(|| {
                    RpcError::bad_specification(format!(
                        "path segment must be a literal or a whole {{param}}: {piece} in {raw}"
                    ))
                })?;
            if !is_valid_param_name(name) {
                return Err(RpcError::bad_specification(format!(
                    "invalid path parameter name {name:?} in {raw}"
                )));
            }
            if names.contains(&name) {
                return Err(RpcError::bad_specification(format!(
                    "duplicate path parameter {name:?} in {raw}"
                )));
            }
            names.push(name);
            segments.push(Segment::Param(name.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the parameter placeholders, in path order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn param_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_param()).count()
    }

    /// Match already-split request path segments, returning decoded parameters.
    pub fn match_segments(&self, path: &[&str]) -> Option<Vec<(String, String)>> {
        if path.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::with_capacity(self.param_count());
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(expected) if expected == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push((name.clone(), percent_decode(actual))),
            }
        }
        Some(params)
    }

    /// Ranking key: lower sorts first and is more specific.
    ///
    /// Literal segments rank ahead of parameters at the first differing
    /// position; remaining ties go to the template with fewer parameters.
    pub fn specificity(&self) -> (Vec<bool>, usize) {
        let shape = self.segments.iter().map(Segment::is_param).collect();
        (shape, self.param_count())
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => write!(f, "/{text}")?,
                Segment::Param(name) => write!(f, "/{{{name}}}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for PathTemplate {
    type Err = RpcError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

/// Normalized route key, e.g. `GET /widgets/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub method: Method,
    pub template: PathTemplate,
}

impl RouteKey {
    pub fn new(method: Method, template: PathTemplate) -> Self {
        Self { method, template }
    }

    /// Parse `"<VERB> <path>"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (method, path) = raw.trim().split_once(char::is_whitespace).ok_or_else(|| {
            RpcError::invalid_argument(format!("route key needs a verb and a path: {raw}"))
        })?;
        Ok(Self {
            method: method.parse()?,
            template: PathTemplate::parse(path.trim())?,
        })
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

impl FromStr for RouteKey {
    type Err = RpcError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

/// Split a request path into non-empty segments, ignoring any query string.
pub fn split_path(path: &str) -> Vec<&str> {
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    path.split('/').filter(|piece| !piece.is_empty()).collect()
}

fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Decode `%XX` escapes; malformed escapes are kept verbatim.
pub fn percent_decode(raw: &str) -> String {
    if !raw.contains('%') {
        return raw.to_string();
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
