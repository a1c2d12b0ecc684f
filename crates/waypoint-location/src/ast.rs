use std::fmt;
use std::str::FromStr;

use waypoint_types::{Path, WaypointError};

/// Marker and separator conventions for location strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSyntax {
    /// Prefix selecting the transaction context scope.
    pub context_marker: String,
    /// Prefix selecting the current payload scope.
    pub payload_marker: String,
    /// Separator between alternative candidates.
    pub alternation: String,
    /// Path segment separator.
    pub separator: char,
}

impl Default for LocationSyntax {
    fn default() -> Self {
        Self {
            context_marker: "context:".to_string(),
            payload_marker: "payload:".to_string(),
            alternation: "|".to_string(),
            separator: waypoint_types::path::DEFAULT_SEPARATOR,
        }
    }
}

/// How a candidate without a scope marker is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unmarked {
    /// A path into the current payload.
    #[default]
    PayloadPath,
    /// A constant returned verbatim.
    Literal,
    /// A payload path if it resolves, otherwise the constant.
    PathOrLiteral,
}

impl Unmarked {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unmarked::PayloadPath => "path",
            Unmarked::Literal => "literal",
            Unmarked::PathOrLiteral => "path_or_literal",
        }
    }
}

impl FromStr for Unmarked {
    type Err = WaypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "path" | "payload" => Ok(Unmarked::PayloadPath),
            "literal" | "value" => Ok(Unmarked::Literal),
            "path_or_literal" | "either" => Ok(Unmarked::PathOrLiteral),
            other => Err(WaypointError::InvalidProperty {
                name: "UNMARKED".to_string(),
                message: format!(
                    "expected 'path', 'literal' or 'path_or_literal', got '{other}'"
                ),
            }),
        }
    }
}

/// One alternative of a [`Location`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Context(Path),
    Payload(Path),
    Literal(String),
    /// Payload path with a literal fallback when it does not resolve.
    PathOrLiteral(Path, String),
}

/// A parsed location expression: ordered candidates, first existing wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub(crate) raw: String,
    pub(crate) candidates: Vec<Candidate>,
}

impl Location {
    /// The original expression text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// `true` when every candidate is a constant.
    pub fn is_literal(&self) -> bool {
        self.candidates
            .iter()
            .all(|c| matches!(c, Candidate::Literal(_)))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Location {
    type Err = WaypointError;

    /// Parse with the default syntax, treating unmarked candidates as payload paths.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::parse(s, &LocationSyntax::default(), Unmarked::PayloadPath)
    }
}
