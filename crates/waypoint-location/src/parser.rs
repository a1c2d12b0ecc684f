use winnow::combinator::{alt, preceded, separated};
use winnow::token::{rest, take_until};
use winnow::{ModalResult, Parser};

use waypoint_types::{Path, Result, WaypointError};

use crate::ast::{Candidate, Location, LocationSyntax, Unmarked};

/// A candidate split by its scope marker.
enum Marked<'i> {
    Context(&'i str),
    Payload(&'i str),
    Unmarked(&'i str),
}

/// Candidate text up to the next alternation separator, or the rest of input.
fn candidate_text<'i>(input: &mut &'i str, alternation: &str) -> ModalResult<&'i str> {
    alt((take_until(0.., alternation), rest)).parse_next(input)
}

fn alternatives<'i>(input: &mut &'i str, alternation: &str) -> ModalResult<Vec<&'i str>> {
    separated(
        1..,
        |i: &mut &'i str| candidate_text(i, alternation),
        alternation,
    )
    .parse_next(input)
}

fn marked<'i>(input: &mut &'i str, syntax: &LocationSyntax) -> ModalResult<Marked<'i>> {
    alt((
        preceded(syntax.context_marker.as_str(), rest).map(Marked::Context),
        preceded(syntax.payload_marker.as_str(), rest).map(Marked::Payload),
        rest.map(Marked::Unmarked),
    ))
    .parse_next(input)
}

fn invalid(raw: &str, message: impl Into<String>) -> WaypointError {
    WaypointError::InvalidLocation {
        location: raw.to_string(),
        message: message.into(),
    }
}

impl Location {
    /// Parse a location expression.
    ///
    /// The string is split on `syntax.alternation` into candidates. Each one is
    /// classified by its scope marker; unmarked candidates follow `unmarked`.
    /// With [`Unmarked::Literal`], a string carrying no marker at all is kept
    /// whole as one constant, separators included.
    pub fn parse(raw: &str, syntax: &LocationSyntax, unmarked: Unmarked) -> Result<Location> {
        if unmarked == Unmarked::Literal
            && !raw.contains(syntax.context_marker.as_str())
            && !raw.contains(syntax.payload_marker.as_str())
        {
            return Ok(Location {
                raw: raw.to_string(),
                candidates: vec![Candidate::Literal(raw.to_string())],
            });
        }

        let mut remaining = raw;
        let parts = alternatives(&mut remaining, &syntax.alternation)
            .map_err(|e| invalid(raw, e.to_string()))?;

        let mut candidates = Vec::with_capacity(parts.len());
        for part in parts {
            let text = part.trim();
            if text.is_empty() {
                return Err(invalid(raw, "empty alternative"));
            }
            let mut input = text;
            let scoped = marked(&mut input, syntax).map_err(|e| invalid(raw, e.to_string()))?;
            let candidate = match scoped {
                Marked::Context(path) => Candidate::Context(parse_path(raw, path, syntax)?),
                Marked::Payload(path) => Candidate::Payload(parse_path(raw, path, syntax)?),
                Marked::Unmarked(text) => match unmarked {
                    Unmarked::PayloadPath => Candidate::Payload(parse_path(raw, text, syntax)?),
                    Unmarked::Literal => Candidate::Literal(text.to_string()),
                    Unmarked::PathOrLiteral => match Path::parse_with(text, syntax.separator) {
                        Ok(path) => Candidate::PathOrLiteral(path, text.to_string()),
                        Err(_) => Candidate::Literal(text.to_string()),
                    },
                },
            };
            candidates.push(candidate);
        }

        tracing::trace!(location = %raw, candidates = candidates.len(), "Parsed location");
        Ok(Location {
            raw: raw.to_string(),
            candidates,
        })
    }

    /// Parse with the default syntax, treating unmarked candidates as payload paths.
    pub fn payload_path(raw: &str) -> Result<Location> {
        Self::parse(raw, &LocationSyntax::default(), Unmarked::PayloadPath)
    }

    /// Parse with the default syntax, falling back to a constant for unmarked candidates.
    pub fn value_or_location(raw: &str) -> Result<Location> {
        Self::parse(raw, &LocationSyntax::default(), Unmarked::PathOrLiteral)
    }
}

fn parse_path(raw: &str, text: &str, syntax: &LocationSyntax) -> Result<Path> {
    Path::parse_with(text, syntax.separator).map_err(|e| match e {
        WaypointError::InvalidLocation { message, .. } => invalid(raw, message),
        other => other,
    })
}
