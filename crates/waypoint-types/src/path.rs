//! Dotted path grammar shared by payload and context lookups.
//!
//! Grammar (separator shown as `.`, configurable):
//! ```text
//! Path     ::= ( Segment ( '.' Segment )* )?
//! Segment  ::= '@' Name | Digits | Name ( '[' Digits ']' )?
//! Name     ::= any character except the separator, '[', ']', '@', whitespace
//! ```
//!
//! `name` selects a table key or the child elements called `name`, `name[i]`
//! selects the i-th of them, a bare number indexes into a list (or is the key
//! of the same spelling in a table; `01` is always a key), and `@attr`
//! addresses an attribute slot (only valid as the last segment). The empty
//! path addresses the whole scope.

use std::fmt;
use std::str::FromStr;

use winnow::ascii::digit1;
use winnow::combinator::{delimited, opt, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::token::take_while;
use winnow::{ModalResult, Parser};

use crate::{Result, WaypointError};

/// Default path-segment separator.
pub const DEFAULT_SEPARATOR: char = '.';

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Table key or child element name.
    Key(String),
    /// The n-th child element (or list item) named `name`.
    Nth(String, usize),
    /// Position in a list, or n-th child element regardless of name.
    Index(usize),
    /// Attribute slot of an element.
    Attribute(String),
}

impl Segment {
    /// The key or element name this segment selects, if it selects by name.
    pub fn name(&self) -> Option<&str> {
        match self {
            Segment::Key(k) | Segment::Nth(k, _) => Some(k),
            Segment::Index(_) | Segment::Attribute(_) => None,
        }
    }
}

/// A parsed dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<Segment>,
    separator: char,
}

impl Path {
    /// The empty path, addressing a whole scope.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
            separator: DEFAULT_SEPARATOR,
        }
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            separator: DEFAULT_SEPARATOR,
        }
    }

    /// Parse a path using the default `.` separator.
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_with(input, DEFAULT_SEPARATOR)
    }

    /// Parse a path using a custom segment separator.
    pub fn parse_with(input: &str, separator: char) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
                separator,
            });
        }

        let mut remaining = trimmed;
        let segments = path_segments(&mut remaining, separator).map_err(|e| {
            invalid(input, format!("{e} at offset {}", trimmed.len() - remaining.len()))
        })?;
        if !remaining.is_empty() {
            return Err(invalid(
                input,
                format!(
                    "unexpected '{remaining}' at offset {}",
                    trimmed.len() - remaining.len()
                ),
            ));
        }

        if let Some(pos) = segments
            .iter()
            .position(|s| matches!(s, Segment::Attribute(_)))
        {
            if pos + 1 != segments.len() {
                return Err(invalid(input, "attribute segment must be last".to_string()));
            }
        }

        Ok(Self {
            segments,
            separator,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Return a new path with `segment` appended.
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self {
            segments,
            separator: self.separator,
        }
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::root()
    }
}

impl FromStr for Path {
    type Err = WaypointError;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.separator)?;
            }
            match seg {
                Segment::Key(k) => write!(f, "{k}")?,
                Segment::Nth(k, n) => write!(f, "{k}[{n}]")?,
                Segment::Index(n) => write!(f, "{n}")?,
                Segment::Attribute(a) => write!(f, "@{a}")?,
            }
        }
        Ok(())
    }
}

fn invalid(location: &str, message: String) -> WaypointError {
    WaypointError::InvalidLocation {
        location: location.to_string(),
        message,
    }
}

fn name<'i>(input: &mut &'i str, separator: char) -> ModalResult<&'i str> {
    take_while(1.., |c: char| {
        c != separator && c != '[' && c != ']' && c != '@' && !c.is_whitespace()
    })
    .parse_next(input)
}

fn index(input: &mut &str) -> ModalResult<usize> {
    let digits: &str = digit1.parse_next(input)?;
    digits
        .parse()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))
}

fn segment(input: &mut &str, separator: char) -> ModalResult<Segment> {
    if opt('@').parse_next(input)?.is_some() {
        let attr = name(input, separator)?;
        return Ok(Segment::Attribute(attr.to_string()));
    }

    let key = name(input, separator)?;
    let nth = opt(delimited('[', index, ']')).parse_next(input)?;
    match nth {
        Some(n) => Ok(Segment::Nth(key.to_string(), n)),
        None => Ok(match canonical_index(key) {
            Some(n) => Segment::Index(n),
            None => Segment::Key(key.to_string()),
        }),
    }
}

/// A number written without leading zeros. `007` or `01` stay table keys.
fn canonical_index(key: &str) -> Option<usize> {
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: usize = key.parse().ok()?;
    (n.to_string() == key).then_some(n)
}

fn path_segments(input: &mut &str, separator: char) -> ModalResult<Vec<Segment>> {
    separated(1.., |i: &mut &str| segment(i, separator), separator).parse_next(input)
}
