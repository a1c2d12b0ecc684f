//! Node configuration: a flat string key/value store and its `.properties` loader.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use waypoint_types::{Result, WaypointError};

/// Registry key naming the node type.
pub const TYPE: &str = "TYPE";
/// Comma-separated default destinations.
pub const NEXT: &str = "NEXT";
/// Override for how unmarked location candidates are read.
pub const UNMARKED: &str = "UNMARKED";

// ---------------------------------------------------------------------------
// PropertySource: read-only configuration lookup
// ---------------------------------------------------------------------------

/// Configuration lookup consumed by nodes and the property group parser.
pub trait PropertySource {
    fn get_property(&self, name: &str) -> Option<&str>;

    /// Fails node construction if `name` is absent.
    fn get_required_property(&self, name: &str) -> Result<&str> {
        self.get_property(name)
            .ok_or_else(|| WaypointError::MissingProperty {
                name: name.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Ordered string key/value configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn required(&self, key: &str) -> Result<&str> {
        self.get_required_property(key)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            Some(v) => parse_bool(key, v),
            None => Ok(default),
        }
    }

    /// Parse a value with `FromStr`; absent keys yield `None`.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key).map(|v| parse_value(key, v)).transpose()
    }

    /// Comma-separated list, blanks dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys starting with `prefix`, with the prefix stripped.
    ///
    /// `props.with_prefix("node.headers.")` turns `node.headers.TYPE` into `TYPE`.
    pub fn with_prefix(&self, prefix: &str) -> Properties {
        Properties {
            values: self
                .values
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(prefix)
                        .filter(|rest| !rest.is_empty())
                        .map(|rest| (rest.to_string(), v.clone()))
                })
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse `.properties` text.
    ///
    /// Supports `key=value`, `key: value` and `key value`, `#`/`!` comment
    /// lines, and a trailing `\` continuing the value on the next line.
    pub fn parse(text: &str) -> Properties {
        let mut props = Properties::new();
        let mut logical = String::new();

        for line in text.lines() {
            let line = line.trim_start();
            if logical.is_empty()
                && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
            {
                continue;
            }

            if ends_with_continuation(line) {
                logical.push_str(&line[..line.len() - 1]);
                continue;
            }
            logical.push_str(line);

            let (key, value) = split_entry(&logical);
            props.insert(unescape(key), unescape(value));
            logical.clear();
        }

        if !logical.is_empty() {
            let (key, value) = split_entry(&logical);
            props.insert(unescape(key), unescape(value));
        }
        props
    }

    /// Read and parse a `.properties` file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Properties> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let props = Properties::parse(&text);
        tracing::debug!(path = %path.display(), keys = props.len(), "Loaded properties");
        Ok(props)
    }
}

impl PropertySource for Properties {
    fn get_property(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Properties::from_pairs(iter)
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Ok(true),
        "false" | "no" | "n" | "0" | "off" => Ok(false),
        other => Err(WaypointError::InvalidProperty {
            name: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

pub(crate) fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| WaypointError::InvalidProperty {
            name: key.to_string(),
            message: e.to_string(),
        })
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Split at the first unescaped `=`, `:` or whitespace.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (line[..i].trim_end(), line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..i], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
