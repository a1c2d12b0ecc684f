//! Indexed property groups: repeated rules declared as `PREFIX_0`, `PREFIX_1`, …
//!
//! Records are read lazily starting at a configurable index. The sequence ends
//! at the first index where none of the group's fields is present. A record
//! where some fields are present but a required one is missing is a
//! configuration error, and the iterator stops after yielding it.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::iter::FusedIterator;
use std::str::FromStr;

use waypoint_types::{Result, WaypointError};

use crate::config::{parse_bool, parse_value, PropertySource};
use crate::node::NodeConfig;

/// One field of a group, identified by its property prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub prefix: String,
    pub required: bool,
    pub default: Option<String>,
}

impl FieldSpec {
    pub fn required(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            required: false,
            default: None,
        }
    }

    /// Value used when the field is absent from an otherwise present record.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

// ---------------------------------------------------------------------------
// PropertyGroup builder
// ---------------------------------------------------------------------------

pub struct PropertyGroup<'a, S: PropertySource + ?Sized> {
    source: &'a S,
    fields: Vec<FieldSpec>,
    start: usize,
    separator: String,
}

impl<'a, S: PropertySource + ?Sized> PropertyGroup<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            fields: Vec::new(),
            start: 0,
            separator: "_".to_string(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn fields(mut self, specs: impl IntoIterator<Item = FieldSpec>) -> Self {
        self.fields.extend(specs);
        self
    }

    pub fn start_at(mut self, index: usize) -> Self {
        self.start = index;
        self
    }

    /// Separator between prefix and index (default `_`).
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn records(self) -> Records<'a, S> {
        Records {
            index: self.start,
            group: self,
            done: false,
        }
    }
}

/// Lazy iterator over the records of a [`PropertyGroup`].
pub struct Records<'a, S: PropertySource + ?Sized> {
    group: PropertyGroup<'a, S>,
    index: usize,
    done: bool,
}

impl<S: PropertySource + ?Sized> Iterator for Records<'_, S> {
    type Item = Result<GroupRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.group.fields.is_empty() {
            return None;
        }
        let index = self.index;
        let sep = &self.group.separator;

        let present: Vec<(&FieldSpec, String, Option<&str>)> = self
            .group
            .fields
            .iter()
            .map(|f| {
                let key = format!("{}{sep}{index}", f.prefix);
                let value = self.group.source.get_property(&key);
                (f, key, value)
            })
            .collect();

        if present.iter().all(|(_, _, v)| v.is_none()) {
            self.done = true;
            return None;
        }

        let mut values = BTreeMap::new();
        for (field, key, value) in present {
            match (value, &field.default) {
                (Some(v), _) => {
                    values.insert(field.prefix.clone(), v.to_string());
                }
                (None, Some(default)) => {
                    values.insert(field.prefix.clone(), default.clone());
                }
                (None, None) if field.required => {
                    self.done = true;
                    return Some(Err(WaypointError::IncompleteRecord {
                        index,
                        missing: key,
                    }));
                }
                (None, None) => {}
            }
        }

        self.index += 1;
        Some(Ok(GroupRecord {
            index,
            separator: self.group.separator.clone(),
            values,
        }))
    }
}

impl<S: PropertySource + ?Sized> FusedIterator for Records<'_, S> {}

// ---------------------------------------------------------------------------
// GroupRecord
// ---------------------------------------------------------------------------

/// One validated record of a property group, keyed by field prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    index: usize,
    separator: String,
    values: BTreeMap<String, String>,
}

impl GroupRecord {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Full property name of `prefix` in this record, e.g. `FROM_2`.
    pub fn key(&self, prefix: &str) -> String {
        format!("{prefix}{}{}", self.separator, self.index)
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.values.get(prefix).map(String::as_str)
    }

    pub fn require(&self, prefix: &str) -> Result<&str> {
        self.get(prefix)
            .ok_or_else(|| WaypointError::IncompleteRecord {
                index: self.index,
                missing: self.key(prefix),
            })
    }

    pub fn get_or<'a>(&'a self, prefix: &str, default: &'a str) -> &'a str {
        self.get(prefix).unwrap_or(default)
    }

    pub fn get_bool(&self, prefix: &str, default: bool) -> Result<bool> {
        match self.get(prefix) {
            Some(v) => parse_bool(&self.key(prefix), v),
            None => Ok(default),
        }
    }

    pub fn get_parsed<T>(&self, prefix: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(prefix)
            .map(|v| parse_value(&self.key(prefix), v))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Typed collection
// ---------------------------------------------------------------------------

/// A rule type built from one property group record.
///
/// `config` is the owning node's configuration, so locations in a record are
/// parsed with that node's syntax and `UNMARKED` policy.
pub trait FromGroupRecord: Sized {
    fn fields() -> Vec<FieldSpec>;

    fn from_record(record: &GroupRecord, config: &NodeConfig) -> Result<Self>;

    fn start_index() -> usize {
        0
    }
}

/// Read every record of `T`'s group from a node's properties, failing on the
/// first invalid one.
pub fn parse_group<T: FromGroupRecord>(config: &NodeConfig) -> Result<Vec<T>> {
    PropertyGroup::new(config)
        .fields(T::fields())
        .start_at(T::start_index())
        .records()
        .map(|record| record.and_then(|r| T::from_record(&r, config)))
        .collect()
}
