//! The unit of data flowing through one pipeline branch.
//!
//! A [`Payload`] is a cheap, reference-counted handle around a [`Body`]
//! variant. Cloning shares the body; any mutation through [`Payload::set`]
//! copies it first if another handle still refers to it, so a payload
//! broadcast to several destinations can be modified by one branch without the
//! others observing the change.
//!
//! Text ↔ tree conversions are computed on first use and memoized on the
//! shared body, so repeated `as_tree`/`as_text` calls never re-parse.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize, Serializer};

use crate::path::{Path, Segment};
use crate::tree::{Element, XmlNode};
use crate::{Result, WaypointError};

/// An error value deliberately passed downstream instead of raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carried {
    pub kind: String,
    pub message: String,
}

/// Discriminant of a payload body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Text,
    Tree,
    Table,
    List,
    Carried,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Text => "text",
            PayloadKind::Tree => "tree",
            PayloadKind::Table => "table",
            PayloadKind::List => "list",
            PayloadKind::Carried => "carried",
        }
    }
}

/// The variants a payload can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Tree(Element),
    Table(Table),
    List(Vec<Payload>),
    Carried(Carried),
}

// ---------------------------------------------------------------------------
// Table: insertion-ordered string → Payload map
// ---------------------------------------------------------------------------

/// Flat key/value map that keeps keys in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    entries: Vec<(String, Payload)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Payload> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert or overwrite a key, keeping the original position on overwrite.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Payload>) -> Option<Payload> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Payload> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Payload> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Payload)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the value under `key`, inserting an empty table first if absent.
    fn entry_or_table(&mut self, key: &str) -> &mut Payload {
        let pos = match self.entries.iter().position(|(k, _)| k == key) {
            Some(pos) => pos,
            None => {
                self.entries
                    .push((key.to_string(), Payload::table(Table::new())));
                self.entries.len() - 1
            }
        };
        &mut self.entries[pos].1
    }
}

impl<K: Into<String>, V: Into<Payload>> FromIterator<(K, V)> for Table {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Table::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Shared, copy-on-write payload handle.
#[derive(Debug, Clone)]
pub struct Payload {
    inner: Arc<Slot>,
}

#[derive(Debug, Clone)]
struct Slot {
    body: Body,
    text: OnceCell<String>,
    tree: OnceCell<Element>,
}

impl Payload {
    pub fn from_body(body: Body) -> Self {
        Self {
            inner: Arc::new(Slot {
                body,
                text: OnceCell::new(),
                tree: OnceCell::new(),
            }),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_body(Body::Text(text.into()))
    }

    pub fn tree(root: Element) -> Self {
        Self::from_body(Body::Tree(root))
    }

    pub fn table(table: Table) -> Self {
        Self::from_body(Body::Table(table))
    }

    pub fn list(items: Vec<Payload>) -> Self {
        Self::from_body(Body::List(items))
    }

    pub fn carried(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_body(Body::Carried(Carried {
            kind: kind.into(),
            message: message.into(),
        }))
    }

    pub fn body(&self) -> &Body {
        &self.inner.body
    }

    /// Take the body out, cloning it only if other handles share it.
    pub fn into_body(self) -> Body {
        match Arc::try_unwrap(self.inner) {
            Ok(slot) => slot.body,
            Err(shared) => shared.body.clone(),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        match self.body() {
            Body::Text(_) => PayloadKind::Text,
            Body::Tree(_) => PayloadKind::Tree,
            Body::Table(_) => PayloadKind::Table,
            Body::List(_) => PayloadKind::List,
            Body::Carried(_) => PayloadKind::Carried,
        }
    }

    /// `true` if both handles share the same body without a copy.
    pub fn ptr_eq(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- Representation views ---

    /// Text form of the payload.
    ///
    /// Trees, tables and lists serialize to XML; a carried error yields its
    /// message so downstream nodes can treat an upstream failure as text.
    pub fn as_text(&self) -> Result<&str> {
        match self.body() {
            Body::Text(s) => Ok(s),
            Body::Carried(c) => Ok(&c.message),
            Body::Tree(_) | Body::Table(_) | Body::List(_) => self
                .inner
                .text
                .get_or_try_init(|| self.as_tree()?.to_xml())
                .map(String::as_str),
        }
    }

    /// Hierarchical form of the payload, parsed or converted on first use.
    pub fn as_tree(&self) -> Result<&Element> {
        match self.body() {
            Body::Tree(e) => Ok(e),
            Body::Text(s) => self.inner.tree.get_or_try_init(|| {
                Element::parse(s).map_err(|e| WaypointError::Conversion {
                    from: "text",
                    to: "tree",
                    message: e.to_string(),
                })
            }),
            Body::Table(t) => self.inner.tree.get_or_try_init(|| Ok(table_to_element(t))),
            Body::List(items) => self.inner.tree.get_or_try_init(|| {
                let mut root = Element::new("list");
                for item in items {
                    push_value(&mut root, "item", item);
                }
                Ok(root)
            }),
            Body::Carried(c) => self.inner.tree.get_or_try_init(|| {
                Ok(Element::new("error")
                    .with_attribute("kind", c.kind.as_str())
                    .with_text(c.message.as_str()))
            }),
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self.body() {
            Body::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Payload]> {
        match self.body() {
            Body::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_carried(&self) -> Option<&Carried> {
        match self.body() {
            Body::Carried(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_carried(&self) -> bool {
        matches!(self.body(), Body::Carried(_))
    }

    /// The elements of a collection-shaped payload.
    ///
    /// Lists yield their items, tables their values, trees their child
    /// elements. Text is parsed as a tree when possible; anything else is a
    /// single-element collection of itself.
    pub fn items(&self) -> Vec<Payload> {
        match self.body() {
            Body::List(items) => items.clone(),
            Body::Table(t) => t.values().cloned().collect(),
            Body::Tree(e) => e.child_elements().map(element_value).collect(),
            Body::Text(_) => match self.as_tree() {
                Ok(e) => e.child_elements().map(element_value).collect(),
                Err(_) => vec![self.clone()],
            },
            Body::Carried(_) => vec![self.clone()],
        }
    }

    // --- Path access ---

    /// First value at `path`, or `None` when nothing matches.
    ///
    /// Trees are document-rooted: the segment that reaches a tree must be
    /// followed by its root element's name. A `<customer>` tree stored under
    /// the table key `cust` is read as `cust.customer.id`, not `cust.id`.
    pub fn get(&self, path: &Path) -> Option<Payload> {
        let mut out = Vec::new();
        self.collect(path.segments(), &mut out, true);
        out.into_iter().next()
    }

    /// Every value at `path`; a segment matching several siblings yields all of them.
    pub fn get_all(&self, path: &Path) -> Vec<Payload> {
        let mut out = Vec::new();
        self.collect(path.segments(), &mut out, false);
        out
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    /// Write `value` at `path`, creating missing intermediate tables or elements.
    ///
    /// Setting into text promotes it to its parsed tree first. The empty path
    /// replaces the whole payload.
    pub fn set(&mut self, path: &Path, value: impl Into<Payload>) -> Result<()> {
        self.set_segments(path.segments(), value.into(), path)
    }

    fn collect(&self, segs: &[Segment], out: &mut Vec<Payload>, first_only: bool) {
        let Some((seg, rest)) = segs.split_first() else {
            out.push(self.clone());
            return;
        };

        match self.body() {
            Body::Table(t) => match seg {
                Segment::Key(k) => {
                    if let Some(v) = t.get(k) {
                        v.collect(rest, out, first_only);
                    }
                }
                Segment::Index(i) => {
                    if let Some(v) = t.get(&i.to_string()) {
                        v.collect(rest, out, first_only);
                    }
                }
                Segment::Nth(k, n) => match t.get(k) {
                    Some(v) => match v.body() {
                        Body::List(items) => {
                            if let Some(item) = items.get(*n) {
                                item.collect(rest, out, first_only);
                            }
                        }
                        _ if *n == 0 => v.collect(rest, out, first_only),
                        _ => {}
                    },
                    None => {}
                },
                Segment::Attribute(_) => {}
            },
            Body::List(items) => match seg {
                Segment::Index(i) => {
                    if let Some(item) = items.get(*i) {
                        item.collect(rest, out, first_only);
                    }
                }
                _ => {
                    for item in items {
                        item.collect(segs, out, first_only);
                        if first_only && !out.is_empty() {
                            return;
                        }
                    }
                }
            },
            Body::Tree(root) => collect_from_root(root, segs, out, first_only),
            Body::Text(_) => {
                if let Ok(root) = self.as_tree() {
                    collect_from_root(root, segs, out, first_only);
                }
            }
            Body::Carried(c) => {
                if rest.is_empty() {
                    match seg.name() {
                        Some("kind") => out.push(Payload::text(c.kind.as_str())),
                        Some("message") => out.push(Payload::text(c.message.as_str())),
                        _ => {}
                    }
                }
            }
        }
    }

    fn set_segments(&mut self, segs: &[Segment], value: Payload, full: &Path) -> Result<()> {
        let Some((seg, rest)) = segs.split_first() else {
            *self = value;
            return Ok(());
        };

        let slot = Arc::make_mut(&mut self.inner);
        slot.text.take();
        let cached_tree = slot.tree.take();

        if let Body::Text(s) = &slot.body {
            slot.body = if s.trim().is_empty() {
                Body::Table(Table::new())
            } else {
                match cached_tree {
                    Some(tree) => Body::Tree(tree),
                    None => Body::Tree(Element::parse(s).map_err(|e| {
                        mismatch(full, format!("text payload is not a document: {e}"))
                    })?),
                }
            };
        }

        match &mut slot.body {
            Body::Table(t) => match seg {
                Segment::Key(k) => set_in_table(t, k, rest, value, full),
                Segment::Index(i) => set_in_table(t, &i.to_string(), rest, value, full),
                Segment::Nth(k, n) => {
                    let child = t.entry_or_table(k);
                    if child.as_list().is_some() {
                        child.set_segments(&segs_with_index(*n, rest), value, full)
                    } else if *n == 0 {
                        child.set_segments(rest, value, full)
                    } else {
                        Err(mismatch(full, format!("'{k}' is not a list")))
                    }
                }
                Segment::Attribute(a) => {
                    Err(mismatch(full, format!("tables have no attribute '@{a}'")))
                }
            },
            Body::List(items) => match seg {
                Segment::Index(i) if *i < items.len() => items[*i].set_segments(rest, value, full),
                Segment::Index(i) if *i == items.len() => {
                    let mut item = Payload::table(Table::new());
                    item.set_segments(rest, value, full)?;
                    items.push(item);
                    Ok(())
                }
                Segment::Index(i) => Err(mismatch(
                    full,
                    format!("index {i} is past the end of a list of {}", items.len()),
                )),
                _ => Err(mismatch(full, "lists are addressed by index".to_string())),
            },
            Body::Tree(root) => set_in_root(root, segs, value, full),
            Body::Carried(_) => Err(mismatch(full, "carried errors are read-only".to_string())),
            Body::Text(_) => unreachable!("text was promoted above"),
        }
    }

    // --- JSON bridge ---

    /// Build a payload from JSON: objects become tables, arrays lists, scalars text.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Payload::table(
                map.into_iter()
                    .map(|(k, v)| (k, Payload::from_json(v)))
                    .collect(),
            ),
            serde_json::Value::Array(items) => {
                Payload::list(items.into_iter().map(Payload::from_json).collect())
            }
            serde_json::Value::String(s) => Payload::text(s),
            serde_json::Value::Null => Payload::text(""),
            other => Payload::text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self.body() {
            Body::Text(s) => serde_json::Value::String(s.clone()),
            Body::Table(t) => serde_json::Value::Object(
                t.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect(),
            ),
            Body::List(items) => {
                serde_json::Value::Array(items.iter().map(Payload::to_json).collect())
            }
            Body::Carried(c) => serde_json::json!({
                "error": { "kind": c.kind, "message": c.message }
            }),
            Body::Tree(root) => {
                let mut obj = serde_json::Map::new();
                obj.insert(root.name.clone(), element_to_json(root));
                serde_json::Value::Object(obj)
            }
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.body() == other.body()
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::text(s)
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::text(s)
    }
}

impl From<Element> for Payload {
    fn from(e: Element) -> Self {
        Payload::tree(e)
    }
}

impl From<Table> for Payload {
    fn from(t: Table) -> Self {
        Payload::table(t)
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(items: Vec<Payload>) -> Self {
        Payload::list(items)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mismatch(path: &Path, message: String) -> WaypointError {
    WaypointError::PathMismatch {
        path: path.to_string(),
        message,
    }
}

fn segs_with_index(n: usize, rest: &[Segment]) -> Vec<Segment> {
    let mut segs = Vec::with_capacity(rest.len() + 1);
    segs.push(Segment::Index(n));
    segs.extend_from_slice(rest);
    segs
}

/// Value of an element as seen through a path: leaves read as text, anything
/// with attributes or child elements reads as a tree.
fn element_value(e: &Element) -> Payload {
    if e.is_leaf() {
        Payload::text(e.text())
    } else {
        Payload::tree(e.clone())
    }
}

fn collect_from_root(root: &Element, segs: &[Segment], out: &mut Vec<Payload>, first_only: bool) {
    let Some((seg, rest)) = segs.split_first() else {
        return;
    };
    match seg {
        Segment::Key(k) | Segment::Nth(k, 0) if *k == root.name => {
            collect_from_element(root, rest, out, first_only)
        }
        Segment::Attribute(a) => {
            if let Some(v) = root.attribute(a) {
                out.push(Payload::text(v));
            }
        }
        _ => {}
    }
}

fn collect_from_element(e: &Element, segs: &[Segment], out: &mut Vec<Payload>, first_only: bool) {
    let Some((seg, rest)) = segs.split_first() else {
        out.push(element_value(e));
        return;
    };
    match seg {
        Segment::Key(k) => {
            for child in e.children_named(k) {
                collect_from_element(child, rest, out, first_only);
                if first_only && !out.is_empty() {
                    return;
                }
            }
        }
        Segment::Nth(k, n) => {
            if let Some(child) = e.children_named(k).nth(*n) {
                collect_from_element(child, rest, out, first_only);
            }
        }
        Segment::Index(n) => {
            if let Some(child) = e.child_elements().nth(*n) {
                collect_from_element(child, rest, out, first_only);
            }
        }
        Segment::Attribute(a) => {
            if let Some(v) = e.attribute(a) {
                out.push(Payload::text(v));
            }
        }
    }
}

fn set_in_table(t: &mut Table, key: &str, rest: &[Segment], value: Payload, full: &Path) -> Result<()> {
    if rest.is_empty() {
        t.insert(key, value);
        return Ok(());
    }
    t.entry_or_table(key).set_segments(rest, value, full)
}

fn set_in_root(root: &mut Element, segs: &[Segment], value: Payload, full: &Path) -> Result<()> {
    let Some((seg, rest)) = segs.split_first() else {
        return Ok(());
    };
    match seg {
        Segment::Key(k) | Segment::Nth(k, 0) if *k == root.name => {
            set_in_element(root, rest, value, full)
        }
        Segment::Attribute(a) => {
            root.set_attribute(a.as_str(), value.as_text()?);
            Ok(())
        }
        _ => Err(mismatch(
            full,
            format!("document root is <{}>", root.name),
        )),
    }
}

fn set_in_element(e: &mut Element, segs: &[Segment], value: Payload, full: &Path) -> Result<()> {
    let Some((seg, rest)) = segs.split_first() else {
        return assign_element(e, &value);
    };
    match seg {
        Segment::Key(k) => {
            let child = match e.nth_child_named_mut(k, 0) {
                Some(child) => child,
                None => e.push_child(k.as_str()),
            };
            set_in_element(child, rest, value, full)
        }
        Segment::Nth(k, n) => {
            let count = e.children_named(k).count();
            let parent = e.name.clone();
            let child = if *n < count {
                e.nth_child_named_mut(k, *n)
            } else if *n == count {
                Some(e.push_child(k.as_str()))
            } else {
                None
            };
            match child {
                Some(child) => set_in_element(child, rest, value, full),
                None => Err(mismatch(
                    full,
                    format!("<{parent}> has only {count} <{k}> children"),
                )),
            }
        }
        Segment::Index(n) => match e.nth_child_mut(*n) {
            Some(child) => set_in_element(child, rest, value, full),
            None => Err(mismatch(
                full,
                format!("<{}> has no child element at index {n}", e.name),
            )),
        },
        Segment::Attribute(a) => {
            e.set_attribute(a.as_str(), value.as_text()?);
            Ok(())
        }
    }
}

/// Replace an element's content with `value`, keeping the element's name.
fn assign_element(e: &mut Element, value: &Payload) -> Result<()> {
    match value.body() {
        Body::Text(s) => e.set_text(s.as_str()),
        Body::Carried(c) => e.set_text(c.message.as_str()),
        Body::Tree(_) | Body::Table(_) | Body::List(_) => {
            let source = value.as_tree()?;
            e.attributes = source.attributes.clone();
            e.children = source.children.clone();
        }
    }
    Ok(())
}

/// Element used for a table key that is not a valid element name. The key
/// itself is kept in its `key` attribute.
const ENTRY: &str = "entry";

fn keyed_element(key: &str) -> Element {
    if Element::is_valid_name(key) {
        Element::new(key)
    } else {
        Element::new(ENTRY).with_attribute("key", key)
    }
}

/// Convert a table to a tree. A table holding exactly one nested table or
/// tree under a valid element name is rooted at that key; otherwise the root
/// is `<table>`.
fn table_to_element(t: &Table) -> Element {
    if t.len() == 1 {
        if let Some((key, value)) = t.iter().next() {
            match value.body() {
                Body::Table(inner) if Element::is_valid_name(key) => {
                    let mut root = Element::new(key);
                    for (k, v) in inner.iter() {
                        push_value(&mut root, k, v);
                    }
                    return root;
                }
                Body::Tree(e) if e.name == key => return e.clone(),
                _ => {}
            }
        }
    }
    let mut root = Element::new("table");
    for (k, v) in t.iter() {
        push_value(&mut root, k, v);
    }
    root
}

fn push_value(parent: &mut Element, name: &str, value: &Payload) {
    let child = match value.body() {
        Body::Text(s) => keyed_element(name).with_text(s.as_str()),
        Body::Tree(e) if e.name == name => e.clone(),
        Body::Tree(e) => keyed_element(name).with_child(e.clone()),
        Body::Table(t) => {
            let mut child = keyed_element(name);
            for (k, v) in t.iter() {
                push_value(&mut child, k, v);
            }
            child
        }
        Body::List(items) => {
            for item in items {
                push_value(parent, name, item);
            }
            return;
        }
        Body::Carried(c) => keyed_element(name)
            .with_attribute("kind", c.kind.as_str())
            .with_text(c.message.as_str()),
    };
    parent.children.push(XmlNode::Element(child));
}

fn element_to_json(e: &Element) -> serde_json::Value {
    if e.is_leaf() {
        return serde_json::Value::String(e.text());
    }
    let mut obj = serde_json::Map::new();
    for (k, v) in &e.attributes {
        obj.insert(format!("@{k}"), serde_json::Value::String(v.clone()));
    }
    let text = e.text();
    if !text.is_empty() {
        obj.insert("#text".to_string(), serde_json::Value::String(text));
    }
    for child in e.child_elements() {
        let value = element_to_json(child);
        match obj.get_mut(&child.name) {
            Some(serde_json::Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = serde_json::Value::Array(vec![first, value]);
            }
            None => {
                obj.insert(child.name.clone(), value);
            }
        }
    }
    serde_json::Value::Object(obj)
}
