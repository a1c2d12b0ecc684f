//! Resolution of a [`Location`] against one `(context, payload)` pair.
//!
//! Candidates are tried left to right and the first one that resolves wins.
//! A `None` payload (batch close) makes every payload candidate absent.

use waypoint_types::{Payload, Result, Table, TransactionContext, WaypointError};

use crate::ast::{Candidate, Location};

impl Candidate {
    fn values(
        &self,
        ctx: &TransactionContext,
        payload: Option<&Payload>,
        first_only: bool,
    ) -> Vec<Payload> {
        match self {
            Candidate::Context(path) => {
                if first_only {
                    ctx.get(path).into_iter().collect()
                } else {
                    ctx.get_all(path)
                }
            }
            Candidate::Payload(path) => match payload {
                Some(p) if first_only => p.get(path).into_iter().collect(),
                Some(p) => p.get_all(path),
                None => Vec::new(),
            },
            Candidate::Literal(text) => vec![Payload::text(text.as_str())],
            Candidate::PathOrLiteral(path, text) => {
                let found = match payload {
                    Some(p) if first_only => p.get(path).into_iter().collect(),
                    Some(p) => p.get_all(path),
                    None => Vec::new(),
                };
                if found.is_empty() {
                    vec![Payload::text(text.as_str())]
                } else {
                    found
                }
            }
        }
    }
}

impl Location {
    /// `true` if any candidate resolves.
    pub fn exists(&self, ctx: &TransactionContext, payload: Option<&Payload>) -> bool {
        self.get_value(ctx, payload).is_some()
    }

    /// Value of the first candidate that resolves.
    pub fn get_value(&self, ctx: &TransactionContext, payload: Option<&Payload>) -> Option<Payload> {
        for (index, candidate) in self.candidates.iter().enumerate() {
            if let Some(value) = candidate.values(ctx, payload, true).into_iter().next() {
                tracing::trace!(location = %self.raw, candidate = index, "Location resolved");
                return Some(value);
            }
        }
        None
    }

    /// Every match of the first candidate that has at least one.
    pub fn get_all(&self, ctx: &TransactionContext, payload: Option<&Payload>) -> Vec<Payload> {
        self.candidates
            .iter()
            .map(|c| c.values(ctx, payload, false))
            .find(|values| !values.is_empty())
            .unwrap_or_default()
    }

    /// Like [`get_value`](Self::get_value), but a missing value is a data error
    /// attributed to `node`.
    pub fn require_value(
        &self,
        node: &str,
        ctx: &TransactionContext,
        payload: Option<&Payload>,
    ) -> Result<Payload> {
        self.get_value(ctx, payload)
            .ok_or_else(|| WaypointError::MissingLocation {
                node: node.to_string(),
                location: self.raw.clone(),
            })
    }

    /// Text of the resolved value, if any.
    pub fn get_text(
        &self,
        ctx: &TransactionContext,
        payload: Option<&Payload>,
    ) -> Result<Option<String>> {
        match self.get_value(ctx, payload) {
            Some(value) => Ok(Some(value.as_text()?.to_string())),
            None => Ok(None),
        }
    }

    pub fn require_text(
        &self,
        node: &str,
        ctx: &TransactionContext,
        payload: Option<&Payload>,
    ) -> Result<String> {
        let value = self.require_value(node, ctx, payload)?;
        Ok(value.as_text()?.to_string())
    }

    /// Write `value` at the first candidate.
    ///
    /// Writing into an absent payload starts a new empty table. The payload is
    /// copied before the write if any other handle shares it.
    pub fn set_value(
        &self,
        ctx: &mut TransactionContext,
        payload: &mut Option<Payload>,
        value: impl Into<Payload>,
    ) -> Result<()> {
        let Some(target) = self.candidates.first() else {
            return Err(WaypointError::InvalidLocation {
                location: self.raw.clone(),
                message: "no candidates".to_string(),
            });
        };
        match target {
            Candidate::Context(path) => ctx.set(path, value),
            Candidate::Payload(path) | Candidate::PathOrLiteral(path, _) => payload
                .get_or_insert_with(|| Payload::table(Table::new()))
                .set(path, value),
            Candidate::Literal(text) => Err(WaypointError::InvalidLocation {
                location: self.raw.clone(),
                message: format!("constant '{text}' is not writable"),
            }),
        }
    }
}
