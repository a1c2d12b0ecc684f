//! Location expressions and their two-scope resolver.
//!
//! A location addresses a slot in either the transaction context or the
//! current payload. Alternatives are separated by `|` and tried in order:
//!
//! ```
//! use waypoint_location::Location;
//! use waypoint_types::{Payload, TransactionContext};
//!
//! let loc: Location = "context:customerId|payload:order.customer.id".parse().unwrap();
//! let payload = Payload::text("<order><customer><id>42</id></customer></order>");
//! let ctx = TransactionContext::new();
//! assert_eq!(loc.get_value(&ctx, Some(&payload)), Some(Payload::text("42")));
//! ```
//!
//! How candidates without a marker are read is chosen per location with
//! [`Unmarked`].

pub mod ast;
mod parser;
mod resolver;

pub use ast::{Candidate, Location, LocationSyntax, Unmarked};
