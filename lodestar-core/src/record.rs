//! Diagnostics returned by agent updates.
//!
//! Every update of an agent returns a [`Record`], a map from names such as
//! `obj_critic` or `alpha` to [`RecordValue`]s.
//!
//! ```rust
//! use lodestar_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("obj_critic", 0.5);
//! record.insert("obj_actor", RecordValue::Scalar(-1.2));
//! assert_eq!(record.get_scalar("obj_critic").unwrap(), 0.5);
//! ```
mod base;

pub use base::{Record, RecordValue};
