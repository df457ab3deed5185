//! Unit data model.
//!
//! A unit is one isolated execution unit of the testbed (a container) with
//! a fixed role, a unique name and a unique overlay address.

mod entry;
mod role;

pub use entry::{UnitEntry, UnitIdentity, SUFFIX_LEN};
pub use role::{Role, UnitStatus};
