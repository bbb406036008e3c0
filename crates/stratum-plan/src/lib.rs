//! In-memory plan objects consumed by the stratum ledger.
//!
//! A plan is the authored side of a migration project: named changes with
//! require/conflict dependencies and release tags. The ledger records which
//! of these have actually been deployed to a target database; everything in
//! this crate is pure data with content-derived identities and no I/O.

pub mod change;
pub mod ident;
pub mod plan;

pub use change::{Change, Dependency, DependencyKind, Tag};
pub use ident::Identity;
pub use plan::Plan;
