//! Domain layer types and invariants.

pub mod catalog;
pub mod filters;
pub mod snapshots;
