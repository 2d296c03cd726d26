//! Application services layer.

pub mod catalog;
pub mod context;
pub mod error;
pub mod repos;
