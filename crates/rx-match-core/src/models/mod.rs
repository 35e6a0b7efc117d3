//! Domain models for the rx-match engine.

mod catalog;
mod prescription;
mod resolution;

pub use catalog::*;
pub use prescription::*;
pub use resolution::*;
