//! CLI command implementations.
//!
//! Pure request building and rendering are kept apart from IO so they can be
//! unit tested.

pub mod config;
pub mod image;
pub mod prune;
pub mod serve;
pub mod submit;
