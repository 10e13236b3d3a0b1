//! Code-execution sandbox for an online judge.
//!
//! Untrusted Java, Python and JavaScript submissions run inside one
//! long-lived, network-less Docker container per language. The
//! [`sandbox::ContainerPool`] owns those containers, a
//! [`executor::LanguageExecutor`] injects code and runs it under time and
//! memory bounds, and [`api`] exposes the whole thing over HTTP.

pub mod api;
pub mod config;
pub mod executor;
pub mod language;
pub mod lifecycle;
pub mod logging;
pub mod result;
pub mod sandbox;
pub mod service;
