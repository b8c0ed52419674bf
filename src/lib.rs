//! layersort: validate declarative layer-ordering instructions and
//! restructure a map layer tree accordingly.
//!
//! Layered like this:
//! - [`domain`]: instructions, the layer tree, validation, restructuring
//!   and the domain bundle filter (no I/O)
//! - [`application`]: services wiring the domain to documents and views
//! - [`infrastructure`]: filesystem, view and notifier implementations
//! - [`cli`]: argument parsing and command dispatch

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
