//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem, ViewResolver, Notifier)
//! but are themselves concrete structs, not traits.

mod document;
mod sorting;

pub use document::{BundleSource, DocumentService};
pub use sorting::{FilterTiming, SortingOutcome, SortingService};
