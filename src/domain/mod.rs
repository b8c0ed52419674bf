//! Domain layer: entities and business logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod entities;
pub mod error;
pub mod origin;
pub mod restructure;
pub mod tree;
pub mod validation;

pub use arena::{LayerArena, LayerData, LayerNode, Members};
pub use entities::*;
pub use error::{DomainError, DomainResult};
pub use origin::{
    tag_bundle_layers, DomainFilter, LocationRule, NodeFacts, OriginClassifier, OriginMatcher,
    PruneDecision,
};
pub use restructure::{RestructureReport, RestructuringEngine};
pub use tree::LayerTree;
pub use validation::{
    ConfigValidator, ProfileKind, ValidationError, ValidationResult, ValidationStrategy,
    DEFAULT_MAX_DEPTH,
};
