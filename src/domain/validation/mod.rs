//! Validation of instruction lists before any mutation.
//!
//! Two profiles exist and are chosen at construction time:
//! - [`StrictProfile`]: shape, identity, reference (no forward references),
//!   cycle, depth and order checks.
//! - [`PermissiveProfile`]: lenient record parsing, any declaration order,
//!   missing parents become groups, cycles found by DFS.
//!
//! Validation never fails; every problem becomes one [`ValidationError`] entry.

mod permissive;
mod records;
mod strict;

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::entities::{AvailableNode, Instruction, NodeKind};

pub use permissive::PermissiveProfile;
pub use strict::StrictProfile;

/// Default limit for parent chains before a nesting warning is reported.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Parent group an instruction sorts into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentKey {
    Root,
    Parent(String),
}

impl ParentKey {
    pub fn of(instruction: &Instruction) -> Self {
        match &instruction.new_parent_id {
            Some(p) => ParentKey::Parent(p.clone()),
            None => ParentKey::Root,
        }
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentKey::Root => write!(f, "root level"),
            ParentKey::Parent(id) => write!(f, "parent '{id}'"),
        }
    }
}

/// One problem found in an instruction list.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Configuration must be an array")]
    NotAList,

    #[error("Configuration is empty")]
    Empty,

    #[error("Configuration entry at index {0} is not a valid object")]
    NotAnObject(usize),

    #[error("Configuration entry at index {0} missing or invalid 'id' property")]
    InvalidId(usize),

    #[error("Configuration entry '{0}' has invalid 'newParentId' property")]
    InvalidParentId(String),

    #[error("Configuration entry '{0}' cannot have itself as parent")]
    SelfParent(String),

    #[error("Configuration entry '{0}' has invalid 'order' property (must be a finite number)")]
    InvalidOrder(String),

    #[error("Configuration entry '{id}' contains unexpected property '{field}'")]
    UnexpectedField { id: String, field: String },

    #[error("Duplicate ID found: {0}")]
    DuplicateId(String),

    #[error("Parent layer '{parent}' for '{id}' does not exist and is not defined in configuration")]
    UnresolvedParent { id: String, parent: String },

    #[error(
        "Forward reference detected: '{id}' refers to parent '{parent}' which is defined later in the configuration"
    )]
    ForwardReference { id: String, parent: String },

    #[error("Parent layer '{parent}' for '{id}' is not a group layer (type: {kind})")]
    ParentNotContainer {
        id: String,
        parent: String,
        kind: NodeKind,
    },

    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Warning: Layer '{id}' has deep nesting (depth: {depth}), which may affect performance")]
    ExcessiveDepth { id: String, depth: usize },

    #[error("Duplicate order {order} found in {parent} for layers: {}", .ids.join(", "))]
    DuplicateOrder {
        parent: ParentKey,
        order: f64,
        ids: Vec<String>,
    },

    #[error(
        "Warning: Mixing ordered and unordered layers in {parent}. Unordered layers: {}",
        .unordered.join(", ")
    )]
    MixedOrdering {
        parent: ParentKey,
        unordered: Vec<String>,
    },
}

impl ValidationError {
    /// Soft findings: still block the run, but describe ambiguity rather than breakage.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ValidationError::ExcessiveDepth { .. } | ValidationError::MixedOrdering { .. }
        )
    }
}

/// Outcome of a validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    /// Problems in phase and scan order
    pub errors: Vec<ValidationError>,
    /// Parsed instructions, in input order
    pub instructions: Vec<Instruction>,
}

impl ValidationResult {
    pub fn new(errors: Vec<ValidationError>, instructions: Vec<Instruction>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            instructions,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Instruction ids and every referenced parent id.
    pub fn explicit_ids(&self) -> HashSet<String> {
        self.instructions
            .iter()
            .flat_map(|i| std::iter::once(&i.id).chain(i.new_parent_id.as_ref()))
            .cloned()
            .collect()
    }
}

/// Which validation discipline to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    #[default]
    Strict,
    Permissive,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileKind::Strict => write!(f, "strict"),
            ProfileKind::Permissive => write!(f, "permissive"),
        }
    }
}

/// A validation profile. Implementations see a non-empty record list.
pub trait ValidationStrategy: fmt::Debug + Send + Sync {
    fn kind(&self) -> ProfileKind;

    fn validate(&self, records: &[Value], available: &[AvailableNode]) -> ValidationResult;
}

/// Entry point: checks the document envelope, then delegates to the profile.
#[derive(Debug)]
pub struct ConfigValidator {
    strategy: Box<dyn ValidationStrategy>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new(ProfileKind::Strict, DEFAULT_MAX_DEPTH)
    }
}

impl ConfigValidator {
    pub fn new(profile: ProfileKind, max_depth: usize) -> Self {
        let strategy: Box<dyn ValidationStrategy> = match profile {
            ProfileKind::Strict => Box::new(StrictProfile::new(max_depth)),
            ProfileKind::Permissive => Box::new(PermissiveProfile),
        };
        Self { strategy }
    }

    pub fn with_strategy(strategy: Box<dyn ValidationStrategy>) -> Self {
        Self { strategy }
    }

    pub fn profile(&self) -> ProfileKind {
        self.strategy.kind()
    }

    /// Validate a whole instruction document (expected to be an array).
    pub fn validate(&self, document: &Value, available: &[AvailableNode]) -> ValidationResult {
        match document.as_array() {
            Some(records) => self.validate_records(records, available),
            None => ValidationResult::new(vec![ValidationError::NotAList], Vec::new()),
        }
    }

    pub fn validate_records(&self, records: &[Value], available: &[AvailableNode]) -> ValidationResult {
        if records.is_empty() {
            return ValidationResult::new(vec![ValidationError::Empty], Vec::new());
        }
        debug!(
            "validate: profile={} records={} available={}",
            self.strategy.kind(),
            records.len(),
            available.len()
        );
        let result = self.strategy.validate(records, available);
        debug!("validate: {} problem(s)", result.errors.len());
        result
    }

    /// Validate already-typed instructions through the same record checks.
    pub fn validate_instructions(
        &self,
        instructions: &[Instruction],
        available: &[AvailableNode],
    ) -> ValidationResult {
        let records: Vec<Value> = instructions.iter().map(Instruction::to_record).collect();
        self.validate_records(&records, available)
    }
}

// ============================================================
// Checks shared by both profiles
// ============================================================

fn catalogue_kinds(available: &[AvailableNode]) -> HashMap<&str, NodeKind> {
    available.iter().map(|n| (n.id.as_str(), n.kind)).collect()
}

fn parent_lookup(instructions: &[Instruction]) -> HashMap<&str, &str> {
    instructions
        .iter()
        .filter_map(|i| i.new_parent_id.as_deref().map(|p| (i.id.as_str(), p)))
        .collect()
}

fn warn_unknown_ids(instructions: &[Instruction], kinds: &HashMap<&str, NodeKind>) {
    for ins in instructions.iter().filter(|i| !kinds.contains_key(i.id.as_str())) {
        warn!(
            "layer '{}' not found in available layers - will be created as group layer",
            ins.id
        );
    }
}

/// Every occurrence after the first of an id is reported.
fn check_identity(instructions: &[Instruction], errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for ins in instructions {
        if !seen.insert(ins.id.as_str()) {
            errors.push(ValidationError::DuplicateId(ins.id.clone()));
        }
    }
}

fn check_depth(instructions: &[Instruction], max_depth: usize, errors: &mut Vec<ValidationError>) {
    let parents = parent_lookup(instructions);
    for ins in instructions.iter().filter(|i| i.new_parent_id.is_some()) {
        let depth = nesting_depth(&ins.id, &parents);
        if depth > max_depth {
            errors.push(ValidationError::ExcessiveDepth {
                id: ins.id.clone(),
                depth,
            });
        }
    }
}

/// Number of parent hops from `id`; stops at a revisited node.
fn nesting_depth(id: &str, parents: &HashMap<&str, &str>) -> usize {
    let mut depth = 0;
    let mut visited = HashSet::new();
    let mut current = id;
    while let Some(&next) = parents.get(current) {
        if !visited.insert(current) {
            break;
        }
        current = next;
        depth += 1;
    }
    depth
}

fn check_order(instructions: &[Instruction], errors: &mut Vec<ValidationError>) {
    let mut groups: IndexMap<ParentKey, Vec<&Instruction>> = IndexMap::new();
    for ins in instructions {
        groups.entry(ParentKey::of(ins)).or_default().push(ins);
    }

    for (parent, members) in groups {
        let (ordered, unordered): (Vec<&Instruction>, Vec<&Instruction>) =
            members.into_iter().partition(|i| i.order.is_some());

        let mut by_order: IndexMap<u64, (f64, Vec<String>)> = IndexMap::new();
        for ins in &ordered {
            // +0.0 folds -0.0 into 0.0
            let order = ins.effective_order() + 0.0;
            by_order
                .entry(order.to_bits())
                .or_insert_with(|| (order, Vec::new()))
                .1
                .push(ins.id.clone());
        }
        for (_, (order, ids)) in by_order {
            if ids.len() > 1 {
                errors.push(ValidationError::DuplicateOrder {
                    parent: parent.clone(),
                    order,
                    ids,
                });
            }
        }

        if !ordered.is_empty() && !unordered.is_empty() {
            errors.push(ValidationError::MixedOrdering {
                parent: parent.clone(),
                unordered: unordered.iter().map(|i| i.id.clone()).collect(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn given_non_array_document_when_validating_then_reports_not_a_list() {
        let result = ConfigValidator::default().validate(&json!({"id": "a"}), &[]);
        assert!(!result.valid);
        assert_eq!(result.errors, vec![ValidationError::NotAList]);
    }

    #[test]
    fn given_empty_document_when_validating_then_single_empty_error() {
        for profile in [ProfileKind::Strict, ProfileKind::Permissive] {
            let result = ConfigValidator::new(profile, DEFAULT_MAX_DEPTH).validate(&json!([]), &[]);
            assert_eq!(result.errors, vec![ValidationError::Empty]);
            assert_eq!(result.messages(), vec!["Configuration is empty".to_string()]);
        }
    }

    #[test]
    fn given_cycle_error_when_displayed_then_joins_path() {
        let err = ValidationError::Cycle {
            path: vec!["a".into(), "c".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> c -> b -> a");
    }

    #[test]
    fn given_fractional_duplicate_order_when_displayed_then_keeps_fraction() {
        let err = ValidationError::DuplicateOrder {
            parent: ParentKey::Parent("g".into()),
            order: 1.5,
            ids: vec!["x".into(), "y".into()],
        };
        assert_eq!(
            err.to_string(),
            "Duplicate order 1.5 found in parent 'g' for layers: x, y"
        );
    }

    #[test]
    fn given_chain_when_measuring_depth_then_counts_hops() {
        let ins = vec![
            Instruction::new("a"),
            Instruction::new("b").with_parent("a"),
            Instruction::new("c").with_parent("b"),
        ];
        let parents = parent_lookup(&ins);
        assert_eq!(nesting_depth("c", &parents), 2);
        assert_eq!(nesting_depth("a", &parents), 0);
    }

    #[test]
    fn given_signed_zero_orders_when_checking_then_treated_as_duplicate() {
        let ins = vec![
            Instruction::new("a").with_order(0.0),
            Instruction::new("b").with_order(-0.0),
        ];
        let mut errors = Vec::new();
        check_order(&ins, &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("a, b"));
    }

    #[test]
    fn given_result_when_explicit_ids_then_includes_parents() {
        let result = ValidationResult::new(
            Vec::new(),
            vec![Instruction::new("child").with_parent("missing")],
        );
        let ids = result.explicit_ids();
        assert!(ids.contains("child"));
        assert!(ids.contains("missing"));
    }
}
