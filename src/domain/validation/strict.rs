use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::domain::entities::{AvailableNode, Instruction, NodeKind};
use crate::domain::validation::records::check_shape;
use crate::domain::validation::{
    catalogue_kinds, check_depth, check_identity, check_order, parent_lookup, warn_unknown_ids,
    ProfileKind, ValidationError, ValidationResult, ValidationStrategy, DEFAULT_MAX_DEPTH,
};

/// The complete validation discipline.
///
/// Phases: shape, identity, references (parents must be available or
/// declared earlier), cycles, nesting depth, sibling order. Shape failures
/// stop validation since later phases cannot trust the records.
#[derive(Debug, Clone)]
pub struct StrictProfile {
    max_depth: usize,
}

impl Default for StrictProfile {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl StrictProfile {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl ValidationStrategy for StrictProfile {
    fn kind(&self) -> ProfileKind {
        ProfileKind::Strict
    }

    fn validate(&self, records: &[Value], available: &[AvailableNode]) -> ValidationResult {
        let (instructions, mut errors) = check_shape(records);
        if !errors.is_empty() {
            return ValidationResult::new(errors, instructions);
        }

        let kinds = catalogue_kinds(available);
        warn_unknown_ids(&instructions, &kinds);

        check_identity(&instructions, &mut errors);
        check_references(&instructions, &kinds, &mut errors);
        errors.extend(detect_cycles(&instructions));
        check_depth(&instructions, self.max_depth, &mut errors);
        check_order(&instructions, &mut errors);

        ValidationResult::new(errors, instructions)
    }
}

fn check_references(
    instructions: &[Instruction],
    kinds: &HashMap<&str, NodeKind>,
    errors: &mut Vec<ValidationError>,
) {
    let declared: HashSet<&str> = instructions.iter().map(|i| i.id.as_str()).collect();
    let mut processed = HashSet::new();

    for ins in instructions {
        if let Some(parent) = ins.new_parent_id.as_deref() {
            let problem = match kinds.get(parent) {
                Some(NodeKind::Container) => None,
                Some(&kind) => Some(ValidationError::ParentNotContainer {
                    id: ins.id.clone(),
                    parent: parent.to_string(),
                    kind,
                }),
                None if !declared.contains(parent) => Some(ValidationError::UnresolvedParent {
                    id: ins.id.clone(),
                    parent: parent.to_string(),
                }),
                None if !processed.contains(parent) => Some(ValidationError::ForwardReference {
                    id: ins.id.clone(),
                    parent: parent.to_string(),
                }),
                None => None,
            };
            errors.extend(problem);
        }
        processed.insert(ins.id.as_str());
    }
}

/// Walk upward from every node; a revisit on the current path is a cycle.
///
/// Nodes already attributed to a reported cycle end any later walk, so a
/// cycle reachable from several entries is reported once.
fn detect_cycles(instructions: &[Instruction]) -> Vec<ValidationError> {
    let parents = parent_lookup(instructions);
    let mut checked: HashSet<&str> = HashSet::new();
    let mut attributed: HashSet<&str> = HashSet::new();
    let mut cycles = Vec::new();

    for ins in instructions {
        let start = ins.id.as_str();
        if !checked.insert(start) {
            continue;
        }

        let mut path: Vec<&str> = Vec::new();
        let mut current = start;
        loop {
            if attributed.contains(current) {
                break;
            }
            if let Some(pos) = path.iter().position(|&p| p == current) {
                let cycle = &path[pos..];
                attributed.extend(cycle.iter().copied());
                checked.extend(cycle.iter().copied());
                cycles.push(ValidationError::Cycle {
                    path: cycle
                        .iter()
                        .chain(std::iter::once(&current))
                        .map(|s| s.to_string())
                        .collect(),
                });
                break;
            }
            let Some(&next) = parents.get(current) else {
                break;
            };
            path.push(current);
            current = next;
        }
    }

    cycles
}
