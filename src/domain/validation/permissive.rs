use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::warn;

use crate::domain::entities::{AvailableNode, Instruction, NodeKind};
use crate::domain::validation::records::parse_lenient;
use crate::domain::validation::{
    catalogue_kinds, check_identity, parent_lookup, ProfileKind, ValidationError,
    ValidationResult, ValidationStrategy,
};

/// Opt-in profile for hand-edited configurations.
///
/// Instructions may be declared in any order and parents that exist
/// nowhere are created as group layers by the engine. Leaf parents, self
/// references, duplicates and cycles still fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveProfile;

impl ValidationStrategy for PermissiveProfile {
    fn kind(&self) -> ProfileKind {
        ProfileKind::Permissive
    }

    fn validate(&self, records: &[Value], available: &[AvailableNode]) -> ValidationResult {
        let instructions = parse_lenient(records);
        let kinds = catalogue_kinds(available);
        let mut errors = Vec::new();

        check_identity(&instructions, &mut errors);
        check_references(&instructions, &kinds, &mut errors);
        errors.extend(detect_cycles(&instructions));

        ValidationResult::new(errors, instructions)
    }
}

fn check_references(
    instructions: &[Instruction],
    kinds: &HashMap<&str, NodeKind>,
    errors: &mut Vec<ValidationError>,
) {
    let declared: HashSet<&str> = instructions.iter().map(|i| i.id.as_str()).collect();

    for ins in instructions {
        let Some(parent) = ins.new_parent_id.as_deref() else {
            continue;
        };
        if parent == ins.id {
            errors.push(ValidationError::SelfParent(ins.id.clone()));
            continue;
        }
        match kinds.get(parent) {
            Some(NodeKind::Leaf) => errors.push(ValidationError::ParentNotContainer {
                id: ins.id.clone(),
                parent: parent.to_string(),
                kind: NodeKind::Leaf,
            }),
            Some(NodeKind::Container) => {}
            None if declared.contains(parent) => {}
            None => warn!(
                "parent layer '{parent}' for '{}' not found - will be created as group layer",
                ins.id
            ),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over parent links with a recursion stack.
///
/// Self references are reported by the reference phase and skipped here.
fn detect_cycles(instructions: &[Instruction]) -> Vec<ValidationError> {
    let parents = parent_lookup(instructions);
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut cycles = Vec::new();

    for ins in instructions {
        let mut stack: Vec<&str> = Vec::new();
        let mut current = ins.id.as_str();
        loop {
            match marks.get(current) {
                Some(Mark::Done) => break,
                Some(Mark::Visiting) => {
                    if let Some(pos) = stack.iter().position(|&s| s == current) {
                        let mut path: Vec<String> =
                            stack[pos..].iter().map(|s| s.to_string()).collect();
                        path.push(current.to_string());
                        if path.len() > 2 {
                            cycles.push(ValidationError::Cycle { path });
                        }
                    }
                    break;
                }
                None => {}
            }
            marks.insert(current, Mark::Visiting);
            stack.push(current);
            match parents.get(current) {
                Some(&next) => current = next,
                None => break,
            }
        }
        for node in stack {
            marks.insert(node, Mark::Done);
        }
    }

    cycles
}
