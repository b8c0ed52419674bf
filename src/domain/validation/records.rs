//! Turning raw instruction records into typed instructions.

use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::entities::Instruction;
use crate::domain::validation::ValidationError;

const ALLOWED_FIELDS: [&str; 3] = ["id", "newParentId", "order"];

fn non_blank_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.trim().is_empty())
}

fn finite_number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}

/// Strict shape check: collects every defect of every record.
///
/// Instructions are only returned for records without defects; callers
/// must not continue when the error list is non-empty.
pub(super) fn check_shape(records: &[Value]) -> (Vec<Instruction>, Vec<ValidationError>) {
    let mut instructions = Vec::with_capacity(records.len());
    let mut errors = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let Some(fields) = record.as_object() else {
            errors.push(ValidationError::NotAnObject(index));
            continue;
        };
        let Some(id) = fields.get("id").and_then(non_blank_str) else {
            errors.push(ValidationError::InvalidId(index));
            continue;
        };

        let before = errors.len();

        let new_parent_id = match fields.get("newParentId") {
            None => None,
            Some(value) => {
                if non_blank_str(value).is_none() {
                    errors.push(ValidationError::InvalidParentId(id.to_string()));
                }
                if value.as_str() == Some(id) {
                    errors.push(ValidationError::SelfParent(id.to_string()));
                }
                value.as_str().map(str::to_string)
            }
        };

        let order = match fields.get("order") {
            None => None,
            Some(value) => {
                let parsed = finite_number(value);
                if parsed.is_none() {
                    errors.push(ValidationError::InvalidOrder(id.to_string()));
                }
                parsed
            }
        };

        errors.extend(unexpected_fields(fields).map(|field| ValidationError::UnexpectedField {
            id: id.to_string(),
            field: field.to_string(),
        }));

        if errors.len() == before {
            instructions.push(Instruction {
                id: id.to_string(),
                new_parent_id,
                order,
            });
        }
    }

    (instructions, errors)
}

fn unexpected_fields(fields: &Map<String, Value>) -> impl Iterator<Item = &str> {
    fields
        .keys()
        .map(String::as_str)
        .filter(|key| !ALLOWED_FIELDS.contains(key))
}

/// Lenient parse: keeps whatever is usable and logs the rest.
pub(super) fn parse_lenient(records: &[Value]) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let Some(id) = record
            .as_object()
            .and_then(|fields| fields.get("id"))
            .and_then(non_blank_str)
        else {
            warn!("skipping configuration entry at index {index}: no usable 'id'");
            continue;
        };

        let new_parent_id = match record.get("newParentId") {
            None => None,
            Some(value) => match non_blank_str(value) {
                Some(parent) => Some(parent.to_string()),
                None => {
                    warn!("ignoring invalid 'newParentId' of '{id}'");
                    None
                }
            },
        };

        let order = match record.get("order") {
            None => None,
            Some(value) => match finite_number(value) {
                Some(order) => Some(order),
                None => {
                    warn!("ignoring invalid 'order' of '{id}'");
                    None
                }
            },
        };

        instructions.push(Instruction {
            id: id.to_string(),
            new_parent_id,
            order,
        });
    }

    instructions
}
