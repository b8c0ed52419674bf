//! Domain entities: core data structures

use std::fmt;

use serde::{Deserialize, Serialize};

/// One user-authored directive: place layer `id` under `new_parent_id` at
/// sibling rank `order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Instruction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
}

impl Instruction {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            new_parent_id: None,
            order: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.new_parent_id = Some(parent.into());
        self
    }

    pub fn with_order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }

    /// Sibling rank used for sorting; unordered instructions rank as 0.
    pub fn effective_order(&self) -> f64 {
        self.order.unwrap_or(0.0)
    }

    /// Raw record form, as it would appear in an instruction document.
    pub fn to_record(&self) -> serde_json::Value {
        let mut record = serde_json::Map::new();
        record.insert("id".into(), self.id.clone().into());
        if let Some(parent) = &self.new_parent_id {
            record.insert("newParentId".into(), parent.clone().into());
        }
        if let Some(order) = self.order {
            record.insert("order".into(), order.into());
        }
        serde_json::Value::Object(record)
    }
}

/// Whether a layer can hold children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Leaf,
    Container,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Leaf => write!(f, "layer"),
            NodeKind::Container => write!(f, "group"),
        }
    }
}

/// A layer the host already knows about, independent of any instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableNode {
    pub id: String,
    pub kind: NodeKind,
}

impl AvailableNode {
    pub fn leaf(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Leaf,
        }
    }

    pub fn container(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Container,
        }
    }
}

/// Map document: the layer tree at rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapDocument {
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

/// One layer of a map document.
///
/// A spec is a group layer when it carries a `layers` or `sublayers`
/// collection, or when its type is `group`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub layer_type: Option<String>,
    /// Resource location of the layer's data source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Bundle that contributed this layer
    #[serde(
        default,
        alias = "_sourceDomainBundle",
        skip_serializing_if = "Option::is_none"
    )]
    pub bundle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<LayerSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sublayers: Option<Vec<LayerSpec>>,
}

impl LayerSpec {
    pub fn kind(&self) -> NodeKind {
        if self.layers.is_some()
            || self.sublayers.is_some()
            || self.layer_type.as_deref() == Some("group")
        {
            NodeKind::Container
        } else {
            NodeKind::Leaf
        }
    }
}
