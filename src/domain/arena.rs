use std::fmt;

use generational_arena::{Arena, Index};
use termtree::Tree;
use tracing::instrument;

use crate::domain::entities::{AvailableNode, LayerSpec, MapDocument, NodeKind};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::tree::LayerTree;

/// Data payload for layer nodes.
#[derive(Debug, Clone, Default)]
pub struct LayerData {
    pub id: String,
    pub title: Option<String>,
    /// Host-specific type string, kept for write-back
    pub layer_type: Option<String>,
    pub url: Option<String>,
    pub bundle_id: Option<String>,
    /// Set by a restructuring run that explicitly placed this node
    pub placed: bool,
}

impl fmt::Display for LayerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) if title != &self.id => write!(f, "{} ({})", self.id, title),
            _ => write!(f, "{}", self.id),
        }
    }
}

/// Child collection of a group layer.
///
/// Hosts expose children under one of two relations; both are treated the
/// same, and a node carries at most one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Members {
    None,
    Layers(Vec<Index>),
    Sublayers(Vec<Index>),
}

impl Members {
    pub fn as_slice(&self) -> Option<&[Index]> {
        match self {
            Members::None => None,
            Members::Layers(v) | Members::Sublayers(v) => Some(v),
        }
    }

    fn as_mut_vec(&mut self) -> Option<&mut Vec<Index>> {
        match self {
            Members::None => None,
            Members::Layers(v) | Members::Sublayers(v) => Some(v),
        }
    }
}

/// Layer node in the arena.
#[derive(Debug)]
pub struct LayerNode {
    pub data: LayerData,
    /// Index of the containing group layer, None for root or detached nodes
    pub parent: Option<Index>,
    pub members: Members,
}

impl LayerNode {
    pub fn kind(&self) -> NodeKind {
        match self.members {
            Members::None => NodeKind::Leaf,
            _ => NodeKind::Container,
        }
    }
}

/// Arena-based live layer tree.
///
/// Uses a generational arena for memory-safe node references. Nodes that
/// are detached from the root collection stay in the arena but are no
/// longer reachable, rendered or written back.
#[derive(Debug, Default)]
pub struct LayerArena {
    arena: Arena<LayerNode>,
    roots: Vec<Index>,
}

impl LayerArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node and attach it to `parent`, or to the root collection.
    #[instrument(level = "trace", skip(self))]
    pub fn insert_node(
        &mut self,
        data: LayerData,
        members: Members,
        parent: Option<Index>,
    ) -> DomainResult<Index> {
        let idx = self.arena.insert(LayerNode {
            data,
            parent: None,
            members,
        });
        match parent {
            Some(p) => self.add_child(p, idx)?,
            None => self.add_to_root(idx)?,
        }
        Ok(idx)
    }

    pub fn from_document(doc: &MapDocument) -> DomainResult<Self> {
        let mut tree = Self::new();
        for spec in &doc.layers {
            tree.insert_spec(spec, None)?;
        }
        Ok(tree)
    }

    /// Insert a layer spec and its whole subtree.
    pub fn insert_spec(&mut self, spec: &LayerSpec, parent: Option<Index>) -> DomainResult<Index> {
        let data = LayerData {
            id: spec.id.clone(),
            title: spec.title.clone(),
            layer_type: spec.layer_type.clone(),
            url: spec.url.clone(),
            bundle_id: spec.bundle_id.clone(),
            placed: false,
        };
        let (members, children) = match (&spec.layers, &spec.sublayers) {
            (Some(children), _) => (Members::Layers(Vec::new()), children.as_slice()),
            (None, Some(children)) => (Members::Sublayers(Vec::new()), children.as_slice()),
            (None, None) if spec.kind() == NodeKind::Container => {
                (Members::Layers(Vec::new()), &[][..])
            }
            (None, None) => (Members::None, &[][..]),
        };
        let idx = self.insert_node(data, members, parent)?;
        for child in children {
            self.insert_spec(child, Some(idx))?;
        }
        Ok(idx)
    }

    pub fn to_document(&self) -> MapDocument {
        MapDocument {
            layers: self.roots.iter().filter_map(|&r| self.to_spec(r)).collect(),
        }
    }

    fn to_spec(&self, idx: Index) -> Option<LayerSpec> {
        let node = self.arena.get(idx)?;
        let collect = |v: &Vec<Index>| -> Vec<LayerSpec> {
            v.iter().filter_map(|&c| self.to_spec(c)).collect()
        };
        let (layers, sublayers) = match &node.members {
            Members::None => (None, None),
            Members::Layers(v) => (Some(collect(v)), None),
            Members::Sublayers(v) => (None, Some(collect(v))),
        };
        Some(LayerSpec {
            id: node.data.id.clone(),
            title: node.data.title.clone(),
            layer_type: node.data.layer_type.clone(),
            url: node.data.url.clone(),
            bundle_id: node.data.bundle_id.clone(),
            layers,
            sublayers,
        })
    }

    pub fn get_node(&self, idx: Index) -> Option<&LayerNode> {
        self.arena.get(idx)
    }

    /// Find a reachable node by layer id.
    pub fn find(&self, id: &str) -> Option<Index> {
        self.iter()
            .find(|(_, node)| node.data.id == id)
            .map(|(idx, _)| idx)
    }

    pub fn root_ids(&self) -> Vec<String> {
        self.ids_of(&self.roots)
    }

    /// Child ids of the group layer with the given id.
    pub fn child_ids(&self, id: &str) -> Option<Vec<String>> {
        let idx = self.find(id)?;
        let members = self.arena.get(idx)?.members.as_slice()?;
        Some(self.ids_of(members))
    }

    fn ids_of(&self, indices: &[Index]) -> Vec<String> {
        indices
            .iter()
            .filter_map(|&i| self.arena.get(i).map(|n| n.data.id.clone()))
            .collect()
    }

    /// Snapshot of all reachable layers as id/kind pairs.
    pub fn catalogue(&self) -> Vec<AvailableNode> {
        self.iter()
            .map(|(_, node)| AvailableNode {
                id: node.data.id.clone(),
                kind: node.kind(),
            })
            .collect()
    }

    pub fn iter(&self) -> LayerIterator<'_> {
        LayerIterator::new(self)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.roots
            .iter()
            .map(|&r| self.calculate_depth(r))
            .max()
            .unwrap_or(0)
    }

    fn calculate_depth(&self, idx: Index) -> usize {
        match self.arena.get(idx) {
            Some(node) => {
                1 + node
                    .members
                    .as_slice()
                    .unwrap_or(&[])
                    .iter()
                    .map(|&child| self.calculate_depth(child))
                    .max()
                    .unwrap_or(0)
            }
            None => 0,
        }
    }

    /// Render the reachable tree under a single synthetic root.
    pub fn to_tree_string(&self, label: &str) -> Tree<String> {
        fn build(arena: &LayerArena, idx: Index) -> Option<Tree<String>> {
            let node = arena.get_node(idx)?;
            let leaves: Vec<_> = node
                .members
                .as_slice()
                .unwrap_or(&[])
                .iter()
                .filter_map(|&c| build(arena, c))
                .collect();
            Some(Tree::new(node.data.to_string()).with_leaves(leaves))
        }

        Tree::new(label.to_string()).with_leaves(self.roots.iter().filter_map(|&r| build(self, r)))
    }

    fn node(&self, idx: Index) -> DomainResult<&LayerNode> {
        self.arena
            .get(idx)
            .ok_or_else(|| DomainError::UnknownNode(format!("{idx:?}")))
    }

    fn node_mut(&mut self, idx: Index) -> DomainResult<&mut LayerNode> {
        self.arena
            .get_mut(idx)
            .ok_or_else(|| DomainError::UnknownNode(format!("{idx:?}")))
    }
}

impl LayerTree for LayerArena {
    type Handle = Index;

    fn roots(&self) -> Vec<Index> {
        self.roots.clone()
    }

    fn children(&self, node: Index) -> Option<Vec<Index>> {
        self.arena
            .get(node)
            .and_then(|n| n.members.as_slice())
            .map(<[Index]>::to_vec)
    }

    fn parent(&self, node: Index) -> Option<Index> {
        self.arena.get(node).and_then(|n| n.parent)
    }

    fn layer_id(&self, node: Index) -> Option<&str> {
        self.arena.get(node).map(|n| n.data.id.as_str())
    }

    fn kind(&self, node: Index) -> Option<NodeKind> {
        self.arena.get(node).map(LayerNode::kind)
    }

    fn location(&self, node: Index) -> Option<&str> {
        self.arena.get(node).and_then(|n| n.data.url.as_deref())
    }

    fn provenance(&self, node: Index) -> Option<&str> {
        self.arena.get(node).and_then(|n| n.data.bundle_id.as_deref())
    }

    fn create_container(&mut self, id: &str, title: &str) -> Index {
        let data = LayerData {
            id: id.to_string(),
            title: Some(title.to_string()),
            layer_type: Some("group".to_string()),
            ..LayerData::default()
        };
        self.arena.insert(LayerNode {
            data,
            parent: None,
            members: Members::Layers(Vec::new()),
        })
    }

    fn add_to_root(&mut self, node: Index) -> DomainResult<()> {
        self.node_mut(node)?.parent = None;
        if !self.roots.contains(&node) {
            self.roots.push(node);
        }
        Ok(())
    }

    fn remove_from_root(&mut self, node: Index) -> DomainResult<()> {
        self.node(node)?;
        self.roots.retain(|&r| r != node);
        Ok(())
    }

    fn add_child(&mut self, container: Index, node: Index) -> DomainResult<()> {
        self.node(node)?;
        let parent = self.node_mut(container)?;
        let id = parent.data.id.clone();
        let members = parent
            .members
            .as_mut_vec()
            .ok_or(DomainError::NotAContainer(id))?;
        if !members.contains(&node) {
            members.push(node);
        }
        self.node_mut(node)?.parent = Some(container);
        Ok(())
    }

    fn remove_child(&mut self, container: Index, node: Index) -> DomainResult<()> {
        let parent = self.node_mut(container)?;
        let id = parent.data.id.clone();
        parent
            .members
            .as_mut_vec()
            .ok_or(DomainError::NotAContainer(id))?
            .retain(|&c| c != node);
        let child = self.node_mut(node)?;
        if child.parent == Some(container) {
            child.parent = None;
        }
        Ok(())
    }

    fn mark_placed(&mut self, node: Index) {
        if let Some(n) = self.arena.get_mut(node) {
            n.data.placed = true;
        }
    }

    fn is_placed(&self, node: Index) -> bool {
        self.arena.get(node).map(|n| n.data.placed).unwrap_or(false)
    }
}

/// Preorder iterator over all reachable nodes, roots left to right.
pub struct LayerIterator<'a> {
    arena: &'a LayerArena,
    stack: Vec<Index>,
}

impl<'a> LayerIterator<'a> {
    fn new(arena: &'a LayerArena) -> Self {
        Self {
            arena,
            stack: arena.roots.iter().rev().copied().collect(),
        }
    }
}

impl<'a> Iterator for LayerIterator<'a> {
    type Item = (Index, &'a LayerNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current) {
                // Push children in reverse order for left-to-right traversal
                if let Some(children) = node.members.as_slice() {
                    self.stack.extend(children.iter().rev());
                }
                return Some((current, node));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LayerArena {
        let doc: MapDocument = serde_json::from_value(serde_json::json!({
            "layers": [
                {"id": "g1", "type": "group", "layers": [
                    {"id": "a", "url": "https://example.org/a"},
                    {"id": "svc", "sublayers": [{"id": "s0"}]}
                ]},
                {"id": "b", "bundleId": "bundle-x"}
            ]
        }))
        .unwrap();
        LayerArena::from_document(&doc).unwrap()
    }

    #[test]
    fn given_document_when_loaded_then_preserves_structure_and_order() {
        let tree = sample();
        assert_eq!(tree.root_ids(), vec!["g1", "b"]);
        assert_eq!(tree.child_ids("g1").unwrap(), vec!["a", "svc"]);
        assert_eq!(tree.child_ids("svc").unwrap(), vec!["s0"]);
        assert_eq!(tree.child_ids("a"), None);
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn given_document_when_round_tripped_then_keeps_child_relation() {
        let tree = sample();
        let doc = tree.to_document();
        let svc = &doc.layers[0].layers.as_ref().unwrap()[1];
        assert!(svc.layers.is_none());
        assert_eq!(svc.sublayers.as_ref().unwrap()[0].id, "s0");
        assert_eq!(doc.layers[1].bundle_id.as_deref(), Some("bundle-x"));
    }

    #[test]
    fn given_tree_when_catalogue_then_lists_every_node_depth_first() {
        let ids: Vec<_> = sample()
            .catalogue()
            .into_iter()
            .map(|n| (n.id, n.kind))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("g1".to_string(), NodeKind::Container),
                ("a".to_string(), NodeKind::Leaf),
                ("svc".to_string(), NodeKind::Container),
                ("s0".to_string(), NodeKind::Leaf),
                ("b".to_string(), NodeKind::Leaf),
            ]
        );
    }

    #[test]
    fn given_child_when_moved_to_root_then_parent_link_is_cleared() {
        let mut tree = sample();
        let a = tree.find("a").unwrap();
        tree.detach(a).unwrap();
        tree.add_to_root(a).unwrap();
        assert_eq!(tree.parent(a), None);
        assert_eq!(tree.root_ids(), vec!["g1", "b", "a"]);
        assert_eq!(tree.child_ids("g1").unwrap(), vec!["svc"]);
    }

    #[test]
    fn given_leaf_when_adding_child_then_not_a_container() {
        let mut tree = sample();
        let a = tree.find("a").unwrap();
        let b = tree.find("b").unwrap();
        assert_eq!(
            tree.add_child(a, b),
            Err(DomainError::NotAContainer("a".to_string()))
        );
    }

    #[test]
    fn given_root_node_when_removed_right_after_add_then_is_gone() {
        let mut tree = LayerArena::new();
        let g = tree.create_container("fresh", "Fresh");
        tree.add_to_root(g).unwrap();
        tree.remove_from_root(g).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.find("fresh"), None);
    }

    #[test]
    fn given_tree_when_rendered_then_lists_nodes() {
        let rendered = sample().to_tree_string("map").to_string();
        assert!(rendered.starts_with("map"));
        assert!(rendered.contains("s0"));
        assert!(rendered.contains("b"));
    }
}
