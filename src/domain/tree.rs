//! Tree accessor: the verbs the engine and the filter use on a live layer tree.
//!
//! The tree owns node lifetime and parent/child linkage. Callers only ask it
//! to detach and attach nodes and never hold a node without knowing which
//! collection currently contains it.

use std::fmt::Debug;
use std::hash::Hash;

use crate::domain::entities::NodeKind;
use crate::domain::error::DomainResult;

pub trait LayerTree {
    /// Opaque reference to a node owned by the tree.
    type Handle: Copy + Eq + Hash + Debug;

    /// Current root child collection, in rendering order.
    fn roots(&self) -> Vec<Self::Handle>;

    /// Children of a group layer; `None` when the node exposes no child collection.
    fn children(&self, node: Self::Handle) -> Option<Vec<Self::Handle>>;

    /// Back-reference to the containing group layer (lookup only).
    fn parent(&self, node: Self::Handle) -> Option<Self::Handle>;

    fn layer_id(&self, node: Self::Handle) -> Option<&str>;

    fn kind(&self, node: Self::Handle) -> Option<NodeKind>;

    /// Resource location the layer exposes, if any.
    fn location(&self, node: Self::Handle) -> Option<&str>;

    /// Bundle provenance tag attached during ingestion, if any.
    fn provenance(&self, node: Self::Handle) -> Option<&str>;

    /// Mint a new, unattached, empty group layer.
    fn create_container(&mut self, id: &str, title: &str) -> Self::Handle;

    fn add_to_root(&mut self, node: Self::Handle) -> DomainResult<()>;

    /// Must be safe to call immediately after [`add_to_root`](Self::add_to_root).
    fn remove_from_root(&mut self, node: Self::Handle) -> DomainResult<()>;

    fn add_child(&mut self, container: Self::Handle, node: Self::Handle) -> DomainResult<()>;

    fn remove_child(&mut self, container: Self::Handle, node: Self::Handle) -> DomainResult<()>;

    /// Mark a node as explicitly placed by a restructuring run.
    fn mark_placed(&mut self, node: Self::Handle);

    fn is_placed(&self, node: Self::Handle) -> bool;

    fn is_root(&self, node: Self::Handle) -> bool {
        self.roots().contains(&node)
    }

    /// Detach a node from wherever it currently lives.
    fn detach(&mut self, node: Self::Handle) -> DomainResult<()> {
        if let Some(parent) = self.parent(node) {
            self.remove_child(parent, node)
        } else if self.is_root(node) {
            self.remove_from_root(node)
        } else {
            Ok(())
        }
    }

    /// All nodes reachable from the root collection, depth-first, parents
    /// before children.
    fn flatten(&self) -> Vec<Self::Handle> {
        let mut out = Vec::new();
        let mut stack: Vec<Self::Handle> = self.roots().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            if let Some(children) = self.children(node) {
                stack.extend(children.into_iter().rev());
            }
        }
        out
    }
}
