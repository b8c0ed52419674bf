//! Restructuring engine: applies a validated instruction list to a live tree.
//!
//! Lookup tables are built once per call from the tree and dropped at the
//! end of the call; nothing survives between runs except the tree itself.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use tracing::{debug, instrument, trace};

use crate::domain::entities::{Instruction, NodeKind};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::origin::PruneDecision;
use crate::domain::tree::LayerTree;

/// What a successful run did to the tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestructureReport {
    /// Final root collection, in rendering order
    pub root_ids: Vec<String>,
    /// Group layers minted by this run
    pub created: Vec<String>,
    /// Nodes an instruction placed, in instruction order
    pub placed: Vec<String>,
    /// Nodes removed by a prune decision
    pub pruned: Vec<String>,
}

/// Sort key of a sibling: explicit order (descending), then sequence.
type Rank = (f64, usize);

fn by_rank(a: &Rank, b: &Rank) -> Ordering {
    b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
}

#[derive(Debug, Clone, Copy)]
enum Collection<H> {
    Root,
    Children(H),
}

#[derive(Debug, Default)]
pub struct RestructuringEngine;

impl RestructuringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Re-parent and re-order the tree according to `instructions`.
    ///
    /// The instructions must have passed validation. A parent that still
    /// cannot be resolved is a [`DomainError::ParentResolutionFailure`];
    /// mutations applied before the failure stay in place.
    #[instrument(level = "debug", skip_all, fields(instructions = instructions.len()))]
    pub fn restructure<T: LayerTree>(
        &self,
        instructions: &[Instruction],
        tree: &mut T,
        prune: Option<&PruneDecision<T::Handle>>,
    ) -> DomainResult<RestructureReport> {
        let mut report = RestructureReport::default();
        let mut index = build_index(tree, prune);
        debug!("index: {} reachable node(s)", index.len());

        // Parents first, so every target exists before anything moves.
        for parent in instructions.iter().filter_map(|i| i.new_parent_id.as_deref()) {
            if !index.contains_key(parent) {
                let handle = tree.create_container(parent, parent);
                index.insert(parent.to_string(), handle);
                report.created.push(parent.to_string());
                debug!("created group layer '{parent}' for referenced parent");
            }
        }

        let mut ranks: HashMap<T::Handle, Rank> = HashMap::new();
        let mut root_level: IndexSet<T::Handle> = IndexSet::new();
        let mut touched: IndexSet<T::Handle> = IndexSet::new();

        for (position, ins) in instructions.iter().enumerate() {
            let node = match index.get(&ins.id) {
                Some(&handle) => handle,
                None => {
                    let handle = tree.create_container(&ins.id, &ins.id);
                    index.insert(ins.id.clone(), handle);
                    report.created.push(ins.id.clone());
                    debug!("created group layer '{}' for instruction", ins.id);
                    handle
                }
            };
            ranks.insert(node, (ins.effective_order(), position));

            match ins.new_parent_id.as_deref() {
                Some(parent) => {
                    let target = index
                        .get(parent)
                        .copied()
                        .filter(|&t| tree.kind(t) == Some(NodeKind::Container))
                        .ok_or_else(|| DomainError::ParentResolutionFailure {
                            id: ins.id.clone(),
                            parent: parent.to_string(),
                        })?;
                    if is_ancestor_or_self(tree, node, target) {
                        return Err(DomainError::WouldNest {
                            id: ins.id.clone(),
                            parent: parent.to_string(),
                        });
                    }
                    tree.detach(node)?;
                    tree.add_child(target, node)?;
                    touched.insert(target);
                    trace!("moved '{}' into '{parent}'", ins.id);
                }
                None => {
                    if let Some(current) = tree.parent(node) {
                        tree.remove_child(current, node)?;
                    }
                    root_level.insert(node);
                }
            }
            tree.mark_placed(node);
            report.placed.push(ins.id.clone());
        }

        // Hosts for children only: parentless ones live at the root.
        let instructed: HashSet<&str> = instructions.iter().map(|i| i.id.as_str()).collect();
        for parent in instructions.iter().filter_map(|i| i.new_parent_id.as_deref()) {
            if instructed.contains(parent) {
                continue;
            }
            if let Some(&handle) = index.get(parent) {
                if tree.parent(handle).is_none() {
                    root_level.insert(handle);
                }
            }
        }

        // Bundle layers the filter keeps stay at the root after the
        // instructed ones.
        if let Some(decision) = prune {
            for &node in decision.kept() {
                if tree.is_root(node) && tree.parent(node).is_none() {
                    root_level.insert(node);
                }
            }
        }

        let base = instructions.len();
        let roots = sort_by_rank(
            root_level
                .into_iter()
                .filter(|&h| tree.parent(h).is_none())
                .collect(),
            &ranks,
            base,
        );
        reconcile(tree, Collection::Root, &roots)?;

        for container in touched {
            let children = tree.children(container).unwrap_or_default();
            let desired = sort_by_rank(children, &ranks, base);
            reconcile(tree, Collection::Children(container), &desired)?;
        }

        if let Some(decision) = prune {
            for &node in decision.nodes() {
                let attached = tree.parent(node).is_some() || tree.is_root(node);
                if tree.is_placed(node) || !attached {
                    continue;
                }
                tree.detach(node)?;
                if let Some(id) = tree.layer_id(node) {
                    report.pruned.push(id.to_string());
                }
            }
            debug!("pruned {} node(s)", report.pruned.len());
        }

        report.root_ids = tree
            .roots()
            .into_iter()
            .filter_map(|h| tree.layer_id(h).map(str::to_string))
            .collect();
        debug!(
            "restructured: {} placed, {} created, {} root(s)",
            report.placed.len(),
            report.created.len(),
            report.root_ids.len()
        );
        Ok(report)
    }
}

/// id -> handle for every reachable node outside the prune decision.
///
/// The first node wins when a live tree repeats an id.
fn build_index<T: LayerTree>(
    tree: &T,
    prune: Option<&PruneDecision<T::Handle>>,
) -> HashMap<String, T::Handle> {
    let mut index = HashMap::new();
    for handle in tree.flatten() {
        if prune.is_some_and(|d| d.contains(handle)) {
            continue;
        }
        if let Some(id) = tree.layer_id(handle) {
            index.entry(id.to_string()).or_insert(handle);
        }
    }
    index
}

fn is_ancestor_or_self<T: LayerTree>(tree: &T, node: T::Handle, target: T::Handle) -> bool {
    let mut current = Some(target);
    while let Some(c) = current {
        if c == node {
            return true;
        }
        current = tree.parent(c);
    }
    false
}

/// Instructed nodes carry their own rank; the rest keep their relative
/// order and rank as order 0 after every instruction.
fn sort_by_rank<H: Copy + Eq + std::hash::Hash>(
    nodes: Vec<H>,
    ranks: &HashMap<H, Rank>,
    base: usize,
) -> Vec<H> {
    let mut keyed: Vec<(Rank, H)> = nodes
        .into_iter()
        .enumerate()
        .map(|(i, h)| (ranks.get(&h).copied().unwrap_or((0.0, base + i)), h))
        .collect();
    keyed.sort_by(|a, b| by_rank(&a.0, &b.0));
    keyed.into_iter().map(|(_, h)| h).collect()
}

/// Bring a collection to `desired` with removes and appends only.
///
/// The longest already-correct prefix is left untouched.
fn reconcile<T: LayerTree>(
    tree: &mut T,
    collection: Collection<T::Handle>,
    desired: &[T::Handle],
) -> DomainResult<()> {
    let current = match collection {
        Collection::Root => tree.roots(),
        Collection::Children(c) => tree.children(c).unwrap_or_default(),
    };

    let mut kept = Vec::with_capacity(current.len());
    for node in current {
        if desired.contains(&node) {
            kept.push(node);
        } else {
            remove(tree, collection, node)?;
        }
    }

    let prefix = kept
        .iter()
        .zip(desired)
        .take_while(|(a, b)| a == b)
        .count();
    for &node in &desired[prefix..] {
        if kept.contains(&node) {
            remove(tree, collection, node)?;
        }
        match collection {
            Collection::Root => tree.add_to_root(node)?,
            Collection::Children(c) => tree.add_child(c, node)?,
        }
    }
    Ok(())
}

fn remove<T: LayerTree>(
    tree: &mut T,
    collection: Collection<T::Handle>,
    node: T::Handle,
) -> DomainResult<()> {
    match collection {
        Collection::Root => tree.remove_from_root(node),
        Collection::Children(c) => tree.remove_child(c, node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arena::LayerArena;
    use crate::domain::entities::MapDocument;

    fn arena(json: serde_json::Value) -> LayerArena {
        let doc: MapDocument = serde_json::from_value(json).unwrap();
        LayerArena::from_document(&doc).unwrap()
    }

    #[test]
    fn given_unordered_roots_when_restructuring_then_sorted_descending() {
        let mut tree = arena(serde_json::json!({"layers": [{"id": "a"}, {"id": "b"}, {"id": "c"}]}));
        let ins = vec![
            Instruction::new("a").with_order(1.0),
            Instruction::new("b").with_order(3.0),
            Instruction::new("c").with_order(2.0),
        ];
        let report = RestructuringEngine::new()
            .restructure(&ins, &mut tree, None)
            .unwrap();
        assert_eq!(report.root_ids, vec!["b", "c", "a"]);
        assert!(report.created.is_empty());
    }

    #[test]
    fn given_equal_orders_when_restructuring_then_input_order_kept() {
        let mut tree = arena(serde_json::json!({"layers": [{"id": "x"}, {"id": "y"}, {"id": "z"}]}));
        let ins = vec![
            Instruction::new("z"),
            Instruction::new("x"),
            Instruction::new("y"),
        ];
        RestructuringEngine::new()
            .restructure(&ins, &mut tree, None)
            .unwrap();
        assert_eq!(tree.root_ids(), vec!["z", "x", "y"]);
    }

    #[test]
    fn given_untouched_sibling_when_container_touched_then_it_stays_after_instructed() {
        let mut tree = arena(serde_json::json!({"layers": [
            {"id": "g", "layers": [{"id": "keep"}]},
            {"id": "m"}
        ]}));
        let ins = vec![
            Instruction::new("g"),
            Instruction::new("m").with_parent("g"),
        ];
        RestructuringEngine::new()
            .restructure(&ins, &mut tree, None)
            .unwrap();
        assert_eq!(tree.child_ids("g").unwrap(), vec!["m", "keep"]);
    }

    #[test]
    fn given_leaf_target_when_restructuring_then_parent_resolution_failure() {
        let mut tree = arena(serde_json::json!({"layers": [{"id": "leaf"}, {"id": "x"}]}));
        let ins = vec![Instruction::new("x").with_parent("leaf")];
        let err = RestructuringEngine::new()
            .restructure(&ins, &mut tree, None)
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::ParentResolutionFailure {
                id: "x".into(),
                parent: "leaf".into()
            }
        );
    }

    #[test]
    fn given_move_below_own_descendant_when_restructuring_then_would_nest() {
        let mut tree = arena(serde_json::json!({"layers": [
            {"id": "outer", "layers": [{"id": "inner", "layers": []}]}
        ]}));
        let ins = vec![Instruction::new("outer").with_parent("inner")];
        let err = RestructuringEngine::new()
            .restructure(&ins, &mut tree, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::WouldNest { .. }));
    }

    #[test]
    fn given_desired_prefix_when_reconciling_then_only_tail_moves() {
        let mut tree = arena(serde_json::json!({"layers": [{"id": "a"}, {"id": "b"}, {"id": "c"}]}));
        let a = tree.find("a").unwrap();
        let b = tree.find("b").unwrap();
        let c = tree.find("c").unwrap();
        reconcile(&mut tree, Collection::Root, &[a, c, b]).unwrap();
        assert_eq!(tree.root_ids(), vec!["a", "c", "b"]);
        reconcile(&mut tree, Collection::Root, &[c]).unwrap();
        assert_eq!(tree.root_ids(), vec!["c"]);
    }
}
