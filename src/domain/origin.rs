//! Domain-origin filter: which bundle contributed a layer, and whether
//! layers nobody placed should stay on the map.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::domain::entities::LayerSpec;
use crate::domain::error::DomainResult;
use crate::domain::tree::LayerTree;

/// What a matcher gets to see of a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeFacts<'a> {
    pub id: &'a str,
    pub provenance: Option<&'a str>,
    pub location: Option<&'a str>,
}

impl<'a> NodeFacts<'a> {
    pub fn of<T: LayerTree>(tree: &'a T, node: T::Handle) -> Option<Self> {
        Some(Self {
            id: tree.layer_id(node)?,
            provenance: tree.provenance(node),
            location: tree.location(node),
        })
    }
}

/// One heuristic for attributing a node to a bundle.
pub trait OriginMatcher: fmt::Debug + Send + Sync {
    fn bundle_of<'a>(&'a self, facts: &NodeFacts<'a>) -> Option<&'a str>;
}

/// Provenance tag attached when the bundle's layers were ingested.
#[derive(Debug, Default)]
pub struct ProvenanceTagMatcher;

impl OriginMatcher for ProvenanceTagMatcher {
    fn bundle_of<'a>(&'a self, facts: &NodeFacts<'a>) -> Option<&'a str> {
        facts.provenance.filter(|p| !p.is_empty())
    }
}

/// Exact layer id -> bundle table.
#[derive(Debug, Default)]
pub struct IdTableMatcher {
    table: BTreeMap<String, String>,
}

impl IdTableMatcher {
    pub fn new(table: BTreeMap<String, String>) -> Self {
        Self { table }
    }
}

impl OriginMatcher for IdTableMatcher {
    fn bundle_of<'a>(&'a self, facts: &NodeFacts<'a>) -> Option<&'a str> {
        self.table.get(facts.id).map(String::as_str)
    }
}

/// A substring of a resource location that identifies a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRule {
    pub fragment: String,
    pub bundle: String,
}

/// First rule whose fragment occurs in the location wins.
#[derive(Debug, Default)]
pub struct LocationFragmentMatcher {
    rules: Vec<LocationRule>,
}

impl LocationFragmentMatcher {
    pub fn new(rules: Vec<LocationRule>) -> Self {
        Self { rules }
    }
}

impl OriginMatcher for LocationFragmentMatcher {
    fn bundle_of<'a>(&'a self, facts: &NodeFacts<'a>) -> Option<&'a str> {
        let location = facts.location?;
        self.rules
            .iter()
            .find(|r| !r.fragment.is_empty() && location.contains(&r.fragment))
            .map(|r| r.bundle.as_str())
    }
}

/// Ordered list of matchers; the first one that answers decides.
#[derive(Debug, Default)]
pub struct OriginClassifier {
    matchers: Vec<Box<dyn OriginMatcher>>,
}

impl OriginClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provenance tag, then id table, then location fragments.
    pub fn from_tables(ids: BTreeMap<String, String>, locations: Vec<LocationRule>) -> Self {
        Self::new()
            .with(ProvenanceTagMatcher)
            .with(IdTableMatcher::new(ids))
            .with(LocationFragmentMatcher::new(locations))
    }

    pub fn with(mut self, matcher: impl OriginMatcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    pub fn classify<'a>(&'a self, facts: &NodeFacts<'a>) -> Option<&'a str> {
        self.matchers.iter().find_map(|m| m.bundle_of(facts))
    }
}

/// Outcome of the bundle filter for one tree.
///
/// `nodes` are chosen for removal: top-most members of pruned subtrees, in
/// tree order. `kept` are untouched root layers of a configured bundle that
/// stay in the map although no instruction placed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneDecision<H> {
    nodes: Vec<H>,
    kept: Vec<H>,
}

impl<H: Copy + PartialEq> PruneDecision<H> {
    pub fn new(nodes: Vec<H>) -> Self {
        Self {
            nodes,
            kept: Vec::new(),
        }
    }

    pub fn with_kept(mut self, kept: Vec<H>) -> Self {
        self.kept = kept;
        self
    }

    /// Same kept roots, nothing left to remove.
    pub fn kept_only(&self) -> Self {
        Self {
            nodes: Vec::new(),
            kept: self.kept.clone(),
        }
    }

    pub fn nodes(&self) -> &[H] {
        &self.nodes
    }

    pub fn kept(&self) -> &[H] {
        &self.kept
    }

    pub fn contains(&self, node: H) -> bool {
        self.nodes.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DomainFilter {
    /// bundle id -> "show remaining contents"
    show_remaining: BTreeMap<String, bool>,
    classifier: OriginClassifier,
}

impl DomainFilter {
    pub fn new(show_remaining: BTreeMap<String, bool>, classifier: OriginClassifier) -> Self {
        Self {
            show_remaining,
            classifier,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.show_remaining.is_empty()
    }

    /// Bundle of a node, restricted to the configured bundles.
    fn bundle_of<T: LayerTree>(&self, tree: &T, node: T::Handle) -> Option<String> {
        let facts = NodeFacts::of(tree, node)?;
        self.classifier
            .classify(&facts)
            .filter(|b| self.show_remaining.contains_key(*b))
            .map(str::to_string)
    }

    /// Configured bundle -> ids of its reachable layers, depth-first.
    pub fn classify<T: LayerTree>(&self, tree: &T) -> BTreeMap<String, Vec<String>> {
        let mut members: BTreeMap<String, Vec<String>> = self
            .show_remaining
            .keys()
            .map(|b| (b.clone(), Vec::new()))
            .collect();
        for node in tree.flatten() {
            if let (Some(bundle), Some(id)) = (self.bundle_of(tree, node), tree.layer_id(node)) {
                members.entry(bundle).or_default().push(id.to_string());
            }
        }
        members
    }

    /// A bundle layer goes when nothing placed it, its bundle does not keep
    /// remaining contents, and nothing below it is kept. Layers of no
    /// configured bundle are always kept, and so is every group above them.
    ///
    /// Root layers of a bundle that keeps remaining contents are listed as
    /// kept.
    pub fn decide_prune<T: LayerTree>(
        &self,
        tree: &T,
        explicit: &HashSet<String>,
    ) -> PruneDecision<T::Handle> {
        let order = tree.flatten();
        let mut protected: HashSet<T::Handle> = HashSet::new();
        let mut candidates: HashSet<T::Handle> = HashSet::new();

        // Reverse preorder visits children before their parent.
        for &node in order.iter().rev() {
            let bundle = self.bundle_of(tree, node);
            let own = bundle.is_none()
                || tree.is_placed(node)
                || tree.layer_id(node).is_some_and(|id| explicit.contains(id));
            let below = tree
                .children(node)
                .unwrap_or_default()
                .iter()
                .any(|c| protected.contains(c));
            if own || below {
                protected.insert(node);
                continue;
            }
            if let Some(bundle) = bundle {
                if self.show_remaining.get(&bundle) != Some(&true) {
                    trace!("prune candidate {:?} from bundle '{bundle}'", tree.layer_id(node));
                    candidates.insert(node);
                }
            }
        }

        let kept: Vec<T::Handle> = tree
            .roots()
            .into_iter()
            .filter(|&node| {
                self.bundle_of(tree, node)
                    .is_some_and(|b| self.show_remaining.get(&b) == Some(&true))
            })
            .collect();

        let mut top_most = Vec::new();
        let mut stack: Vec<T::Handle> = tree.roots().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if candidates.contains(&node) {
                top_most.push(node);
                continue;
            }
            if let Some(children) = tree.children(node) {
                stack.extend(children.into_iter().rev());
            }
        }
        debug!(
            "prune decision: {} node(s), {} root layer(s) kept",
            top_most.len(),
            kept.len()
        );
        PruneDecision::new(top_most).with_kept(kept)
    }

    /// Detach every decided node; already detached nodes are skipped.
    pub fn apply<T: LayerTree>(
        &self,
        tree: &mut T,
        decision: &PruneDecision<T::Handle>,
    ) -> DomainResult<Vec<String>> {
        let mut removed = Vec::new();
        for &node in decision.nodes() {
            if tree.is_placed(node) {
                continue;
            }
            let attached = tree.parent(node).is_some() || tree.is_root(node);
            if !attached {
                continue;
            }
            tree.detach(node)?;
            if let Some(id) = tree.layer_id(node) {
                removed.push(id.to_string());
            }
        }
        debug!("removed {} bundle layer(s)", removed.len());
        Ok(removed)
    }
}

/// Tag layers contributed by a bundle with its id.
///
/// Only top-level layers and their direct children are tagged; deeper
/// layers inherit nothing.
pub fn tag_bundle_layers(layers: &mut [LayerSpec], bundle: &str) {
    for layer in layers {
        layer.bundle_id = Some(bundle.to_string());
        for child in layer
            .layers
            .iter_mut()
            .chain(layer.sublayers.iter_mut())
            .flatten()
        {
            child.bundle_id = Some(bundle.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arena::LayerArena;
    use crate::domain::entities::MapDocument;

    fn facts<'a>(id: &'a str, provenance: Option<&'a str>, location: Option<&'a str>) -> NodeFacts<'a> {
        NodeFacts {
            id,
            provenance,
            location,
        }
    }

    fn classifier() -> OriginClassifier {
        OriginClassifier::from_tables(
            BTreeMap::from([("special".to_string(), "by-id".to_string())]),
            vec![LocationRule {
                fragment: "Schulen".into(),
                bundle: "by-url".into(),
            }],
        )
    }

    #[test]
    fn given_matchers_when_classifying_then_first_match_wins() {
        let c = classifier();
        assert_eq!(c.classify(&facts("special", Some("tagged"), None)), Some("tagged"));
        assert_eq!(c.classify(&facts("special", None, Some("x/Schulen"))), Some("by-id"));
        assert_eq!(c.classify(&facts("other", None, Some("x/Schulen/y"))), Some("by-url"));
        assert_eq!(c.classify(&facts("other", None, None)), None);
    }

    #[test]
    fn given_bundle_specs_when_tagging_then_top_and_direct_children_tagged() {
        let doc: MapDocument = serde_json::from_value(serde_json::json!({"layers": [
            {"id": "g", "layers": [{"id": "c", "layers": [{"id": "deep"}]}]},
            {"id": "s", "sublayers": [{"id": "s0"}]}
        ]}))
        .unwrap();
        let mut layers = doc.layers;
        tag_bundle_layers(&mut layers, "b");
        let g = &layers[0];
        let c = &g.layers.as_ref().unwrap()[0];
        assert_eq!(g.bundle_id.as_deref(), Some("b"));
        assert_eq!(c.bundle_id.as_deref(), Some("b"));
        assert_eq!(c.layers.as_ref().unwrap()[0].bundle_id, None);
        assert_eq!(layers[1].sublayers.as_ref().unwrap()[0].bundle_id.as_deref(), Some("b"));
    }

    #[test]
    fn given_group_with_explicit_child_when_deciding_then_only_siblings_pruned() {
        let doc: MapDocument = serde_json::from_value(serde_json::json!({"layers": [
            {"id": "g", "bundleId": "b", "layers": [
                {"id": "keep", "bundleId": "b"},
                {"id": "drop", "bundleId": "b"}
            ]}
        ]}))
        .unwrap();
        let mut tree = LayerArena::from_document(&doc).unwrap();
        let filter = DomainFilter::new(BTreeMap::from([("b".to_string(), false)]), classifier());
        let explicit = HashSet::from(["keep".to_string()]);

        let decision = filter.decide_prune(&tree, &explicit);
        assert_eq!(decision.nodes(), &[tree.find("drop").unwrap()]);

        let removed = filter.apply(&mut tree, &decision).unwrap();
        assert_eq!(removed, vec!["drop"]);
        assert!(filter.apply(&mut tree, &decision).unwrap().is_empty());
        assert_eq!(tree.child_ids("g").unwrap(), vec!["keep"]);
    }

    #[test]
    fn given_untagged_layer_below_bundle_group_when_deciding_then_only_tagged_sibling_pruned() {
        let doc: MapDocument = serde_json::from_value(serde_json::json!({"layers": [
            {"id": "g", "bundleId": "b", "layers": [
                {"id": "c", "bundleId": "b", "layers": [{"id": "deep"}]},
                {"id": "drop", "bundleId": "b"}
            ]}
        ]}))
        .unwrap();
        let mut tree = LayerArena::from_document(&doc).unwrap();
        let filter = DomainFilter::new(BTreeMap::from([("b".to_string(), false)]), classifier());

        let decision = filter.decide_prune(&tree, &HashSet::new());
        assert_eq!(decision.nodes(), &[tree.find("drop").unwrap()]);
        assert!(decision.kept().is_empty());

        filter.apply(&mut tree, &decision).unwrap();
        assert_eq!(tree.child_ids("g").unwrap(), vec!["c"]);
        assert_eq!(tree.child_ids("c").unwrap(), vec!["deep"]);
    }

    #[test]
    fn given_shown_bundle_at_root_when_deciding_then_listed_as_kept() {
        let doc: MapDocument = serde_json::from_value(serde_json::json!({"layers": [
            {"id": "shown", "bundleId": "b"},
            {"id": "hidden", "bundleId": "h"},
            {"id": "plain"}
        ]}))
        .unwrap();
        let tree = LayerArena::from_document(&doc).unwrap();
        let filter = DomainFilter::new(
            BTreeMap::from([("b".to_string(), true), ("h".to_string(), false)]),
            classifier(),
        );

        let decision = filter.decide_prune(&tree, &HashSet::new());

        assert_eq!(decision.nodes(), &[tree.find("hidden").unwrap()]);
        assert_eq!(decision.kept(), &[tree.find("shown").unwrap()]);
        assert!(decision.kept_only().is_empty());
        assert_eq!(decision.kept_only().kept(), decision.kept());
    }
}
