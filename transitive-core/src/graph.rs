// transitive-core/src/graph.rs
use std::collections::{BTreeSet, HashMap};

use transitive_common::{
    Coordinate, Exclusion, Mediation, MediationKey, ResolutionWarning, Scope,
};

/// A declared dependency edge, already narrowed to a concrete version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub target: Coordinate,
    /// Scope as declared in the parent's descriptor.
    pub scope: Scope,
    pub optional: bool,
    pub exclusions: BTreeSet<Exclusion>,
    /// Depth of `target` when reached through the owner's nearest occurrence.
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub coordinate: Coordinate,
    /// Direct dependencies in declaration order.
    pub dependencies: Vec<Edge>,
    /// Depth of the nearest occurrence; the root is 0.
    pub depth: usize,
    /// Widest scope over every path that reaches the node.
    pub scope: Scope,
    /// Whether every path that reaches the node goes through an optional edge.
    pub optional: bool,
    /// Packaging from the descriptor, once fetched.
    pub packaging: Option<String>,
    /// The descriptor could not be fetched; only ever set on optional nodes.
    pub unavailable: bool,
}

impl DependencyNode {
    fn new(coordinate: Coordinate, depth: usize, state: &PathState) -> Self {
        Self {
            coordinate,
            dependencies: Vec::new(),
            depth,
            scope: state.scope,
            optional: state.optional,
            packaging: None,
            unavailable: false,
        }
    }

    pub fn is_pom_only(&self) -> bool {
        self.packaging.as_deref() == Some("pom")
    }
}

/// What a traversal knows about a node from the paths reaching it so far.
/// Merging only ever widens scope, clears optionality or shrinks the
/// exclusion set, so repeated merging terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathState {
    pub scope: Scope,
    pub optional: bool,
    pub exclusions: BTreeSet<Exclusion>,
}

impl PathState {
    pub fn root(scope: Scope) -> Self {
        Self {
            scope,
            optional: false,
            exclusions: BTreeSet::new(),
        }
    }

    pub fn excludes(&self, key: &MediationKey) -> bool {
        self.exclusions.iter().any(|e| e.matches(key))
    }

    /// State of `edge`'s target when reached from a node in this state, or
    /// `None` when the edge is not followed for a `requested` classpath.
    pub fn follow(&self, edge: &Edge, is_root: bool, requested: Scope) -> Option<PathState> {
        if self.excludes(&edge.target.key()) {
            return None;
        }
        let scope = if is_root {
            edge.scope
        } else {
            self.scope.transitive(edge.scope)?
        };
        if !requested.classpath_includes(scope) {
            return None;
        }
        Some(PathState {
            scope,
            optional: self.optional || edge.optional,
            exclusions: self
                .exclusions
                .union(&edge.exclusions)
                .cloned()
                .collect(),
        })
    }

    /// Folds another path into this one. Returns whether anything changed.
    pub fn merge(&mut self, other: &PathState) -> bool {
        let scope = self.scope.widest(other.scope);
        let optional = self.optional && other.optional;
        let exclusions: BTreeSet<Exclusion> = self
            .exclusions
            .intersection(&other.exclusions)
            .cloned()
            .collect();

        let changed =
            scope != self.scope || optional != self.optional || exclusions != self.exclusions;
        self.scope = scope;
        self.optional = optional;
        self.exclusions = exclusions;
        changed
    }
}

/// Every node discovered for one root, in discovery order.
///
/// Before mediation the graph may hold several versions per mediation key;
/// afterwards it holds exactly one, edges point at the winners and the
/// graph is acyclic.
#[derive(Debug, Clone)]
pub struct ResolutionGraph {
    pub root: Coordinate,
    /// The scope the caller asked for.
    pub scope: Scope,
    nodes: HashMap<Coordinate, DependencyNode>,
    order: Vec<Coordinate>,
    pub warnings: Vec<ResolutionWarning>,
    pub mediations: Vec<Mediation>,
}

impl ResolutionGraph {
    pub fn new(root: Coordinate, scope: Scope) -> Self {
        let mut graph = Self {
            root: root.clone(),
            scope,
            nodes: HashMap::new(),
            order: Vec::new(),
            warnings: Vec::new(),
            mediations: Vec::new(),
        };
        graph.insert(DependencyNode::new(root, 0, &PathState::root(scope)));
        graph
    }

    pub(crate) fn add_node(&mut self, coordinate: Coordinate, depth: usize, state: &PathState) {
        if !self.nodes.contains_key(&coordinate) {
            self.insert(DependencyNode::new(coordinate, depth, state));
        }
    }

    pub(crate) fn insert(&mut self, node: DependencyNode) {
        if self.nodes.insert(node.coordinate.clone(), node.clone()).is_none() {
            self.order.push(node.coordinate);
        }
    }

    pub(crate) fn node_mut(&mut self, coordinate: &Coordinate) -> Option<&mut DependencyNode> {
        self.nodes.get_mut(coordinate)
    }

    pub fn node(&self, coordinate: &Coordinate) -> Option<&DependencyNode> {
        self.nodes.get(coordinate)
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.nodes.contains_key(coordinate)
    }

    /// Nodes in discovery order.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.order.iter().filter_map(|c| self.nodes.get(c))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Coordinates in discovery order.
    pub fn coordinates(&self) -> impl Iterator<Item = &Coordinate> {
        self.order.iter()
    }

    /// Distinct versions seen per mediation key, keys in first-seen order.
    pub fn versions_by_key(&self) -> Vec<(MediationKey, Vec<&DependencyNode>)> {
        let mut groups: Vec<(MediationKey, Vec<&DependencyNode>)> = Vec::new();
        let mut index: HashMap<MediationKey, usize> = HashMap::new();
        for node in self.nodes() {
            let key = node.coordinate.key();
            match index.get(&key) {
                Some(&i) => groups[i].1.push(node),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![node]));
                }
            }
        }
        groups
    }
}
