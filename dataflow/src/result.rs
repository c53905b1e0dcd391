use std::collections::HashMap;

use crate::cfg::BlockId;
use crate::elements::TreeId;
use crate::node::NodeId;
use crate::transfer::FlowStores;

/// A node of a specific control flow graph. Graphs are identified by the
/// tree they were built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub cfg: TreeId,
    pub node: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef {
    pub cfg: TreeId,
    pub block: BlockId,
}

/// The stores right before and right after a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStores<S> {
    pub before: FlowStores<S>,
    pub after: FlowStores<S>,
}

/// The outcome of one or more analysis runs. Results of different graphs
/// can be merged with [`AnalysisResult::combine`], nothing is ever removed.
#[derive(Debug, Clone)]
pub struct AnalysisResult<V, S> {
    pub(crate) node_values: HashMap<NodeRef, V>,
    pub(crate) tree_lookup: HashMap<TreeId, NodeRef>,
    pub(crate) block_inputs: HashMap<BlockRef, FlowStores<S>>,
    pub(crate) node_stores: HashMap<NodeRef, NodeStores<S>>,
    pub(crate) regular_exit_stores: HashMap<TreeId, S>,
    pub(crate) exceptional_exit_stores: HashMap<TreeId, S>,
    pub(crate) return_stores: HashMap<TreeId, Vec<(NodeId, S)>>,
    pub(crate) block_visits: HashMap<TreeId, usize>,
}

impl<V, S> Default for AnalysisResult<V, S> {
    fn default() -> Self {
        Self {
            node_values: HashMap::new(),
            tree_lookup: HashMap::new(),
            block_inputs: HashMap::new(),
            node_stores: HashMap::new(),
            regular_exit_stores: HashMap::new(),
            exceptional_exit_stores: HashMap::new(),
            return_stores: HashMap::new(),
            block_visits: HashMap::new(),
        }
    }
}

impl<V, S> AnalysisResult<V, S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the results of another run into this one.
    pub fn combine(&mut self, other: AnalysisResult<V, S>) {
        self.node_values.extend(other.node_values);
        self.tree_lookup.extend(other.tree_lookup);
        self.block_inputs.extend(other.block_inputs);
        self.node_stores.extend(other.node_stores);
        self.regular_exit_stores.extend(other.regular_exit_stores);
        self.exceptional_exit_stores
            .extend(other.exceptional_exit_stores);
        self.return_stores.extend(other.return_stores);
        self.block_visits.extend(other.block_visits);
    }

    pub fn is_analyzed(&self, cfg: TreeId) -> bool {
        self.block_visits.contains_key(&cfg)
    }

    pub fn value(&self, node: NodeRef) -> Option<&V> {
        self.node_values.get(&node)
    }

    pub fn node_for_tree(&self, tree: TreeId) -> Option<NodeRef> {
        self.tree_lookup.get(&tree).copied()
    }

    pub fn value_for_tree(&self, tree: TreeId) -> Option<&V> {
        self.node_for_tree(tree).and_then(|node| self.value(node))
    }

    /// The last computed input of a block.
    pub fn block_input(&self, block: BlockRef) -> Option<&FlowStores<S>> {
        self.block_inputs.get(&block)
    }

    pub fn node_stores(&self, node: NodeRef) -> Option<&NodeStores<S>> {
        self.node_stores.get(&node)
    }

    pub fn store_before(&self, tree: TreeId) -> Option<&FlowStores<S>> {
        let node = self.node_for_tree(tree)?;
        self.node_stores(node).map(|stores| &stores.before)
    }

    pub fn store_after(&self, tree: TreeId) -> Option<&FlowStores<S>> {
        let node = self.node_for_tree(tree)?;
        self.node_stores(node).map(|stores| &stores.after)
    }

    /// The store at the regular exit of the graph built from `cfg`, if the
    /// exit is reachable.
    pub fn regular_exit_store(&self, cfg: TreeId) -> Option<&S> {
        self.regular_exit_stores.get(&cfg)
    }

    pub fn exceptional_exit_store(&self, cfg: TreeId) -> Option<&S> {
        self.exceptional_exit_stores.get(&cfg)
    }

    /// The stores after each reachable return statement, ordered by node.
    pub fn return_statement_stores(&self, cfg: TreeId) -> &[(NodeId, S)] {
        self.return_stores
            .get(&cfg)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of block visits it took to reach the fixed point.
    pub fn block_visits(&self, cfg: TreeId) -> Option<usize> {
        self.block_visits.get(&cfg).copied()
    }
}
