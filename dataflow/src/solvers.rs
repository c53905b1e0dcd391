use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, debug_span, trace};

use crate::cfg::{Block, BlockId, Cfg, ControlFlowGraph, RpoWorklist};
use crate::domains::{AbstractValue, Store};
use crate::elements::TreeId;
use crate::node::{NodeId, NodeKind};
use crate::result::{AnalysisResult, BlockRef, NodeRef, NodeStores};
use crate::transfer::{FlowStores, TransferError, TransferFunction, TransferInput, TransferResult};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("analysis of {cfg} did not converge after {visits} block visits")]
    NotConverged { cfg: TreeId, visits: usize },
}

/// Forward worklist solver. Blocks are visited in reverse post-order, the
/// store flowing into a block is the join of the stores flowing out of its
/// predecessors. A block is visited again whenever its incoming store
/// changes.
///
/// Requirements:
/// * The abstract values must not have infinite ascending chains, or the
///   solver might not terminate without a visit limit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ForwardSolver {
    /// Optional upper bound on the number of block visits. If the limit is
    /// reached, the solver gives up with [`AnalysisError::NotConverged`].
    pub block_visit_limit: Option<usize>,
}

impl ForwardSolver {
    /// Run the analysis on a graph until the fixed point is reached.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Side information of the stores and values.
    /// * `transfer` - The effects of individual nodes.
    pub fn solve<V, S, T>(
        &self,
        cfg: &Cfg,
        ctx: &S::Context,
        transfer: &mut T,
    ) -> Result<AnalysisResult<V, S>, AnalysisError>
    where
        V: AbstractValue,
        S: Store,
        T: TransferFunction<V, S>,
    {
        let span = debug_span!("dataflow", cfg = %cfg.id());
        let _guard = span.enter();

        let mut analysis = Analysis::new(cfg, ctx);
        analysis.run(transfer, self.block_visit_limit)?;
        analysis.into_result(transfer)
    }
}

/// State of a single analysis run.
struct Analysis<'a, V, S: Store> {
    cfg: &'a Cfg,
    ctx: &'a S::Context,
    stores: HashMap<BlockId, FlowStores<S>>,
    worklist: RpoWorklist,
    node_values: HashMap<NodeId, V>,
    visits: usize,
}

impl<'a, V, S> Analysis<'a, V, S>
where
    V: AbstractValue,
    S: Store,
{
    fn new(cfg: &'a Cfg, ctx: &'a S::Context) -> Self {
        Self {
            cfg,
            ctx,
            stores: HashMap::new(),
            worklist: RpoWorklist::new(cfg),
            node_values: HashMap::new(),
            visits: 0,
        }
    }

    fn run<T>(&mut self, transfer: &mut T, limit: Option<usize>) -> Result<(), AnalysisError>
    where
        T: TransferFunction<V, S>,
    {
        let cfg = self.cfg;
        let entry = cfg.entry();
        let initial = transfer.initial_store(cfg, self.ctx);
        self.stores.insert(entry, FlowStores::Regular(initial));
        self.worklist.push(entry);

        while let Some(block_id) = self.worklist.pop() {
            self.visits += 1;
            if limit.is_some_and(|limit| self.visits > limit) {
                return Err(AnalysisError::NotConverged {
                    cfg: cfg.id(),
                    visits: self.visits - 1,
                });
            }
            trace!(block = block_id.index(), "visiting block");

            let input = self.stores.get(&block_id).cloned().unwrap_or_else(|| {
                panic!("block {block_id:?} was queued without an incoming store")
            });

            match cfg.block(block_id) {
                Block::Regular { nodes, successor } => {
                    let mut current = input;
                    for &node in nodes {
                        current = self.apply(transfer, node, current)?.stores;
                    }
                    self.add_store_before(*successor, current);
                }
                Block::Exception {
                    node,
                    successor,
                    exceptional_successors,
                } => {
                    let result = self.apply(transfer, *node, input.clone())?;
                    for (exception, handler) in exceptional_successors {
                        let store = match result.exceptional_store(exception) {
                            Some(store) => store.clone(),
                            None => input.regular_store(self.ctx),
                        };
                        self.add_store_before(*handler, FlowStores::Regular(store));
                    }
                    if let Some(successor) = successor {
                        self.add_store_before(*successor, result.stores);
                    }
                }
                Block::Conditional {
                    then_successor,
                    else_successor,
                } => {
                    self.add_store_before(*then_successor, FlowStores::Regular(input.then_store()));
                    self.add_store_before(*else_successor, FlowStores::Regular(input.else_store()));
                }
                Block::Special { successor, .. } => {
                    if let Some(successor) = successor {
                        self.add_store_before(*successor, input);
                    }
                }
            }
        }

        debug!(
            visits = self.visits,
            blocks = cfg.blocks().len(),
            "fixed point reached"
        );
        Ok(())
    }

    fn apply<T>(
        &mut self,
        transfer: &mut T,
        node: NodeId,
        stores: FlowStores<S>,
    ) -> Result<TransferResult<V, S>, TransferError>
    where
        T: TransferFunction<V, S>,
    {
        let cfg = self.cfg;
        let input = TransferInput::new(stores, &self.node_values, self.ctx);
        let result = transfer.transfer(cfg, cfg.node(node), input)?;
        match &result.value {
            Some(value) => {
                self.node_values.insert(node, value.clone());
            }
            None => {
                self.node_values.remove(&node);
            }
        }
        Ok(result)
    }

    /// Join `stores` into the input of `block` and queue the block if its
    /// input changed.
    fn add_store_before(&mut self, block: BlockId, stores: FlowStores<S>) {
        let new = match self.stores.get(&block) {
            Some(existing) => existing.least_upper_bound(&stores, self.ctx),
            None => stores,
        };
        if self.stores.get(&block) != Some(&new) {
            trace!(block = block.index(), "incoming store changed");
            self.stores.insert(block, new);
            self.worklist.push(block);
        }
    }

    /// Replay every reached block once more to record the stores around
    /// each node, and package everything into an [`AnalysisResult`].
    fn into_result<T>(self, transfer: &mut T) -> Result<AnalysisResult<V, S>, AnalysisError>
    where
        T: TransferFunction<V, S>,
    {
        let cfg_id = self.cfg.id();
        let node_ref = |node| NodeRef { cfg: cfg_id, node };
        let mut result = AnalysisResult::new();

        for index in 0..self.cfg.blocks().len() {
            let block = BlockId(index);
            let Some(input) = self.stores.get(&block) else {
                continue;
            };
            result.block_inputs.insert(
                BlockRef {
                    cfg: cfg_id,
                    block,
                },
                input.clone(),
            );

            let mut current = input.clone();
            for &node in self.cfg.block(block).nodes() {
                let before = current.clone();
                let input = TransferInput::new(current, &self.node_values, self.ctx);
                let after = transfer.transfer(self.cfg, self.cfg.node(node), input)?.stores;
                if let NodeKind::Return { .. } = self.cfg.node(node).kind() {
                    result
                        .return_stores
                        .entry(cfg_id)
                        .or_default()
                        .push((node, after.regular_store(self.ctx)));
                }
                result.node_stores.insert(
                    node_ref(node),
                    NodeStores {
                        before,
                        after: after.clone(),
                    },
                );
                current = after;
            }
        }

        if let Some(returns) = result.return_stores.get_mut(&cfg_id) {
            returns.sort_by_key(|(node, _)| *node);
        }
        if let Some(exit) = self.stores.get(&self.cfg.regular_exit()) {
            result
                .regular_exit_stores
                .insert(cfg_id, exit.regular_store(self.ctx));
        }
        if let Some(exit) = self.stores.get(&self.cfg.exceptional_exit()) {
            result
                .exceptional_exit_stores
                .insert(cfg_id, exit.regular_store(self.ctx));
        }
        for (tree, node) in self.cfg.tree_lookup() {
            result.tree_lookup.insert(*tree, node_ref(*node));
        }
        for (node, value) in self.node_values {
            result.node_values.insert(node_ref(node), value);
        }
        result.block_visits.insert(cfg_id, self.visits);

        Ok(result)
    }
}
