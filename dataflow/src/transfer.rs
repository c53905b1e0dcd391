use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::cfg::Cfg;
use crate::domains::{AbstractValue, Store};
use crate::elements::Type;
use crate::node::{Node, NodeId};

/// The store flowing into or out of a node. Boolean expressions may keep
/// separate knowledge for the case they evaluate to true and to false.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStores<S> {
    Regular(S),
    Conditional { then_store: S, else_store: S },
}

impl<S: Store> FlowStores<S> {
    /// A single store describing both outcomes.
    pub fn regular_store(&self, ctx: &S::Context) -> S {
        match self {
            FlowStores::Regular(store) => store.clone(),
            FlowStores::Conditional {
                then_store,
                else_store,
            } => then_store.least_upper_bound(else_store, ctx),
        }
    }

    pub fn then_store(&self) -> S {
        match self {
            FlowStores::Regular(store) => store.clone(),
            FlowStores::Conditional { then_store, .. } => then_store.clone(),
        }
    }

    pub fn else_store(&self) -> S {
        match self {
            FlowStores::Regular(store) => store.clone(),
            FlowStores::Conditional { else_store, .. } => else_store.clone(),
        }
    }

    /// Split into a then/else pair, copying a regular store.
    pub fn into_conditional(self) -> (S, S) {
        match self {
            FlowStores::Regular(store) => (store.clone(), store),
            FlowStores::Conditional {
                then_store,
                else_store,
            } => (then_store, else_store),
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, FlowStores::Conditional { .. })
    }

    /// Join two flow stores. Regular stores join into a regular store,
    /// otherwise the then and else stores are joined separately.
    pub fn least_upper_bound(&self, other: &Self, ctx: &S::Context) -> Self {
        match (self, other) {
            (FlowStores::Regular(a), FlowStores::Regular(b)) => {
                FlowStores::Regular(a.least_upper_bound(b, ctx))
            }
            _ => FlowStores::Conditional {
                then_store: self.then_store().least_upper_bound(&other.then_store(), ctx),
                else_store: self.else_store().least_upper_bound(&other.else_store(), ctx),
            },
        }
    }
}

/// Everything a transfer function gets to see when processing a node.
pub struct TransferInput<'a, V: AbstractValue, S: Store> {
    stores: FlowStores<S>,
    node_values: &'a HashMap<NodeId, V>,
    ctx: &'a S::Context,
}

impl<'a, V: AbstractValue, S: Store> TransferInput<'a, V, S> {
    pub fn new(stores: FlowStores<S>, node_values: &'a HashMap<NodeId, V>, ctx: &'a S::Context) -> Self {
        Self {
            stores,
            node_values,
            ctx,
        }
    }

    pub fn stores(&self) -> &FlowStores<S> {
        &self.stores
    }

    pub fn into_stores(self) -> FlowStores<S> {
        self.stores
    }

    pub fn context(&self) -> &'a S::Context {
        self.ctx
    }

    pub fn regular_store(&self) -> S {
        self.stores.regular_store(self.ctx)
    }

    pub fn then_store(&self) -> S {
        self.stores.then_store()
    }

    pub fn else_store(&self) -> S {
        self.stores.else_store()
    }

    /// The value already computed for an operand of the current node.
    pub fn value_of_sub_node(&self, node: NodeId) -> Option<&'a V> {
        self.node_values.get(&node)
    }
}

/// The effect of a node: its value and the knowledge after it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult<V, S> {
    pub value: Option<V>,
    pub stores: FlowStores<S>,
    /// Stores flowing to exception handlers. Exceptions not listed here
    /// continue with the store from before the node.
    pub exceptional_stores: BTreeMap<Type, S>,
}

impl<V, S> TransferResult<V, S> {
    pub fn regular(value: Option<V>, store: S) -> Self {
        Self {
            value,
            stores: FlowStores::Regular(store),
            exceptional_stores: BTreeMap::new(),
        }
    }

    pub fn conditional(value: Option<V>, then_store: S, else_store: S) -> Self {
        Self {
            value,
            stores: FlowStores::Conditional {
                then_store,
                else_store,
            },
            exceptional_stores: BTreeMap::new(),
        }
    }

    pub fn with_stores(value: Option<V>, stores: FlowStores<S>) -> Self {
        Self {
            value,
            stores,
            exceptional_stores: BTreeMap::new(),
        }
    }

    pub fn exceptional_store(&self, exception: &Type) -> Option<&S> {
        self.exceptional_stores.get(exception)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("unsupported {kind} node {node}")]
    Unsupported { node: NodeId, kind: &'static str },
    #[error("{0}")]
    Client(String),
}

/// The semantics of an analysis: the knowledge at the entry of a graph and
/// the effect of each node. Transfer functions are invoked again whenever
/// the store flowing into a block changes, so they must not depend on how
/// often they were called.
pub trait TransferFunction<V: AbstractValue, S: Store> {
    /// The store at the entry block.
    fn initial_store(&mut self, cfg: &Cfg, ctx: &S::Context) -> S;

    /// Apply the effects of a single node.
    fn transfer(
        &mut self,
        cfg: &Cfg,
        node: &Node,
        input: TransferInput<'_, V, S>,
    ) -> Result<TransferResult<V, S>, TransferError>;
}
