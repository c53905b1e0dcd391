use std::rc::Rc;

use crate::cfg::{BlockId, Cfg, CfgBuilder, UnderlyingAst};
use crate::domains::AbstractValue;
use crate::elements::{ClassElement, MethodElement, NominalTypes, TreeId, Type, VariableElement};
use crate::node::{Literal, NodeId, NodeKind};
use crate::receiver::{LocalVariable, Receiver};
use crate::store::{ReceiverStore, StoreContext};
use crate::transfer::{TransferError, TransferFunction, TransferInput, TransferResult};

/// A three element lattice: `Null` and `NonNull` below `Nullable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullness {
    Null,
    NonNull,
    Nullable,
}

impl AbstractValue for Nullness {
    type Context = ();

    fn least_upper_bound(&self, other: &Self, _ctx: &()) -> Self {
        if self == other { *self } else { Nullness::Nullable }
    }

    fn is_subtype_of(&self, other: &Self, _ctx: &()) -> bool {
        self == other || *other == Nullness::Nullable
    }
}

pub type NullStore = ReceiverStore<Nullness>;

pub const ENTRY: BlockId = BlockId(0);
pub const EXIT: BlockId = BlockId(1);
pub const EXCEPTIONAL_EXIT: BlockId = BlockId(2);

pub fn object() -> Type {
    Type::declared("Object")
}

pub fn class_type() -> Type {
    Type::declared("C")
}

pub fn types() -> NominalTypes {
    let mut types = NominalTypes::new();
    types
        .add_supertype(Type::declared("Node"), object())
        .add_supertype(Type::declared("String"), object());
    types
}

pub fn context() -> StoreContext<()> {
    StoreContext::new((), Rc::new(types()))
}

pub fn var(name: &str, id: u32) -> Rc<VariableElement> {
    VariableElement::new(name, id, object())
}

pub fn method_ast(parameters: Vec<Rc<VariableElement>>) -> UnderlyingAst {
    let method = MethodElement::new(
        "m",
        class_type(),
        parameters.iter().map(|p| p.ty.clone()).collect(),
        Type::primitive("void"),
    );
    UnderlyingAst::Method {
        tree: TreeId(1000),
        method: Rc::new(method),
        parameters,
        class: ClassElement::new("C"),
        is_constructor: false,
    }
}

pub fn local(builder: &mut CfgBuilder, var: &Rc<VariableElement>, tree: Option<u32>) -> NodeId {
    builder.add_node(
        NodeKind::LocalVariable(var.clone()),
        var.ty.clone(),
        tree.map(TreeId),
    )
}

pub fn null_literal(builder: &mut CfgBuilder) -> NodeId {
    builder.add_node(NodeKind::ValueLiteral(Literal::Null), Type::null(), None)
}

pub fn new_object(builder: &mut CfgBuilder) -> NodeId {
    let constructor = MethodElement::new("<init>", object(), vec![], object());
    builder.add_node(
        NodeKind::ObjectCreation {
            constructor: Rc::new(constructor),
            arguments: vec![],
        },
        object(),
        None,
    )
}

pub fn assign(builder: &mut CfgBuilder, target: NodeId, expression: NodeId, tree: Option<u32>) -> NodeId {
    builder.add_node(
        NodeKind::Assignment { target, expression },
        object(),
        tree.map(TreeId),
    )
}

pub fn this(builder: &mut CfgBuilder) -> NodeId {
    builder.add_node(NodeKind::This { explicit: false }, class_type(), None)
}

/// Nullness tracking: literals are `Null` or `NonNull`, parameters and
/// unknown reads are `Nullable`, and `x == null` refines `x` in both
/// branches.
#[derive(Default)]
pub struct NullnessTransfer {
    pub transferred: usize,
}

impl TransferFunction<Nullness, NullStore> for NullnessTransfer {
    fn initial_store(&mut self, cfg: &Cfg, _ctx: &StoreContext<()>) -> NullStore {
        let mut store = NullStore::new(true);
        for parameter in cfg.underlying().parameters() {
            store.initialize_method_parameter(
                LocalVariable::new(parameter.clone()),
                Some(Nullness::Nullable),
            );
        }
        store
    }

    fn transfer(
        &mut self,
        cfg: &Cfg,
        node: &crate::node::Node,
        input: TransferInput<'_, Nullness, NullStore>,
    ) -> Result<TransferResult<Nullness, NullStore>, TransferError> {
        self.transferred += 1;
        let ctx = input.context();
        match node.kind() {
            NodeKind::ValueLiteral(Literal::Null) => Ok(TransferResult::with_stores(
                Some(Nullness::Null),
                input.into_stores(),
            )),
            NodeKind::ValueLiteral(_) | NodeKind::ObjectCreation { .. } => Ok(
                TransferResult::with_stores(Some(Nullness::NonNull), input.into_stores()),
            ),
            NodeKind::LocalVariable(_) | NodeKind::FieldAccess { .. } => {
                let receiver = Receiver::from_node(cfg, node.id());
                let value = input
                    .regular_store()
                    .get_value(&receiver)
                    .copied()
                    .unwrap_or(Nullness::Nullable);
                Ok(TransferResult::with_stores(Some(value), input.into_stores()))
            }
            NodeKind::Assignment { target, expression } => {
                let value = input.value_of_sub_node(*expression).copied();
                let mut store = input.regular_store();
                match Receiver::from_node(cfg, *target) {
                    Receiver::LocalVariable(var) => {
                        store.update_for_local_assignment(&var, value, ctx)
                    }
                    Receiver::FieldAccess(fa) => store.update_for_field_assignment(&fa, value, ctx),
                    other => store.update_for_unknown_assignment(&other, ctx.types.as_ref()),
                }
                Ok(TransferResult::regular(value, store))
            }
            NodeKind::EqualTo { left, right } => {
                let (mut then_store, mut else_store) = input.stores().clone().into_conditional();
                for (operand, other) in [(*left, *right), (*right, *left)] {
                    if input.value_of_sub_node(other) == Some(&Nullness::Null) {
                        let receiver = Receiver::from_node(cfg, operand);
                        then_store.insert_value(&receiver, Nullness::Null, ctx);
                        else_store.insert_value(&receiver, Nullness::NonNull, ctx);
                    }
                }
                Ok(TransferResult::conditional(None, then_store, else_store))
            }
            NodeKind::MethodInvocation { target, .. } => {
                let NodeKind::MethodAccess { method, .. } = cfg.node(*target).kind() else {
                    return Err(TransferError::Client("call without method".to_owned()));
                };
                let mut store = input.regular_store();
                let receiver = Receiver::from_node(cfg, node.id());
                store.update_for_method_call(
                    &receiver,
                    method.purity.side_effect_free,
                    Some(Nullness::Nullable),
                    ctx,
                    |_, _| None,
                );
                Ok(TransferResult::regular(Some(Nullness::Nullable), store))
            }
            NodeKind::ArrayAccess { .. } => Err(TransferError::Unsupported {
                node: node.id(),
                kind: node.kind().name(),
            }),
            _ => Ok(TransferResult::with_stores(None, input.into_stores())),
        }
    }
}
