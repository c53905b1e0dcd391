use core::fmt;
use std::rc::Rc;

use dataflow::cfg::{Cfg, UnderlyingAst};
use dataflow::domains::AbstractValue;
use dataflow::elements::{FieldElement, TreeId, VariableElement};
use dataflow::node::{Node, NodeId, NodeKind, NodeVisitor};
use dataflow::receiver::{FieldAccess, LocalVariable, Receiver};
use dataflow::store::{ReceiverStore, StoreContext};
use dataflow::transfer::{TransferError, TransferFunction, TransferInput, TransferResult};
use tracing::{debug, warn};

use crate::checker::FlowChecker;
use crate::contracts::{Contract, ContractKind};
use crate::expression::{self, FlowExpressionContext};
use crate::hierarchy::QualifierHierarchy;
use crate::options::FlowOptions;
use crate::value::QualifierValue;

pub type QualifierStore = ReceiverStore<QualifierValue>;
pub type QualifierContext = StoreContext<QualifierHierarchy>;
pub type QualifierTransferResult = TransferResult<QualifierValue, QualifierStore>;
type QualifierInput<'a> = TransferInput<'a, QualifierValue, QualifierStore>;
type Outcome = Result<QualifierTransferResult, TransferError>;

/// The value of a field right after its initializer ran.
pub type FieldValue = (Rc<FieldElement>, QualifierValue);

/// A problem with the checker's declarations found during the analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub tree: TreeId,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tree, self.message)
    }
}

/// Everything the transfer function sees about the node being visited.
pub struct NodeInput<'c, 'i> {
    cfg: &'c Cfg,
    input: QualifierInput<'i>,
}

/// The default transfer function of qualifier inference. Reads take the
/// more precise of the declared and the stored value, writes update the
/// store, comparisons and type tests refine their operands, and calls
/// invalidate what the callee could change before applying its
/// postconditions.
pub struct QualifierTransfer<'a, C: FlowChecker + ?Sized> {
    checker: &'a C,
    options: &'a FlowOptions,
    field_values: &'a [FieldValue],
    diagnostics: Vec<Diagnostic>,
}

fn more_specific(
    a: Option<QualifierValue>,
    b: Option<&QualifierValue>,
    hierarchy: &QualifierHierarchy,
) -> Option<QualifierValue> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.most_specific(b, hierarchy)),
        (Some(a), None) => Some(a),
        (None, b) => b.cloned(),
    }
}

/// The part of a field's value that survives a call: the monotonic
/// qualifiers of the field that are already established.
fn monotonic_value<C: FlowChecker + ?Sized>(
    checker: &C,
    hierarchy: &QualifierHierarchy,
    field: &FieldAccess,
    value: &QualifierValue,
) -> Option<QualifierValue> {
    let mut kept = QualifierValue::top(hierarchy);
    for target in checker.monotonic_targets(field.field()) {
        if value.qualifier_in(hierarchy, &target) == Some(&target) {
            kept = QualifierValue::top(hierarchy)
                .with(hierarchy, target)
                .most_specific(&kept, hierarchy);
        }
    }
    (!kept.is_top()).then_some(kept)
}

/// The nodes whose value is known after `node` evaluates: the node itself,
/// and the targets of assignments it consists of, as in `(x = y) == null`.
fn split_assignments(cfg: &Cfg, node: NodeId) -> Vec<NodeId> {
    match cfg.node(node).kind() {
        NodeKind::Assignment { target, expression } => {
            let mut parts = vec![*target];
            parts.extend(split_assignments(cfg, *expression));
            parts
        }
        _ => vec![node],
    }
}

/// Give `weaker_node` the qualifiers of the other operand of a comparison
/// that are strictly more precise than its own, hierarchy by hierarchy.
fn strengthen(
    cfg: &Cfg,
    store: &mut QualifierStore,
    stronger: Option<&QualifierValue>,
    weaker_node: NodeId,
    weaker: Option<&QualifierValue>,
    ctx: &QualifierContext,
) {
    let Some(stronger) = stronger else {
        return;
    };
    let hierarchy = &ctx.values;
    let mut refined = QualifierValue::top(hierarchy);
    for idx in 0..hierarchy.hierarchy_count() {
        let Some(qualifier) = stronger.qualifier(idx) else {
            continue;
        };
        let own = match weaker {
            Some(weaker) => weaker.effective_qualifier(hierarchy, idx),
            None => hierarchy.top(idx),
        };
        if hierarchy.is_subtype(qualifier, &own) && !hierarchy.is_subtype(&own, qualifier) {
            refined = refined.with(hierarchy, qualifier.clone());
        }
    }
    if refined.is_top() {
        return;
    }
    for part in split_assignments(cfg, weaker_node) {
        let receiver = Receiver::from_node(cfg, part);
        if QualifierStore::can_insert_receiver(&receiver) {
            store.insert_value(&receiver, refined.clone(), ctx);
        }
    }
}

impl<'a, C: FlowChecker + ?Sized> QualifierTransfer<'a, C> {
    pub fn new(checker: &'a C, options: &'a FlowOptions) -> Self {
        Self {
            checker,
            options,
            field_values: &[],
            diagnostics: Vec::new(),
        }
    }

    /// Field values known at the start of methods of the same class.
    pub fn with_field_values(mut self, field_values: &'a [FieldValue]) -> Self {
        self.field_values = field_values;
        self
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        core::mem::take(&mut self.diagnostics)
    }

    fn read_value(&self, cfg: &Cfg, node: &Node, input: &QualifierInput<'_>) -> Option<QualifierValue> {
        let receiver = Receiver::from_node(cfg, node.id());
        let store = input.regular_store();
        more_specific(
            self.checker.value_from_factory(cfg, node),
            store.get_value(&receiver),
            &input.context().values,
        )
    }

    fn assign(
        &self,
        cfg: &Cfg,
        target: NodeId,
        value: Option<QualifierValue>,
        store: &mut QualifierStore,
        ctx: &QualifierContext,
    ) {
        match Receiver::from_node(cfg, target) {
            Receiver::LocalVariable(var) => store.update_for_local_assignment(&var, value, ctx),
            Receiver::FieldAccess(fa) => store.update_for_field_assignment(&fa, value, ctx),
            other => store.update_for_unknown_assignment(&other, ctx.types.as_ref()),
        }
    }

    fn comparison(
        &mut self,
        node: &Node,
        left: NodeId,
        right: NodeId,
        not_equal: bool,
        p: NodeInput<'_, '_>,
    ) -> Outcome {
        let NodeInput { cfg, input } = p;
        let ctx = input.context();
        let value = self.checker.value_from_factory(cfg, node);
        let left_value = input.value_of_sub_node(left);
        let right_value = input.value_of_sub_node(right);
        let (mut then_store, mut else_store) = input.into_stores().into_conditional();
        let refined = if not_equal {
            &mut else_store
        } else {
            &mut then_store
        };
        strengthen(cfg, refined, left_value, right, right_value, ctx);
        strengthen(cfg, refined, right_value, left, left_value, ctx);
        Ok(TransferResult::conditional(value, then_store, else_store))
    }

    /// Insert the qualifier of a contract for each of its expressions.
    /// Expressions that do not parse are skipped, they are reported where
    /// the contract is declared.
    fn apply_contract(
        &self,
        contract: &Contract,
        context: &FlowExpressionContext,
        store: &mut QualifierStore,
        ctx: &QualifierContext,
    ) {
        let value = QualifierValue::top(&ctx.values).with(&ctx.values, contract.qualifier.clone());
        for text in &contract.expressions {
            match expression::parse(text, context, self.checker.resolver()) {
                Ok(receiver) => store.insert_value(&receiver, value.clone(), ctx),
                Err(error) => debug!(%error, expression = text.as_str(), "skipping contract"),
            }
        }
    }

    /// Assume the preconditions of the analyzed method. Every contract of
    /// the method is parsed relative to its declaration, so expressions
    /// that can never be used are reported once, here.
    fn add_declared_contracts(&mut self, cfg: &Cfg, store: &mut QualifierStore, ctx: &QualifierContext) {
        let ast = cfg.underlying();
        let Some(method) = ast.method() else {
            return;
        };
        let context = FlowExpressionContext::for_declaration(ast);
        for contract in self.checker.contracts(method) {
            let value = QualifierValue::top(&ctx.values).with(&ctx.values, contract.qualifier.clone());
            let (kind, precondition) = match contract.kind {
                ContractKind::Precondition => ("precondition", true),
                ContractKind::Postcondition => ("postcondition", false),
                ContractKind::ConditionalPostcondition { .. } => ("conditional postcondition", false),
            };
            for text in &contract.expressions {
                match expression::parse(text, &context, self.checker.resolver()) {
                    Ok(receiver) if precondition => store.insert_value(&receiver, value.clone(), ctx),
                    Ok(_) => {}
                    Err(error) => {
                        warn!(method = %method.name, kind, %error, "unusable contract");
                        self.diagnostics.push(Diagnostic {
                            tree: ast.tree(),
                            message: format!("{kind} '{text}' of {}: {error}", method.name),
                        });
                    }
                }
            }
        }
    }
}

impl<'c, 'i, C: FlowChecker + ?Sized> NodeVisitor<Outcome, NodeInput<'c, 'i>> for QualifierTransfer<'_, C> {
    fn visit_node(&mut self, node: &Node, p: NodeInput<'c, 'i>) -> Outcome {
        let value = self.checker.value_from_factory(p.cfg, node);
        Ok(TransferResult::with_stores(value, p.input.into_stores()))
    }

    fn visit_local_variable(
        &mut self,
        node: &Node,
        _var: &Rc<VariableElement>,
        p: NodeInput<'c, 'i>,
    ) -> Outcome {
        let value = self.read_value(p.cfg, node, &p.input);
        Ok(TransferResult::with_stores(value, p.input.into_stores()))
    }

    fn visit_variable_declaration(
        &mut self,
        _node: &Node,
        _var: &Rc<VariableElement>,
        p: NodeInput<'c, 'i>,
    ) -> Outcome {
        Ok(TransferResult::with_stores(None, p.input.into_stores()))
    }

    fn visit_field_access(
        &mut self,
        node: &Node,
        _receiver: NodeId,
        _field: &Rc<FieldElement>,
        p: NodeInput<'c, 'i>,
    ) -> Outcome {
        let value = self.read_value(p.cfg, node, &p.input);
        Ok(TransferResult::with_stores(value, p.input.into_stores()))
    }

    fn visit_method_invocation(
        &mut self,
        node: &Node,
        target: NodeId,
        arguments: &[NodeId],
        p: NodeInput<'c, 'i>,
    ) -> Outcome {
        let NodeInput { cfg, input } = p;
        let ctx = input.context();
        let hierarchy = &ctx.values;
        let NodeKind::MethodAccess { receiver, method } = cfg.node(target).kind() else {
            return Err(TransferError::Client(format!(
                "the target of call {} is not a method access",
                node.id()
            )));
        };

        let mut store = input.regular_store();
        let call = Receiver::from_node(cfg, node.id());
        let value = more_specific(
            self.checker.value_from_factory(cfg, node),
            store.get_value(&call),
            hierarchy,
        );
        let side_effect_free = self.options.assume_side_effect_free || method.purity.side_effect_free;
        let checker = self.checker;
        store.update_for_method_call(&call, side_effect_free, value.clone(), ctx, |fa, v| {
            monotonic_value(checker, hierarchy, fa, v)
        });

        let contracts = self.checker.contracts(method);
        if contracts.is_empty() {
            return Ok(TransferResult::regular(value, store));
        }
        let context = FlowExpressionContext::for_use(cfg, *receiver, method, arguments);
        for contract in contracts.iter().filter(|c| c.kind == ContractKind::Postcondition) {
            self.apply_contract(contract, &context, &mut store, ctx);
        }

        let conditional: Vec<_> = contracts
            .iter()
            .filter_map(|c| match c.kind {
                ContractKind::ConditionalPostcondition { result } => Some((result, c)),
                _ => None,
            })
            .collect();
        if conditional.is_empty() {
            return Ok(TransferResult::regular(value, store));
        }
        let mut then_store = store.clone();
        let mut else_store = store;
        for (result, contract) in conditional {
            let target = if result {
                &mut then_store
            } else {
                &mut else_store
            };
            self.apply_contract(contract, &context, target, ctx);
        }
        Ok(TransferResult::conditional(value, then_store, else_store))
    }

    fn visit_assignment(
        &mut self,
        _node: &Node,
        target: NodeId,
        expression: NodeId,
        p: NodeInput<'c, 'i>,
    ) -> Outcome {
        let NodeInput { cfg, input } = p;
        let ctx = input.context();
        let (lhs, rhs) = (cfg.node(target), cfg.node(expression));
        let value = if rhs.ty().is_type_variable_like() && !lhs.ty().is_type_variable_like() {
            self.checker.effective_value_from_factory(cfg, rhs)
        } else {
            input.value_of_sub_node(expression).cloned()
        };
        let mut store = input.regular_store();
        self.assign(cfg, target, value.clone(), &mut store, ctx);
        Ok(TransferResult::regular(value, store))
    }

    fn visit_compound_assignment(&mut self, node: &Node, target: NodeId, p: NodeInput<'c, 'i>) -> Outcome {
        let NodeInput { cfg, input } = p;
        let ctx = input.context();
        let value = self.checker.value_from_factory(cfg, node);
        let mut store = input.regular_store();
        self.assign(cfg, target, value.clone(), &mut store, ctx);
        Ok(TransferResult::regular(value, store))
    }

    fn visit_equal_to(&mut self, node: &Node, left: NodeId, right: NodeId, p: NodeInput<'c, 'i>) -> Outcome {
        self.comparison(node, left, right, false, p)
    }

    fn visit_not_equal(&mut self, node: &Node, left: NodeId, right: NodeId, p: NodeInput<'c, 'i>) -> Outcome {
        self.comparison(node, left, right, true, p)
    }

    fn visit_conditional_not(&mut self, node: &Node, _operand: NodeId, p: NodeInput<'c, 'i>) -> Outcome {
        let value = self.checker.value_from_factory(p.cfg, node);
        let (then_store, else_store) = p.input.into_stores().into_conditional();
        Ok(TransferResult::conditional(value, else_store, then_store))
    }

    fn visit_ternary(
        &mut self,
        _node: &Node,
        then_operand: NodeId,
        else_operand: NodeId,
        p: NodeInput<'c, 'i>,
    ) -> Outcome {
        let input = p.input;
        let hierarchy = &input.context().values;
        let value = match (
            input.value_of_sub_node(then_operand),
            input.value_of_sub_node(else_operand),
        ) {
            (Some(a), Some(b)) => Some(a.least_upper_bound(b, hierarchy)),
            _ => None,
        };
        Ok(TransferResult::regular(value, input.regular_store()))
    }

    fn visit_type_cast(&mut self, node: &Node, operand: NodeId, p: NodeInput<'c, 'i>) -> Outcome {
        let NodeInput { cfg, input } = p;
        let value = more_specific(
            self.checker.value_from_factory(cfg, node),
            input.value_of_sub_node(operand),
            &input.context().values,
        );
        Ok(TransferResult::with_stores(value, input.into_stores()))
    }

    fn visit_instance_of(&mut self, node: &Node, operand: NodeId, p: NodeInput<'c, 'i>) -> Outcome {
        let NodeInput { cfg, input } = p;
        let ctx = input.context();
        let tested = match node.kind() {
            NodeKind::InstanceOf { tested, .. } => self.checker.type_value(tested),
            _ => None,
        };
        let refined = more_specific(tested, input.value_of_sub_node(operand), &ctx.values);
        let value = self.checker.value_from_factory(cfg, node);
        let (mut then_store, else_store) = input.into_stores().into_conditional();
        let receiver = Receiver::from_node(cfg, operand);
        if let Some(refined) = refined {
            if QualifierStore::can_insert_receiver(&receiver) {
                then_store.insert_value(&receiver, refined, ctx);
            }
        }
        Ok(TransferResult::conditional(value, then_store, else_store))
    }

    fn visit_assert(&mut self, _node: &Node, p: NodeInput<'c, 'i>) -> Outcome {
        let input = p.input;
        let store = if self.options.assume_asserts_enabled && input.stores().is_conditional() {
            input.then_store()
        } else {
            input.regular_store()
        };
        Ok(TransferResult::regular(None, store))
    }

    fn visit_case(&mut self, _node: &Node, p: NodeInput<'c, 'i>) -> Outcome {
        Ok(TransferResult::with_stores(None, p.input.into_stores()))
    }

    fn visit_return(&mut self, _node: &Node, p: NodeInput<'c, 'i>) -> Outcome {
        Ok(TransferResult::with_stores(None, p.input.into_stores()))
    }
}

impl<C: FlowChecker + ?Sized> TransferFunction<QualifierValue, QualifierStore> for QualifierTransfer<'_, C> {
    /// Parameters get their declared qualifiers and preconditions are
    /// assumed. Fields initialized in the class keep the value of their
    /// initializer if they are final, or in constructors.
    fn initial_store(&mut self, cfg: &Cfg, ctx: &QualifierContext) -> QualifierStore {
        let mut store = QualifierStore::new(self.options.sequential_semantics);
        let UnderlyingAst::Method {
            parameters,
            class,
            is_constructor,
            ..
        } = cfg.underlying()
        else {
            return store;
        };

        for parameter in parameters {
            store.initialize_method_parameter(
                LocalVariable::new(parameter.clone()),
                self.checker.parameter_value(parameter),
            );
        }
        self.add_declared_contracts(cfg, &mut store, ctx);

        for (field, value) in self.field_values {
            if !field.is_final && !*is_constructor {
                continue;
            }
            let receiver = if field.is_static {
                Receiver::class_name(field.owner.clone())
            } else {
                Receiver::this(class.ty.clone())
            };
            store.insert_value(&Receiver::field(receiver, field.clone()), value.clone(), ctx);
        }
        store
    }

    fn transfer(&mut self, cfg: &Cfg, node: &Node, input: QualifierInput<'_>) -> Outcome {
        let ctx = input.context();
        let result = node.accept(self, NodeInput { cfg, input })?;
        self.checker.refine(cfg, node, ctx, result)
    }
}
