use dataflow::cfg::Cfg;
use dataflow::elements::{FieldElement, MethodElement, Type, VariableElement};
use dataflow::node::Node;
use dataflow::transfer::TransferError;

use crate::contracts::Contract;
use crate::hierarchy::{Qualifier, QualifierHierarchy};
use crate::symbols::SymbolResolver;
use crate::transfer::{QualifierContext, QualifierTransferResult};
use crate::value::QualifierValue;

/// What a concrete checker contributes to the flow analysis: its
/// qualifiers, the qualifiers the type rules give to each node, and the
/// declared contracts of methods and fields.
///
/// Every method returning an optional value may return `None` for "no
/// information", which is the top of every hierarchy.
pub trait FlowChecker {
    fn hierarchy(&self) -> &QualifierHierarchy;

    fn resolver(&self) -> &dyn SymbolResolver;

    /// The qualifiers of a node according to declarations and type rules,
    /// ignoring flow refinement. Called for desugaring nodes too, those
    /// have no tree.
    fn value_from_factory(&self, cfg: &Cfg, node: &Node) -> Option<QualifierValue>;

    /// Like [`FlowChecker::value_from_factory`], but for the upper bound of
    /// nodes whose type is a type variable or wildcard.
    fn effective_value_from_factory(&self, cfg: &Cfg, node: &Node) -> Option<QualifierValue> {
        self.value_from_factory(cfg, node)
    }

    /// The qualifiers every value of a type has. Used to refine the operand
    /// of a successful instanceof test.
    fn type_value(&self, _ty: &Type) -> Option<QualifierValue> {
        None
    }

    fn parameter_value(&self, _parameter: &VariableElement) -> Option<QualifierValue> {
        None
    }

    fn contracts(&self, _method: &MethodElement) -> Vec<Contract> {
        Vec::new()
    }

    /// Qualifiers of a field that can never be lost once established,
    /// even when the field is reassigned.
    fn monotonic_targets(&self, _field: &FieldElement) -> Vec<Qualifier> {
        Vec::new()
    }

    /// Post-process the effect of a node, e.g. to learn from calls to
    /// checker specific test methods.
    fn refine(
        &self,
        _cfg: &Cfg,
        _node: &Node,
        _ctx: &QualifierContext,
        result: QualifierTransferResult,
    ) -> Result<QualifierTransferResult, TransferError> {
        Ok(result)
    }
}
