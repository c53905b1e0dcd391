use core::fmt;
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicU64, Ordering};
use std::rc::Rc;

use crate::cfg::Cfg;
use crate::elements::{FieldElement, MethodElement, Type, TypeHierarchy, VariableElement};
use crate::node::{Literal, NodeId, NodeKind};

/// A syntactic stand-in for a run-time reference that the analysis can
/// track, used as the key of stores. Receivers are plain data created
/// whenever a node is translated to its receiver form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Receiver {
    FieldAccess(FieldAccess),
    ThisReference(ThisReference),
    ClassName(ClassName),
    LocalVariable(LocalVariable),
    ValueLiteral(ValueLiteral),
    PureMethodCall(PureMethodCall),
    Unknown(Unknown),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldAccess {
    receiver: Box<Receiver>,
    field: Rc<FieldElement>,
}

impl FieldAccess {
    pub fn new(receiver: Receiver, field: Rc<FieldElement>) -> Self {
        Self {
            receiver: Box::new(receiver),
            field,
        }
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    pub fn field(&self) -> &Rc<FieldElement> {
        &self.field
    }

    pub fn is_final(&self) -> bool {
        self.field.is_final
    }

    pub fn is_unmodifiable_by_other_code(&self) -> bool {
        self.field.is_final && self.receiver.is_unmodifiable_by_other_code()
    }
}

/// The `this` reference. All `this` references are equal, whatever static
/// type they were created with.
#[derive(Debug, Clone)]
pub struct ThisReference {
    ty: Type,
}

impl ThisReference {
    pub fn new(ty: Type) -> Self {
        Self { ty }
    }
}

impl PartialEq for ThisReference {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for ThisReference {}

impl Hash for ThisReference {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}

/// The class itself, as the receiver of static members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassName {
    ty: Type,
}

impl ClassName {
    pub fn new(ty: Type) -> Self {
        Self { ty }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalVariable {
    element: Rc<VariableElement>,
}

impl LocalVariable {
    pub fn new(element: Rc<VariableElement>) -> Self {
        Self { element }
    }

    pub fn element(&self) -> &Rc<VariableElement> {
        &self.element
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueLiteral {
    ty: Type,
    value: Literal,
}

impl ValueLiteral {
    pub fn new(ty: Type, value: Literal) -> Self {
        Self { ty, value }
    }

    pub fn value(&self) -> &Literal {
        &self.value
    }
}

/// A call to a deterministic method. Repeating such a call with
/// syntactically equal receiver and arguments yields an equal result, so
/// facts about the result can be remembered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PureMethodCall {
    ty: Type,
    method: Rc<MethodElement>,
    receiver: Box<Receiver>,
    parameters: Vec<Receiver>,
}

impl PureMethodCall {
    pub fn new(
        ty: Type,
        method: Rc<MethodElement>,
        receiver: Receiver,
        parameters: Vec<Receiver>,
    ) -> Self {
        Self {
            ty,
            method,
            receiver: Box::new(receiver),
            parameters,
        }
    }

    pub fn method(&self) -> &Rc<MethodElement> {
        &self.method
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    pub fn parameters(&self) -> &[Receiver] {
        &self.parameters
    }

    pub fn contains_syntactic_equal_parameter(&self, var: &LocalVariable) -> bool {
        let var = Receiver::LocalVariable(var.clone());
        self.parameters
            .iter()
            .any(|p| p.contains_syntactic_equal_receiver(&var))
    }
}

static NEXT_UNKNOWN: AtomicU64 = AtomicU64::new(0);

/// An expression the analysis cannot describe. Every unknown receiver is
/// distinct from every other receiver, including other unknowns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Unknown {
    ty: Type,
    id: u64,
}

impl Unknown {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            id: NEXT_UNKNOWN.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Two receivers can alias if the type of one is a subtype of the other.
pub fn can_alias(types: &dyn TypeHierarchy, a: &Receiver, b: &Receiver) -> bool {
    types.is_subtype(a.ty(), b.ty()) || types.is_subtype(b.ty(), a.ty())
}

impl Receiver {
    pub fn unknown(ty: Type) -> Self {
        Receiver::Unknown(Unknown::new(ty))
    }

    pub fn this(ty: Type) -> Self {
        Receiver::ThisReference(ThisReference::new(ty))
    }

    pub fn local(element: Rc<VariableElement>) -> Self {
        Receiver::LocalVariable(LocalVariable::new(element))
    }

    pub fn field(receiver: Receiver, field: Rc<FieldElement>) -> Self {
        Receiver::FieldAccess(FieldAccess::new(receiver, field))
    }

    pub fn class_name(ty: Type) -> Self {
        Receiver::ClassName(ClassName::new(ty))
    }

    pub fn literal(ty: Type, value: Literal) -> Self {
        Receiver::ValueLiteral(ValueLiteral::new(ty, value))
    }

    pub fn ty(&self) -> &Type {
        match self {
            Receiver::FieldAccess(fa) => &fa.field.ty,
            Receiver::ThisReference(this) => &this.ty,
            Receiver::ClassName(class) => &class.ty,
            Receiver::LocalVariable(var) => &var.element.ty,
            Receiver::ValueLiteral(literal) => &literal.ty,
            Receiver::PureMethodCall(call) => &call.ty,
            Receiver::Unknown(unknown) => &unknown.ty,
        }
    }

    /// Translate a node to its receiver form. Nodes that do not denote a
    /// trackable expression become [`Receiver::Unknown`].
    pub fn from_node(cfg: &Cfg, id: NodeId) -> Receiver {
        let node = cfg.node(id);
        match node.kind() {
            NodeKind::FieldAccess { receiver, field } => {
                let receiver = if field.is_static {
                    Receiver::class_name(field.owner.clone())
                } else {
                    Receiver::from_node(cfg, *receiver)
                };
                Receiver::field(receiver, field.clone())
            }
            NodeKind::LocalVariable(var) => Receiver::local(var.clone()),
            NodeKind::This { .. } => Receiver::this(node.ty().clone()),
            NodeKind::ClassName(class) => Receiver::class_name(class.ty.clone()),
            NodeKind::ValueLiteral(value) => Receiver::literal(node.ty().clone(), value.clone()),
            NodeKind::MethodInvocation { target, arguments } => {
                let NodeKind::MethodAccess { receiver, method } = cfg.node(*target).kind() else {
                    return Receiver::unknown(node.ty().clone());
                };
                if !method.purity.deterministic {
                    return Receiver::unknown(node.ty().clone());
                }
                let receiver = if method.is_static {
                    Receiver::class_name(method.owner.clone())
                } else {
                    Receiver::from_node(cfg, *receiver)
                };
                let parameters = arguments
                    .iter()
                    .map(|arg| Receiver::from_node(cfg, *arg))
                    .collect();
                Receiver::PureMethodCall(PureMethodCall::new(
                    node.ty().clone(),
                    method.clone(),
                    receiver,
                    parameters,
                ))
            }
            _ => Receiver::unknown(node.ty().clone()),
        }
    }

    pub fn contains_unknown(&self) -> bool {
        match self {
            Receiver::Unknown(_) => true,
            Receiver::FieldAccess(fa) => fa.receiver.contains_unknown(),
            Receiver::PureMethodCall(call) => {
                call.receiver.contains_unknown()
                    || call.parameters.iter().any(Receiver::contains_unknown)
            }
            _ => false,
        }
    }

    /// Whether code outside the current method could change the value this
    /// receiver refers to.
    pub fn is_unmodifiable_by_other_code(&self) -> bool {
        match self {
            Receiver::FieldAccess(fa) => fa.is_unmodifiable_by_other_code(),
            Receiver::ThisReference(_)
            | Receiver::ClassName(_)
            | Receiver::LocalVariable(_)
            | Receiver::ValueLiteral(_) => true,
            Receiver::PureMethodCall(_) | Receiver::Unknown(_) => false,
        }
    }

    /// Whether the two receivers denote the same expression.
    pub fn syntactic_equals(&self, other: &Receiver) -> bool {
        match (self, other) {
            (Receiver::FieldAccess(a), Receiver::FieldAccess(b)) => {
                a.field == b.field && a.receiver.syntactic_equals(&b.receiver)
            }
            (Receiver::ThisReference(_), Receiver::ThisReference(_)) => true,
            (Receiver::ClassName(a), Receiver::ClassName(b)) => a == b,
            (Receiver::LocalVariable(a), Receiver::LocalVariable(b)) => a == b,
            (Receiver::ValueLiteral(a), Receiver::ValueLiteral(b)) => a == b,
            (Receiver::PureMethodCall(a), Receiver::PureMethodCall(b)) => {
                a.method == b.method
                    && a.receiver.syntactic_equals(&b.receiver)
                    && a.parameters.len() == b.parameters.len()
                    && a.parameters
                        .iter()
                        .zip(&b.parameters)
                        .all(|(x, y)| x.syntactic_equals(y))
            }
            (Receiver::Unknown(a), Receiver::Unknown(b)) => a == b,
            _ => false,
        }
    }

    /// Whether `other` is syntactically equal to this receiver or to one of
    /// its sub-receivers.
    pub fn contains_syntactic_equal_receiver(&self, other: &Receiver) -> bool {
        if self.syntactic_equals(other) {
            return true;
        }
        match self {
            Receiver::FieldAccess(fa) => fa.receiver.contains_syntactic_equal_receiver(other),
            Receiver::PureMethodCall(call) => {
                call.receiver.contains_syntactic_equal_receiver(other)
                    || call
                        .parameters
                        .iter()
                        .any(|p| p.contains_syntactic_equal_receiver(other))
            }
            _ => false,
        }
    }

    /// Conservatively decide whether this receiver or any of its
    /// sub-receivers may refer to the same object as `other`.
    pub fn contains_alias_of(&self, types: &dyn TypeHierarchy, other: &Receiver) -> bool {
        if let Receiver::Unknown(_) = self {
            return true;
        }
        if self == other || can_alias(types, self, other) {
            return true;
        }
        match self {
            Receiver::FieldAccess(fa) => fa.receiver.contains_alias_of(types, other),
            Receiver::PureMethodCall(call) => {
                call.receiver.contains_alias_of(types, other)
                    || call
                        .parameters
                        .iter()
                        .any(|p| p.contains_alias_of(types, other))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Receiver::FieldAccess(fa) => write!(f, "{}", fa),
            Receiver::ThisReference(_) => f.write_str("this"),
            Receiver::ClassName(class) => write!(f, "{}", class.ty),
            Receiver::LocalVariable(var) => write!(f, "{}", var),
            Receiver::ValueLiteral(literal) => write!(f, "{}", literal.value),
            Receiver::PureMethodCall(call) => write!(f, "{}", call),
            Receiver::Unknown(_) => f.write_str("?"),
        }
    }
}

impl fmt::Display for FieldAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.receiver, self.field.name)
    }
}

impl fmt::Display for LocalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.element.name)
    }
}

impl fmt::Display for PureMethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<_> = self.parameters.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{}.{}({})",
            self.receiver,
            self.method.name,
            params.join(", ")
        )
    }
}
