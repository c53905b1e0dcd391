use core::fmt;
use std::rc::Rc;

use crate::cfg::BlockId;
use crate::elements::{ClassElement, FieldElement, MethodElement, TreeId, Type, VariableElement};

/// Index of a node within its control flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Compile time constant appearing in the program text. Floating point
/// values are kept as their bit pattern so literals can be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Char(char),
    Float(u64),
    String(Rc<str>),
}

impl Literal {
    pub fn float(value: f64) -> Self {
        Literal::Float(value.to_bits())
    }

    pub fn string(value: &str) -> Self {
        Literal::String(value.into())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Long(l) => write!(f, "{l}L"),
            Literal::Char(c) => write!(f, "'{c}'"),
            Literal::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Literal::String(s) => write!(f, "\"{s}\""),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
    StringConcat,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOperator::Add | BinaryOperator::StringConcat => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEq => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEq => ">=",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Minus,
    Plus,
    BitwiseComplement,
}

/// Conversions inserted by the CFG builder that have no source counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    Boxing,
    Unboxing,
    Widening,
    Narrowing,
    String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    LocalVariable(Rc<VariableElement>),
    VariableDeclaration(Rc<VariableElement>),
    FieldAccess {
        receiver: NodeId,
        field: Rc<FieldElement>,
    },
    /// `this`, either written in the source or implied by an unqualified
    /// field access or method call.
    This {
        explicit: bool,
    },
    ClassName(Rc<ClassElement>),
    ValueLiteral(Literal),
    /// The callee part of a method invocation, `receiver.method`.
    MethodAccess {
        receiver: NodeId,
        method: Rc<MethodElement>,
    },
    MethodInvocation {
        target: NodeId,
        arguments: Vec<NodeId>,
    },
    ObjectCreation {
        constructor: Rc<MethodElement>,
        arguments: Vec<NodeId>,
    },
    Assignment {
        target: NodeId,
        expression: NodeId,
    },
    CompoundAssignment {
        operator: BinaryOperator,
        target: NodeId,
        operand: NodeId,
    },
    BinaryOperation {
        operator: BinaryOperator,
        left: NodeId,
        right: NodeId,
    },
    UnaryOperation {
        operator: UnaryOperator,
        operand: NodeId,
    },
    EqualTo {
        left: NodeId,
        right: NodeId,
    },
    NotEqual {
        left: NodeId,
        right: NodeId,
    },
    ConditionalNot {
        operand: NodeId,
    },
    Ternary {
        condition: NodeId,
        then_operand: NodeId,
        else_operand: NodeId,
    },
    TypeCast {
        operand: NodeId,
        target: Type,
    },
    InstanceOf {
        operand: NodeId,
        tested: Type,
    },
    ArrayAccess {
        array: NodeId,
        index: NodeId,
    },
    Assert {
        condition: NodeId,
    },
    Case {
        switch_expression: NodeId,
        case_expression: NodeId,
    },
    Return {
        result: Option<NodeId>,
    },
    Throw {
        expression: NodeId,
    },
    Conversion {
        kind: ConversionKind,
        operand: NodeId,
    },
}

impl NodeKind {
    /// Short name of the node kind, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::LocalVariable(_) => "local variable",
            NodeKind::VariableDeclaration(_) => "variable declaration",
            NodeKind::FieldAccess { .. } => "field access",
            NodeKind::This { .. } => "this",
            NodeKind::ClassName(_) => "class name",
            NodeKind::ValueLiteral(_) => "literal",
            NodeKind::MethodAccess { .. } => "method access",
            NodeKind::MethodInvocation { .. } => "method invocation",
            NodeKind::ObjectCreation { .. } => "object creation",
            NodeKind::Assignment { .. } => "assignment",
            NodeKind::CompoundAssignment { .. } => "compound assignment",
            NodeKind::BinaryOperation { .. } => "binary operation",
            NodeKind::UnaryOperation { .. } => "unary operation",
            NodeKind::EqualTo { .. } => "equal to",
            NodeKind::NotEqual { .. } => "not equal",
            NodeKind::ConditionalNot { .. } => "conditional not",
            NodeKind::Ternary { .. } => "ternary",
            NodeKind::TypeCast { .. } => "type cast",
            NodeKind::InstanceOf { .. } => "instanceof",
            NodeKind::ArrayAccess { .. } => "array access",
            NodeKind::Assert { .. } => "assert",
            NodeKind::Case { .. } => "case",
            NodeKind::Return { .. } => "return",
            NodeKind::Throw { .. } => "throw",
            NodeKind::Conversion { .. } => "conversion",
        }
    }

    /// The nodes whose values this node consumes, in evaluation order.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            NodeKind::LocalVariable(_)
            | NodeKind::VariableDeclaration(_)
            | NodeKind::This { .. }
            | NodeKind::ClassName(_)
            | NodeKind::ValueLiteral(_) => vec![],
            NodeKind::FieldAccess { receiver, .. } | NodeKind::MethodAccess { receiver, .. } => {
                vec![*receiver]
            }
            NodeKind::MethodInvocation { target, arguments } => {
                let mut operands = vec![*target];
                operands.extend(arguments.iter().copied());
                operands
            }
            NodeKind::ObjectCreation { arguments, .. } => arguments.clone(),
            NodeKind::Assignment { target, expression } => vec![*target, *expression],
            NodeKind::CompoundAssignment {
                target, operand, ..
            } => vec![*target, *operand],
            NodeKind::BinaryOperation { left, right, .. }
            | NodeKind::EqualTo { left, right }
            | NodeKind::NotEqual { left, right } => vec![*left, *right],
            NodeKind::UnaryOperation { operand, .. }
            | NodeKind::ConditionalNot { operand }
            | NodeKind::TypeCast { operand, .. }
            | NodeKind::InstanceOf { operand, .. }
            | NodeKind::Conversion { operand, .. } => vec![*operand],
            NodeKind::Ternary {
                condition,
                then_operand,
                else_operand,
            } => vec![*condition, *then_operand, *else_operand],
            NodeKind::ArrayAccess { array, index } => vec![*array, *index],
            NodeKind::Assert { condition } => vec![*condition],
            NodeKind::Case {
                switch_expression,
                case_expression,
            } => vec![*switch_expression, *case_expression],
            NodeKind::Return { result } => result.iter().copied().collect(),
            NodeKind::Throw { expression } => vec![*expression],
        }
    }
}

/// One elaborated operation of a control flow graph. Nodes are created by
/// [`crate::cfg::CfgBuilder`] and never change after the graph is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) ty: Type,
    pub(crate) tree: Option<TreeId>,
    pub(crate) block: BlockId,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The source tree this node was created for, if any. Desugaring nodes
    /// have no tree.
    pub fn tree(&self) -> Option<TreeId> {
        self.tree
    }

    /// The block containing this node.
    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn operands(&self) -> Vec<NodeId> {
        self.kind.operands()
    }

    /// Dispatch to the visitor method matching the kind of this node.
    pub fn accept<R, P, V>(&self, visitor: &mut V, param: P) -> R
    where
        V: NodeVisitor<R, P> + ?Sized,
    {
        match &self.kind {
            NodeKind::LocalVariable(var) => visitor.visit_local_variable(self, var, param),
            NodeKind::VariableDeclaration(var) => {
                visitor.visit_variable_declaration(self, var, param)
            }
            NodeKind::FieldAccess { receiver, field } => {
                visitor.visit_field_access(self, *receiver, field, param)
            }
            NodeKind::MethodInvocation { target, arguments } => {
                visitor.visit_method_invocation(self, *target, arguments, param)
            }
            NodeKind::Assignment { target, expression } => {
                visitor.visit_assignment(self, *target, *expression, param)
            }
            NodeKind::CompoundAssignment { target, .. } => {
                visitor.visit_compound_assignment(self, *target, param)
            }
            NodeKind::EqualTo { left, right } => visitor.visit_equal_to(self, *left, *right, param),
            NodeKind::NotEqual { left, right } => {
                visitor.visit_not_equal(self, *left, *right, param)
            }
            NodeKind::ConditionalNot { operand } => {
                visitor.visit_conditional_not(self, *operand, param)
            }
            NodeKind::Ternary {
                then_operand,
                else_operand,
                ..
            } => visitor.visit_ternary(self, *then_operand, *else_operand, param),
            NodeKind::TypeCast { operand, .. } => visitor.visit_type_cast(self, *operand, param),
            NodeKind::InstanceOf { operand, .. } => {
                visitor.visit_instance_of(self, *operand, param)
            }
            NodeKind::Assert { .. } => visitor.visit_assert(self, param),
            NodeKind::Case { .. } => visitor.visit_case(self, param),
            NodeKind::Return { .. } => visitor.visit_return(self, param),
            _ => visitor.visit_node(self, param),
        }
    }
}

/// Visitor over node kinds. Only [`NodeVisitor::visit_node`] is required,
/// every other method falls back to it.
pub trait NodeVisitor<R, P> {
    fn visit_node(&mut self, node: &Node, param: P) -> R;

    fn visit_local_variable(&mut self, node: &Node, _var: &Rc<VariableElement>, param: P) -> R {
        self.visit_node(node, param)
    }

    fn visit_variable_declaration(
        &mut self,
        node: &Node,
        _var: &Rc<VariableElement>,
        param: P,
    ) -> R {
        self.visit_node(node, param)
    }

    fn visit_field_access(
        &mut self,
        node: &Node,
        _receiver: NodeId,
        _field: &Rc<FieldElement>,
        param: P,
    ) -> R {
        self.visit_node(node, param)
    }

    fn visit_method_invocation(
        &mut self,
        node: &Node,
        _target: NodeId,
        _arguments: &[NodeId],
        param: P,
    ) -> R {
        self.visit_node(node, param)
    }

    fn visit_assignment(
        &mut self,
        node: &Node,
        _target: NodeId,
        _expression: NodeId,
        param: P,
    ) -> R {
        self.visit_node(node, param)
    }

    fn visit_compound_assignment(&mut self, node: &Node, _target: NodeId, param: P) -> R {
        self.visit_node(node, param)
    }

    fn visit_equal_to(&mut self, node: &Node, _left: NodeId, _right: NodeId, param: P) -> R {
        self.visit_node(node, param)
    }

    fn visit_not_equal(&mut self, node: &Node, _left: NodeId, _right: NodeId, param: P) -> R {
        self.visit_node(node, param)
    }

    fn visit_conditional_not(&mut self, node: &Node, _operand: NodeId, param: P) -> R {
        self.visit_node(node, param)
    }

    fn visit_ternary(
        &mut self,
        node: &Node,
        _then_operand: NodeId,
        _else_operand: NodeId,
        param: P,
    ) -> R {
        self.visit_node(node, param)
    }

    fn visit_type_cast(&mut self, node: &Node, _operand: NodeId, param: P) -> R {
        self.visit_node(node, param)
    }

    fn visit_instance_of(&mut self, node: &Node, _operand: NodeId, param: P) -> R {
        self.visit_node(node, param)
    }

    fn visit_assert(&mut self, node: &Node, param: P) -> R {
        self.visit_node(node, param)
    }

    fn visit_case(&mut self, node: &Node, param: P) -> R {
        self.visit_node(node, param)
    }

    fn visit_return(&mut self, node: &Node, param: P) -> R {
        self.visit_node(node, param)
    }
}
