use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use dataflow::cfg::{BlockId, Cfg, CfgBuilder, UnderlyingAst};
use dataflow::elements::{
    ClassElement, FieldElement, MethodElement, Purity, TreeId, Type, VariableElement,
};
use dataflow::node::{Literal, Node, NodeId, NodeKind};
use dataflow::receiver::Receiver;
use dataflow::store::StoreContext;
use dataflow::transfer::{FlowStores, TransferError};

use crate::checker::FlowChecker;
use crate::contracts::Contract;
use crate::factory::{ClassMember, HostProgram};
use crate::hierarchy::{Qualifier, QualifierHierarchy, QualifierHierarchyBuilder};
use crate::symbols::{SymbolResolver, SymbolTable};
use crate::transfer::{QualifierContext, QualifierTransferResult};
use crate::value::QualifierValue;

pub const ENTRY: BlockId = BlockId(0);
pub const EXIT: BlockId = BlockId(1);

/// Three hierarchies: nullness, oddness of numbers, and regular
/// expressions with their number of capturing groups.
pub fn hierarchy() -> QualifierHierarchy {
    let mut builder = QualifierHierarchyBuilder::new();
    builder
        .add_subtype("NonNull", "Nullable")
        .add_subtype("Null", "Nullable")
        .add_subtype("NullBottom", "NonNull")
        .add_subtype("NullBottom", "Null")
        .add_subtype("Odd", "UnknownOdd")
        .add_subtype("OddBottom", "Odd")
        .add_subtype("Regex", "UnknownRegex")
        .add_subtype("RegexBottom", "Regex")
        .add_polymorphic("PolyRegex", "UnknownRegex");
    builder.build().unwrap()
}

pub fn q(name: &str) -> Qualifier {
    Qualifier::new(name)
}

pub fn regex(groups: i64) -> Qualifier {
    Qualifier::new("Regex").with_int(groups)
}

pub fn value(hierarchy: &QualifierHierarchy, qualifiers: &[Qualifier]) -> QualifierValue {
    QualifierValue::from_qualifiers(hierarchy, qualifiers.iter().cloned())
}

pub fn object() -> Type {
    Type::declared("Object")
}

pub fn string() -> Type {
    Type::declared("String")
}

pub fn int() -> Type {
    Type::primitive("int")
}

pub fn boolean() -> Type {
    Type::primitive("boolean")
}

pub fn class_type() -> Type {
    Type::declared("C")
}

pub fn class() -> Rc<ClassElement> {
    ClassElement::new("C")
}

pub fn var(name: &str, id: u32) -> Rc<VariableElement> {
    VariableElement::new(name, id, object())
}

pub fn field(name: &str) -> Rc<FieldElement> {
    Rc::new(FieldElement::new(name, class_type(), object()))
}

pub fn final_field(name: &str) -> Rc<FieldElement> {
    Rc::new(FieldElement::new(name, class_type(), object()).with_final(true))
}

pub fn method(name: &str, parameters: Vec<Type>, return_type: Type, purity: Purity) -> Rc<MethodElement> {
    Rc::new(MethodElement::new(name, class_type(), parameters, return_type).with_purity(purity))
}

pub fn method_ast(name: &str, tree: u32, parameters: Vec<Rc<VariableElement>>) -> UnderlyingAst {
    let element = method(
        name,
        parameters.iter().map(|p| p.ty.clone()).collect(),
        Type::primitive("void"),
        Purity::NONE,
    );
    UnderlyingAst::Method {
        tree: TreeId(tree),
        method: element,
        parameters,
        class: class(),
        is_constructor: false,
    }
}

pub fn constructor_ast(tree: u32) -> UnderlyingAst {
    UnderlyingAst::Method {
        tree: TreeId(tree),
        method: method("<init>", vec![], Type::primitive("void"), Purity::NONE),
        parameters: vec![],
        class: class(),
        is_constructor: true,
    }
}

pub fn initializer_ast(tree: u32) -> UnderlyingAst {
    UnderlyingAst::Arbitrary {
        tree: TreeId(tree),
        class: class(),
    }
}

pub fn local(builder: &mut CfgBuilder, var: &Rc<VariableElement>, tree: Option<u32>) -> NodeId {
    builder.add_node(
        NodeKind::LocalVariable(var.clone()),
        var.ty.clone(),
        tree.map(TreeId),
    )
}

pub fn literal(builder: &mut CfgBuilder, value: Literal, tree: Option<u32>) -> NodeId {
    let ty = match &value {
        Literal::Null => Type::null(),
        Literal::Int(_) => int(),
        Literal::Long(_) => Type::primitive("long"),
        Literal::Bool(_) => boolean(),
        Literal::String(_) => string(),
        Literal::Char(_) => Type::primitive("char"),
        Literal::Float(_) => Type::primitive("double"),
    };
    builder.add_node(NodeKind::ValueLiteral(value), ty, tree.map(TreeId))
}

pub fn this(builder: &mut CfgBuilder) -> NodeId {
    builder.add_node(NodeKind::This { explicit: false }, class_type(), None)
}

/// `this.field`
pub fn field_access(builder: &mut CfgBuilder, field: &Rc<FieldElement>, tree: Option<u32>) -> Vec<NodeId> {
    let receiver = this(builder);
    let access = builder.add_node(
        NodeKind::FieldAccess {
            receiver,
            field: field.clone(),
        },
        field.ty.clone(),
        tree.map(TreeId),
    );
    vec![receiver, access]
}

pub fn assign(builder: &mut CfgBuilder, target: NodeId, expression: NodeId, tree: Option<u32>) -> NodeId {
    builder.add_node(
        NodeKind::Assignment { target, expression },
        object(),
        tree.map(TreeId),
    )
}

/// `this.method(arguments)`, the invocation is the last node.
pub fn call(
    builder: &mut CfgBuilder,
    method: &Rc<MethodElement>,
    arguments: Vec<NodeId>,
    tree: Option<u32>,
) -> Vec<NodeId> {
    let receiver = this(builder);
    let target = builder.add_node(
        NodeKind::MethodAccess {
            receiver,
            method: method.clone(),
        },
        method.return_type.clone(),
        None,
    );
    let invocation = builder.add_node(
        NodeKind::MethodInvocation { target, arguments },
        method.return_type.clone(),
        tree.map(TreeId),
    );
    vec![receiver, target, invocation]
}

pub fn equal_to(builder: &mut CfgBuilder, left: NodeId, right: NodeId, tree: Option<u32>) -> NodeId {
    builder.add_node(NodeKind::EqualTo { left, right }, boolean(), tree.map(TreeId))
}

pub fn not_equal(builder: &mut CfgBuilder, left: NodeId, right: NodeId, tree: Option<u32>) -> NodeId {
    builder.add_node(NodeKind::NotEqual { left, right }, boolean(), tree.map(TreeId))
}

/// A graph with all nodes in one block between entry and exit.
pub fn straight_line(mut builder: CfgBuilder, nodes: Vec<NodeId>) -> Cfg {
    let block = builder.add_regular_block(nodes);
    builder.set_successor(ENTRY, block).set_successor(block, EXIT);
    builder.build().unwrap()
}

/// A checker over [`hierarchy`]. Literals get their natural qualifiers,
/// everything else only what is declared in the maps.
pub struct TestChecker {
    pub hierarchy: QualifierHierarchy,
    pub symbols: SymbolTable,
    pub declared: HashMap<TreeId, QualifierValue>,
    pub parameters: HashMap<u32, QualifierValue>,
    pub contracts: HashMap<Rc<str>, Vec<Contract>>,
    pub monotonic: HashMap<Rc<str>, Vec<Qualifier>>,
    /// Names of the refined nodes, in order.
    pub refined: RefCell<Vec<&'static str>>,
}

impl TestChecker {
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        symbols
            .add_class(object(), None)
            .add_class(class_type(), Some(object()));
        Self {
            hierarchy: hierarchy(),
            symbols,
            declared: HashMap::new(),
            parameters: HashMap::new(),
            contracts: HashMap::new(),
            monotonic: HashMap::new(),
            refined: RefCell::new(Vec::new()),
        }
    }

    pub fn context(&self) -> QualifierContext {
        StoreContext::new(self.hierarchy.clone(), Rc::new(self.symbols.clone()))
    }

    pub fn value(&self, qualifiers: &[Qualifier]) -> QualifierValue {
        value(&self.hierarchy, qualifiers)
    }

    pub fn declare(&mut self, tree: u32, qualifiers: &[Qualifier]) {
        let value = self.value(qualifiers);
        self.declared.insert(TreeId(tree), value);
    }

    pub fn add_contract(&mut self, method: &str, contract: Contract) {
        self.contracts.entry(method.into()).or_default().push(contract);
    }

    fn literal_value(&self, literal: &Literal) -> Option<QualifierValue> {
        let qualifiers = match literal {
            Literal::Null => vec![q("Null")],
            Literal::String(text) => match regex::Regex::new(text) {
                Ok(parsed) => vec![q("NonNull"), regex(parsed.captures_len() as i64 - 1)],
                Err(_) => vec![q("NonNull")],
            },
            Literal::Int(i) if i % 2 != 0 => vec![q("Odd")],
            Literal::Long(l) if l % 2 != 0 => vec![q("Odd")],
            _ => return None,
        };
        Some(self.value(&qualifiers))
    }
}

impl FlowChecker for TestChecker {
    fn hierarchy(&self) -> &QualifierHierarchy {
        &self.hierarchy
    }

    fn resolver(&self) -> &dyn SymbolResolver {
        &self.symbols
    }

    fn value_from_factory(&self, _cfg: &Cfg, node: &Node) -> Option<QualifierValue> {
        if let Some(value) = node.tree().and_then(|tree| self.declared.get(&tree)) {
            return Some(value.clone());
        }
        match node.kind() {
            NodeKind::ValueLiteral(literal) => self.literal_value(literal),
            NodeKind::ObjectCreation { .. } | NodeKind::This { .. } => Some(self.value(&[q("NonNull")])),
            _ => None,
        }
    }

    fn type_value(&self, _ty: &Type) -> Option<QualifierValue> {
        Some(self.value(&[q("NonNull")]))
    }

    fn parameter_value(&self, parameter: &VariableElement) -> Option<QualifierValue> {
        self.parameters.get(&parameter.id).cloned()
    }

    fn contracts(&self, method: &MethodElement) -> Vec<Contract> {
        self.contracts.get(&method.name).cloned().unwrap_or_default()
    }

    fn monotonic_targets(&self, field: &FieldElement) -> Vec<Qualifier> {
        self.monotonic.get(&field.name).cloned().unwrap_or_default()
    }

    /// `isRegex(s, n)` returning true means `s` is a regex with `n` groups.
    fn refine(
        &self,
        cfg: &Cfg,
        node: &Node,
        ctx: &QualifierContext,
        mut result: QualifierTransferResult,
    ) -> Result<QualifierTransferResult, TransferError> {
        let NodeKind::MethodInvocation { target, arguments } = node.kind() else {
            return Ok(result);
        };
        let NodeKind::MethodAccess { method, .. } = cfg.node(*target).kind() else {
            return Ok(result);
        };
        if &*method.name != "isRegex" {
            return Ok(result);
        }
        let [checked, groups] = arguments.as_slice() else {
            return Err(TransferError::Client("isRegex takes two arguments".to_owned()));
        };
        let NodeKind::ValueLiteral(Literal::Int(groups)) = cfg.node(*groups).kind() else {
            return Ok(result);
        };
        self.refined.borrow_mut().push("isRegex");

        let refined = self.value(&[regex(i64::from(*groups))]);
        let (mut then_store, else_store) = result.stores.into_conditional();
        then_store.insert_value(&Receiver::from_node(cfg, *checked), refined, ctx);
        result.stores = FlowStores::Conditional {
            then_store,
            else_store,
        };
        Ok(result)
    }
}

/// A program whose classes and members are listed up front. Records the
/// classes whose members were requested.
#[derive(Default)]
pub struct TestProgram {
    classes: HashMap<Type, Vec<ClassMember>>,
    trees: HashMap<TreeId, Rc<ClassElement>>,
    pub requested: RefCell<Vec<Rc<str>>>,
}

impl TestProgram {
    /// Add a class. Every tree of its bodies is considered to be part of it.
    pub fn add_class(&mut self, class: Rc<ClassElement>, members: Vec<ClassMember>) {
        for member in &members {
            let cfg = match member {
                ClassMember::Field {
                    initializer: Some(initializer),
                    ..
                } => &initializer.cfg,
                ClassMember::Method(cfg) | ClassMember::Initializer(cfg) => cfg,
                _ => continue,
            };
            self.trees.insert(cfg.id(), class.clone());
            for tree in cfg.tree_lookup().keys() {
                self.trees.insert(*tree, class.clone());
            }
        }
        self.classes.insert(class.ty.clone(), members);
    }
}

impl HostProgram for TestProgram {
    fn enclosing_class(&self, tree: TreeId) -> Option<Rc<ClassElement>> {
        self.trees.get(&tree).cloned()
    }

    fn class_members(&self, class: &ClassElement) -> Vec<ClassMember> {
        self.requested.borrow_mut().push(class.name.clone());
        self.classes.get(&class.ty).cloned().unwrap_or_default()
    }
}
