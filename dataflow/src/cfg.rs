use core::cmp::Reverse;
use core::fmt::Write;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use priority_queue::PriorityQueue;
use thiserror::Error;

use crate::elements::{ClassElement, MethodElement, TreeId, Type, VariableElement};
use crate::node::{Node, NodeId, NodeKind, UnaryOperator};

pub trait CfgBlock {
    type Element;

    fn operations(&self) -> &[Self::Element];
    fn successors(&self) -> Vec<BlockId>;
}

/// A control flow graph. The block at index zero is the entry.
pub trait ControlFlowGraph {
    type Block: CfgBlock;
    fn blocks(&self) -> &[Self::Block];
}

pub fn print<G, OpPrinter>(cfg: &G, printer: OpPrinter) -> String
where
    G: ControlFlowGraph,
    OpPrinter: Fn(&<<G as ControlFlowGraph>::Block as CfgBlock>::Element) -> String,
{
    let mut output = "digraph CFG {\n".to_owned();
    for (counter, block) in cfg.blocks().iter().enumerate() {
        write!(output, "  Node_{}[label=\"", counter).unwrap();
        let text: Vec<_> = block.operations().iter().map(&printer).collect();
        output.push_str(&text.join("\\n"));
        output.push_str("\"]\n");
    }
    output.push('\n');
    for (counter, block) in cfg.blocks().iter().enumerate() {
        for next in block.successors() {
            writeln!(output, "  Node_{} -> Node_{}", counter, next.0).unwrap();
        }
    }
    output.push_str("}\n");
    output
}

/// A worklist that always hands out the queued block that comes first in
/// reverse post-order. Pushing a block that is already queued is a no-op.
pub struct RpoWorklist {
    queue: PriorityQueue<BlockId, Reverse<usize>>,
    rpo_order: Vec<usize>,
}

impl RpoWorklist {
    pub fn new<G: ControlFlowGraph>(cfg: &G) -> Self {
        let block_count = cfg.blocks().len();
        let mut post_order = Vec::with_capacity(block_count);
        let mut visited = vec![false; block_count];

        if block_count > 0 {
            // Successors are visited in reverse so the first successor of a
            // block is also the first in reverse post-order.
            let mut stack: Vec<(BlockId, Vec<BlockId>)> = Vec::new();
            visited[0] = true;
            stack.push((BlockId(0), cfg.blocks()[0].successors()));
            while let Some((block, pending)) = stack.last_mut() {
                if let Some(next) = pending.pop() {
                    if !visited[next.0] {
                        visited[next.0] = true;
                        let successors = cfg.blocks()[next.0].successors();
                        stack.push((next, successors));
                    }
                } else {
                    post_order.push(*block);
                    stack.pop();
                }
            }
        }

        let mut rpo_order = vec![usize::MAX; block_count];
        for (order, block) in post_order.iter().rev().enumerate() {
            rpo_order[block.0] = order;
        }
        // Unreachable blocks go last, in index order.
        let mut next = post_order.len();
        for order in rpo_order.iter_mut().filter(|order| **order == usize::MAX) {
            *order = next;
            next += 1;
        }

        Self {
            queue: PriorityQueue::with_capacity(block_count),
            rpo_order,
        }
    }

    pub fn get_rpo_order(&self, block: BlockId) -> usize {
        self.rpo_order[block.0]
    }

    pub fn push(&mut self, block: BlockId) {
        self.queue.push(block, Reverse(self.rpo_order[block.0]));
    }

    pub fn pop(&mut self) -> Option<BlockId> {
        self.queue.pop().map(|(block, _)| block)
    }
}

/////////////////////
// Blocks and CFG. //
/////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialBlockKind {
    Entry,
    Exit,
    ExceptionalExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Regular,
    Conditional,
    Exception,
    Special(SpecialBlockKind),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// A straight line sequence of nodes with a single successor.
    Regular {
        nodes: Vec<NodeId>,
        successor: BlockId,
    },
    /// Branches on the value of the previously evaluated condition.
    Conditional {
        then_successor: BlockId,
        else_successor: BlockId,
    },
    /// A single node that may throw. Handlers are keyed by exception type.
    Exception {
        node: NodeId,
        successor: Option<BlockId>,
        exceptional_successors: BTreeMap<Type, BlockId>,
    },
    Special {
        kind: SpecialBlockKind,
        successor: Option<BlockId>,
    },
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Regular { .. } => BlockKind::Regular,
            Block::Conditional { .. } => BlockKind::Conditional,
            Block::Exception { .. } => BlockKind::Exception,
            Block::Special { kind, .. } => BlockKind::Special(*kind),
        }
    }

    pub fn nodes(&self) -> &[NodeId] {
        match self {
            Block::Regular { nodes, .. } => nodes,
            Block::Exception { node, .. } => core::slice::from_ref(node),
            Block::Conditional { .. } | Block::Special { .. } => &[],
        }
    }
}

impl CfgBlock for Block {
    type Element = NodeId;

    fn operations(&self) -> &[NodeId] {
        self.nodes()
    }

    fn successors(&self) -> Vec<BlockId> {
        match self {
            Block::Regular { successor, .. } => vec![*successor],
            Block::Conditional {
                then_successor,
                else_successor,
            } => vec![*then_successor, *else_successor],
            Block::Exception {
                successor,
                exceptional_successors,
                ..
            } => successor
                .iter()
                .chain(exceptional_successors.values())
                .copied()
                .collect(),
            Block::Special { successor, .. } => successor.iter().copied().collect(),
        }
    }
}

/// The code a control flow graph was built from.
#[derive(Debug, Clone, PartialEq)]
pub enum UnderlyingAst {
    Method {
        tree: TreeId,
        method: Rc<MethodElement>,
        parameters: Vec<Rc<VariableElement>>,
        class: Rc<ClassElement>,
        is_constructor: bool,
    },
    /// Field initializers and initializer blocks.
    Arbitrary {
        tree: TreeId,
        class: Rc<ClassElement>,
    },
}

impl UnderlyingAst {
    pub fn tree(&self) -> TreeId {
        match self {
            UnderlyingAst::Method { tree, .. } | UnderlyingAst::Arbitrary { tree, .. } => *tree,
        }
    }

    pub fn class(&self) -> &Rc<ClassElement> {
        match self {
            UnderlyingAst::Method { class, .. } | UnderlyingAst::Arbitrary { class, .. } => class,
        }
    }

    pub fn method(&self) -> Option<&Rc<MethodElement>> {
        match self {
            UnderlyingAst::Method { method, .. } => Some(method),
            UnderlyingAst::Arbitrary { .. } => None,
        }
    }

    pub fn parameters(&self) -> &[Rc<VariableElement>] {
        match self {
            UnderlyingAst::Method { parameters, .. } => parameters,
            UnderlyingAst::Arbitrary { .. } => &[],
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(
            self,
            UnderlyingAst::Method {
                is_constructor: true,
                ..
            }
        )
    }
}

/// Control flow graph of a method body, field initializer or initializer
/// block. Built with [`CfgBuilder`], immutable afterwards.
#[derive(Debug, Clone)]
pub struct Cfg {
    underlying: UnderlyingAst,
    blocks: Vec<Block>,
    nodes: Vec<Node>,
    tree_lookup: HashMap<TreeId, NodeId>,
}

impl ControlFlowGraph for Cfg {
    type Block = Block;

    fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

impl Cfg {
    /// Graphs are identified by the tree they were built from.
    pub fn id(&self) -> TreeId {
        self.underlying.tree()
    }

    pub fn underlying(&self) -> &UnderlyingAst {
        &self.underlying
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn regular_exit(&self) -> BlockId {
        BlockId(1)
    }

    pub fn exceptional_exit(&self) -> BlockId {
        BlockId(2)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_for_tree(&self, tree: TreeId) -> Option<NodeId> {
        self.tree_lookup.get(&tree).copied()
    }

    pub fn tree_lookup(&self) -> &HashMap<TreeId, NodeId> {
        &self.tree_lookup
    }

    pub fn return_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind(), NodeKind::Return { .. }))
            .map(Node::id)
            .collect()
    }

    /// Source-like rendering of a node, used for debugging output.
    pub fn node_label(&self, id: NodeId) -> String {
        let node = self.node(id);
        let label = |id: &NodeId| self.node_label(*id);
        let list = |ids: &[NodeId]| ids.iter().map(label).collect::<Vec<_>>().join(", ");
        match node.kind() {
            NodeKind::LocalVariable(var) => var.name.to_string(),
            NodeKind::VariableDeclaration(var) => format!("{} {}", var.ty, var.name),
            NodeKind::FieldAccess { receiver, field } => {
                format!("{}.{}", label(receiver), field.name)
            }
            NodeKind::This { .. } => "this".to_owned(),
            NodeKind::ClassName(class) => class.name.to_string(),
            NodeKind::ValueLiteral(literal) => literal.to_string(),
            NodeKind::MethodAccess { receiver, method } => {
                format!("{}.{}", label(receiver), method.name)
            }
            NodeKind::MethodInvocation { target, arguments } => {
                format!("{}({})", label(target), list(arguments))
            }
            NodeKind::ObjectCreation {
                constructor,
                arguments,
            } => format!("new {}({})", constructor.owner, list(arguments)),
            NodeKind::Assignment { target, expression } => {
                format!("{} = {}", label(target), label(expression))
            }
            NodeKind::CompoundAssignment {
                operator,
                target,
                operand,
            } => format!("{} {}= {}", label(target), operator, label(operand)),
            NodeKind::BinaryOperation {
                operator,
                left,
                right,
            } => format!("({} {} {})", label(left), operator, label(right)),
            NodeKind::UnaryOperation { operator, operand } => {
                let op = match operator {
                    UnaryOperator::Minus => "-",
                    UnaryOperator::Plus => "+",
                    UnaryOperator::BitwiseComplement => "~",
                };
                format!("{op}{}", label(operand))
            }
            NodeKind::EqualTo { left, right } => format!("({} == {})", label(left), label(right)),
            NodeKind::NotEqual { left, right } => {
                format!("({} != {})", label(left), label(right))
            }
            NodeKind::ConditionalNot { operand } => format!("!({})", label(operand)),
            NodeKind::Ternary {
                condition,
                then_operand,
                else_operand,
            } => format!(
                "({} ? {} : {})",
                label(condition),
                label(then_operand),
                label(else_operand)
            ),
            NodeKind::TypeCast { operand, target } => format!("({target}) {}", label(operand)),
            NodeKind::InstanceOf { operand, tested } => {
                format!("({} instanceof {tested})", label(operand))
            }
            NodeKind::ArrayAccess { array, index } => format!("{}[{}]", label(array), label(index)),
            NodeKind::Assert { condition } => format!("assert {}", label(condition)),
            NodeKind::Case {
                case_expression, ..
            } => format!("case {}:", label(case_expression)),
            NodeKind::Return { result: None } => "return".to_owned(),
            NodeKind::Return {
                result: Some(result),
            } => format!("return {}", label(result)),
            NodeKind::Throw { expression } => format!("throw {}", label(expression)),
            NodeKind::Conversion { kind, operand } => format!("{kind:?}({})", label(operand)),
        }
    }
}

/////////////////
// CFG builder //
/////////////////

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfgError {
    #[error("block {0:?} does not exist")]
    UnknownBlock(BlockId),
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0} is not part of any block")]
    UnattachedNode(NodeId),
    #[error("node {0} is part of more than one block")]
    NodeInMultipleBlocks(NodeId),
    #[error("block {0:?} has no successor")]
    MissingSuccessor(BlockId),
    #[error("conditional block {0:?} needs both a then and an else successor")]
    MissingBranch(BlockId),
    #[error("operation not supported by the kind of block {0:?}")]
    WrongBlockKind(BlockId),
}

#[derive(Debug, Clone)]
enum PendingBlock {
    Regular {
        nodes: Vec<NodeId>,
        successor: Option<BlockId>,
    },
    Conditional {
        then_successor: Option<BlockId>,
        else_successor: Option<BlockId>,
    },
    Exception {
        node: NodeId,
        successor: Option<BlockId>,
        exceptional_successors: BTreeMap<Type, BlockId>,
    },
    Special {
        kind: SpecialBlockKind,
        successor: Option<BlockId>,
    },
}

impl PendingBlock {
    fn nodes(&self) -> &[NodeId] {
        match self {
            PendingBlock::Regular { nodes, .. } => nodes,
            PendingBlock::Exception { node, .. } => core::slice::from_ref(node),
            PendingBlock::Conditional { .. } | PendingBlock::Special { .. } => &[],
        }
    }
}

/// Incrementally builds a [`Cfg`]. The entry, regular exit and exceptional
/// exit blocks are created up front. Structural errors are collected while
/// building and reported by [`CfgBuilder::build`].
#[derive(Debug, Clone)]
pub struct CfgBuilder {
    underlying: UnderlyingAst,
    nodes: Vec<(NodeKind, Type, Option<TreeId>)>,
    blocks: Vec<PendingBlock>,
    errors: Vec<CfgError>,
}

impl CfgBuilder {
    pub fn new(underlying: UnderlyingAst) -> Self {
        let special = |kind| PendingBlock::Special {
            kind,
            successor: None,
        };
        Self {
            underlying,
            nodes: Vec::new(),
            blocks: vec![
                special(SpecialBlockKind::Entry),
                special(SpecialBlockKind::Exit),
                special(SpecialBlockKind::ExceptionalExit),
            ],
            errors: Vec::new(),
        }
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn regular_exit(&self) -> BlockId {
        BlockId(1)
    }

    pub fn exceptional_exit(&self) -> BlockId {
        BlockId(2)
    }

    pub fn add_node(&mut self, kind: NodeKind, ty: Type, tree: Option<TreeId>) -> NodeId {
        self.nodes.push((kind, ty, tree));
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_regular_block(&mut self, nodes: Vec<NodeId>) -> BlockId {
        self.push_block(PendingBlock::Regular {
            nodes,
            successor: None,
        })
    }

    pub fn add_conditional_block(&mut self) -> BlockId {
        self.push_block(PendingBlock::Conditional {
            then_successor: None,
            else_successor: None,
        })
    }

    pub fn add_exception_block(&mut self, node: NodeId) -> BlockId {
        self.push_block(PendingBlock::Exception {
            node,
            successor: None,
            exceptional_successors: BTreeMap::new(),
        })
    }

    /// Set the normal successor of a regular, exception or special block.
    pub fn set_successor(&mut self, block: BlockId, next: BlockId) -> &mut Self {
        match self.blocks.get_mut(block.0) {
            Some(
                PendingBlock::Regular { successor, .. }
                | PendingBlock::Exception { successor, .. }
                | PendingBlock::Special { successor, .. },
            ) => *successor = Some(next),
            Some(PendingBlock::Conditional { .. }) => {
                self.errors.push(CfgError::WrongBlockKind(block))
            }
            None => self.errors.push(CfgError::UnknownBlock(block)),
        }
        self
    }

    pub fn set_branches(&mut self, block: BlockId, then_block: BlockId, else_block: BlockId) -> &mut Self {
        match self.blocks.get_mut(block.0) {
            Some(PendingBlock::Conditional {
                then_successor,
                else_successor,
            }) => {
                *then_successor = Some(then_block);
                *else_successor = Some(else_block);
            }
            Some(_) => self.errors.push(CfgError::WrongBlockKind(block)),
            None => self.errors.push(CfgError::UnknownBlock(block)),
        }
        self
    }

    pub fn add_exceptional_successor(
        &mut self,
        block: BlockId,
        exception: Type,
        handler: BlockId,
    ) -> &mut Self {
        match self.blocks.get_mut(block.0) {
            Some(PendingBlock::Exception {
                exceptional_successors,
                ..
            }) => {
                exceptional_successors.insert(exception, handler);
            }
            Some(_) => self.errors.push(CfgError::WrongBlockKind(block)),
            None => self.errors.push(CfgError::UnknownBlock(block)),
        }
        self
    }

    pub fn build(self) -> Result<Cfg, CfgError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }

        let block_count = self.blocks.len();
        let node_count = self.nodes.len();
        let check_block = |id: BlockId| {
            if id.0 < block_count {
                Ok(id)
            } else {
                Err(CfgError::UnknownBlock(id))
            }
        };
        let check_node = |id: NodeId| {
            if id.0 < node_count {
                Ok(id)
            } else {
                Err(CfgError::UnknownNode(id))
            }
        };

        let mut owner: Vec<Option<BlockId>> = vec![None; node_count];
        for (index, block) in self.blocks.iter().enumerate() {
            for &node in block.nodes() {
                check_node(node)?;
                if owner[node.0].replace(BlockId(index)).is_some() {
                    return Err(CfgError::NodeInMultipleBlocks(node));
                }
            }
        }

        let mut blocks = Vec::with_capacity(block_count);
        for (index, block) in self.blocks.into_iter().enumerate() {
            let id = BlockId(index);
            let block = match block {
                PendingBlock::Regular { nodes, successor } => Block::Regular {
                    nodes,
                    successor: check_block(successor.ok_or(CfgError::MissingSuccessor(id))?)?,
                },
                PendingBlock::Conditional {
                    then_successor: Some(then_successor),
                    else_successor: Some(else_successor),
                } => Block::Conditional {
                    then_successor: check_block(then_successor)?,
                    else_successor: check_block(else_successor)?,
                },
                PendingBlock::Conditional { .. } => return Err(CfgError::MissingBranch(id)),
                PendingBlock::Exception {
                    node,
                    successor,
                    exceptional_successors,
                } => {
                    successor.map(check_block).transpose()?;
                    for handler in exceptional_successors.values() {
                        check_block(*handler)?;
                    }
                    Block::Exception {
                        node,
                        successor,
                        exceptional_successors,
                    }
                }
                PendingBlock::Special { kind, successor } => {
                    if kind == SpecialBlockKind::Entry && successor.is_none() {
                        return Err(CfgError::MissingSuccessor(id));
                    }
                    successor.map(check_block).transpose()?;
                    Block::Special { kind, successor }
                }
            };
            blocks.push(block);
        }

        let mut nodes = Vec::with_capacity(node_count);
        let mut tree_lookup = HashMap::new();
        for (index, (kind, ty, tree)) in self.nodes.into_iter().enumerate() {
            let id = NodeId(index);
            for operand in kind.operands() {
                check_node(operand)?;
            }
            let block = owner[index].ok_or(CfgError::UnattachedNode(id))?;
            if let Some(tree) = tree {
                tree_lookup.insert(tree, id);
            }
            nodes.push(Node {
                id,
                kind,
                ty,
                tree,
                block,
            });
        }

        Ok(Cfg {
            underlying: self.underlying,
            blocks,
            nodes,
            tree_lookup,
        })
    }

    fn push_block(&mut self, block: PendingBlock) -> BlockId {
        self.blocks.push(block);
        BlockId(self.blocks.len() - 1)
    }
}
