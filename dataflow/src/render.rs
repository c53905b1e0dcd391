use core::fmt::{Debug, Write};

use crate::cfg::{Block, BlockId, Cfg, ControlFlowGraph, SpecialBlockKind};
use crate::domains::Store;
use crate::result::{AnalysisResult, BlockRef, NodeRef};

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render a graph in DOT format. When an analysis result is given, each
/// block shows the store flowing into it and each node its computed value.
pub fn visualize<V, S>(cfg: &Cfg, result: Option<&AnalysisResult<V, S>>) -> String
where
    V: Debug,
    S: Store,
{
    let mut output = "digraph {\n    node [shape=rectangle];\n\n".to_owned();

    for (index, block) in cfg.blocks().iter().enumerate() {
        let block_id = BlockId(index);
        match block {
            Block::Conditional { .. } => {
                writeln!(output, "    {index} [shape=polygon sides=8 label=\"\"];").unwrap();
            }
            Block::Special { kind, .. } => {
                let label = match kind {
                    SpecialBlockKind::Entry => "<entry>",
                    SpecialBlockKind::Exit => "<exit>",
                    SpecialBlockKind::ExceptionalExit => "<exceptional-exit>",
                };
                writeln!(output, "    {index} [shape=oval label=\"{label}\"];").unwrap();
            }
            Block::Regular { .. } | Block::Exception { .. } => {
                let mut lines = Vec::new();
                if let Some(result) = result {
                    let input = result.block_input(BlockRef {
                        cfg: cfg.id(),
                        block: block_id,
                    });
                    if let Some(dot) = input.and_then(|stores| stores.then_store().to_dot()) {
                        if !dot.is_empty() {
                            lines.push(dot);
                            lines.push("~~~~~~~~~".to_owned());
                        }
                    }
                }
                for &node in block.nodes() {
                    let mut line = format!(
                        "{}   [ {} ]",
                        escape(&cfg.node_label(node)),
                        cfg.node(node).kind().name()
                    );
                    let value = result.and_then(|result| {
                        result.value(NodeRef {
                            cfg: cfg.id(),
                            node,
                        })
                    });
                    if let Some(value) = value {
                        write!(line, "    > {}", escape(&format!("{value:?}"))).unwrap();
                    }
                    lines.push(line);
                }
                writeln!(output, "    {index} [label=\"{}\"];", lines.join("\\n")).unwrap();
            }
        }
    }
    output.push('\n');

    for (index, block) in cfg.blocks().iter().enumerate() {
        match block {
            Block::Regular { successor, .. } => {
                writeln!(output, "    {index} -> {};", successor.0).unwrap();
            }
            Block::Conditional {
                then_successor,
                else_successor,
            } => {
                writeln!(output, "    {index} -> {} [label=\"then\"];", then_successor.0).unwrap();
                writeln!(output, "    {index} -> {} [label=\"else\"];", else_successor.0).unwrap();
            }
            Block::Exception {
                successor,
                exceptional_successors,
                ..
            } => {
                if let Some(successor) = successor {
                    writeln!(output, "    {index} -> {};", successor.0).unwrap();
                }
                for (exception, handler) in exceptional_successors {
                    writeln!(
                        output,
                        "    {index} -> {} [label=\"{}\"];",
                        handler.0,
                        escape(exception.name())
                    )
                    .unwrap();
                }
            }
            Block::Special { successor, .. } => {
                if let Some(successor) = successor {
                    writeln!(output, "    {index} -> {};", successor.0).unwrap();
                }
            }
        }
    }
    output.push_str("}\n");
    output
}
