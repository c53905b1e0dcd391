use super::cfg::CfgBuilder;
use super::elements::Type;
use super::node::NodeKind;
use super::render::visualize;
use super::solvers::ForwardSolver;
use super::test_utils::*;

#[test]
fn test_visualize_with_results() {
    let p = var("p", 0);
    let x = var("x", 1);
    let mut builder = CfgBuilder::new(method_ast(vec![p]));
    let target = local(&mut builder, &x, None);
    let null = null_literal(&mut builder);
    let write = assign(&mut builder, target, null, None);
    let block = builder.add_regular_block(vec![target, null, write]);
    builder.set_successor(ENTRY, block).set_successor(block, EXIT);
    let cfg = builder.build().unwrap();

    let result = ForwardSolver::default()
        .solve::<Nullness, NullStore, _>(&cfg, &context(), &mut NullnessTransfer::default())
        .unwrap();
    let expected = r#"digraph {
    node [shape=rectangle];

    0 [shape=oval label="<entry>"];
    1 [shape=oval label="<exit>"];
    2 [shape=oval label="<exceptional-exit>"];
    3 [label="p > Nullable\n~~~~~~~~~\nx   [ local variable ]    > Nullable\nnull   [ literal ]    > Null\nx = null   [ assignment ]    > Null"];

    0 -> 3;
    3 -> 1;
}
"#;
    assert_eq!(visualize(&cfg, Some(&result)), expected);
}

#[test]
fn test_visualize_branches_and_handlers() {
    let p = var("p", 0);
    let mut builder = CfgBuilder::new(method_ast(vec![p.clone()]));
    let p_read = local(&mut builder, &p, None);
    let null = null_literal(&mut builder);
    let test = builder.add_node(
        NodeKind::EqualTo {
            left: p_read,
            right: null,
        },
        Type::primitive("boolean"),
        None,
    );
    let ret = builder.add_node(NodeKind::Return { result: None }, Type::primitive("void"), None);
    let created = new_object(&mut builder);

    let head = builder.add_regular_block(vec![p_read, null, test]);
    let branch = builder.add_conditional_block();
    let returning = builder.add_regular_block(vec![ret]);
    let throwing = builder.add_exception_block(created);
    builder
        .set_successor(ENTRY, head)
        .set_successor(head, branch)
        .set_branches(branch, returning, throwing)
        .set_successor(returning, EXIT)
        .set_successor(throwing, EXIT)
        .add_exceptional_successor(throwing, Type::declared("Exception"), EXCEPTIONAL_EXIT);
    let cfg = builder.build().unwrap();

    let expected = r#"digraph {
    node [shape=rectangle];

    0 [shape=oval label="<entry>"];
    1 [shape=oval label="<exit>"];
    2 [shape=oval label="<exceptional-exit>"];
    3 [label="p   [ local variable ]\nnull   [ literal ]\n(p == null)   [ equal to ]"];
    4 [shape=polygon sides=8 label=""];
    5 [label="return   [ return ]"];
    6 [label="new Object()   [ object creation ]"];

    0 -> 3;
    3 -> 4;
    4 -> 5 [label="then"];
    4 -> 6 [label="else"];
    5 -> 1;
    6 -> 1;
    6 -> 2 [label="Exception"];
}
"#;
    assert_eq!(visualize::<Nullness, NullStore>(&cfg, None), expected);
}
