use std::rc::Rc;

use super::cfg::{Cfg, CfgBuilder};
use super::elements::{FieldElement, MethodElement, Purity, Type, VariableElement};
use super::node::{Literal, NodeId, NodeKind};
use super::receiver::*;
use super::test_utils::*;

fn field(name: &str, is_final: bool) -> Rc<FieldElement> {
    Rc::new(FieldElement::new(name, class_type(), object()).with_final(is_final))
}

fn call_graph(purity: Purity, is_static: bool) -> (Cfg, NodeId) {
    let x = var("x", 0);
    let mut builder = CfgBuilder::new(method_ast(vec![x.clone()]));
    let receiver = local(&mut builder, &x, None);
    let argument = builder.add_node(
        NodeKind::ValueLiteral(Literal::Int(1)),
        Type::primitive("int"),
        None,
    );
    let method = MethodElement::new("get", object(), vec![Type::primitive("int")], object())
        .with_purity(purity)
        .with_static(is_static);
    let access = builder.add_node(
        NodeKind::MethodAccess {
            receiver,
            method: Rc::new(method),
        },
        object(),
        None,
    );
    let call = builder.add_node(
        NodeKind::MethodInvocation {
            target: access,
            arguments: vec![argument],
        },
        object(),
        None,
    );
    let block = builder.add_regular_block(vec![receiver, argument, access, call]);
    builder.set_successor(ENTRY, block).set_successor(block, EXIT);
    (builder.build().unwrap(), call)
}

#[test]
fn deterministic_calls_become_pure_method_calls() {
    let (cfg, call) = call_graph(Purity::DETERMINISTIC, false);
    let Receiver::PureMethodCall(receiver) = Receiver::from_node(&cfg, call) else {
        panic!("expected a pure method call");
    };
    assert_eq!(receiver.receiver(), &Receiver::local(var("x", 0)));
    assert_eq!(receiver.parameters().len(), 1);
    assert_eq!(Receiver::PureMethodCall(receiver).to_string(), "x.get(1)");

    let (cfg, call) = call_graph(Purity::DETERMINISTIC, true);
    let Receiver::PureMethodCall(receiver) = Receiver::from_node(&cfg, call) else {
        panic!("expected a pure method call");
    };
    assert_eq!(receiver.receiver(), &Receiver::class_name(object()));
}

#[test]
fn other_calls_are_unknown() {
    for purity in [Purity::NONE, Purity::SIDE_EFFECT_FREE] {
        let (cfg, call) = call_graph(purity, false);
        let receiver = Receiver::from_node(&cfg, call);
        assert!(matches!(receiver, Receiver::Unknown(_)));
        assert!(receiver.contains_unknown());
    }
}

#[test]
fn static_field_access_uses_class_receiver() {
    let mut builder = CfgBuilder::new(method_ast(vec![]));
    let receiver = this(&mut builder);
    let element = Rc::new(FieldElement::new("INSTANCE", class_type(), object()).with_static(true));
    let access = builder.add_node(
        NodeKind::FieldAccess {
            receiver,
            field: element.clone(),
        },
        object(),
        None,
    );
    let block = builder.add_regular_block(vec![receiver, access]);
    builder.set_successor(ENTRY, block).set_successor(block, EXIT);
    let cfg = builder.build().unwrap();

    assert_eq!(
        Receiver::from_node(&cfg, access),
        Receiver::field(Receiver::class_name(class_type()), element)
    );
    assert_eq!(Receiver::from_node(&cfg, receiver), Receiver::this(Type::declared("Other")));
}

#[test]
fn unknowns_are_never_equal() {
    let a = Receiver::unknown(object());
    let b = Receiver::unknown(object());
    assert_ne!(a, b);
    assert!(!a.syntactic_equals(&b));
    assert!(a.syntactic_equals(&a.clone()));
}

#[test]
fn contains_unknown_propagates_outward() {
    let inner = Receiver::field(Receiver::unknown(object()), field("f", true));
    let outer = Receiver::field(inner.clone(), field("g", true));
    assert!(inner.contains_unknown());
    assert!(outer.contains_unknown());
    assert!(!Receiver::field(Receiver::local(var("x", 0)), field("f", false)).contains_unknown());
}

#[test]
fn unmodifiable_by_other_code() {
    let x = Receiver::local(var("x", 0));
    assert!(x.is_unmodifiable_by_other_code());
    assert!(Receiver::this(class_type()).is_unmodifiable_by_other_code());
    assert!(Receiver::class_name(class_type()).is_unmodifiable_by_other_code());
    assert!(Receiver::literal(Type::null(), Literal::Null).is_unmodifiable_by_other_code());

    let final_field = Receiver::field(x.clone(), field("f", true));
    assert!(final_field.is_unmodifiable_by_other_code());
    assert!(!Receiver::field(x.clone(), field("g", false)).is_unmodifiable_by_other_code());

    // A final field of a mutable field is still mutable.
    let nested = Receiver::field(Receiver::field(x, field("g", false)), field("f", true));
    assert!(!nested.is_unmodifiable_by_other_code());
    assert!(!Receiver::unknown(object()).is_unmodifiable_by_other_code());
}

#[test]
fn syntactic_equality_and_containment() {
    let x = Receiver::local(var("x", 0));
    let y = Receiver::local(var("y", 1));
    let x_f = Receiver::field(x.clone(), field("f", false));
    let x_f_g = Receiver::field(x_f.clone(), field("g", false));

    assert!(x_f.syntactic_equals(&Receiver::field(x.clone(), field("f", false))));
    assert!(!x_f.syntactic_equals(&Receiver::field(y.clone(), field("f", false))));
    assert!(Receiver::this(class_type()).syntactic_equals(&Receiver::this(object())));

    assert!(x_f_g.contains_syntactic_equal_receiver(&x));
    assert!(x_f_g.contains_syntactic_equal_receiver(&x_f));
    assert!(!x_f_g.contains_syntactic_equal_receiver(&y));

    let method = Rc::new(MethodElement::new("get", object(), vec![object()], object()));
    let call = PureMethodCall::new(object(), method, y.clone(), vec![x_f.clone()]);
    let Receiver::LocalVariable(x_var) = &x else {
        unreachable!()
    };
    assert!(call.contains_syntactic_equal_parameter(x_var));
    assert!(Receiver::PureMethodCall(call).contains_syntactic_equal_receiver(&x));
}

#[test]
fn aliasing_follows_types() {
    let types = types();
    let node = Receiver::local(VariableElement::new("n", 0, Type::declared("Node")));
    let string = Receiver::local(VariableElement::new("s", 1, Type::declared("String")));
    let any = Receiver::local(var("o", 2));

    assert!(!can_alias(&types, &node, &string));
    assert!(can_alias(&types, &node, &any));
    assert!(!node.contains_alias_of(&types, &string));

    let node_field = Receiver::field(
        node.clone(),
        Rc::new(FieldElement::new("next", Type::declared("Node"), Type::declared("String"))),
    );
    // The field itself has type String, so it may alias a String.
    assert!(node_field.contains_alias_of(&types, &string));
    assert!(Receiver::unknown(Type::primitive("int")).contains_alias_of(&types, &string));
}
