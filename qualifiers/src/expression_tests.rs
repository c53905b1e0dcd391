use std::rc::Rc;

use dataflow::cfg::CfgBuilder;
use dataflow::elements::{FieldElement, MethodElement, Purity, Type};
use dataflow::node::Literal;
use dataflow::receiver::{PureMethodCall, Receiver};

use super::expression::{
    FlowExpressionContext, FlowExpressionParseError, parameter_indices, parse,
};
use super::symbols::SymbolTable;
use super::test_utils::*;

fn base_type() -> Type {
    Type::declared("Base")
}

fn inner_type() -> Type {
    Type::declared("Inner")
}

struct Fixture {
    symbols: SymbolTable,
    f: Rc<FieldElement>,
    base_field: Rc<FieldElement>,
    constant: Rc<FieldElement>,
    get: Rc<MethodElement>,
    lookup: Rc<MethodElement>,
}

/// class Base { Object b; }
/// class C extends Base {
///   Object f; static Object CONSTANT;
///   @Pure C get(); @Pure Object lookup(Object o); void mutate();
///   class Inner {}
/// }
fn fixture() -> Fixture {
    let f = field("f");
    let base_field = Rc::new(FieldElement::new("b", base_type(), object()));
    let constant = Rc::new(FieldElement::new("CONSTANT", class_type(), object()).with_static(true));
    let get = method("get", vec![], class_type(), Purity::PURE);
    let lookup = method("lookup", vec![object()], object(), Purity::PURE);
    let mutate = method("mutate", vec![], object(), Purity::NONE);

    let mut symbols = SymbolTable::new();
    symbols
        .add_class(object(), None)
        .add_class(base_type(), Some(object()))
        .add_class(class_type(), Some(base_type()))
        .add_class(inner_type(), Some(object()))
        .add_nested_class(inner_type(), class_type())
        .add_field(f.clone())
        .add_field(base_field.clone())
        .add_field(constant.clone())
        .add_method(get.clone())
        .add_method(lookup.clone())
        .add_method(mutate);
    Fixture {
        symbols,
        f,
        base_field,
        constant,
        get,
        lookup,
    }
}

fn this() -> Receiver {
    Receiver::this(class_type())
}

fn parameter() -> Receiver {
    Receiver::local(dataflow::elements::VariableElement::new("p", 0, class_type()))
}

fn context() -> FlowExpressionContext {
    FlowExpressionContext::new(this(), vec![parameter(), Receiver::local(var("q", 1))])
}

#[test]
fn literals() {
    let fixture = fixture();
    let parse = |s: &str| parse(s, &context(), &fixture.symbols);
    assert_eq!(parse("42"), Ok(Receiver::literal(int(), Literal::Int(42))));
    assert_eq!(parse("0"), Ok(Receiver::literal(int(), Literal::Int(0))));
    assert_eq!(
        parse("7L"),
        Ok(Receiver::literal(Type::primitive("long"), Literal::Long(7)))
    );
    assert_eq!(
        parse("\"a.b(c)\""),
        Ok(Receiver::literal(string(), Literal::string("a.b(c)")))
    );
    assert_eq!(parse("null"), Ok(Receiver::literal(Type::null(), Literal::Null)));
    assert!(parse("007").is_err());
}

#[test]
fn this_super_and_parameters() {
    let fixture = fixture();
    let parse = |s: &str| parse(s, &context(), &fixture.symbols);
    assert_eq!(parse("this"), Ok(this()));
    assert_eq!(parse("super").map(|r| r.ty().clone()), Ok(base_type()));
    assert_eq!(parse("#1"), Ok(parameter()));
    assert_eq!(parse(" #2 "), Ok(Receiver::local(var("q", 1))));
    assert_eq!(parse("#3"), Err(FlowExpressionParseError::IndexTooBig(3)));
    assert_eq!(parse("#0"), Err(FlowExpressionParseError::Parse("#0".to_owned())));

    let object_context = FlowExpressionContext::new(Receiver::this(object()), vec![]);
    assert_eq!(
        super::expression::parse("super", &object_context, &fixture.symbols),
        Err(FlowExpressionParseError::NoSuperclass("Object".to_owned()))
    );
}

#[test]
fn fields() {
    let fixture = fixture();
    let parse = |s: &str| parse(s, &context(), &fixture.symbols);
    let this_f = Receiver::field(this(), fixture.f.clone());
    assert_eq!(parse("f"), Ok(this_f.clone()));
    assert_eq!(parse("this.f"), Ok(this_f));
    // Inherited fields.
    assert_eq!(parse("b"), Ok(Receiver::field(this(), fixture.base_field.clone())));
    assert_eq!(parse("#1.f"), Ok(Receiver::field(parameter(), fixture.f.clone())));

    let constant = Receiver::field(Receiver::class_name(class_type()), fixture.constant.clone());
    assert_eq!(parse("CONSTANT"), Ok(constant.clone()));
    assert_eq!(parse("C.CONSTANT"), Ok(constant));
    assert_eq!(parse("C"), Ok(Receiver::class_name(class_type())));

    assert_eq!(parse("g"), Err(FlowExpressionParseError::Parse("g".to_owned())));
    assert!(parse("f.").is_err());
    assert!(parse(".f").is_err());
}

#[test]
fn fields_of_enclosing_classes() {
    let fixture = fixture();
    let inner = Receiver::this(inner_type());
    let context = FlowExpressionContext::new(inner.clone(), vec![]);
    assert_eq!(
        parse("f", &context, &fixture.symbols),
        Ok(Receiver::field(inner, fixture.f.clone()))
    );
}

#[test]
fn method_calls() {
    let fixture = fixture();
    let parse = |s: &str| parse(s, &context(), &fixture.symbols);
    let get = Receiver::PureMethodCall(PureMethodCall::new(
        class_type(),
        fixture.get.clone(),
        this(),
        vec![],
    ));
    assert_eq!(parse("get()"), Ok(get.clone()));
    assert_eq!(parse("this.get().f"), Ok(Receiver::field(get.clone(), fixture.f.clone())));

    let lookup = |receiver: Receiver, argument: Receiver| {
        Receiver::PureMethodCall(PureMethodCall::new(
            object(),
            fixture.lookup.clone(),
            receiver,
            vec![argument],
        ))
    };
    assert_eq!(parse("lookup(#1)"), Ok(lookup(this(), parameter())));
    assert_eq!(
        parse("lookup(get().f)"),
        Ok(lookup(this(), Receiver::field(get, fixture.f.clone())))
    );
    // Arguments are resolved against the outer receiver.
    assert_eq!(
        parse("#1.lookup(f)"),
        Ok(lookup(parameter(), Receiver::field(this(), fixture.f.clone())))
    );
    assert_eq!(parse("lookup(\"a,b\")").map(|r| r.to_string()), Ok("this.lookup(\"a,b\")".to_owned()));
}

#[test]
fn invalid_method_calls() {
    let fixture = fixture();
    let parse = |s: &str| parse(s, &context(), &fixture.symbols);
    assert_eq!(
        parse("mutate()"),
        Err(FlowExpressionParseError::NotDeterministic("mutate".to_owned()))
    );
    assert_eq!(parse("lookup(,)"), Err(FlowExpressionParseError::Parse(",".to_owned())));
    assert!(parse("lookup(f").is_err());
    assert!(parse("lookup(f))").is_err());
    // No overload takes two arguments.
    assert_eq!(
        parse("lookup(f, f)"),
        Err(FlowExpressionParseError::Parse("lookup".to_owned()))
    );
    assert_eq!(parse("get(#4)"), Err(FlowExpressionParseError::IndexTooBig(4)));
}

#[test]
fn parameter_indices_in_expressions() {
    assert_eq!(parameter_indices("#1.lookup(#2, #10)"), vec![1, 2, 10]);
    assert!(parameter_indices("this.f").is_empty());
}

#[test]
fn contexts() {
    let p = var("p", 0);
    let ast = method_ast("m", 100, vec![p.clone()]);
    let context = FlowExpressionContext::for_declaration(&ast);
    assert_eq!(context.receiver, this());
    assert_eq!(context.arguments, vec![Receiver::local(p.clone())]);

    let lookup = method("lookup", vec![object()], object(), Purity::PURE);
    let mut builder = CfgBuilder::new(ast);
    let argument = local(&mut builder, &p, None);
    let mut nodes = vec![argument];
    nodes.extend(call(&mut builder, &lookup, vec![argument], None));
    let receiver = nodes[1];
    let cfg = straight_line(builder, nodes);
    let context = FlowExpressionContext::for_use(&cfg, receiver, &lookup, &[argument]);
    assert_eq!(context.receiver, this());
    assert_eq!(context.arguments, vec![Receiver::local(p)]);

    let changed = context.change_receiver(Receiver::class_name(class_type()));
    assert_eq!(changed.outer_receiver, this());
    assert_eq!(changed.use_outer_receiver().receiver, this());

    let static_lookup = Rc::new(
        MethodElement::new("lookup", class_type(), vec![object()], object()).with_static(true),
    );
    let context = FlowExpressionContext::for_use(&cfg, receiver, &static_lookup, &[argument]);
    assert_eq!(context.receiver, Receiver::class_name(class_type()));
}
