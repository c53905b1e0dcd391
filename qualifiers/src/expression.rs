use dataflow::cfg::{Cfg, UnderlyingAst};
use dataflow::elements::{MethodElement, Type};
use dataflow::node::{Literal, NodeId};
use dataflow::receiver::{PureMethodCall, Receiver};
use regex::Regex;
use thiserror::Error;

use crate::symbols::SymbolResolver;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[a-zA-Z_$][a-zA-Z_$0-9]*$").expect("valid regex");
    static ref PARAMETER: Regex = Regex::new(r"^#([1-9][0-9]*)$").expect("valid regex");
    static ref PARAMETERS: Regex = Regex::new(r"#([1-9][0-9]*)").expect("valid regex");
    static ref METHOD: Regex =
        Regex::new(r"^([a-zA-Z_$][a-zA-Z_$0-9]*)\((.*)\)$").expect("valid regex");
    static ref INT: Regex = Regex::new(r"^(0|[1-9][0-9]*)$").expect("valid regex");
    static ref LONG: Regex = Regex::new(r"^(0|[1-9][0-9]*)L$").expect("valid regex");
    static ref STRING: Regex = Regex::new(r#"^"(?:[^"\\]|\\.)*"$"#).expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowExpressionParseError {
    #[error("cannot parse the expression '{0}'")]
    Parse(String),
    #[error("parameter index {0} is out of range")]
    IndexTooBig(usize),
    #[error("method {0} is not deterministic")]
    NotDeterministic(String),
    #[error("{0} has no superclass")]
    NoSuperclass(String),
}

/// What `this` and the `#n` parameters stand for while parsing.
///
/// Arguments of method calls are always resolved against the outer
/// receiver: in `a.get(f)`, `f` is a field of `this`, not of `a`.
#[derive(Debug, Clone)]
pub struct FlowExpressionContext {
    pub receiver: Receiver,
    pub outer_receiver: Receiver,
    pub arguments: Vec<Receiver>,
}

impl FlowExpressionContext {
    pub fn new(receiver: Receiver, arguments: Vec<Receiver>) -> Self {
        Self {
            outer_receiver: receiver.clone(),
            receiver,
            arguments,
        }
    }

    /// The context inside the body of a method: `this` is the enclosing
    /// class and the parameters are the declared ones.
    pub fn for_declaration(ast: &UnderlyingAst) -> Self {
        let receiver = Receiver::this(ast.class().ty.clone());
        let arguments = ast
            .parameters()
            .iter()
            .map(|p| Receiver::local(p.clone()))
            .collect();
        Self::new(receiver, arguments)
    }

    /// The context at a call site: `this` is the receiver of the call and
    /// the parameters are the actual arguments.
    pub fn for_use(cfg: &Cfg, receiver: NodeId, method: &MethodElement, arguments: &[NodeId]) -> Self {
        let receiver = if method.is_static {
            Receiver::class_name(method.owner.clone())
        } else {
            Receiver::from_node(cfg, receiver)
        };
        let arguments = arguments
            .iter()
            .map(|arg| Receiver::from_node(cfg, *arg))
            .collect();
        Self::new(receiver, arguments)
    }

    pub fn change_receiver(&self, receiver: Receiver) -> Self {
        Self {
            receiver,
            outer_receiver: self.outer_receiver.clone(),
            arguments: self.arguments.clone(),
        }
    }

    pub fn use_outer_receiver(&self) -> Self {
        self.change_receiver(self.outer_receiver.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Start,
    /// Right after a dot, only fields and methods can follow.
    Member,
}

/// Parse an expression written in a contract, like `this.f`, `#1` or
/// `get(#2).name`, into the receiver it refers to.
pub fn parse(
    expression: &str,
    context: &FlowExpressionContext,
    resolver: &dyn SymbolResolver,
) -> Result<Receiver, FlowExpressionParseError> {
    parse_at(expression, context, resolver, Position::Start)
}

/// The parameter indices mentioned in an expression, starting at 1.
pub fn parameter_indices(expression: &str) -> Vec<usize> {
    PARAMETERS
        .captures_iter(expression)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

fn parse_error(s: &str) -> FlowExpressionParseError {
    FlowExpressionParseError::Parse(s.to_owned())
}

fn parse_at(
    s: &str,
    context: &FlowExpressionContext,
    resolver: &dyn SymbolResolver,
    position: Position,
) -> Result<Receiver, FlowExpressionParseError> {
    let s = s.trim();

    if position == Position::Start {
        if INT.is_match(s) {
            let value = s.parse().map_err(|_| parse_error(s))?;
            return Ok(Receiver::literal(Type::primitive("int"), Literal::Int(value)));
        }
        if LONG.is_match(s) {
            let value = s[..s.len() - 1].parse().map_err(|_| parse_error(s))?;
            return Ok(Receiver::literal(Type::primitive("long"), Literal::Long(value)));
        }
        if STRING.is_match(s) {
            let text = &s[1..s.len() - 1];
            return Ok(Receiver::literal(Type::declared("String"), Literal::string(text)));
        }
        match s {
            "null" => return Ok(Receiver::literal(Type::null(), Literal::Null)),
            "this" => return Ok(Receiver::this(context.receiver.ty().clone())),
            "super" => {
                let ty = context.receiver.ty();
                return resolver
                    .superclass(ty)
                    .map(Receiver::this)
                    .ok_or_else(|| FlowExpressionParseError::NoSuperclass(ty.to_string()));
            }
            _ => {}
        }
        if let Some(captures) = PARAMETER.captures(s) {
            let idx: usize = captures[1].parse().map_err(|_| parse_error(s))?;
            return context
                .arguments
                .get(idx - 1)
                .cloned()
                .ok_or(FlowExpressionParseError::IndexTooBig(idx));
        }
    }

    if IDENTIFIER.is_match(s) {
        return parse_identifier(s, context, resolver);
    }

    if let Some((receiver, member)) = split_member(s) {
        let receiver = parse_at(receiver, context, resolver, Position::Start)?;
        return parse_at(member, &context.change_receiver(receiver), resolver, Position::Member);
    }

    if let Some(captures) = METHOD.captures(s) {
        return parse_method(&captures[1], &captures[2], context, resolver);
    }

    Err(parse_error(s))
}

/// Fields are looked up in the receiver's class and the classes it is
/// nested in. Names that are not fields may refer to a class.
fn parse_identifier(
    name: &str,
    context: &FlowExpressionContext,
    resolver: &dyn SymbolResolver,
) -> Result<Receiver, FlowExpressionParseError> {
    let mut ty = Some(context.receiver.ty().clone());
    while let Some(current) = ty {
        if let Some(field) = resolver.find_field(&current, name) {
            let receiver = if field.is_static {
                Receiver::class_name(field.owner.clone())
            } else {
                context.receiver.clone()
            };
            return Ok(Receiver::field(receiver, field));
        }
        ty = resolver.enclosing_type(&current);
    }
    resolver
        .find_class(name)
        .map(Receiver::class_name)
        .ok_or_else(|| parse_error(name))
}

fn parse_method(
    name: &str,
    arguments: &str,
    context: &FlowExpressionContext,
    resolver: &dyn SymbolResolver,
) -> Result<Receiver, FlowExpressionParseError> {
    let outer = context.use_outer_receiver();
    let parameters = split_arguments(arguments)
        .ok_or_else(|| parse_error(arguments))?
        .into_iter()
        .map(|arg| parse_at(arg, &outer, resolver, Position::Start))
        .collect::<Result<Vec<_>, _>>()?;
    let types: Vec<Type> = parameters.iter().map(|p| p.ty().clone()).collect();

    let mut ty = Some(context.receiver.ty().clone());
    let mut found = None;
    while let Some(current) = ty {
        found = resolver.find_method(&current, name, &types);
        if found.is_some() {
            break;
        }
        ty = resolver.enclosing_type(&current);
    }
    let method = found.ok_or_else(|| parse_error(name))?;
    if !method.purity.deterministic {
        return Err(FlowExpressionParseError::NotDeterministic(name.to_owned()));
    }

    let receiver = if method.is_static {
        Receiver::class_name(method.owner.clone())
    } else {
        context.receiver.clone()
    };
    Ok(Receiver::PureMethodCall(PureMethodCall::new(
        method.return_type.clone(),
        method,
        receiver,
        parameters,
    )))
}

/// Tracks nesting while scanning an expression, so separators inside
/// argument lists or string literals are skipped.
#[derive(Default)]
struct Nesting {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Nesting {
    /// Returns false if the character closes a parenthesis that was never
    /// opened.
    fn step(&mut self, c: char) -> bool {
        if self.in_string {
            match c {
                _ if self.escaped => self.escaped = false,
                '\\' => self.escaped = true,
                '"' => self.in_string = false,
                _ => {}
            }
            return true;
        }
        match c {
            '"' => self.in_string = true,
            '(' => self.depth += 1,
            ')' => {
                if self.depth == 0 {
                    return false;
                }
                self.depth -= 1;
            }
            _ => {}
        }
        true
    }

    fn at_top_level(&self) -> bool {
        self.depth == 0 && !self.in_string
    }
}

/// Split `a.b.c` at the first dot that is not nested, into `a` and `b.c`.
fn split_member(s: &str) -> Option<(&str, &str)> {
    let mut nesting = Nesting::default();
    for (idx, c) in s.char_indices() {
        if c == '.' && nesting.at_top_level() {
            let (receiver, member) = (&s[..idx], &s[idx + 1..]);
            if receiver.trim().is_empty() || member.trim().is_empty() {
                return None;
            }
            return Some((receiver, member));
        }
        if !nesting.step(c) {
            return None;
        }
    }
    None
}

/// Split an argument list at the commas that are not nested. Returns
/// `None` for unbalanced lists or empty arguments.
fn split_arguments(s: &str) -> Option<Vec<&str>> {
    if s.trim().is_empty() {
        return Some(Vec::new());
    }
    let mut result = Vec::new();
    let mut nesting = Nesting::default();
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        if c == ',' && nesting.at_top_level() {
            result.push(&s[start..idx]);
            start = idx + 1;
            continue;
        }
        if !nesting.step(c) {
            return None;
        }
    }
    if !nesting.at_top_level() {
        return None;
    }
    result.push(&s[start..]);
    if result.iter().any(|arg| arg.trim().is_empty()) {
        return None;
    }
    Some(result)
}
