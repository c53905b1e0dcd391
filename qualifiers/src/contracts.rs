use crate::hierarchy::Qualifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    /// Must hold when the method is called, can be assumed in its body.
    Precondition,
    /// Holds whenever the method returns normally.
    Postcondition,
    /// Holds when the method returns the given boolean.
    ConditionalPostcondition { result: bool },
}

/// A qualifier a method requires or ensures for some expressions. The
/// expressions are parsed with [`crate::expression::parse`], relative to the
/// declaration for preconditions and to the call site for postconditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contract {
    pub kind: ContractKind,
    pub expressions: Vec<String>,
    pub qualifier: Qualifier,
}

impl Contract {
    pub fn new(kind: ContractKind, expressions: &[&str], qualifier: Qualifier) -> Self {
        Self {
            kind,
            expressions: expressions.iter().map(|e| (*e).to_owned()).collect(),
            qualifier,
        }
    }

    pub fn precondition(expressions: &[&str], qualifier: Qualifier) -> Self {
        Self::new(ContractKind::Precondition, expressions, qualifier)
    }

    pub fn postcondition(expressions: &[&str], qualifier: Qualifier) -> Self {
        Self::new(ContractKind::Postcondition, expressions, qualifier)
    }

    pub fn conditional_postcondition(result: bool, expressions: &[&str], qualifier: Qualifier) -> Self {
        Self::new(
            ContractKind::ConditionalPostcondition { result },
            expressions,
            qualifier,
        )
    }
}
