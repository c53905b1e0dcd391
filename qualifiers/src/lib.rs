//! Flow-sensitive inference of type qualifiers, built on the `dataflow`
//! crate. A checker declares one or more qualifier hierarchies, like
//! `NonNull <: Nullable`, and tells the analysis which qualifiers the type
//! rules give to each expression. The analysis then refines those
//! qualifiers along the control flow: after `if (x != null)` the variable
//! `x` is `NonNull` in the then branch, even if it was declared
//! `Nullable`.
//!
//! The main entry points are [`checker::FlowChecker`], implemented by
//! concrete checkers, and [`factory::FlowTypeFactory`], which analyzes
//! classes on demand and answers queries about trees.
//!
//! Further reading:
//! * [Practical pluggable types for Java](https://homes.cs.washington.edu/~mernst/pubs/pluggable-checkers-issta2008.pdf)
//! * [The Checker Framework manual](https://checkerframework.org/manual/)

#[macro_use]
extern crate lazy_static;

/// The interface concrete checkers implement.
pub mod checker;

/// Pre- and postconditions of methods.
pub mod contracts;

/// Parsing the expressions written in contracts into receivers.
pub mod expression;

/// On demand analysis of classes and queries about the results.
pub mod factory;

/// Qualifier hierarchies, validated and closed under lub and glb.
pub mod hierarchy;

pub mod options;

/// Resolving names in contract expressions.
pub mod symbols;

/// The transfer function of qualifier inference.
pub mod transfer;

/// Sets of qualifiers, one per hierarchy, as abstract values.
pub mod value;

#[cfg(test)]
mod test_utils;



#[cfg(test)]
mod expression_tests;
