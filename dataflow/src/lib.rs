//! This crate contains a forward
//! [dataflow analysis](https://en.wikipedia.org/wiki/Data-flow_analysis)
//! engine for object oriented programs. The building blocks include
//! [control flow graphs](https://en.wikipedia.org/wiki/Control-flow_graph)
//! made of typed nodes, receivers that describe the expressions the analysis
//! can keep track of, stores mapping receivers to abstract values, and a
//! worklist solver computing the fixed point of a transfer function.
//!
//! The abstract values are left to the users of the crate. Look at the
//! qualifiers crate for an example that infers type qualifiers with the
//! helpers in this crate.
//!
//! Some resources to learn more about dataflow analysis:
//! * [Static Program Analysis, Anders Møller and Michael I. Schwartzbach](https://cs.au.dk/~amoeller/spa/)
//! * [Data Flow Analysis: Theory and Practice](https://www.amazon.com/Data-Flow-Analysis-Theory-Practice/dp/0849328802)
//! * [Data flow analysis: an informal introduction](https://clang.llvm.org/docs/DataFlowAnalysisIntro.html)
//! * [Practical pluggable types for Java](https://homes.cs.washington.edu/~mernst/pubs/pluggable-checkers-issta2008.pdf)

/// Control flow graphs of method bodies and initializers, a builder that
/// validates their structure, and a reverse post-order worklist.
pub mod cfg;

/// Traits for abstract values and stores.
pub mod domains;

/// The parts of the host program the analysis needs to know about: types,
/// variables, fields, methods and classes.
pub mod elements;

/// The operations making up control flow graphs.
pub mod node;

/// Receivers describe expressions whose values the analysis can track.
pub mod receiver;

/// DOT rendering of graphs annotated with analysis results.
pub mod render;

/// The results of analysis runs, queryable by node or tree.
pub mod result;

/// Fixed-point iteration over control flow graphs.
pub mod solvers;

/// A store keyed by receivers.
pub mod store;

/// The interface between the solver and the semantics of an analysis.
pub mod transfer;

#[cfg(test)]
mod test_utils;


#[cfg(test)]
mod receiver_tests;



#[cfg(test)]
mod render_tests;
