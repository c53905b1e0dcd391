use core::fmt::Debug;

use crate::receiver::Receiver;

///////////////////////////////////
// Traits for values and stores. //
///////////////////////////////////

/// The abstract value computed for a node or remembered for a receiver.
/// Values form a join semi-lattice where larger values carry less
/// information. A missing value stands for the largest element.
pub trait AbstractValue: Clone + PartialEq + Debug {
    /// A type to hold information about the lattice on the side, like the
    /// qualifier hierarchy the values are drawn from. Set this to unit when
    /// no such information is needed.
    type Context;

    /// Compute the least upper bound of two values. Used at join points
    /// where the result needs to over approximate both inputs.
    ///
    /// Requirements:
    /// * Reflexive: a.least_upper_bound(a, ctx) == a
    /// * Commutative: a.least_upper_bound(b, ctx) == b.least_upper_bound(a, ctx)
    /// * Upper bound: a <= a.least_upper_bound(b, ctx) and b <= a.least_upper_bound(b, ctx)
    fn least_upper_bound(&self, other: &Self, ctx: &Self::Context) -> Self;

    /// The ordering of the lattice: smaller values are more precise.
    fn is_subtype_of(&self, other: &Self, ctx: &Self::Context) -> bool;

    /// Combine two facts that hold at the same time, keeping the more
    /// precise information. This is not a lattice meet: when the two
    /// values are incomparable the result prefers `self`.
    ///
    /// The default implementation compares the values as a whole, values
    /// made of independent parts should refine each part separately.
    fn most_specific(&self, other: &Self, ctx: &Self::Context) -> Self {
        if other.is_subtype_of(self, ctx) && !self.is_subtype_of(other, ctx) {
            other.clone()
        } else {
            self.clone()
        }
    }
}

/// Snapshot of the knowledge at one program point.
pub trait Store: Clone + PartialEq + Debug {
    type Context;

    /// Join two stores at a merge point.
    ///
    /// Requirements:
    /// * Idempotent: s.least_upper_bound(s, ctx) == s
    /// * Facts present in only one of the stores are dropped.
    fn least_upper_bound(&self, other: &Self, ctx: &Self::Context) -> Self;

    /// Whether two receivers could refer to the same object.
    fn can_alias(&self, a: &Receiver, b: &Receiver, ctx: &Self::Context) -> bool;

    /// Optional rendering of the store in DOT label syntax, for debugging.
    fn to_dot(&self) -> Option<String> {
        None
    }
}
