use core::fmt;

use dataflow::domains::AbstractValue;

use crate::hierarchy::{Qualifier, QualifierHierarchy};

/// The qualifiers known to hold for an expression, at most one for each
/// hierarchy. A hierarchy without a qualifier is at its top, so the empty
/// value carries no information at all.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QualifierValue {
    qualifiers: Vec<Option<Qualifier>>,
}

impl QualifierValue {
    pub fn top(hierarchy: &QualifierHierarchy) -> Self {
        Self {
            qualifiers: vec![None; hierarchy.hierarchy_count()],
        }
    }

    pub fn from_qualifiers<I>(hierarchy: &QualifierHierarchy, qualifiers: I) -> Self
    where
        I: IntoIterator<Item = Qualifier>,
    {
        qualifiers
            .into_iter()
            .fold(Self::top(hierarchy), |value, q| value.with(hierarchy, q))
    }

    /// Replace the qualifier of the hierarchy `qualifier` belongs to.
    pub fn with(mut self, hierarchy: &QualifierHierarchy, qualifier: Qualifier) -> Self {
        let idx = hierarchy.hierarchy_index(&qualifier);
        self.qualifiers[idx] = (!hierarchy.is_top(&qualifier)).then_some(qualifier);
        self
    }

    /// The qualifier of the given hierarchy, `None` means top.
    pub fn qualifier(&self, hierarchy: usize) -> Option<&Qualifier> {
        self.qualifiers.get(hierarchy).and_then(Option::as_ref)
    }

    /// The qualifier in the same hierarchy as `qualifier`.
    pub fn qualifier_in(&self, hierarchy: &QualifierHierarchy, qualifier: &Qualifier) -> Option<&Qualifier> {
        self.qualifier(hierarchy.hierarchy_index(qualifier))
    }

    /// Like [`QualifierValue::qualifier`], but spelling out the top.
    pub fn effective_qualifier(&self, hierarchy: &QualifierHierarchy, idx: usize) -> Qualifier {
        self.qualifier(idx)
            .cloned()
            .unwrap_or_else(|| hierarchy.top(idx))
    }

    pub fn has(&self, qualifier: &Qualifier) -> bool {
        self.qualifiers().any(|q| q == qualifier)
    }

    pub fn is_top(&self) -> bool {
        self.qualifiers.iter().all(Option::is_none)
    }

    pub fn qualifiers(&self) -> impl Iterator<Item = &Qualifier> {
        self.qualifiers.iter().flatten()
    }
}

impl AbstractValue for QualifierValue {
    type Context = QualifierHierarchy;

    fn least_upper_bound(&self, other: &Self, ctx: &QualifierHierarchy) -> Self {
        let qualifiers = self
            .qualifiers
            .iter()
            .zip(&other.qualifiers)
            .map(|pair| match pair {
                (Some(a), Some(b)) => {
                    let lub = ctx.least_upper_bound(a, b);
                    (!ctx.is_top(&lub)).then_some(lub)
                }
                _ => None,
            })
            .collect();
        Self { qualifiers }
    }

    fn is_subtype_of(&self, other: &Self, ctx: &QualifierHierarchy) -> bool {
        self.qualifiers
            .iter()
            .zip(&other.qualifiers)
            .all(|pair| match pair {
                (_, None) => true,
                (None, Some(_)) => false,
                (Some(a), Some(b)) => ctx.is_subtype(a, b),
            })
    }

    /// Refines each hierarchy separately. When the two qualifiers of a
    /// hierarchy are incomparable, the one of `self` wins.
    fn most_specific(&self, other: &Self, ctx: &QualifierHierarchy) -> Self {
        let qualifiers = self
            .qualifiers
            .iter()
            .zip(&other.qualifiers)
            .map(|pair| match pair {
                (Some(a), Some(b)) if ctx.is_subtype(b, a) => Some(b.clone()),
                (Some(a), _) => Some(a.clone()),
                (None, b) => b.clone(),
            })
            .collect();
        Self { qualifiers }
    }
}

impl fmt::Display for QualifierValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.qualifiers().map(ToString::to_string).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

impl fmt::Debug for QualifierValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
