use core::fmt;
use std::collections::HashMap;
use std::rc::Rc;

use fixedbitset::FixedBitSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QualifierArgument {
    Int(i64),
    Str(Rc<str>),
}

impl fmt::Display for QualifierArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualifierArgument::Int(value) => write!(f, "{value}"),
            QualifierArgument::Str(value) => write!(f, "\"{value}\""),
        }
    }
}

/// A type qualifier like `NonNull` or `Regex(2)`. Qualifiers sharing a name
/// belong to the same family and only differ in their arguments. The
/// hierarchy only knows about families, arguments are compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qualifier {
    name: Rc<str>,
    arguments: Vec<QualifierArgument>,
}

impl Qualifier {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: QualifierArgument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_int(self, value: i64) -> Self {
        self.with_argument(QualifierArgument::Int(value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[QualifierArgument] {
        &self.arguments
    }

    pub fn int_argument(&self, index: usize) -> Option<i64> {
        match self.arguments.get(index) {
            Some(QualifierArgument::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn same_family(&self, other: &Qualifier) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.arguments.is_empty() {
            let args: Vec<_> = self.arguments.iter().map(ToString::to_string).collect();
            write!(f, "({})", args.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("the hierarchy has no qualifiers")]
    Empty,
    #[error("unknown qualifier {0}")]
    UnknownQualifier(String),
    #[error("subtype cycle through {0}")]
    Cycle(String),
    #[error("{0} is below more than one top qualifier")]
    MultipleTops(String),
    #[error("the hierarchy of {0} has no unique bottom qualifier")]
    NoBottom(String),
    #[error("{0} and {1} have no least upper bound")]
    NoLeastUpperBound(String, String),
    #[error("{0} and {1} have no greatest lower bound")]
    NoGreatestLowerBound(String, String),
}

/// Collects qualifier families and the subtype edges between them.
///
/// ```
/// use qualifiers::hierarchy::{Qualifier, QualifierHierarchyBuilder};
/// let mut builder = QualifierHierarchyBuilder::new();
/// builder
///     .add_subtype("NonNull", "Nullable")
///     .add_subtype("Null", "Nullable")
///     .add_subtype("NullBottom", "NonNull")
///     .add_subtype("NullBottom", "Null");
/// let hierarchy = builder.build().unwrap();
/// assert_eq!(
///     hierarchy.least_upper_bound(&Qualifier::new("Null"), &Qualifier::new("NonNull")),
///     Qualifier::new("Nullable")
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct QualifierHierarchyBuilder {
    names: Vec<Rc<str>>,
    index: HashMap<Rc<str>, usize>,
    less: Vec<(usize, usize)>,
    polymorphic: Vec<(usize, Rc<str>)>,
}

impl QualifierHierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_qualifier(&mut self, name: &str) -> &mut Self {
        self.intern(name);
        self
    }

    /// Declare `sub` to be a direct subtype of `sup`. Both qualifiers are
    /// added if they are not known yet.
    pub fn add_subtype(&mut self, sub: &str, sup: &str) -> &mut Self {
        let sub = self.intern(sub);
        let sup = self.intern(sup);
        self.less.push((sub, sup));
        self
    }

    /// Declare a polymorphic qualifier for the hierarchy containing `top`.
    /// It is placed right below the top and above the bottom.
    pub fn add_polymorphic(&mut self, name: &str, top: &str) -> &mut Self {
        let poly = self.intern(name);
        self.polymorphic.push((poly, top.into()));
        self
    }

    fn intern(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let name: Rc<str> = name.into();
        self.names.push(name.clone());
        self.index.insert(name, self.names.len() - 1);
        self.names.len() - 1
    }

    pub fn build(self) -> Result<QualifierHierarchy, HierarchyError> {
        let n = self.names.len();
        if n == 0 {
            return Err(HierarchyError::Empty);
        }
        let name = |idx: usize| self.names[idx].to_string();

        let mut poly = FixedBitSet::with_capacity(n);
        for &(idx, _) in &self.polymorphic {
            poly.insert(idx);
        }

        let mut supers = closure(n, &self.less);
        for i in 0..n {
            if supers[i].ones().any(|j| j != i && supers[j].contains(i)) {
                return Err(HierarchyError::Cycle(name(i)));
            }
        }

        let tops: Vec<usize> = (0..n)
            .filter(|&i| !poly.contains(i) && supers[i].count_ones(..) == 1)
            .collect();
        let mut hierarchy_of = vec![usize::MAX; n];
        for i in (0..n).filter(|&i| !poly.contains(i)) {
            let mut found = tops
                .iter()
                .enumerate()
                .filter(|&(_, &top)| supers[i].contains(top));
            let Some((hierarchy, _)) = found.next() else {
                unreachable!("an acyclic hierarchy always has a top above {}", name(i));
            };
            if found.next().is_some() {
                return Err(HierarchyError::MultipleTops(name(i)));
            }
            hierarchy_of[i] = hierarchy;
        }

        let mut bottoms = Vec::with_capacity(tops.len());
        for (hierarchy, &top) in tops.iter().enumerate() {
            let members: Vec<usize> = (0..n).filter(|&i| hierarchy_of[i] == hierarchy).collect();
            let Some(&bottom) = members
                .iter()
                .find(|&&i| members.iter().all(|&j| supers[i].contains(j)))
            else {
                return Err(HierarchyError::NoBottom(name(top)));
            };
            bottoms.push(bottom);
        }

        let mut less = self.less.clone();
        let mut polymorphic = vec![None; tops.len()];
        for (idx, top_name) in &self.polymorphic {
            let Some(&member) = self.index.get(top_name).filter(|&&t| !poly.contains(t)) else {
                return Err(HierarchyError::UnknownQualifier(top_name.to_string()));
            };
            let hierarchy = hierarchy_of[member];
            hierarchy_of[*idx] = hierarchy;
            polymorphic[hierarchy] = Some(*idx);
            less.push((*idx, tops[hierarchy]));
            less.push((bottoms[hierarchy], *idx));
        }
        if !self.polymorphic.is_empty() {
            supers = closure(n, &less);
        }

        let mut subs = vec![FixedBitSet::with_capacity(n); n];
        transpose(&supers, &mut subs);

        let mut lubs = vec![vec![None; n]; n];
        let mut glbs = vec![vec![None; n]; n];
        for i in 0..n {
            for j in i..n {
                if hierarchy_of[i] != hierarchy_of[j] {
                    continue;
                }
                let mut upper = supers[i].clone();
                upper.intersect_with(&supers[j]);
                let Some(lub) = upper.ones().find(|&k| supers[k] == upper) else {
                    return Err(HierarchyError::NoLeastUpperBound(name(i), name(j)));
                };
                let mut lower = subs[i].clone();
                lower.intersect_with(&subs[j]);
                let Some(glb) = lower.ones().find(|&k| subs[k] == lower) else {
                    return Err(HierarchyError::NoGreatestLowerBound(name(i), name(j)));
                };
                lubs[i][j] = Some(lub);
                lubs[j][i] = Some(lub);
                glbs[i][j] = Some(glb);
                glbs[j][i] = Some(glb);
            }
        }

        Ok(QualifierHierarchy {
            names: self.names,
            index: self.index,
            supers,
            hierarchy_of,
            tops,
            bottoms,
            polymorphic,
            lubs,
            glbs,
        })
    }
}

/// One or more independent qualifier hierarchies, each with a single top
/// and a single bottom. The subtype relation is stored as bit matrices, so
/// queries are cheap, and least upper bounds and greatest lower bounds are
/// computed when the hierarchy is built.
///
/// Asking about a qualifier that is not part of the hierarchy is a bug in
/// the checker and panics.
#[derive(Debug, Clone)]
pub struct QualifierHierarchy {
    names: Vec<Rc<str>>,
    index: HashMap<Rc<str>, usize>,
    supers: Vec<FixedBitSet>,
    hierarchy_of: Vec<usize>,
    tops: Vec<usize>,
    bottoms: Vec<usize>,
    polymorphic: Vec<Option<usize>>,
    lubs: Vec<Vec<Option<usize>>>,
    glbs: Vec<Vec<Option<usize>>>,
}

impl QualifierHierarchy {
    /// Number of independent hierarchies.
    pub fn hierarchy_count(&self) -> usize {
        self.tops.len()
    }

    pub fn contains(&self, qualifier: &Qualifier) -> bool {
        self.index.contains_key(qualifier.name())
    }

    /// The families of all known qualifiers, in declaration order.
    pub fn qualifiers(&self) -> impl Iterator<Item = Qualifier> + '_ {
        self.names.iter().map(|name| Qualifier::new(name))
    }

    pub fn tops(&self) -> Vec<Qualifier> {
        self.tops.iter().map(|&idx| self.qualifier(idx)).collect()
    }

    pub fn bottoms(&self) -> Vec<Qualifier> {
        self.bottoms.iter().map(|&idx| self.qualifier(idx)).collect()
    }

    pub fn top(&self, hierarchy: usize) -> Qualifier {
        self.qualifier(self.tops[hierarchy])
    }

    pub fn bottom(&self, hierarchy: usize) -> Qualifier {
        self.qualifier(self.bottoms[hierarchy])
    }

    pub fn polymorphic(&self, hierarchy: usize) -> Option<Qualifier> {
        self.polymorphic[hierarchy].map(|idx| self.qualifier(idx))
    }

    /// The index of the hierarchy the qualifier belongs to.
    pub fn hierarchy_index(&self, qualifier: &Qualifier) -> usize {
        self.hierarchy_of[self.position(qualifier)]
    }

    pub fn top_for(&self, qualifier: &Qualifier) -> Qualifier {
        self.top(self.hierarchy_index(qualifier))
    }

    pub fn bottom_for(&self, qualifier: &Qualifier) -> Qualifier {
        self.bottom(self.hierarchy_index(qualifier))
    }

    pub fn is_top(&self, qualifier: &Qualifier) -> bool {
        self.tops.contains(&self.position(qualifier))
    }

    pub fn is_bottom(&self, qualifier: &Qualifier) -> bool {
        self.bottoms.contains(&self.position(qualifier))
    }

    pub fn is_polymorphic(&self, qualifier: &Qualifier) -> bool {
        let idx = self.position(qualifier);
        self.polymorphic.contains(&Some(idx))
    }

    /// Subtyping between qualifiers. Qualifiers of the same family are only
    /// related when their arguments are equal, everything is below the top
    /// of its own hierarchy.
    pub fn is_subtype(&self, sub: &Qualifier, sup: &Qualifier) -> bool {
        let (i, j) = (self.position(sub), self.position(sup));
        if self.hierarchy_of[i] != self.hierarchy_of[j] {
            return false;
        }
        if self.tops.contains(&j) {
            return true;
        }
        if sub.same_family(sup) {
            return sub == sup;
        }
        self.supers[i].contains(j)
    }

    /// Subtyping between the families of the qualifiers, arguments are not
    /// considered.
    pub fn is_subtype_ignoring_values(&self, sub: &Qualifier, sup: &Qualifier) -> bool {
        self.supers[self.position(sub)].contains(self.position(sup))
    }

    pub fn least_upper_bound(&self, a: &Qualifier, b: &Qualifier) -> Qualifier {
        let (i, j) = self.same_hierarchy(a, b);
        if a.same_family(b) {
            return if a == b {
                a.clone()
            } else {
                self.top(self.hierarchy_of[i])
            };
        }
        if self.is_subtype(a, b) {
            return b.clone();
        }
        if self.is_subtype(b, a) {
            return a.clone();
        }
        self.qualifier(self.lubs[i][j].expect("lub is computed for qualifiers of one hierarchy"))
    }

    pub fn greatest_lower_bound(&self, a: &Qualifier, b: &Qualifier) -> Qualifier {
        let (i, j) = self.same_hierarchy(a, b);
        if a.same_family(b) {
            return if a == b {
                a.clone()
            } else {
                self.bottom(self.hierarchy_of[i])
            };
        }
        if self.is_subtype(a, b) {
            return a.clone();
        }
        if self.is_subtype(b, a) {
            return b.clone();
        }
        self.qualifier(self.glbs[i][j].expect("glb is computed for qualifiers of one hierarchy"))
    }

    fn same_hierarchy(&self, a: &Qualifier, b: &Qualifier) -> (usize, usize) {
        let (i, j) = (self.position(a), self.position(b));
        assert_eq!(
            self.hierarchy_of[i], self.hierarchy_of[j],
            "{a} and {b} belong to different hierarchies"
        );
        (i, j)
    }

    fn qualifier(&self, idx: usize) -> Qualifier {
        Qualifier::new(&self.names[idx])
    }

    fn position(&self, qualifier: &Qualifier) -> usize {
        *self
            .index
            .get(qualifier.name())
            .unwrap_or_else(|| panic!("unknown qualifier {qualifier}"))
    }
}

fn closure(n: usize, less: &[(usize, usize)]) -> Vec<FixedBitSet> {
    let mut matrix = vec![FixedBitSet::with_capacity(n); n];
    edge_list_to_matrix(&mut matrix, less);
    reflexive_closure(&mut matrix);
    transitive_closure(&mut matrix);
    matrix
}

fn edge_list_to_matrix(empty: &mut [FixedBitSet], edges: &[(usize, usize)]) {
    for &(from, to) in edges {
        empty[from].insert(to);
    }
}

fn reflexive_closure(bool_matrix: &mut [FixedBitSet]) {
    for (i, item) in bool_matrix.iter_mut().enumerate() {
        item.insert(i);
    }
}

fn transitive_closure(bool_matrix: &mut [FixedBitSet]) {
    let n = bool_matrix.len();
    for k in 0..n {
        for i in 0..n {
            if bool_matrix[i].contains(k) {
                let row = bool_matrix[k].clone();
                bool_matrix[i].union_with(&row);
            }
        }
    }
}

fn transpose(from: &[FixedBitSet], to: &mut [FixedBitSet]) {
    for (i, row) in from.iter().enumerate() {
        for j in row.ones() {
            to[j].insert(i);
        }
    }
}
