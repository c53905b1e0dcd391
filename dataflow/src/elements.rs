use core::fmt;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Opaque identity of a tree in the host program. The engine never looks
/// inside trees, it only uses them as keys to connect analysis results back
/// to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(pub u32);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKind {
    Declared,
    Primitive,
    Null,
    Array,
    TypeVariable,
    Wildcard,
}

/// A host type. Types are compared by name and kind only, the host is
/// responsible for subtyping through [`TypeHierarchy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type {
    name: Rc<str>,
    kind: TypeKind,
}

impl Type {
    pub fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn declared(name: &str) -> Self {
        Self::new(name, TypeKind::Declared)
    }

    pub fn primitive(name: &str) -> Self {
        Self::new(name, TypeKind::Primitive)
    }

    pub fn type_variable(name: &str) -> Self {
        Self::new(name, TypeKind::TypeVariable)
    }

    /// The type of the `null` literal.
    pub fn null() -> Self {
        Self::new("null", TypeKind::Null)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_type_variable_like(&self) -> bool {
        matches!(self.kind, TypeKind::TypeVariable | TypeKind::Wildcard)
    }

    pub fn is_reference(&self) -> bool {
        self.kind != TypeKind::Primitive
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Subtyping oracle of the host language. Used to decide whether two
/// references could possibly point to the same object.
pub trait TypeHierarchy {
    fn is_subtype(&self, sub: &Type, sup: &Type) -> bool;
}

/// A nominal type hierarchy built from declared direct supertypes.
///
/// * Every type is a subtype of itself.
/// * The null type is a subtype of every reference type.
/// * Every reference type is a subtype of `Object`.
/// * Type variables and wildcards may be instantiated with anything, so
///   they are related to every reference type in both directions.
#[derive(Debug, Clone, Default)]
pub struct NominalTypes {
    supertypes: HashMap<Type, Vec<Type>>,
}

impl NominalTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_supertype(&mut self, sub: Type, sup: Type) -> &mut Self {
        self.supertypes.entry(sub).or_default().push(sup);
        self
    }
}

impl TypeHierarchy for NominalTypes {
    fn is_subtype(&self, sub: &Type, sup: &Type) -> bool {
        if sub == sup {
            return true;
        }
        if !sub.is_reference() || !sup.is_reference() {
            return false;
        }
        if sub.kind() == TypeKind::Null || sup.name() == "Object" {
            return true;
        }
        if sub.is_type_variable_like() || sup.is_type_variable_like() {
            return true;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![sub];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for parent in self.supertypes.get(current).into_iter().flatten() {
                if parent == sup {
                    return true;
                }
                stack.push(parent);
            }
        }
        false
    }
}

/// Purity of a method as declared by the host program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Purity {
    /// The method does not modify any state visible to the caller.
    pub side_effect_free: bool,
    /// Calling the method twice with equal arguments yields equal results.
    pub deterministic: bool,
}

impl Purity {
    pub const NONE: Purity = Purity {
        side_effect_free: false,
        deterministic: false,
    };

    pub const PURE: Purity = Purity {
        side_effect_free: true,
        deterministic: true,
    };

    pub const SIDE_EFFECT_FREE: Purity = Purity {
        side_effect_free: true,
        deterministic: false,
    };

    pub const DETERMINISTIC: Purity = Purity {
        side_effect_free: false,
        deterministic: true,
    };
}

/// A local variable or parameter. The `id` distinguishes shadowing
/// declarations that share a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableElement {
    pub name: Rc<str>,
    pub id: u32,
    pub ty: Type,
}

impl VariableElement {
    pub fn new(name: &str, id: u32, ty: Type) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            id,
            ty,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement {
    pub name: Rc<str>,
    pub owner: Type,
    pub ty: Type,
    pub is_final: bool,
    pub is_static: bool,
}

impl FieldElement {
    pub fn new(name: &str, owner: Type, ty: Type) -> Self {
        Self {
            name: name.into(),
            owner,
            ty,
            is_final: false,
            is_static: false,
        }
    }

    pub fn with_final(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodElement {
    pub name: Rc<str>,
    pub owner: Type,
    pub parameters: Vec<Type>,
    pub return_type: Type,
    pub is_static: bool,
    pub purity: Purity,
}

impl MethodElement {
    pub fn new(name: &str, owner: Type, parameters: Vec<Type>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            owner,
            parameters,
            return_type,
            is_static: false,
            purity: Purity::NONE,
        }
    }

    pub fn with_purity(mut self, purity: Purity) -> Self {
        self.purity = purity;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassElement {
    pub name: Rc<str>,
    pub ty: Type,
}

impl ClassElement {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            ty: Type::declared(name),
        })
    }
}
