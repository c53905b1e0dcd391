use std::collections::HashMap;
use std::rc::Rc;

use dataflow::elements::{FieldElement, MethodElement, NominalTypes, Type, TypeHierarchy};

/// Name lookup in the host program, needed to resolve the expressions
/// mentioned in contracts.
pub trait SymbolResolver {
    /// A field declared in `owner` or inherited by it.
    fn find_field(&self, owner: &Type, name: &str) -> Option<Rc<FieldElement>>;

    /// A method of `owner` that accepts arguments of the given types.
    fn find_method(&self, owner: &Type, name: &str, arguments: &[Type]) -> Option<Rc<MethodElement>>;

    fn find_class(&self, name: &str) -> Option<Type>;

    /// The class `ty` is nested in.
    fn enclosing_type(&self, ty: &Type) -> Option<Type>;

    fn superclass(&self, ty: &Type) -> Option<Type>;
}

#[derive(Debug, Clone, Default)]
struct ClassSymbols {
    superclass: Option<Type>,
    enclosing: Option<Type>,
    fields: Vec<Rc<FieldElement>>,
    methods: Vec<Rc<MethodElement>>,
}

/// An in-memory symbol table. It also answers subtyping questions, based on
/// the declared superclasses.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    classes: HashMap<Type, ClassSymbols>,
    types: NominalTypes,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, ty: Type, superclass: Option<Type>) -> &mut Self {
        if let Some(superclass) = &superclass {
            self.types.add_supertype(ty.clone(), superclass.clone());
        }
        self.classes.entry(ty).or_default().superclass = superclass;
        self
    }

    pub fn add_nested_class(&mut self, ty: Type, enclosing: Type) -> &mut Self {
        self.classes.entry(ty).or_default().enclosing = Some(enclosing);
        self
    }

    pub fn add_field(&mut self, field: Rc<FieldElement>) -> &mut Self {
        self.classes
            .entry(field.owner.clone())
            .or_default()
            .fields
            .push(field);
        self
    }

    pub fn add_method(&mut self, method: Rc<MethodElement>) -> &mut Self {
        self.classes
            .entry(method.owner.clone())
            .or_default()
            .methods
            .push(method);
        self
    }

    /// `ty` and its superclasses, starting with `ty`.
    fn lineage<'a>(&'a self, ty: &Type) -> impl Iterator<Item = &'a ClassSymbols> + 'a {
        let mut current = self.classes.get(ty);
        core::iter::from_fn(move || {
            let class = current?;
            current = class
                .superclass
                .as_ref()
                .and_then(|superclass| self.classes.get(superclass));
            Some(class)
        })
        .take(self.classes.len())
    }
}

impl SymbolResolver for SymbolTable {
    fn find_field(&self, owner: &Type, name: &str) -> Option<Rc<FieldElement>> {
        self.lineage(owner)
            .flat_map(|class| class.fields.iter())
            .find(|field| &*field.name == name)
            .cloned()
    }

    fn find_method(&self, owner: &Type, name: &str, arguments: &[Type]) -> Option<Rc<MethodElement>> {
        self.lineage(owner)
            .flat_map(|class| class.methods.iter())
            .find(|method| {
                &*method.name == name
                    && method.parameters.len() == arguments.len()
                    && arguments
                        .iter()
                        .zip(&method.parameters)
                        .all(|(arg, param)| self.types.is_subtype(arg, param))
            })
            .cloned()
    }

    fn find_class(&self, name: &str) -> Option<Type> {
        self.classes.keys().find(|ty| ty.name() == name).cloned()
    }

    fn enclosing_type(&self, ty: &Type) -> Option<Type> {
        self.classes.get(ty)?.enclosing.clone()
    }

    fn superclass(&self, ty: &Type) -> Option<Type> {
        self.classes.get(ty)?.superclass.clone()
    }
}

impl TypeHierarchy for SymbolTable {
    fn is_subtype(&self, sub: &Type, sup: &Type) -> bool {
        self.types.is_subtype(sub, sup)
    }
}
