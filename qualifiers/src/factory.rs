use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use dataflow::cfg::Cfg;
use dataflow::domains::AbstractValue;
use dataflow::elements::{ClassElement, FieldElement, TreeId, Type, TypeHierarchy};
use dataflow::node::NodeId;
use dataflow::render;
use dataflow::result::AnalysisResult;
use dataflow::solvers::AnalysisError;
use dataflow::store::StoreContext;
use dataflow::transfer::FlowStores;
use thiserror::Error;
use tracing::{debug, debug_span, warn};

use crate::checker::FlowChecker;
use crate::options::FlowOptions;
use crate::transfer::{Diagnostic, FieldValue, QualifierContext, QualifierStore, QualifierTransfer};
use crate::value::QualifierValue;

pub type QualifierAnalysisResult = AnalysisResult<QualifierValue, QualifierStore>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("tree {0} is not part of any known class")]
    UnknownTree(TreeId),
    #[error("flow analysis of class {class} failed")]
    Analysis {
        class: Rc<str>,
        #[source]
        source: AnalysisError,
    },
}

#[derive(Debug, Clone)]
pub struct FieldInitializer {
    pub cfg: Rc<Cfg>,
    /// The initializer expression within `cfg`.
    pub expression: TreeId,
}

/// A member of a class as far as the flow analysis is concerned.
#[derive(Debug, Clone)]
pub enum ClassMember {
    Field {
        field: Rc<FieldElement>,
        initializer: Option<FieldInitializer>,
    },
    Method(Rc<Cfg>),
    /// An initializer block.
    Initializer(Rc<Cfg>),
    Class(Rc<ClassElement>),
}

/// The host's view of the program: which class a tree belongs to and the
/// members of each class, in declaration order.
pub trait HostProgram {
    /// The innermost class containing `tree`.
    fn enclosing_class(&self, tree: TreeId) -> Option<Rc<ClassElement>>;

    fn class_members(&self, class: &ClassElement) -> Vec<ClassMember>;
}

/// Answers qualifier queries about trees, refined by the flow analysis.
///
/// The first query about a tree analyzes every body of its enclosing
/// class, then the classes nested in it. Field initializers and
/// initializer blocks come first, so methods can start from the values of
/// the fields. Results are kept for later queries.
pub struct FlowTypeFactory<'a, C: FlowChecker + ?Sized, P: HostProgram + ?Sized> {
    checker: &'a C,
    program: &'a P,
    options: FlowOptions,
    ctx: QualifierContext,
    result: QualifierAnalysisResult,
    cfgs: HashMap<TreeId, Rc<Cfg>>,
    scanned: HashSet<Type>,
    pending: Vec<Rc<ClassElement>>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, C: FlowChecker + ?Sized, P: HostProgram + ?Sized> FlowTypeFactory<'a, C, P> {
    pub fn new(checker: &'a C, program: &'a P, options: FlowOptions, types: Rc<dyn TypeHierarchy>) -> Self {
        Self {
            checker,
            program,
            options,
            ctx: StoreContext::new(checker.hierarchy().clone(), types),
            result: AnalysisResult::new(),
            cfgs: HashMap::new(),
            scanned: HashSet::new(),
            pending: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn context(&self) -> &QualifierContext {
        &self.ctx
    }

    pub fn result(&self) -> &QualifierAnalysisResult {
        &self.result
    }

    /// Problems found with the declarations of the analyzed classes so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The qualifiers of a tree: the declared ones, made more precise by
    /// what the flow analysis inferred. `None` for trees that are not
    /// expressions of an analyzed body, or when nothing is known.
    pub fn annotated_value(&mut self, tree: TreeId) -> Result<Option<QualifierValue>, FlowError> {
        self.ensure_analyzed(tree)?;
        let Some(node) = self.result.node_for_tree(tree) else {
            return Ok(None);
        };
        let Some(cfg) = self.cfgs.get(&node.cfg) else {
            return Ok(None);
        };
        let declared = self.checker.value_from_factory(cfg, cfg.node(node.node));
        let hierarchy = &self.ctx.values;
        Ok(match (self.result.value(node), declared) {
            (Some(inferred), Some(declared)) => Some(inferred.most_specific(&declared, hierarchy)),
            (Some(inferred), None) => Some(inferred.clone()),
            (None, declared) => declared,
        })
    }

    pub fn value_for_tree(&mut self, tree: TreeId) -> Result<Option<&QualifierValue>, FlowError> {
        self.ensure_analyzed(tree)?;
        Ok(self.result.value_for_tree(tree))
    }

    pub fn store_before(&mut self, tree: TreeId) -> Result<Option<&FlowStores<QualifierStore>>, FlowError> {
        self.ensure_analyzed(tree)?;
        Ok(self.result.store_before(tree))
    }

    pub fn store_after(&mut self, tree: TreeId) -> Result<Option<&FlowStores<QualifierStore>>, FlowError> {
        self.ensure_analyzed(tree)?;
        Ok(self.result.store_after(tree))
    }

    /// The store at the regular exit of the body built from `cfg`.
    pub fn regular_exit_store(&mut self, cfg: TreeId) -> Result<Option<&QualifierStore>, FlowError> {
        self.ensure_analyzed(cfg)?;
        Ok(self.result.regular_exit_store(cfg))
    }

    pub fn return_statement_stores(&mut self, cfg: TreeId) -> Result<&[(NodeId, QualifierStore)], FlowError> {
        self.ensure_analyzed(cfg)?;
        Ok(self.result.return_statement_stores(cfg))
    }

    /// The annotated graph of a body in DOT format.
    pub fn visualize(&mut self, cfg: TreeId) -> Result<Option<String>, FlowError> {
        self.ensure_analyzed(cfg)?;
        Ok(self
            .cfgs
            .get(&cfg)
            .map(|graph| render::visualize(graph, Some(&self.result))))
    }

    fn ensure_analyzed(&mut self, tree: TreeId) -> Result<(), FlowError> {
        let class = self
            .program
            .enclosing_class(tree)
            .ok_or(FlowError::UnknownTree(tree))?;
        if self.scanned.contains(&class.ty) {
            return Ok(());
        }

        self.pending.push(class);
        while let Some(class) = self.pending.pop() {
            if self.scanned.contains(&class.ty) {
                continue;
            }
            let reported = self.diagnostics.len();
            if let Err(error) = self.analyze_class(&class) {
                // A later query analyzes the class again.
                self.pending.clear();
                self.diagnostics.truncate(reported);
                return Err(error);
            }
            self.scanned.insert(class.ty.clone());
        }
        Ok(())
    }

    fn analyze_class(&mut self, class: &ClassElement) -> Result<(), FlowError> {
        let span = debug_span!("class", name = %class.name);
        let _guard = span.enter();

        let members = self.program.class_members(class);
        let mut field_values: Vec<FieldValue> = Vec::new();
        for member in &members {
            match member {
                ClassMember::Field {
                    field,
                    initializer: Some(initializer),
                } => {
                    self.analyze(class, &initializer.cfg, &[])?;
                    if let Some(value) = self.result.value_for_tree(initializer.expression) {
                        debug!(field = %field.name, %value, "field initialized");
                        field_values.push((field.clone(), value.clone()));
                    }
                }
                ClassMember::Initializer(cfg) => self.analyze(class, cfg, &[])?,
                _ => {}
            }
        }

        for member in &members {
            if let ClassMember::Method(cfg) = member {
                self.analyze(class, cfg, &field_values)?;
            }
        }

        // Reversed, so nested classes are analyzed in declaration order.
        self.pending
            .extend(members.into_iter().rev().filter_map(|member| match member {
                ClassMember::Class(nested) => Some(nested),
                _ => None,
            }));
        Ok(())
    }

    fn analyze(&mut self, class: &ClassElement, cfg: &Rc<Cfg>, field_values: &[FieldValue]) -> Result<(), FlowError> {
        debug!(cfg = %cfg.id(), "analyzing");
        let mut transfer = QualifierTransfer::new(self.checker, &self.options).with_field_values(field_values);
        let result = self
            .options
            .solver()
            .solve(cfg, &self.ctx, &mut transfer)
            .map_err(|source| FlowError::Analysis {
                class: class.name.clone(),
                source,
            })?;
        self.diagnostics.extend(transfer.take_diagnostics());

        if let Some(dir) = &self.options.flow_dot_dir {
            write_dot(dir, &class.name, cfg, &result);
        }
        self.result.combine(result);
        self.cfgs.insert(cfg.id(), cfg.clone());
        Ok(())
    }
}

fn write_dot(dir: &Path, class: &str, cfg: &Cfg, result: &QualifierAnalysisResult) {
    let path = dir.join(format!("{class}-{}.dot", cfg.id().0));
    let written = fs::create_dir_all(dir).and_then(|()| fs::write(&path, render::visualize(cfg, Some(result))));
    if let Err(error) = written {
        warn!(path = %path.display(), %error, "cannot write the flow graph");
    }
}
