//! Module graph: modules, their kinds, and dependency edges
//!
//! Built once from the resolved configuration and immutable afterwards.
//! Construction validates that every dependency target exists, that every
//! plugin declares the SDK, and that the module edges are acyclic.

use crate::error::{BuildError, BuildResult};
use runetale_config::modules::module_name;
use runetale_config::{DependencyScope, ModuleKind, ResolvedConfig};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// A dependency edge to another module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleDependency {
    /// Target module path
    pub module: String,
    /// Visibility of the edge
    pub scope: DependencyScope,
}

/// A module in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Hierarchical module path (e.g. `plugins/skills`)
    pub path: String,
    pub kind: ModuleKind,
    pub version: String,
    pub source_root: PathBuf,
    pub test_root: PathBuf,
    pub resource_root: PathBuf,
    /// Module dependencies in declaration order
    pub dependencies: Vec<ModuleDependency>,
    /// Scope of the SDK dependency, if declared
    pub sdk: Option<DependencyScope>,
}

impl Module {
    /// Create a module rooted at `dir` with conventional source layout
    pub fn new(path: impl Into<String>, kind: ModuleKind, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            path: path.into(),
            kind,
            version: "0.1.0".to_string(),
            source_root: dir.join("src/main/java"),
            test_root: dir.join("src/test/java"),
            resource_root: dir.join("src/main/resources"),
            dependencies: Vec::new(),
            sdk: None,
        }
    }

    /// Add a module dependency
    pub fn with_dependency(mut self, module: impl Into<String>, scope: DependencyScope) -> Self {
        self.dependencies.push(ModuleDependency {
            module: module.into(),
            scope,
        });
        self
    }

    /// Declare the SDK dependency
    pub fn with_sdk(mut self, scope: DependencyScope) -> Self {
        self.sdk = Some(scope);
        self
    }

    /// Set the version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Short name (last path segment)
    pub fn name(&self) -> &str {
        module_name(&self.path)
    }

    /// Dependencies needed by main sources (everything except test-only)
    pub fn main_dependencies(&self) -> impl Iterator<Item = &ModuleDependency> {
        self.dependencies.iter().filter(|d| d.scope.is_main())
    }
}

/// Three-color DFS mark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Validated, acyclic module graph
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    /// Modules in declaration order
    modules: Vec<Module>,
    /// Module path -> index
    index: HashMap<String, usize>,
    /// Indices in dependency order (dependencies first)
    order: Vec<usize>,
}

impl ModuleGraph {
    /// Build the graph from resolved configuration
    pub fn load(config: &ResolvedConfig) -> BuildResult<Self> {
        let modules = config
            .modules
            .iter()
            .map(|m| {
                let mut module = Module {
                    path: m.path.clone(),
                    kind: m.kind,
                    version: m.version.clone(),
                    source_root: m.source_root.clone(),
                    test_root: m.test_root.clone(),
                    resource_root: m.resource_root.clone(),
                    dependencies: Vec::new(),
                    sdk: None,
                };
                for dep in &m.dependencies {
                    match &dep.module {
                        Some(target) => module.dependencies.push(ModuleDependency {
                            module: target.clone(),
                            scope: dep.scope,
                        }),
                        None => module.sdk = Some(dep.scope),
                    }
                }
                module
            })
            .collect();

        Self::from_modules(modules)
    }

    /// Build the graph from explicit modules, validating it.
    ///
    /// No partial graph is ever returned: any error rejects the whole set.
    pub fn from_modules(modules: Vec<Module>) -> BuildResult<Self> {
        let mut index = HashMap::new();
        for (i, module) in modules.iter().enumerate() {
            if index.insert(module.path.clone(), i).is_some() {
                return Err(BuildError::DuplicateModule(module.path.clone()));
            }
        }

        for module in &modules {
            for dep in &module.dependencies {
                if !index.contains_key(&dep.module) {
                    return Err(BuildError::MissingModule {
                        module: dep.module.clone(),
                        required_by: module.path.clone(),
                    });
                }
            }
            if module.kind == ModuleKind::Plugin && module.sdk.is_none() {
                return Err(BuildError::MissingSdk {
                    module: module.path.clone(),
                });
            }
        }

        let mut graph = Self {
            modules,
            index,
            order: Vec::new(),
        };
        graph.order = graph.topological_sort()?;
        Ok(graph)
    }

    /// DFS with white/gray/black marks; an edge to a gray node is a cycle.
    /// Post-order yields dependencies before dependents.
    fn topological_sort(&self) -> BuildResult<Vec<usize>> {
        let mut marks = vec![Mark::White; self.modules.len()];
        let mut order = Vec::with_capacity(self.modules.len());
        let mut stack = Vec::new();

        for start in 0..self.modules.len() {
            if marks[start] == Mark::White {
                self.visit(start, &mut marks, &mut stack, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> BuildResult<()> {
        marks[node] = Mark::Gray;
        stack.push(node);

        for dep in &self.modules[node].dependencies {
            let target = self.index[&dep.module];
            match marks[target] {
                Mark::Gray => {
                    let start = stack.iter().position(|&n| n == target).unwrap_or(0);
                    let mut cycle: Vec<&str> = stack[start..]
                        .iter()
                        .map(|&n| self.modules[n].path.as_str())
                        .collect();
                    cycle.push(self.modules[target].path.as_str());
                    return Err(BuildError::CyclicDependency(cycle.join(" -> ")));
                }
                Mark::White => self.visit(target, marks, stack, order)?,
                Mark::Black => {}
            }
        }

        stack.pop();
        marks[node] = Mark::Black;
        order.push(node);
        Ok(())
    }

    /// Get a module by path
    pub fn module(&self, path: &str) -> Option<&Module> {
        self.index.get(path).map(|&i| &self.modules[i])
    }

    /// Modules in declaration order
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Modules in dependency order (every module after all of its dependencies)
    pub fn topological_order(&self) -> impl Iterator<Item = &Module> {
        self.order.iter().map(|&i| &self.modules[i])
    }

    /// Plugin modules in declaration order
    pub fn plugins(&self) -> impl Iterator<Item = &Module> {
        self.modules
            .iter()
            .filter(|m| m.kind == ModuleKind::Plugin)
    }

    /// Get module count
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Transitive closure of main-scope dependencies, in dependency order.
    ///
    /// These are the modules whose classes are on the compile classpath and
    /// get inlined when packaging. The module itself is not included.
    pub fn main_closure(&self, path: &str) -> Vec<&Module> {
        let mut seen = HashSet::new();
        if let Some(module) = self.module(path) {
            for dep in module.main_dependencies() {
                self.collect_main(&dep.module, &mut seen);
            }
        }
        self.in_dependency_order(&seen)
    }

    /// Modules on the test classpath: the main closure plus test-only
    /// dependencies and their own main closures.
    pub fn test_closure(&self, path: &str) -> Vec<&Module> {
        let mut seen = HashSet::new();
        if let Some(module) = self.module(path) {
            for dep in &module.dependencies {
                self.collect_main(&dep.module, &mut seen);
            }
        }
        seen.remove(path);
        self.in_dependency_order(&seen)
    }

    fn collect_main<'a>(&'a self, path: &'a str, seen: &mut HashSet<&'a str>) {
        if !seen.insert(path) {
            return;
        }
        if let Some(module) = self.module(path) {
            for dep in module.main_dependencies() {
                self.collect_main(&dep.module, seen);
            }
        }
    }

    fn in_dependency_order(&self, members: &HashSet<&str>) -> Vec<&Module> {
        self.topological_order()
            .filter(|m| members.contains(m.path.as_str()))
            .collect()
    }

    /// Group modules into levels that can compile concurrently.
    ///
    /// Level 0 has no module dependencies; level N depends only on lower levels.
    pub fn levels(&self) -> Vec<Vec<&Module>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        for module in self.topological_order() {
            let d = module
                .dependencies
                .iter()
                .map(|dep| depth[dep.module.as_str()] + 1)
                .max()
                .unwrap_or(0);
            depth.insert(module.path.as_str(), d);
        }

        let mut levels: Vec<Vec<&Module>> = Vec::new();
        for module in &self.modules {
            let d = depth[module.path.as_str()];
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(module);
        }
        levels
    }
}
