//! Task graph derived from the module graph
//!
//! Every module expands into a fixed template of tasks according to its
//! kind, and edges are derived from module dependencies. One task exists per
//! (module, kind) pair. Tasks are stored so that every prerequisite has a
//! lower index than its dependents, which makes the graph acyclic by
//! construction.

use crate::artifact::BundleKind;
use crate::error::{BuildError, BuildResult};
use crate::graph::ModuleGraph;
use runetale_config::ModuleKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// What a task does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Compile,
    UnitTest,
    ContractTest,
    Package,
    Bundle(BundleKind),
    Deploy,
}

impl TaskKind {
    /// Task name as shown to users
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::UnitTest => "unitTest",
            Self::ContractTest => "contractTest",
            Self::Package => "package",
            Self::Bundle(BundleKind::PluginJars) => "bundlePluginJars",
            Self::Bundle(BundleKind::ModsRelease) => "bundleModsRelease",
            Self::Deploy => "deployPluginsToRun",
        }
    }

    /// Task kinds generated for a module of the given kind
    pub fn template(kind: ModuleKind) -> &'static [TaskKind] {
        match kind {
            ModuleKind::Library => &[Self::Compile, Self::UnitTest, Self::ContractTest],
            ModuleKind::Plugin => &[
                Self::Compile,
                Self::UnitTest,
                Self::ContractTest,
                Self::Package,
            ],
            ModuleKind::TestSupport => &[Self::Compile, Self::UnitTest],
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed task identity: owning module (None for root-level tasks) plus kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub module: Option<String>,
    pub kind: TaskKind,
}

impl TaskId {
    /// Task owned by a module
    pub fn module(module: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            module: Some(module.into()),
            kind,
        }
    }

    /// Root-level task
    pub fn root(kind: TaskKind) -> Self {
        Self { module: None, kind }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}:{}", module, self.kind),
            None => write!(f, ":{}", self.kind),
        }
    }
}

/// A schedulable unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    /// Indices of prerequisite tasks, ascending
    pub prerequisites: Vec<usize>,
}

/// Execution DAG of build tasks
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    /// Derive the task graph from a validated module graph
    pub fn build(graph: &ModuleGraph) -> Self {
        let mut builder = TaskGraph {
            tasks: Vec::new(),
            index: HashMap::new(),
        };

        for module in graph.topological_order() {
            let compile = TaskId::module(&module.path, TaskKind::Compile);

            for kind in TaskKind::template(module.kind) {
                let mut prerequisites = Vec::new();
                match kind {
                    TaskKind::Compile => {
                        for dep in &module.dependencies {
                            prerequisites.push(TaskId::module(&dep.module, TaskKind::Compile));
                        }
                    }
                    TaskKind::UnitTest | TaskKind::ContractTest => {
                        prerequisites.push(compile.clone());
                    }
                    TaskKind::Package => {
                        // Contract tests are not part of the packaging gate
                        prerequisites.push(compile.clone());
                        prerequisites.push(TaskId::module(&module.path, TaskKind::UnitTest));
                        for dep in graph.main_closure(&module.path) {
                            prerequisites.push(TaskId::module(&dep.path, TaskKind::Compile));
                        }
                    }
                    TaskKind::Bundle(_) | TaskKind::Deploy => {}
                }
                builder.add(TaskId::module(&module.path, *kind), &prerequisites);
            }
        }

        let packages: Vec<TaskId> = graph
            .plugins()
            .map(|p| TaskId::module(&p.path, TaskKind::Package))
            .collect();
        for kind in [
            TaskKind::Bundle(BundleKind::PluginJars),
            TaskKind::Bundle(BundleKind::ModsRelease),
            TaskKind::Deploy,
        ] {
            builder.add(TaskId::root(kind), &packages);
        }

        builder
    }

    fn add(&mut self, id: TaskId, prerequisites: &[TaskId]) {
        let resolved: BTreeSet<usize> = prerequisites
            .iter()
            .filter_map(|p| self.index.get(p).copied())
            .collect();
        debug_assert_eq!(resolved.len(), {
            let unique: BTreeSet<&TaskId> = prerequisites.iter().collect();
            unique.len()
        });

        self.index.insert(id.clone(), self.tasks.len());
        self.tasks.push(Task {
            id,
            prerequisites: resolved.into_iter().collect(),
        });
    }

    /// All tasks; prerequisites always precede dependents
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Task at an index
    pub fn task(&self, index: usize) -> &Task {
        &self.tasks[index]
    }

    /// Look up a task index by identity
    pub fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Look up a task by identity
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index_of(id).map(|i| &self.tasks[i])
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the graph has no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Identities of every task of a kind, in graph order
    pub fn ids_of_kind(&self, kind: TaskKind) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.id.kind == kind)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Requested tasks plus all of their transitive prerequisites, ascending
    pub fn closure(&self, requested: &[TaskId]) -> BuildResult<Vec<usize>> {
        let mut members = BTreeSet::new();
        let mut stack = Vec::new();
        for id in requested {
            let idx = self
                .index_of(id)
                .ok_or_else(|| BuildError::TaskNotFound(id.to_string()))?;
            stack.push(idx);
        }

        while let Some(idx) = stack.pop() {
            if members.insert(idx) {
                stack.extend(self.tasks[idx].prerequisites.iter().copied());
            }
        }

        Ok(members.into_iter().collect())
    }

    /// Indices of tasks that directly depend on each task
    pub fn dependents(&self) -> Vec<Vec<usize>> {
        let mut dependents = vec![Vec::new(); self.tasks.len()];
        for (idx, task) in self.tasks.iter().enumerate() {
            for &pre in &task.prerequisites {
                dependents[pre].push(idx);
            }
        }
        dependents
    }
}
