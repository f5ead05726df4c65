//! Dependency graph construction and execution ordering.
//!
//! [`build_graph`] runs once per registration change to check the
//! evaluator list for structural errors and build the [`EvaluationPlan`]:
//! the interned fields, each evaluator's inputs and outputs, and a
//! deterministic topological execution order.

use crate::evaluator::Evaluator;
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::error::Error;
use std::fmt;
use strata_core::{EvalScalar, FieldId, FieldRegistry, FieldSet, FieldTag};

/// The field declarations of one evaluator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluatorDecl {
    /// Evaluator name.
    pub name: String,
    /// Fields required as inputs.
    pub requires: Vec<FieldTag>,
    /// Fields produced as outputs.
    pub produces: Vec<FieldTag>,
}

impl EvaluatorDecl {
    /// Create a declaration.
    pub fn new(name: impl Into<String>, requires: Vec<FieldTag>, produces: Vec<FieldTag>) -> Self {
        Self {
            name: name.into(),
            requires,
            produces,
        }
    }
}

// ── Plan ───────────────────────────────────────────────────────────

/// Compiled evaluation graph.
///
/// Evaluator indices refer to positions in the registration list the plan
/// was built from.
#[derive(Debug)]
#[must_use]
pub struct EvaluationPlan {
    registry: FieldRegistry,
    roots: FieldSet,
    names: Vec<String>,
    order: Vec<usize>,
    inputs: Vec<Vec<FieldId>>,
    outputs: Vec<Vec<FieldId>>,
    dependencies: Vec<Vec<usize>>,
    producers: IndexMap<FieldId, usize>,
}

impl EvaluationPlan {
    /// Registration indices in execution order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Evaluator names in execution order.
    pub fn ordered_names(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    /// Number of scheduled evaluators.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of registered evaluators (scheduled or not).
    pub fn evaluator_count(&self) -> usize {
        self.names.len()
    }

    /// The interned fields.
    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Fields supplied from outside the graph.
    pub fn roots(&self) -> &FieldSet {
        &self.roots
    }

    /// Whether `field` is an external root.
    pub fn is_root(&self, field: FieldId) -> bool {
        self.roots.contains(field)
    }

    /// Registration index of the evaluator producing `field`.
    pub fn producer_of(&self, field: FieldId) -> Option<usize> {
        self.producers.get(&field).copied()
    }

    /// Produced fields with their producers, in first-produced order.
    pub fn produced(&self) -> impl Iterator<Item = (FieldId, usize)> + '_ {
        self.producers.iter().map(|(&f, &i)| (f, i))
    }

    /// Input fields of an evaluator.
    pub fn inputs(&self, evaluator: usize) -> &[FieldId] {
        self.inputs.get(evaluator).map_or(&[], Vec::as_slice)
    }

    /// Output fields of an evaluator.
    pub fn outputs(&self, evaluator: usize) -> &[FieldId] {
        self.outputs.get(evaluator).map_or(&[], Vec::as_slice)
    }

    /// Registration indices of the evaluators an evaluator depends on,
    /// ascending.
    pub fn dependencies(&self, evaluator: usize) -> &[usize] {
        self.dependencies.get(evaluator).map_or(&[], Vec::as_slice)
    }

    /// Name of an evaluator.
    pub fn name(&self, evaluator: usize) -> Option<&str> {
        self.names.get(evaluator).map(String::as_str)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Two evaluators producing the same field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateProducer {
    /// The contested field.
    pub field: FieldTag,
    /// Earlier producer in registration order.
    pub first: String,
    /// Later producer in registration order.
    pub second: String,
}

/// A required field nobody produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// The unmet field.
    pub field: FieldTag,
    /// Evaluator requiring it.
    pub evaluator: String,
    /// Known fields with the same name but a different layout.
    pub near_misses: Vec<FieldTag>,
}

/// Errors from graph construction (setup-time, never per workset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphBuildError {
    /// No evaluators registered.
    EmptyGraph,

    /// Two or more evaluators produce the same field.
    DuplicateProducer(Vec<DuplicateProducer>),

    /// An evaluator produces a field also declared as an external root.
    RootProduced {
        /// The field.
        field: FieldTag,
        /// The producing evaluator.
        evaluator: String,
    },

    /// Required fields neither produced nor declared as roots.
    MissingDependency(Vec<MissingDependency>),

    /// A field requested for output is not part of the graph.
    UnknownRequiredField {
        /// The field.
        field: FieldTag,
    },

    /// The dependencies form a cycle.
    CycleDetected {
        /// Evaluator names along the shortest cycle, each depending on
        /// the one before it and the first on the last.
        cycle: Vec<String>,
    },
}

impl fmt::Display for GraphBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGraph => write!(f, "no evaluators registered"),
            Self::DuplicateProducer(dups) => {
                write!(f, "duplicate producers: ")?;
                for (i, d) in dups.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(
                        f,
                        "field {} produced by '{}' and '{}'",
                        d.field, d.first, d.second
                    )?;
                }
                Ok(())
            }
            Self::RootProduced { field, evaluator } => {
                write!(f, "root field {field} is also produced by '{evaluator}'")
            }
            Self::MissingDependency(missing) => {
                write!(f, "missing dependencies: ")?;
                for (i, m) in missing.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "field {} required by '{}'", m.field, m.evaluator)?;
                    if !m.near_misses.is_empty() {
                        let near: Vec<String> =
                            m.near_misses.iter().map(ToString::to_string).collect();
                        write!(f, " (layout differs from {})", near.join(", "))?;
                    }
                }
                Ok(())
            }
            Self::UnknownRequiredField { field } => {
                write!(f, "required field {field} is not in the graph")
            }
            Self::CycleDetected { cycle } => {
                write!(f, "dependency cycle: {}", cycle.join(" -> "))?;
                if let Some(first) = cycle.first() {
                    write!(f, " -> {first}")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for GraphBuildError {}

// ── Construction ───────────────────────────────────────────────────

/// Build the evaluation plan for a list of evaluators.
///
/// See [`build_graph_from_decls`].
pub fn build_graph<S: EvalScalar>(
    evaluators: &[Box<dyn Evaluator<S>>],
    roots: &[FieldTag],
    required: &[FieldTag],
) -> Result<EvaluationPlan, GraphBuildError> {
    let decls: Vec<EvaluatorDecl> = evaluators.iter().map(|e| e.declared_fields()).collect();
    build_graph_from_decls(&decls, roots, required)
}

/// Intern `tags`, keeping the first occurrence of a tag listed twice.
fn intern_unique(registry: &mut FieldRegistry, tags: &[FieldTag]) -> Vec<FieldId> {
    let mut ids = Vec::with_capacity(tags.len());
    for tag in tags {
        let id = registry.intern(tag);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Build the evaluation plan from evaluator declarations.
///
/// Checks performed (all before any evaluation):
///
/// 1. At least one evaluator.
/// 2. No field has two producers, and no root is produced.
/// 3. Every required field is produced or a root.
/// 4. The producer-to-consumer graph is acyclic.
///
/// The order is a topological sort in which, among evaluators whose
/// dependencies are satisfied, the earliest registered runs first. When
/// `required` is non-empty, only the evaluators those fields transitively
/// depend on are scheduled.
pub fn build_graph_from_decls(
    decls: &[EvaluatorDecl],
    roots: &[FieldTag],
    required: &[FieldTag],
) -> Result<EvaluationPlan, GraphBuildError> {
    // 1. Non-empty
    if decls.is_empty() {
        return Err(GraphBuildError::EmptyGraph);
    }

    // Intern: roots first, then each evaluator's fields in registration order.
    let mut registry = FieldRegistry::new();
    let root_set: FieldSet = roots.iter().map(|t| registry.intern(t)).collect();
    let mut inputs = Vec::with_capacity(decls.len());
    let mut outputs = Vec::with_capacity(decls.len());
    for d in decls {
        outputs.push(intern_unique(&mut registry, &d.produces));
        inputs.push(intern_unique(&mut registry, &d.requires));
    }

    // 2. Producers
    let mut producers: IndexMap<FieldId, usize> = IndexMap::new();
    let mut duplicates = Vec::new();
    for (i, outs) in outputs.iter().enumerate() {
        for &field in outs {
            if let Some(&j) = producers.get(&field) {
                duplicates.push(DuplicateProducer {
                    field: tag_of(&registry, field),
                    first: decls[j].name.clone(),
                    second: decls[i].name.clone(),
                });
                continue;
            }
            producers.insert(field, i);
        }
    }
    if !duplicates.is_empty() {
        return Err(GraphBuildError::DuplicateProducer(duplicates));
    }
    if let Some((&field, &i)) = producers.iter().find(|(f, _)| root_set.contains(**f)) {
        return Err(GraphBuildError::RootProduced {
            field: tag_of(&registry, field),
            evaluator: decls[i].name.clone(),
        });
    }

    // 3. Unmet dependencies
    let mut missing = Vec::new();
    for (i, ins) in inputs.iter().enumerate() {
        for &field in ins {
            if root_set.contains(field) || producers.contains_key(&field) {
                continue;
            }
            let tag = tag_of(&registry, field);
            let near_misses = registry.near_misses(tag.name(), tag.layout());
            missing.push(MissingDependency {
                field: tag,
                evaluator: decls[i].name.clone(),
                near_misses,
            });
        }
    }
    if !missing.is_empty() {
        return Err(GraphBuildError::MissingDependency(missing));
    }

    // Edges: producer -> consumer.
    let n = decls.len();
    let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(n);
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, ins) in inputs.iter().enumerate() {
        let mut deps: Vec<usize> = ins
            .iter()
            .filter_map(|f| producers.get(f).copied())
            .collect();
        deps.sort_unstable();
        deps.dedup();
        for &p in &deps {
            dependents[p].push(i);
        }
        dependencies.push(deps);
    }

    // 4. Kahn's algorithm with a min-heap on registration index.
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &c in &dependents[i] {
            in_degree[c] -= 1;
            if in_degree[c] == 0 {
                ready.push(Reverse(c));
            }
        }
    }
    if order.len() < n {
        let remaining: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
        let cycle = shortest_cycle(&dependents, &remaining)
            .into_iter()
            .map(|i| decls[i].name.clone())
            .collect();
        return Err(GraphBuildError::CycleDetected { cycle });
    }

    // Required-field pruning.
    if !required.is_empty() {
        let mut scheduled = vec![false; n];
        let mut stack = Vec::new();
        for tag in required {
            let field = registry
                .get(tag)
                .ok_or_else(|| GraphBuildError::UnknownRequiredField { field: tag.clone() })?;
            if let Some(&p) = producers.get(&field) {
                stack.push(p);
            }
        }
        while let Some(i) = stack.pop() {
            if !scheduled[i] {
                scheduled[i] = true;
                stack.extend(dependencies[i].iter().copied());
            }
        }
        order.retain(|&i| scheduled[i]);
    }

    let names: Vec<String> = decls.iter().map(|d| d.name.clone()).collect();
    log::info!(
        "evaluation graph: {} of {} evaluators scheduled over {} fields: [{}]",
        order.len(),
        n,
        registry.len(),
        order
            .iter()
            .map(|&i| names[i].as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(EvaluationPlan {
        registry,
        roots: root_set,
        names,
        order,
        inputs,
        outputs,
        dependencies,
        producers,
    })
}

fn tag_of(registry: &FieldRegistry, field: FieldId) -> FieldTag {
    registry
        .tag(field)
        .cloned()
        .unwrap_or_else(|| FieldTag::new(field.to_string(), strata_core::FieldLayout::new(&[])))
}

/// Shortest cycle among the `live` nodes, as a node sequence in edge
/// order. Ties resolve to the cycle through the lowest-indexed node.
fn shortest_cycle(dependents: &[Vec<usize>], live: &[bool]) -> Vec<usize> {
    let n = dependents.len();
    let mut best: Option<Vec<usize>> = None;
    for start in (0..n).filter(|&s| live[s]) {
        // BFS from `start` until an edge returns to it.
        let mut parent: Vec<Option<usize>> = vec![None; n];
        let mut seen = vec![false; n];
        let mut queue = VecDeque::from([start]);
        seen[start] = true;
        let mut closing = None;
        'bfs: while let Some(u) = queue.pop_front() {
            for &v in &dependents[u] {
                if !live[v] {
                    continue;
                }
                if v == start {
                    closing = Some(u);
                    break 'bfs;
                }
                if !seen[v] {
                    seen[v] = true;
                    parent[v] = Some(u);
                    queue.push_back(v);
                }
            }
        }
        let Some(mut node) = closing else {
            continue;
        };
        let mut path = vec![node];
        while let Some(p) = parent[node] {
            path.push(p);
            node = p;
        }
        path.reverse();
        if best.as_ref().is_none_or(|b| path.len() < b.len()) {
            best = Some(path);
        }
    }
    best.unwrap_or_default()
}
