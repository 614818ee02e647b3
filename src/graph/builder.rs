//! DAG construction from targets.
//!
//! Starting from the requested targets as "wanted outputs", selects the
//! producing rule for every wanted artifact (unique after order
//! resolution), adds its inputs to the worklist, expands file-scoped rules
//! across the source files, and emits ordering edges. Cycles are a hard
//! error naming the rules involved.

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use tracing::debug;

use crate::base::{Result, SparvError};
use crate::registry::{ExecutionEnv, FunctionKind};
use crate::resolver::{Artifact, RuleScope, RuleSet};

use super::task::Task;

/// The runnable DAG: tasks plus forward and reverse adjacency.
#[derive(Debug)]
pub struct TaskGraph {
    pub tasks: Vec<Task>,
    /// For each task, the tasks that consume its outputs.
    pub dependents: Vec<Vec<usize>>,
    /// For each task, the tasks it needs finished first.
    pub dependencies: Vec<Vec<usize>>,
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task indices in a deterministic topological order.
    pub fn topo_order(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: Vec<usize> = (0..self.tasks.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(task) = ready.pop() {
            order.push(task);
            for &dependent in &self.dependents[task] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }
        order
    }
}

/// Build the task graph for a set of targets.
///
/// A target names a rule (`xml_export:pretty`), a module (`xml_export`,
/// selecting its rules of the allowed kinds), or a concrete annotation.
pub fn build_graph(
    ruleset: &mut RuleSet,
    targets: &[String],
    allowed_kinds: &[FunctionKind],
    env: &ExecutionEnv,
) -> Result<TaskGraph> {
    // --- Resolve targets to initial rules -----------------------------
    let mut selected: Vec<usize> = Vec::new();
    let mut selected_set: FxHashSet<usize> = FxHashSet::default();
    let mut queue: Vec<usize> = Vec::new();

    let mut select = |index: usize,
                      selected: &mut Vec<usize>,
                      selected_set: &mut FxHashSet<usize>,
                      queue: &mut Vec<usize>| {
        if selected_set.insert(index) {
            selected.push(index);
            queue.push(index);
        }
    };

    for target in targets {
        let mut matched = false;
        let matches: Vec<usize> = ruleset
            .rules()
            .iter()
            .enumerate()
            .filter(|(_, rule)| {
                rule.name.as_str() == target
                    || (rule.function.module() == target
                        && allowed_kinds.contains(&rule.function.kind))
            })
            .map(|(i, _)| i)
            .collect();
        for index in matches {
            matched = true;
            select(index, &mut selected, &mut selected_set, &mut queue);
        }
        if !matched {
            // A target may also be a concrete annotation identifier.
            if let Ok(annotation) = crate::base::Annotation::new(target) {
                let resolved = ruleset.bindings().resolve(&annotation)?;
                if let Some(index) =
                    ruleset.producer_of(&Artifact::Annotation(resolved), env)?
                {
                    matched = true;
                    select(index, &mut selected, &mut selected_set, &mut queue);
                }
            }
        }
        if !matched {
            return Err(SparvError::UnknownTarget(target.clone()));
        }
    }

    // --- Transitive closure over wanted outputs -----------------------
    // Rule-level edges: (producer, consumer).
    let mut rule_edges: FxHashSet<(usize, usize)> = FxHashSet::default();

    while let Some(consumer) = queue.pop() {
        let inputs = ruleset.rule(consumer).inputs();
        for input in inputs {
            let producer = ruleset.producer_of(&input.artifact, env)?;
            let producer = match (producer, &input.artifact) {
                (Some(p), _) => Some(p),
                // An annotation no rule produces may come from the source
                // itself; it is then covered by the importer's structure
                // record.
                (None, Artifact::Annotation(_)) => {
                    ruleset.producer_of(&Artifact::Structure, env)?
                }
                (None, _) => None,
            };
            if let Some(producer) = producer {
                if producer != consumer {
                    rule_edges.insert((producer, consumer));
                    select(producer, &mut selected, &mut selected_set, &mut queue);
                }
            }
        }
    }

    // --- Cycle detection at rule level --------------------------------
    detect_cycles(ruleset, &selected, &rule_edges)?;

    // --- Expand to per-file tasks -------------------------------------
    let mut tasks: Vec<Task> = Vec::new();
    // rule index -> task indices
    let mut tasks_of_rule: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    // Deterministic order: selection order, files in source order.
    let mut ordered_rules = selected.clone();
    ordered_rules.sort_unstable();
    for &rule_index in &ordered_rules {
        let rule = ruleset.rule(rule_index).clone();
        let mut indices = Vec::new();
        match rule.scope {
            RuleScope::File => {
                for file in &env.files {
                    indices.push(tasks.len());
                    tasks.push(Task::new(rule.clone(), Some(file.clone())));
                }
            }
            RuleScope::Corpus => {
                indices.push(tasks.len());
                tasks.push(Task::new(rule.clone(), None));
            }
        }
        tasks_of_rule.insert(rule_index, indices);
    }

    // --- Task-level edges ---------------------------------------------
    let mut dependents: Vec<FxHashSet<usize>> = vec![FxHashSet::default(); tasks.len()];
    let mut dependencies: Vec<FxHashSet<usize>> = vec![FxHashSet::default(); tasks.len()];
    let file_of = |task: &Task| task.id.file.clone();

    for &(producer, consumer) in &rule_edges {
        let empty = Vec::new();
        let producer_tasks = tasks_of_rule.get(&producer).unwrap_or(&empty);
        let consumer_tasks = tasks_of_rule.get(&consumer).unwrap_or(&empty);
        for &pt in producer_tasks {
            for &ct in consumer_tasks {
                let same_file = match (file_of(&tasks[pt]), file_of(&tasks[ct])) {
                    (Some(a), Some(b)) => a == b,
                    // A corpus-scoped endpoint connects to every task of
                    // the other rule.
                    _ => true,
                };
                if same_file {
                    dependents[pt].insert(ct);
                    dependencies[ct].insert(pt);
                }
            }
        }
    }

    let dependents: Vec<Vec<usize>> = dependents
        .into_iter()
        .map(|set| {
            let mut v: Vec<usize> = set.into_iter().collect();
            v.sort_unstable();
            v
        })
        .collect();
    let dependencies: Vec<Vec<usize>> = dependencies
        .into_iter()
        .map(|set| {
            let mut v: Vec<usize> = set.into_iter().collect();
            v.sort_unstable();
            v
        })
        .collect();

    debug!(
        tasks = tasks.len(),
        rules = selected.len(),
        "built task graph"
    );

    Ok(TaskGraph {
        tasks,
        dependents,
        dependencies,
    })
}

/// Depth-first search for a rule-level cycle.
fn detect_cycles(
    ruleset: &RuleSet,
    selected: &[usize],
    edges: &FxHashSet<(usize, usize)>,
) -> Result<()> {
    let mut adjacency: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for &(producer, consumer) in edges {
        adjacency.entry(producer).or_default().push(consumer);
    }

    #[derive(Clone, Copy, PartialEq)]
    enum State {
        White,
        Grey,
        Black,
    }
    let mut state: FxHashMap<usize, State> = FxHashMap::default();
    for &rule in selected {
        state.insert(rule, State::White);
    }

    fn visit(
        node: usize,
        adjacency: &FxHashMap<usize, Vec<usize>>,
        state: &mut FxHashMap<usize, State>,
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        state.insert(node, State::Grey);
        stack.push(node);
        if let Some(nexts) = adjacency.get(&node) {
            for &next in nexts {
                match state.get(&next) {
                    Some(State::Grey) => {
                        let from = stack.iter().position(|&n| n == next).unwrap_or(0);
                        return Some(stack[from..].to_vec());
                    }
                    Some(State::White) => {
                        if let Some(cycle) = visit(next, adjacency, state, stack) {
                            return Some(cycle);
                        }
                    }
                    _ => {}
                }
            }
        }
        stack.pop();
        state.insert(node, State::Black);
        None
    }

    for &rule in selected {
        if state.get(&rule) == Some(&State::White) {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(rule, &adjacency, &mut state, &mut stack) {
                let names: Vec<SmolStr> = cycle
                    .iter()
                    .map(|&i| ruleset.rule(i).name.clone())
                    .collect();
                return Err(SparvError::Cycle(
                    names
                        .iter()
                        .map(SmolStr::as_str)
                        .collect::<Vec<_>>()
                        .join(" -> "),
                ));
            }
        }
    }
    Ok(())
}
