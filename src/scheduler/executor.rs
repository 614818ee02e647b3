//! Worker-pool execution of the task DAG.
//!
//! A bounded pool of worker threads drains the ready queue: a task becomes
//! ready when every dependency reached a terminal state. Per-rule
//! concurrency caps are enforced at dequeue time, completeness markers
//! decide skipping, and a cancellation token stops new launches on
//! interrupt.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::base::{Result, SparvError};
use crate::graph::{TaskGraph, TaskId};
use crate::preloader::PreloadClient;
use crate::registry::{ExecutionEnv, TaskContext};

use super::staleness::{marker_workdir, outputs_complete, task_signature};

/// Options controlling one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker count; 0 means all available CPUs.
    pub jobs: usize,
    pub dry_run: bool,
    pub force: bool,
    pub keep_going: bool,
    pub rerun_incomplete: bool,
    pub stats: bool,
    pub socket: Option<PathBuf>,
    pub force_preloader: bool,
}

impl RunOptions {
    pub fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Executed,
    Skipped,
    Failed(String),
    /// Not run because an upstream task failed or the run was cancelled.
    NotRun,
}

/// Result of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub executed: Vec<TaskId>,
    pub skipped: Vec<TaskId>,
    pub failed: Vec<(TaskId, String)>,
    /// Per-task wall-clock times (with `--stats`).
    pub timings: Vec<(TaskId, Duration)>,
    /// Stale tasks listed by a dry run.
    pub stale: Vec<TaskId>,
}

impl RunSummary {
    pub fn ok(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Status {
    Pending,
    Running,
    Done,
    Failed,
    NotRun,
}

struct SchedState {
    status: Vec<Status>,
    indegree: Vec<usize>,
    running_per_rule: FxHashMap<SmolStr, usize>,
    running: usize,
    terminal: usize,
    stop_launch: bool,
    summary: RunSummary,
}

impl SchedState {
    fn finished(&self, total: usize) -> bool {
        self.terminal == total || (self.stop_launch && self.running == 0)
    }
}

/// Execute (or dry-run) the task graph.
pub fn execute(
    graph: &TaskGraph,
    env: &ExecutionEnv,
    options: &RunOptions,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    if options.dry_run {
        return dry_run(graph, env, options);
    }

    let total = graph.len();
    let state = Mutex::new(SchedState {
        status: vec![Status::Pending; total],
        indegree: graph.dependencies.iter().map(Vec::len).collect(),
        running_per_rule: FxHashMap::default(),
        running: 0,
        terminal: 0,
        stop_launch: false,
        summary: RunSummary::default(),
    });
    let ready_cv = Condvar::new();
    let workers = options.worker_count().min(total.max(1));

    info!(tasks = total, workers, "starting run");

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| worker_loop(graph, env, options, cancel, &state, &ready_cv));
        }
    });

    let state = state.into_inner();
    let summary = state.summary;

    if cancel.is_cancelled() {
        return Err(SparvError::Cancelled);
    }
    Ok(summary)
}

fn worker_loop(
    graph: &TaskGraph,
    env: &ExecutionEnv,
    options: &RunOptions,
    cancel: &CancellationToken,
    state: &Mutex<SchedState>,
    ready_cv: &Condvar,
) {
    let total = graph.len();
    loop {
        let task_index = {
            let mut guard = state.lock();
            loop {
                if cancel.is_cancelled() {
                    guard.stop_launch = true;
                }
                if guard.finished(total) {
                    ready_cv.notify_all();
                    return;
                }
                if !guard.stop_launch {
                    if let Some(index) = pick_ready(graph, &guard) {
                        guard.status[index] = Status::Running;
                        guard.running += 1;
                        *guard
                            .running_per_rule
                            .entry(graph.tasks[index].rule.name.clone())
                            .or_insert(0) += 1;
                        break index;
                    }
                }
                ready_cv.wait(&mut guard);
            }
        };

        let task = &graph.tasks[task_index];
        let started = Instant::now();
        let outcome = run_one(graph, task_index, env, options);
        let elapsed = started.elapsed();

        let mut guard = state.lock();
        guard.running -= 1;
        if let Some(count) = guard.running_per_rule.get_mut(&task.rule.name) {
            *count = count.saturating_sub(1);
        }
        match &outcome {
            TaskOutcome::Executed => {
                debug!(task = %task.id, ?elapsed, "task finished");
                guard.status[task_index] = Status::Done;
                guard.summary.executed.push(task.id.clone());
                if options.stats {
                    guard.summary.timings.push((task.id.clone(), elapsed));
                }
            }
            TaskOutcome::Skipped => {
                debug!(task = %task.id, "task up to date");
                guard.status[task_index] = Status::Done;
                guard.summary.skipped.push(task.id.clone());
            }
            TaskOutcome::Failed(message) => {
                error!(task = %task.id, message, "task failed");
                guard.status[task_index] = Status::Failed;
                guard
                    .summary
                    .failed
                    .push((task.id.clone(), message.clone()));
                if options.keep_going {
                    skip_descendants(graph, task_index, &mut guard);
                } else {
                    guard.stop_launch = true;
                }
            }
            TaskOutcome::NotRun => {
                guard.status[task_index] = Status::NotRun;
            }
        }
        guard.terminal += 1;
        if guard.status[task_index] == Status::Done {
            for &dependent in &graph.dependents[task_index] {
                guard.indegree[dependent] = guard.indegree[dependent].saturating_sub(1);
            }
        }
        ready_cv.notify_all();
    }
}

/// Choose the highest-priority ready task whose rule is under its
/// concurrency cap.
fn pick_ready(graph: &TaskGraph, state: &SchedState) -> Option<usize> {
    let mut best: Option<usize> = None;
    for index in 0..graph.len() {
        if state.status[index] != Status::Pending || state.indegree[index] != 0 {
            continue;
        }
        let task = &graph.tasks[index];
        if let Some(cap) = task.rule.function.max_concurrent {
            let running = state
                .running_per_rule
                .get(&task.rule.name)
                .copied()
                .unwrap_or(0);
            if running >= cap {
                continue;
            }
        }
        match best {
            None => best = Some(index),
            Some(current) if task.priority() > graph.tasks[current].priority() => {
                best = Some(index)
            }
            _ => {}
        }
    }
    best
}

/// Mark every transitive dependent of a failed task as not-run.
fn skip_descendants(graph: &TaskGraph, failed: usize, state: &mut SchedState) {
    let mut queue = vec![failed];
    while let Some(index) = queue.pop() {
        for &dependent in &graph.dependents[index] {
            if state.status[dependent] == Status::Pending {
                state.status[dependent] = Status::NotRun;
                state.terminal += 1;
                warn!(task = %graph.tasks[dependent].id, "skipped: upstream failure");
                queue.push(dependent);
            }
        }
    }
}

/// Run one task: skip when fresh, otherwise execute the body (through the
/// preloader when configured) and publish the completeness marker.
fn run_one(
    graph: &TaskGraph,
    task_index: usize,
    env: &ExecutionEnv,
    options: &RunOptions,
) -> TaskOutcome {
    let task = &graph.tasks[task_index];

    let signature = match task_signature(task, env) {
        Ok(signature) => Some(signature),
        // Inputs unreadable: the task must run (and may then produce a
        // real error worth reporting).
        Err(_) => None,
    };

    if !options.force {
        if let Some(signature) = &signature {
            if outputs_complete(task, env) {
                let marker = marker_workdir(task, env)
                    .read_marker(&task.id.rule)
                    .ok()
                    .flatten();
                if let Some(marker) = marker {
                    if &marker.signature == signature {
                        return TaskOutcome::Skipped;
                    }
                    debug!(task = %task.id, "signature changed, re-running");
                }
            }
        }
    }

    let result = execute_body(task, env, options);
    match result {
        Ok(()) => {
            // Recompute after running: inputs may only now exist.
            let signature = match task_signature(task, env) {
                Ok(signature) => signature,
                Err(e) => {
                    return TaskOutcome::Failed(format!("signature after run: {e}"));
                }
            };
            if let Err(e) =
                marker_workdir(task, env).write_marker(&task.id.rule, &signature)
            {
                return TaskOutcome::Failed(format!("writing marker: {e}"));
            }
            TaskOutcome::Executed
        }
        Err(e) => {
            if e.is_fatal() {
                error!(task = %task.id, "fatal: {e}");
            }
            TaskOutcome::Failed(e.to_string())
        }
    }
}

fn execute_body(
    task: &crate::graph::Task,
    env: &ExecutionEnv,
    options: &RunOptions,
) -> Result<()> {
    // Warm instance over the preload socket when available.
    if let (Some(socket), Some(_)) = (&options.socket, &task.rule.function.preload) {
        match PreloadClient::try_execute(socket, task, env, options.force_preloader) {
            Ok(Some(result)) => return result,
            Ok(None) => {
                debug!(task = %task.id, "preloader unavailable, running inline");
            }
            Err(e) => {
                warn!(task = %task.id, "preloader error, running inline: {e}");
            }
        }
    }

    let body = task
        .rule
        .function
        .body
        .clone()
        .ok_or_else(|| SparvError::registry(format!("'{}' has no body", task.rule.name)))?;
    let mut ctx = TaskContext::new(
        &task.rule.name,
        task.file(),
        &task.rule.params,
        env,
    );
    body(&mut ctx).map_err(|e| match e {
        fatal @ SparvError::Corrupt(_) => fatal,
        other => SparvError::task(task.rule.name.as_str(), task.file(), other.to_string()),
    })
}

/// Compute and report the stale set without running anything.
fn dry_run(graph: &TaskGraph, env: &ExecutionEnv, options: &RunOptions) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    let mut stale = vec![false; graph.len()];
    for index in graph.topo_order() {
        let task = &graph.tasks[index];
        let dep_stale = graph.dependencies[index].iter().any(|&d| stale[d]);
        let own_stale = if options.force {
            true
        } else if dep_stale {
            // Inputs will be rewritten; assume stale (the real run still
            // skips when the rewritten inputs hash identically).
            true
        } else if !outputs_complete(task, env) {
            true
        } else {
            match task_signature(task, env) {
                Ok(signature) => {
                    let marker = marker_workdir(task, env)
                        .read_marker(&task.id.rule)
                        .ok()
                        .flatten();
                    marker.map(|m| m.signature != signature).unwrap_or(true)
                }
                Err(_) => true,
            }
        };
        stale[index] = own_stale;
        if own_stale {
            summary.stale.push(task.id.clone());
        }
    }
    info!(
        stale = summary.stale.len(),
        total = graph.len(),
        "dry run complete"
    );
    Ok(summary)
}
