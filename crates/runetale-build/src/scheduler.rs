//! Parallel task scheduler
//!
//! A coordinator on the calling thread owns every task status. Worker
//! threads receive ready tasks over a channel and report results back; a
//! task becomes ready the moment all of its prerequisites have succeeded.
//! At most `workers` tasks are in flight, so cancelling "not yet started"
//! tasks never races with a queued job.

use crate::error::{BuildError, BuildResult};
use crate::tasks::{Task, TaskGraph, TaskId};
use crossbeam_channel::{bounded, unbounded};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Completion status of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded {
        /// Reported from the fingerprint cache without executing
        up_to_date: bool,
    },
    Failed {
        error: String,
    },
    Skipped {
        reason: String,
    },
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Rank used to pick the worst status of a run
    fn severity(&self) -> u8 {
        match self {
            Self::Succeeded { .. } => 0,
            Self::Pending | Self::Running => 1,
            Self::Skipped { .. } => 2,
            Self::Failed { .. } => 3,
        }
    }

    /// The worse of two statuses
    pub fn worst<'a>(&'a self, other: &'a TaskStatus) -> &'a TaskStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded { up_to_date: true } => write!(f, "up-to-date"),
            Self::Succeeded { up_to_date: false } => write!(f, "succeeded"),
            Self::Failed { .. } => write!(f, "failed"),
            Self::Skipped { .. } => write!(f, "skipped"),
        }
    }
}

/// How a task reached success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Executed,
    UpToDate,
}

/// Read-only view handed to an executing task
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Status of each direct prerequisite at dispatch time
    pub prerequisites: Vec<(TaskId, TaskStatus)>,
}

impl TaskContext {
    /// Status of a direct prerequisite
    pub fn status_of(&self, id: &TaskId) -> Option<&TaskStatus> {
        self.prerequisites
            .iter()
            .find(|(p, _)| p == id)
            .map(|(_, s)| s)
    }
}

/// Executes the action behind a task
pub trait TaskExecutor: Sync {
    fn execute(&self, task: &Task, context: &TaskContext) -> BuildResult<TaskOutcome>;
}

/// Final record of one task in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    #[serde(flatten)]
    pub status: TaskStatus,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Outcome of scheduling a set of requested tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleReport {
    /// Every task in the requested closure, in graph order
    pub records: Vec<TaskRecord>,
    /// The tasks the caller asked for
    pub requested: Vec<TaskId>,
    /// Set when a fatal error cancelled the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl ScheduleReport {
    pub fn record(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn status(&self, id: &TaskId) -> Option<&TaskStatus> {
        self.record(id).map(|r| &r.status)
    }

    /// Worst status among the requested tasks
    pub fn overall(&self) -> TaskStatus {
        let initial = TaskStatus::Succeeded { up_to_date: false };
        self.requested
            .iter()
            .filter_map(|id| self.status(id))
            .fold(initial, |worst, s| worst.worst(s).clone())
    }

    /// True when every requested task succeeded
    pub fn succeeded(&self) -> bool {
        self.fatal.is_none() && self.overall().is_success()
    }

    /// Records that actually ran to success (cache hits excluded)
    pub fn executed(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records
            .iter()
            .filter(|r| r.status == TaskStatus::Succeeded { up_to_date: false })
    }
}

struct Job {
    index: usize,
    context: TaskContext,
}

struct Done {
    index: usize,
    result: BuildResult<TaskOutcome>,
    elapsed: Duration,
}

/// Worker-pool scheduler over a task graph
#[derive(Debug, Clone)]
pub struct Scheduler {
    workers: usize,
    fail_fast: bool,
}

impl Scheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            fail_fast: false,
        }
    }

    /// Cancel not-yet-started tasks after the first failure
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run the requested tasks and their prerequisites
    pub fn run<E: TaskExecutor>(
        &self,
        graph: &TaskGraph,
        requested: &[TaskId],
        executor: &E,
    ) -> BuildResult<ScheduleReport> {
        let closure = graph.closure(requested)?;
        let mut in_run = vec![false; graph.len()];
        for &idx in &closure {
            in_run[idx] = true;
        }

        let dependents: Vec<Vec<usize>> = graph
            .dependents()
            .into_iter()
            .map(|d| d.into_iter().filter(|&i| in_run[i]).collect())
            .collect();
        let mut remaining: Vec<usize> = graph
            .tasks()
            .iter()
            .map(|t| t.prerequisites.len())
            .collect();
        let mut status = vec![TaskStatus::Pending; graph.len()];
        let mut durations = vec![Duration::ZERO; graph.len()];

        let mut ready: BTreeSet<usize> = closure
            .iter()
            .copied()
            .filter(|&i| remaining[i] == 0)
            .collect();

        let pool_size = self.workers.min(closure.len()).max(1);
        let mut fatal: Option<String> = None;
        let mut cancelled: Option<String> = None;

        info!(tasks = closure.len(), workers = pool_size, "scheduling");

        thread::scope(|scope| {
            let (job_tx, job_rx) = bounded::<Job>(pool_size);
            let (done_tx, done_rx) = unbounded::<Done>();

            for _ in 0..pool_size {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for job in job_rx.iter() {
                        let task = graph.task(job.index);
                        let start = Instant::now();
                        let result = panic::catch_unwind(AssertUnwindSafe(|| {
                            executor.execute(task, &job.context)
                        }))
                        .unwrap_or_else(|_| Err(BuildError::TaskPanicked(task.id.to_string())));
                        let done = Done {
                            index: job.index,
                            result,
                            elapsed: start.elapsed(),
                        };
                        if done_tx.send(done).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);

            let mut running = 0usize;
            loop {
                if cancelled.is_none() {
                    while running < pool_size {
                        let Some(index) = ready.pop_first() else {
                            break;
                        };
                        let task = graph.task(index);
                        let context = TaskContext {
                            prerequisites: task
                                .prerequisites
                                .iter()
                                .map(|&p| (graph.task(p).id.clone(), status[p].clone()))
                                .collect(),
                        };
                        debug!(task = %task.id, "dispatching");
                        status[index] = TaskStatus::Running;
                        if job_tx.send(Job { index, context }).is_err() {
                            status[index] = TaskStatus::Pending;
                            break;
                        }
                        running += 1;
                    }
                }

                if running == 0 {
                    break;
                }

                let Ok(done) = done_rx.recv() else {
                    break;
                };
                running -= 1;
                durations[done.index] = done.elapsed;
                let id = &graph.task(done.index).id;

                match done.result {
                    Ok(outcome) => {
                        let up_to_date = outcome == TaskOutcome::UpToDate;
                        info!(task = %id, up_to_date, elapsed_ms = done.elapsed.as_millis() as u64, "task succeeded");
                        status[done.index] = TaskStatus::Succeeded { up_to_date };
                        for &d in &dependents[done.index] {
                            remaining[d] -= 1;
                            if remaining[d] == 0 && status[d] == TaskStatus::Pending {
                                ready.insert(d);
                            }
                        }
                    }
                    Err(error) => {
                        warn!(task = %id, %error, "task failed");
                        if error.is_fatal() && fatal.is_none() {
                            fatal = Some(error.to_string());
                        }
                        if (self.fail_fast || error.is_fatal()) && cancelled.is_none() {
                            cancelled = Some(format!("run cancelled after {} failed", id));
                        }
                        status[done.index] = TaskStatus::Failed {
                            error: error.to_string(),
                        };
                        skip_dependents(graph, &dependents, &mut status, &mut ready, done.index);
                    }
                }
            }
            drop(job_tx);
        });

        let reason = cancelled.unwrap_or_else(|| "not scheduled".to_string());
        let records = closure
            .iter()
            .map(|&idx| {
                let status = match &status[idx] {
                    TaskStatus::Pending | TaskStatus::Running => TaskStatus::Skipped {
                        reason: reason.clone(),
                    },
                    other => other.clone(),
                };
                TaskRecord {
                    id: graph.task(idx).id.clone(),
                    status,
                    duration: durations[idx],
                }
            })
            .collect();

        Ok(ScheduleReport {
            records,
            requested: requested.to_vec(),
            fatal,
        })
    }
}

/// Mark every transitive dependent of a failed task as skipped
fn skip_dependents(
    graph: &TaskGraph,
    dependents: &[Vec<usize>],
    status: &mut [TaskStatus],
    ready: &mut BTreeSet<usize>,
    failed: usize,
) {
    let failed_id = &graph.task(failed).id;
    let mut stack: Vec<usize> = dependents[failed].clone();
    while let Some(idx) = stack.pop() {
        if status[idx] != TaskStatus::Pending {
            continue;
        }
        debug!(task = %graph.task(idx).id, cause = %failed_id, "skipping dependent");
        status[idx] = TaskStatus::Skipped {
            reason: format!("prerequisite {} failed", failed_id),
        };
        ready.remove(&idx);
        stack.extend(dependents[idx].iter().copied());
    }
}
