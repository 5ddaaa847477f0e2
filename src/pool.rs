//! Bounded task groups with deadlines.
//!
//! Both levels of the pipeline (batches, and rows inside a batch) run through
//! [`run_bounded`]: at most `concurrency` tasks are in flight, each task can
//! carry its own deadline, and the whole collection can carry an overall one.
//! Tasks live in a [`JoinSet`], so anything still running when the group
//! gives up is aborted rather than leaked.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;

/// Shape of one bounded pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Maximum tasks in flight.
    pub concurrency: usize,
    /// Deadline for each task, measured from when it starts running.
    pub task_deadline: Option<Duration>,
    /// Deadline for collecting every task.
    pub overall_deadline: Option<Duration>,
}

impl PoolLimits {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            task_deadline: None,
            overall_deadline: None,
        }
    }

    pub fn with_task_deadline(mut self, deadline: Duration) -> Self {
        self.task_deadline = Some(deadline);
        self
    }

    pub fn with_overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = Some(deadline);
        self
    }
}

/// How a single task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// The task ran past its own deadline.
    TimedOut,
    /// The task panicked or was cancelled.
    Failed(String),
}

/// Everything a pool collected, in completion order.
#[derive(Debug)]
pub struct PoolReport<T> {
    pub outcomes: Vec<(usize, TaskOutcome<T>)>,
    /// Keys never collected because the overall deadline passed first.
    pub abandoned: Vec<usize>,
}

impl<T> Default for PoolReport<T> {
    fn default() -> Self {
        Self {
            outcomes: Vec::new(),
            abandoned: Vec::new(),
        }
    }
}

impl<T> PoolReport<T> {
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TaskOutcome::Completed(_)))
            .count()
    }
}

/// Run keyed futures with bounded concurrency and optional deadlines.
///
/// Futures are started lazily, one as soon as another finishes. Keys are
/// opaque to the pool and are handed back with each outcome.
pub async fn run_bounded<I, Fut, T>(tasks: I, limits: PoolLimits) -> PoolReport<T>
where
    I: IntoIterator<Item = (usize, Fut)>,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let concurrency = limits.concurrency.max(1);
    let deadline = limits.overall_deadline.map(|d| Instant::now() + d);

    let mut pending = tasks.into_iter();
    let mut set: JoinSet<(usize, Option<T>)> = JoinSet::new();
    let mut in_flight: HashMap<Id, usize> = HashMap::new();
    let mut report = PoolReport::default();

    while in_flight.len() < concurrency {
        match pending.next() {
            Some((key, fut)) => spawn_task(&mut set, &mut in_flight, key, fut, limits.task_deadline),
            None => break,
        }
    }

    loop {
        let joined = match deadline {
            Some(at) => match tokio::time::timeout_at(at, set.join_next_with_id()).await {
                Ok(joined) => joined,
                Err(_) => {
                    report.abandoned.extend(in_flight.values().copied());
                    report.abandoned.extend(pending.by_ref().map(|(key, _)| key));
                    report.abandoned.sort_unstable();
                    break;
                }
            },
            None => set.join_next_with_id().await,
        };

        let Some(joined) = joined else { break };

        match joined {
            Ok((id, (key, value))) => {
                in_flight.remove(&id);
                let outcome = match value {
                    Some(v) => TaskOutcome::Completed(v),
                    None => TaskOutcome::TimedOut,
                };
                report.outcomes.push((key, outcome));
            }
            Err(e) => {
                if let Some(key) = in_flight.remove(&e.id()) {
                    report.outcomes.push((key, TaskOutcome::Failed(e.to_string())));
                }
            }
        }

        if let Some((key, fut)) = pending.next() {
            spawn_task(&mut set, &mut in_flight, key, fut, limits.task_deadline);
        }
    }

    set.shutdown().await;
    report
}

fn spawn_task<Fut, T>(
    set: &mut JoinSet<(usize, Option<T>)>,
    in_flight: &mut HashMap<Id, usize>,
    key: usize,
    fut: Fut,
    task_deadline: Option<Duration>,
) where
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = set.spawn(async move {
        match task_deadline {
            Some(limit) => (key, tokio::time::timeout(limit, fut).await.ok()),
            None => (key, Some(fut.await)),
        }
    });
    in_flight.insert(handle.id(), key);
}
