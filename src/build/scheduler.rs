//! Bounded worker pool for plan steps
//!
//! The dispatcher keeps a ready set ordered by step index and hands the
//! earliest ready step to the next idle worker. Workers report back over a
//! channel. After the first failure nothing new is dispatched; steps already
//! running are allowed to finish. A panicking step counts as a failure and
//! its panic is resumed on the calling thread once the pool has drained.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use tracing::{debug, warn};

/// Work item for the pool
#[derive(Debug)]
enum WorkItem {
    Execute(usize),
    Shutdown,
}

type Panic = Box<dyn Any + Send + 'static>;

/// What a worker reports for one step
type StepOutcome<E> = Result<Result<(), E>, Panic>;

enum Failure<E> {
    Step(E),
    Panicked(Panic),
}

/// Runs dependent tasks on a fixed number of threads
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    worker_count: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// One worker per CPU
    pub fn new() -> Self {
        Self::with_worker_count(num_cpus::get())
    }

    pub fn with_worker_count(worker_count: usize) -> Self {
        Scheduler {
            worker_count: worker_count.max(1),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Run `task` for every index of `waits_on`, where `waits_on[i]` lists
    /// the indices that must succeed before `i` starts.
    ///
    /// Returns the indices in completion order, or the first error. If a task
    /// panics, the panic is resumed here after in-flight tasks finished.
    pub fn run<E, F>(&self, waits_on: &[Vec<usize>], task: F) -> Result<Vec<usize>, E>
    where
        E: Send,
        F: Fn(usize) -> Result<(), E> + Sync,
    {
        let count = waits_on.len();
        let mut pending: Vec<usize> = waits_on.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (idx, waits) in waits_on.iter().enumerate() {
            for &dep in waits {
                if dep < count {
                    dependents[dep].push(idx);
                } else {
                    warn!("Step {} waits on unknown step {}", idx, dep);
                }
            }
        }
        let mut ready: BTreeSet<usize> = (0..count).filter(|&idx| pending[idx] == 0).collect();

        let workers = self.worker_count.min(count.max(1));
        let (work_sender, work_receiver) = mpsc::channel::<WorkItem>();
        let work_receiver = Arc::new(Mutex::new(work_receiver));
        let (result_sender, result_receiver) = mpsc::channel::<(usize, StepOutcome<E>)>();

        thread::scope(|scope| {
            for worker_id in 0..workers {
                let work_receiver = Arc::clone(&work_receiver);
                let result_sender = result_sender.clone();
                let task = &task;
                scope.spawn(move || Self::worker_thread(worker_id, work_receiver, result_sender, task));
            }
            drop(result_sender);

            let mut completed = Vec::with_capacity(count);
            let mut in_flight = 0usize;
            let mut failure: Option<Failure<E>> = None;

            loop {
                if failure.is_none() {
                    while in_flight < workers {
                        let Some(idx) = ready.pop_first() else { break };
                        if work_sender.send(WorkItem::Execute(idx)).is_err() {
                            break;
                        }
                        in_flight += 1;
                    }
                }
                if in_flight == 0 {
                    break;
                }

                let Ok((idx, result)) = result_receiver.recv() else {
                    break;
                };
                in_flight -= 1;
                match result {
                    Ok(Ok(())) => {
                        completed.push(idx);
                        for &dependent in &dependents[idx] {
                            pending[dependent] -= 1;
                            if pending[dependent] == 0 {
                                ready.insert(dependent);
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        debug!("Step {} failed, draining {} running step(s)", idx, in_flight);
                        if failure.is_none() {
                            failure = Some(Failure::Step(e));
                        }
                    }
                    Err(payload) => {
                        warn!("Step {} panicked, draining {} running step(s)", idx, in_flight);
                        if failure.is_none() {
                            failure = Some(Failure::Panicked(payload));
                        }
                    }
                }
            }

            for _ in 0..workers {
                let _ = work_sender.send(WorkItem::Shutdown);
            }

            match failure {
                Some(Failure::Step(e)) => Err(e),
                Some(Failure::Panicked(payload)) => panic::resume_unwind(payload),
                None => {
                    if completed.len() < count {
                        warn!("{} step(s) never became ready", count - completed.len());
                    }
                    Ok(completed)
                }
            }
        })
    }

    fn worker_thread<E, F>(
        worker_id: usize,
        work_receiver: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
        result_sender: mpsc::Sender<(usize, StepOutcome<E>)>,
        task: &F,
    ) where
        F: Fn(usize) -> Result<(), E>,
    {
        loop {
            let work_item = match work_receiver.lock() {
                Ok(receiver) => receiver.recv(),
                Err(_) => break,
            };

            match work_item {
                Ok(WorkItem::Execute(idx)) => {
                    debug!("Worker {} running step {}", worker_id, idx);
                    let result = panic::catch_unwind(AssertUnwindSafe(|| task(idx)));
                    if result_sender.send((idx, result)).is_err() {
                        break;
                    }
                }
                Ok(WorkItem::Shutdown) | Err(_) => break,
            }
        }
    }
}
