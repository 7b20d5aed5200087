//! Task scheduler service.
//!
//! A background loop wakes every tick and runs one scheduling pass: tasks
//! tagged `queue` are checked against their worker, and the due ones are
//! executed concurrently. A task is never dispatched again while a previous
//! execution of it is still in flight.

use anyhow::Result;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::runtime::AgentRuntime;
use crate::types::database::DatabaseAdapter;
use crate::types::memory::Memory;
use crate::types::primitives::{Content, UUID};
use crate::types::service::{service_type, Service};
use crate::types::state::State;
use crate::types::task::{GetTasksParams, Task, TaskStatus, TaskWorker, TAG_QUEUE};

const IDLE_POLL: Duration = Duration::from_millis(10);

/// Runs queued tasks through their registered workers.
pub struct TaskService {
    runtime: Weak<AgentRuntime>,
    tick: Duration,
    stop_flag: AtomicBool,
    in_flight: Arc<Mutex<HashSet<UUID>>>,
    /// Last skip reason logged per task
    reported: Mutex<HashMap<UUID, String>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskService {
    /// Create the service and spawn its loop.
    pub fn start(runtime: &Arc<AgentRuntime>, tick: Duration) -> Arc<Self> {
        let svc = Arc::new(TaskService {
            runtime: Arc::downgrade(runtime),
            tick,
            stop_flag: AtomicBool::new(false),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            reported: Mutex::new(HashMap::new()),
            handle: Mutex::new(None),
        });
        svc.spawn_loop();
        info!(tick_ms = tick.as_millis() as u64, "Task service started");
        svc
    }

    fn spawn_loop(self: &Arc<Self>) {
        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(svc.tick).await;
                if svc.stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                if svc.runtime.strong_count() == 0 {
                    debug!("Runtime dropped, task loop exiting");
                    break;
                }
                if let Err(e) = svc.tick().await {
                    warn!(error = %format!("{e:#}"), "Task scheduling pass failed");
                }
            }
        });
        *self.handle.lock() = Some(handle);
    }

    /// Run one scheduling pass and return the ids of the tasks dispatched.
    ///
    /// Tasks without an id or a registered worker, tasks whose worker rejects
    /// them and failed tasks are skipped. Dispatched tasks run in the
    /// background; use [`TaskService::wait_for_idle`] to wait for them.
    pub async fn tick(&self) -> Result<Vec<UUID>> {
        let Some(runtime) = self.runtime.upgrade() else {
            return Ok(Vec::new());
        };
        let Some(adapter) = runtime.get_adapter().cloned() else {
            debug!("No database adapter, skipping task pass");
            return Ok(Vec::new());
        };

        let tasks = adapter
            .get_tasks(GetTasksParams {
                tags: Some(vec![TAG_QUEUE.to_string()]),
                ..Default::default()
            })
            .await?;
        self.forget_missing(&tasks);

        let now = chrono::Utc::now().timestamp_millis();
        let mut dispatched = Vec::new();
        for task in tasks {
            let Some(id) = task.id.clone() else {
                debug!(task = %task.name, "Task has no id, skipping");
                continue;
            };
            if task.status == Some(TaskStatus::Failed) || self.in_flight.lock().contains(&id) {
                continue;
            }

            let Some(worker) = runtime.get_task_worker(&task.name).await else {
                self.report(&id, &task.name, "no worker registered");
                continue;
            };
            let message = Memory::new(
                runtime.agent_id.clone(),
                task.room_id.clone().unwrap_or_else(|| runtime.agent_id.clone()),
                Content::default(),
            );
            if !worker.validate(&runtime, &message, &State::new()).await {
                self.report(&id, &task.name, "worker validation failed");
                continue;
            }
            self.reported.lock().remove(&id);

            if !task.is_due(now) {
                continue;
            }

            // Overlapping passes may both reach this point for the same task.
            let Some(claim) = InFlightClaim::acquire(&self.in_flight, &id) else {
                continue;
            };
            debug!(task_id = %id, task = %task.name, "Dispatching task");
            tokio::spawn(execute_task(runtime.clone(), adapter.clone(), worker, task, claim));
            dispatched.push(id);
        }
        Ok(dispatched)
    }

    /// Wait until no task is executing. Returns `false` on timeout; the
    /// tasks keep running either way.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.in_flight.lock().is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Ids of tasks currently executing
    pub fn in_flight(&self) -> Vec<UUID> {
        self.in_flight.lock().iter().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::SeqCst)
    }

    /// Log a skipped task: `warn` the first time for a reason, `debug` after.
    fn report(&self, id: &UUID, name: &str, reason: &str) {
        let mut reported = self.reported.lock();
        if reported.get(id).is_some_and(|r| r == reason) {
            debug!(task_id = %id, task = name, reason, "Skipping task");
        } else {
            warn!(task_id = %id, task = name, reason, "Skipping task");
            reported.insert(id.clone(), reason.to_string());
        }
    }

    fn forget_missing(&self, tasks: &[Task]) {
        let live: HashSet<&UUID> = tasks.iter().filter_map(|t| t.id.as_ref()).collect();
        self.reported.lock().retain(|id, _| live.contains(id));
    }
}

/// Marks a task as executing until dropped, so the mark is released even
/// when the worker panics.
struct InFlightClaim {
    set: Arc<Mutex<HashSet<UUID>>>,
    id: UUID,
}

impl InFlightClaim {
    fn acquire(set: &Arc<Mutex<HashSet<UUID>>>, id: &UUID) -> Option<Self> {
        set.lock().insert(id.clone()).then(|| InFlightClaim {
            set: Arc::clone(set),
            id: id.clone(),
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

async fn execute_task(
    runtime: Arc<AgentRuntime>,
    adapter: Arc<dyn DatabaseAdapter>,
    worker: Arc<dyn TaskWorker>,
    task: Task,
    claim: InFlightClaim,
) {
    let id = claim.id.clone();
    let outcome = worker.execute(&runtime, &task.metadata, &task).await;
    let now = chrono::Utc::now().timestamp_millis();

    let bookkeeping = match (&outcome, task.is_repeating()) {
        (Ok(()), false) => {
            debug!(task_id = %id, task = %task.name, "Task completed");
            adapter.delete_task(&id).await
        }
        (Ok(()), true) => rearm(adapter.as_ref(), &task, now, false).await,
        (Err(e), repeating) => {
            warn!(task_id = %id, task = %task.name, error = %format!("{e:#}"), "Task failed");
            if repeating {
                rearm(adapter.as_ref(), &task, now, true).await
            } else {
                let mut failed = task.clone();
                failed.status = Some(TaskStatus::Failed);
                failed.updated_at = Some(now);
                adapter.update_task(&id, &failed).await
            }
        }
    };
    if let Err(e) = bookkeeping {
        warn!(task_id = %id, error = %format!("{e:#}"), "Failed to update task after execution");
    }
    drop(claim);
}

/// Schedule the next run of a repeating task one interval from `now`. After
/// a success a later time the worker set itself is kept.
async fn rearm(adapter: &dyn DatabaseAdapter, task: &Task, now: i64, failed: bool) -> Result<()> {
    let Some(id) = task.id.as_ref() else {
        return Ok(());
    };
    // The worker may have rewritten the task while running.
    let Some(mut current) = adapter.get_task(id).await? else {
        debug!(task_id = %id, "Repeating task removed during execution");
        return Ok(());
    };

    let next = now + task.interval_ms().unwrap_or(0).max(0);
    let next = match current.next_run_at() {
        Some(existing) if !failed => existing.max(next),
        _ => next,
    };
    current.set_next_run_at(next);
    current.status = Some(TaskStatus::Pending);
    current.updated_at = Some(now);
    adapter.update_task(id, &current).await
}

#[async_trait::async_trait]
impl Service for TaskService {
    fn service_type(&self) -> &str {
        service_type::TASK
    }

    fn capability_description(&self) -> &str {
        "Executes queued and repeating tasks through registered workers"
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    async fn stop(&self) -> Result<()> {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
        info!("Task service stopped");
        Ok(())
    }
}
