// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic-task harness for the scheduler process.
//!
//! The only long-running work this process does is ticking: the
//! dispatcher wakes every `scheduler_interval`, claims groups and emits
//! frames.  [`Driver`] owns one tokio task per registered
//! [`BackgroundTask`], ticks it on its period, and lets callers request
//! an extra tick ([`Driver::wakeup`]) after an enqueue so a payload does
//! not have to wait out the period.  Dropping the driver aborts the
//! tasks; a tick cut down mid-transaction rolls back on the database
//! side, so shutdown never half-applies a tick.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use slog::{debug, o, Logger};
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;

pub mod dispatcher;

/// A unit of work ticked by the [`Driver`].
pub trait BackgroundTask: Send + Sync {
    /// Run one tick, returning a status value surfaced through
    /// [`Driver::status`].
    fn activate<'a>(&'a mut self) -> BoxFuture<'a, serde_json::Value>;
}

/// Externally visible state of one registered task.
#[derive(Clone, Debug, Default)]
pub struct TaskState {
    /// Number of ticks that have completed.
    pub runs: u64,
    /// A tick is executing right now.
    pub busy: bool,
    /// Outcome of the most recently completed tick.
    pub last: Option<TickSummary>,
}

/// What the last completed tick did.
#[derive(Clone, Debug)]
pub struct TickSummary {
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Whatever the task's `activate` returned.
    pub details: serde_json::Value,
}

/// Names a registered task; obtained from [`Driver::register`].
#[derive(Clone, Debug, Ord, PartialOrd, PartialEq, Eq)]
pub struct TaskHandle(String);

struct RegisteredTask {
    state: watch::Receiver<TaskState>,
    join_handle: tokio::task::JoinHandle<()>,
    tick_request: Arc<Notify>,
}

/// Owns the background tasks of one process.
pub struct Driver {
    tasks: BTreeMap<TaskHandle, RegisteredTask>,
}

impl Driver {
    pub fn new() -> Driver {
        Driver {
            tasks: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: &str,
        period: Duration,
        task: Box<dyn BackgroundTask>,
        log: &Logger,
    ) -> TaskHandle {
        let handle = TaskHandle(name.to_string());
        if self.tasks.contains_key(&handle) {
            panic!("background task {:?} registered twice", name);
        }

        let (state_tx, state_rx) = watch::channel(TaskState::default());
        let tick_request = Arc::new(Notify::new());
        let log = log.new(o!("background_task" => name.to_string()));
        let join_handle = tokio::task::spawn(task_loop(
            period,
            task,
            Arc::clone(&tick_request),
            log,
            state_tx,
        ));

        self.tasks.insert(
            handle.clone(),
            RegisteredTask {
                state: state_rx,
                join_handle,
                tick_request,
            },
        );
        handle
    }

    /// Request a tick now, rather than at the next period boundary.
    pub fn wakeup(&self, handle: &TaskHandle) {
        self.task(handle).tick_request.notify_one();
    }

    pub fn status(&self, handle: &TaskHandle) -> TaskState {
        self.task(handle).state.borrow().clone()
    }

    fn task(&self, handle: &TaskHandle) -> &RegisteredTask {
        // Handles only come out of register(), so a miss here means the
        // handle crossed over from another Driver.
        self.tasks.get(handle).unwrap_or_else(|| {
            panic!("no background task named {:?}", handle.0)
        })
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.join_handle.abort();
        }
    }
}

async fn task_loop(
    period: Duration,
    mut task: Box<dyn BackgroundTask>,
    tick_request: Arc<Notify>,
    log: Logger,
    state_tx: watch::Sender<TaskState>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let trigger = tokio::select! {
            _ = interval.tick() => "period",
            _ = tick_request.notified() => "request",
        };

        debug!(log, "tick starting"; "trigger" => trigger);
        state_tx.send_modify(|state| state.busy = true);

        let started = Instant::now();
        let details = task.activate().await;
        let elapsed = started.elapsed();

        debug!(
            log, "tick finished";
            "trigger" => trigger,
            "elapsed" => ?elapsed,
        );
        state_tx.send_modify(|state| {
            state.busy = false;
            state.runs += 1;
            state.last = Some(TickSummary {
                finished_at: Utc::now(),
                elapsed,
                details: details.clone(),
            });
        });
    }
}
