//! Consumer task supervision.
//!
//! Runs every event consumer on its own task and owns the stop handles. The
//! first of (shutdown signal, any consumer exiting) stops all consumers, then
//! every task is awaited so in-flight events finish before the process exits.
//! Tasks still running when the drain timeout elapses are aborted.

use std::future::Future;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::stream::{BatchHandler, ConsumerError, EventConsumer, StopHandle};

/// How a single consumer ended.
#[derive(Debug)]
pub struct ConsumerExit {
    pub name: String,
    pub result: Result<(), ConsumerError>,
}

/// What triggered the shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    Signal,
    ConsumerExited(String),
}

/// Summary returned once every consumer task has finished.
#[derive(Debug)]
pub struct SupervisorReport {
    pub cause: ShutdownCause,
    pub exits: Vec<ConsumerExit>,
    /// Tasks that panicked instead of returning.
    pub crashed: usize,
    /// Tasks aborted because they did not finish within the drain timeout.
    pub abandoned: usize,
}

impl SupervisorReport {
    /// True when shutdown came from a signal and no consumer failed.
    ///
    /// Consumers abandoned at the drain timeout do not count as failures.
    pub fn is_clean(&self) -> bool {
        self.cause == ShutdownCause::Signal
            && self.crashed == 0
            && self.exits.iter().all(|exit| exit.result.is_ok())
    }

    /// First consumer error, if any.
    pub fn first_error(&self) -> Option<&ConsumerExit> {
        self.exits.iter().find(|exit| exit.result.is_err())
    }
}

/// Drain timeout used unless configured otherwise.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owner of the consumer tasks.
pub struct Supervisor {
    tasks: JoinSet<ConsumerExit>,
    stops: Vec<(String, StopHandle)>,
    drain_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self {
            tasks: JoinSet::new(),
            stops: Vec::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound how long [`run`](Self::run) waits for consumers after stopping them.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Start `consumer` on a new task.
    pub fn spawn<H>(&mut self, name: impl Into<String>, consumer: EventConsumer<H>)
    where
        H: BatchHandler + 'static,
    {
        let name = name.into();
        self.stops.push((name.clone(), consumer.stop_handle()));

        info!(consumer = %name, topic = %consumer.topic(), "Starting event consumer");
        self.tasks.spawn(async move {
            let result = consumer.start().await;
            ConsumerExit { name, result }
        });
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Stop every consumer. Idempotent.
    pub fn stop_all(&self) {
        for (name, stop) in &self.stops {
            if !stop.is_stopped() {
                info!(consumer = %name, "Stopping event consumer");
                stop.stop();
            }
        }
    }

    /// Run until `shutdown` resolves or a consumer exits, then drain.
    pub async fn run<F>(mut self, shutdown: F) -> SupervisorReport
    where
        F: Future<Output = ()>,
    {
        let mut exits = Vec::with_capacity(self.stops.len());
        let mut crashed = 0;

        let cause = tokio::select! {
            _ = shutdown => {
                info!("Shutdown signal received");
                ShutdownCause::Signal
            }
            Some(joined) = self.tasks.join_next() => {
                let cause = match &joined {
                    Ok(exit) => ShutdownCause::ConsumerExited(exit.name.clone()),
                    Err(_) => ShutdownCause::ConsumerExited("unknown".to_string()),
                };
                warn!(cause = ?cause, "Consumer exited, shutting down remaining consumers");
                Self::collect(joined, &mut exits, &mut crashed);
                cause
            }
        };

        self.stop_all();

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = self.tasks.join_next().await {
                Self::collect(joined, &mut exits, &mut crashed);
            }
        })
        .await;

        let mut abandoned = 0;
        if drained.is_err() {
            warn!(
                timeout_secs = self.drain_timeout.as_secs_f64(),
                remaining = self.tasks.len(),
                "Consumers did not stop in time, aborting"
            );
            self.tasks.abort_all();
            while let Some(joined) = self.tasks.join_next().await {
                match joined {
                    Err(e) if e.is_cancelled() => abandoned += 1,
                    joined => Self::collect(joined, &mut exits, &mut crashed),
                }
            }
        }

        info!(
            consumers = exits.len(),
            crashed, abandoned, "All consumers stopped"
        );
        SupervisorReport {
            cause,
            exits,
            crashed,
            abandoned,
        }
    }

    fn collect(
        joined: Result<ConsumerExit, JoinError>,
        exits: &mut Vec<ConsumerExit>,
        crashed: &mut usize,
    ) {
        match joined {
            Ok(exit) => {
                match &exit.result {
                    Ok(()) => info!(consumer = %exit.name, "Consumer stopped"),
                    Err(e) => error!(consumer = %exit.name, error = %e, "Consumer failed"),
                }
                exits.push(exit);
            }
            Err(e) => {
                error!(error = %e, "Consumer task crashed");
                *crashed += 1;
            }
        }
    }
}
