//! Shared test utilities.
//!
//! In-memory stand-ins for Nomad: a scripted event source, recording job
//! actions, a fake spec parser, and event builders.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::backup::{DeregisterOutcome, JobActions, JobSpecParser};
use crate::nomad::{Event, EventKind, Events, Job, JobRegisterResponse, NomadError, Topic};
use crate::stream::{EntityHandler, EventBatchStream, EventSource};

/// Sender half feeding a [`ScriptedSource`].
pub type BatchSender = mpsc::UnboundedSender<Result<Events, NomadError>>;

fn mock_error(status: u16, message: &str) -> NomadError {
    NomadError::Api {
        status,
        message: message.to_string(),
    }
}

/// Build a batch.
pub fn events(index: u64, events: Vec<Event>) -> Events {
    Events { index, events }
}

/// Heartbeat batch, as sent by the server on an idle stream.
pub fn heartbeat() -> Events {
    Events::default()
}

/// Build a job event whose payload carries a job with `meta`.
pub fn job_event(event_type: &str, job_id: &str, meta: &[(&str, &str)]) -> Event {
    let meta: HashMap<String, String> = meta
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Event {
        topic: "Job".to_string(),
        event_type: event_type.to_string(),
        key: job_id.to_string(),
        namespace: "default".to_string(),
        index: 0,
        payload: Some(json!({
            "Job": {"ID": job_id, "Status": "running", "Meta": meta}
        })),
    }
}

/// Build a node event.
pub fn node_event(event_type: &str, name: &str) -> Event {
    Event {
        topic: "Node".to_string(),
        event_type: event_type.to_string(),
        key: format!("{name}-id"),
        namespace: String::new(),
        index: 0,
        payload: Some(json!({
            "Node": {"ID": format!("{name}-id"), "Name": name, "Status": "ready"}
        })),
    }
}

/// Event source backed by a channel the test writes to.
///
/// Dropping the sender ends the stream.
pub struct ScriptedSource {
    last_index: Option<u64>,
    fail_subscribe: bool,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Result<Events, NomadError>>>>,
    subscriptions: Mutex<Vec<(Topic, u64)>>,
}

impl ScriptedSource {
    /// Source whose listing reports `last_index`.
    pub fn new(last_index: u64) -> (Arc<Self>, BatchSender) {
        Self::build(Some(last_index), false)
    }

    /// Source whose listing call fails.
    pub fn with_failing_listing() -> (Arc<Self>, BatchSender) {
        Self::build(None, false)
    }

    /// Source whose subscribe call fails.
    pub fn with_failing_subscribe() -> Arc<Self> {
        Self::build(Some(0), true).0
    }

    fn build(last_index: Option<u64>, fail_subscribe: bool) -> (Arc<Self>, BatchSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            last_index,
            fail_subscribe,
            receiver: Mutex::new(Some(rx)),
            subscriptions: Mutex::new(Vec::new()),
        };
        (Arc::new(source), tx)
    }

    /// Every `(topic, index)` subscribe was called with.
    pub async fn subscriptions(&self) -> Vec<(Topic, u64)> {
        self.subscriptions.lock().await.clone()
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn last_index(&self, _topic: Topic) -> Result<u64, NomadError> {
        self.last_index
            .ok_or_else(|| mock_error(500, "Mock listing failure"))
    }

    async fn subscribe(&self, topic: Topic, index: u64) -> Result<EventBatchStream, NomadError> {
        self.subscriptions.lock().await.push((topic, index));
        if self.fail_subscribe {
            return Err(mock_error(503, "Mock subscribe failure"));
        }
        let rx = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| mock_error(409, "Mock source already subscribed"))?;

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

/// Entity handler that records everything it receives.
pub struct RecordingHandler<E> {
    seen: RwLock<Vec<(EventKind, E)>>,
}

impl<E: Clone> RecordingHandler<E> {
    pub fn new() -> Self {
        Self {
            seen: RwLock::new(Vec::new()),
        }
    }

    pub async fn seen(&self) -> Vec<(EventKind, E)> {
        self.seen.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.seen.read().await.len()
    }
}

#[async_trait]
impl<E: Clone + Send + Sync + 'static> EntityHandler<E> for RecordingHandler<E> {
    async fn on_entity(&self, kind: &EventKind, entity: E) {
        self.seen.write().await.push((kind.clone(), entity));
    }
}

/// A call made against [`RecordingActions`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionCall {
    Register(Job),
    Deregister { job_id: String, purge: bool },
}

/// Job actions that record calls and track which jobs exist.
#[derive(Default)]
pub struct RecordingActions {
    calls: RwLock<Vec<ActionCall>>,
    existing: RwLock<BTreeSet<String>>,
    fail_register: RwLock<bool>,
    fail_deregister: RwLock<bool>,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_register(&self, fail: bool) {
        *self.fail_register.write().await = fail;
    }

    pub async fn set_fail_deregister(&self, fail: bool) {
        *self.fail_deregister.write().await = fail;
    }

    pub async fn calls(&self) -> Vec<ActionCall> {
        self.calls.read().await.clone()
    }

    /// Job IDs currently registered, sorted.
    pub async fn existing(&self) -> Vec<String> {
        self.existing.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl JobActions for RecordingActions {
    async fn register(&self, job: &Job) -> Result<JobRegisterResponse, NomadError> {
        self.calls.write().await.push(ActionCall::Register(job.clone()));
        if *self.fail_register.read().await {
            return Err(mock_error(500, "Mock register failure"));
        }
        self.existing.write().await.insert(job.id().to_string());
        Ok(JobRegisterResponse {
            eval_id: format!("eval-{}", job.id()),
            job_modify_index: 1,
        })
    }

    async fn deregister(&self, job_id: &str, purge: bool) -> Result<DeregisterOutcome, NomadError> {
        self.calls.write().await.push(ActionCall::Deregister {
            job_id: job_id.to_string(),
            purge,
        });
        if *self.fail_deregister.read().await {
            return Err(mock_error(500, "Mock deregister failure"));
        }
        if self.existing.write().await.remove(job_id) {
            Ok(DeregisterOutcome::Removed {
                eval_id: format!("eval-{job_id}"),
            })
        } else {
            Ok(DeregisterOutcome::NotFound)
        }
    }
}

/// Spec parser that records specs and lifts the job ID out of `job "<id>"`.
///
/// The rendered text is kept on the returned job under `Rendered`.
#[derive(Default)]
pub struct FakeParser {
    specs: RwLock<Vec<String>>,
    fail: RwLock<bool>,
}

impl FakeParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    pub async fn specs(&self) -> Vec<String> {
        self.specs.read().await.clone()
    }
}

#[async_trait]
impl JobSpecParser for FakeParser {
    async fn parse(&self, spec: &str) -> Result<Job, NomadError> {
        self.specs.write().await.push(spec.to_string());
        if *self.fail.read().await {
            return Err(mock_error(400, "Mock parse failure"));
        }

        let id = spec
            .split("job \"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .ok_or_else(|| mock_error(400, "No job stanza"))?;

        let mut extra = Map::new();
        extra.insert("Rendered".to_string(), Value::String(spec.to_string()));
        Ok(Job {
            id: Some(id.to_string()),
            name: Some(id.to_string()),
            extra,
            ..Default::default()
        })
    }
}
