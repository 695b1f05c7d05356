//! Typed dispatch of event batches.
//!
//! A [`Dispatcher`] pulls an entity snapshot out of each event in a batch and
//! hands it to an [`EntityHandler`]. What counts as a relevant event, and how
//! the entity is extracted, is defined per entity type by [`Entity`].

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::BatchHandler;
use crate::nomad::{Event, EventKind, Events, Job, Node, NomadError, Topic};

/// An entity carried in event payloads.
pub trait Entity: Send + Sync + Sized + 'static {
    /// Topic the entity is published on.
    const TOPIC: Topic;

    /// Whether events of this kind are forwarded to the handler.
    fn accepts(kind: &EventKind) -> bool;

    /// Decode the entity from the event payload.
    fn extract(event: &Event) -> Result<Option<Self>, NomadError>;

    fn identifier(&self) -> &str;

    fn status(&self) -> &str;
}

impl Entity for Job {
    const TOPIC: Topic = Topic::Job;

    fn accepts(kind: &EventKind) -> bool {
        matches!(kind, EventKind::Registered | EventKind::Deregistered)
    }

    fn extract(event: &Event) -> Result<Option<Self>, NomadError> {
        event.job()
    }

    fn identifier(&self) -> &str {
        self.id()
    }

    fn status(&self) -> &str {
        Job::status(self)
    }
}

impl Entity for Node {
    const TOPIC: Topic = Topic::Node;

    fn accepts(_kind: &EventKind) -> bool {
        true
    }

    fn extract(event: &Event) -> Result<Option<Self>, NomadError> {
        event.node()
    }

    fn identifier(&self) -> &str {
        &self.name
    }

    fn status(&self) -> &str {
        &self.status
    }
}

/// Capability invoked for every entity that survives filtering.
#[async_trait]
pub trait EntityHandler<E: Send + 'static>: Send + Sync {
    async fn on_entity(&self, kind: &EventKind, entity: E);
}

#[async_trait]
impl<E, T> EntityHandler<E> for Arc<T>
where
    E: Send + 'static,
    T: EntityHandler<E> + ?Sized,
{
    async fn on_entity(&self, kind: &EventKind, entity: E) {
        (**self).on_entity(kind, entity).await
    }
}

/// What to do with the rest of a batch after an event is rejected.
///
/// An event is rejected when its kind is not accepted, its payload does not
/// decode, it carries no entity, or the entity has no identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Drop only the rejected event and keep going.
    #[default]
    SkipEvent,
    /// Drop the rejected event and everything after it in the batch.
    AbortBatch,
}

enum Rejection {
    Ignored(EventKind),
    Malformed(NomadError),
    Empty,
    Unidentified,
}

/// Batch handler that forwards typed entities to an [`EntityHandler`].
pub struct Dispatcher<E, H> {
    handler: H,
    policy: BatchFailurePolicy,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, H: EntityHandler<E>> Dispatcher<E, H> {
    pub fn new(handler: H) -> Self {
        Self::with_policy(handler, BatchFailurePolicy::default())
    }

    pub fn with_policy(handler: H, policy: BatchFailurePolicy) -> Self {
        Self {
            handler,
            policy,
            _entity: PhantomData,
        }
    }

    fn extract(event: &Event) -> Result<(EventKind, E), Rejection> {
        let kind = event.kind();
        if !E::accepts(&kind) {
            return Err(Rejection::Ignored(kind));
        }
        match E::extract(event) {
            Ok(Some(entity)) if entity.identifier().is_empty() => Err(Rejection::Unidentified),
            Ok(Some(entity)) => Ok((kind, entity)),
            Ok(None) => Err(Rejection::Empty),
            Err(e) => Err(Rejection::Malformed(e)),
        }
    }
}

#[async_trait]
impl<E: Entity, H: EntityHandler<E>> BatchHandler for Dispatcher<E, H> {
    async fn handle_batch(&self, batch: Events) {
        let total = batch.events.len();

        for (position, event) in batch.events.iter().enumerate() {
            match Self::extract(event) {
                Ok((kind, entity)) => {
                    info!(
                        topic = %E::TOPIC,
                        event_type = %event.event_type,
                        id = %entity.identifier(),
                        status = %entity.status(),
                        "==> {}: {} ({})",
                        event.event_type,
                        entity.identifier(),
                        entity.status()
                    );
                    self.handler.on_entity(&kind, entity).await;
                    continue;
                }
                Err(Rejection::Ignored(kind)) => {
                    debug!(topic = %E::TOPIC, event_type = %kind, key = %event.key, "Ignoring event type");
                }
                Err(Rejection::Malformed(e)) => {
                    warn!(
                        topic = %E::TOPIC,
                        event_type = %event.event_type,
                        key = %event.key,
                        error = %e,
                        "Failed to extract entity from event"
                    );
                }
                Err(Rejection::Unidentified) => {
                    warn!(
                        topic = %E::TOPIC,
                        event_type = %event.event_type,
                        key = %event.key,
                        "Entity in event has no identifier"
                    );
                }
                Err(Rejection::Empty) => {
                    debug!(topic = %E::TOPIC, event_type = %event.event_type, key = %event.key, "Event carried no entity");
                }
            }

            if self.policy == BatchFailurePolicy::AbortBatch {
                let dropped = total - position - 1;
                if dropped > 0 {
                    warn!(
                        topic = %E::TOPIC,
                        index = batch.index,
                        dropped,
                        "Abandoning remainder of batch"
                    );
                }
                return;
            }
        }
    }
}
