//! Cancellable event stream consumer.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{BatchHandler, ConsumerError, EventBatchStream, EventSource};
use crate::nomad::Topic;

/// Handle that stops an [`EventConsumer`] from another task.
///
/// Stopping is idempotent and safe at any time, including before the
/// consumer starts (it then returns as soon as it is started).
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Reads one topic of the event log and feeds each batch to a handler.
///
/// Batches are handled one at a time on the consumer's task. Cancellation
/// only interrupts the wait for the next batch; a batch being handled always
/// runs to completion.
pub struct EventConsumer<H> {
    source: Arc<dyn EventSource>,
    topic: Topic,
    handler: H,
    cancel: CancellationToken,
}

impl<H: BatchHandler> EventConsumer<H> {
    pub fn new(source: Arc<dyn EventSource>, topic: Topic, handler: H) -> Self {
        Self {
            source,
            topic,
            handler,
            cancel: CancellationToken::new(),
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Stop the consumer. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Consume until stopped.
    ///
    /// A stop also interrupts a subscription that is still being opened.
    /// Returns `Ok(())` after a stop, `Err(Subscribe)` if the subscription
    /// cannot be opened, and `Err(StreamClosed)` if the server ends the
    /// stream. Nothing is retried.
    pub async fn start(&self) -> Result<(), ConsumerError> {
        if self.cancel.is_cancelled() {
            debug!(topic = %self.topic, "Consumer stopped before start");
            return Ok(());
        }

        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!(topic = %self.topic, "Event consumer stopped while subscribing");
                return Ok(());
            }
            opened = self.open() => opened?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(topic = %self.topic, "Event consumer stopped");
                    return Ok(());
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(batch)) if batch.is_heartbeat() => {
                    trace!(topic = %self.topic, "Heartbeat");
                }
                Some(Ok(batch)) => {
                    debug!(
                        topic = %self.topic,
                        index = batch.index,
                        events = batch.events.len(),
                        "Received event batch"
                    );
                    self.handler.handle_batch(batch).await;
                }
                Some(Err(e)) => {
                    error!(topic = %self.topic, error = %e, "Received error from event stream");
                }
                None => {
                    warn!(topic = %self.topic, "Event stream closed by server");
                    return Err(ConsumerError::StreamClosed { topic: self.topic });
                }
            }
        }
    }

    async fn open(&self) -> Result<EventBatchStream, ConsumerError> {
        let index = self.resume_index().await;
        let stream = self
            .source
            .subscribe(self.topic, index)
            .await
            .map_err(|source| ConsumerError::Subscribe {
                topic: self.topic,
                index,
                source,
            })?;

        info!(topic = %self.topic, index, "Event stream opened");
        Ok(stream)
    }

    /// Position to resume from: the current end of the log, so history is
    /// never replayed. Falls back to 0 when the listing fails.
    async fn resume_index(&self) -> u64 {
        match self.source.last_index(self.topic).await {
            Ok(index) => index,
            Err(e) => {
                warn!(
                    topic = %self.topic,
                    error = %e,
                    "Failed to read current index, subscribing from 0"
                );
                0
            }
        }
    }
}
