//! Live relay of a test's result log to one subscriber
//!
//! The relay polls the store: it forwards any entries past `last_index`, then
//! checks the completion flag. Once the flag is seen it reads the log length
//! one more time before sending the terminal marker, because the flag can
//! become visible between the relay's length read and its flag read.

use crate::protocol::StreamMessage;
use crate::store::{ResultStore, StoreError};
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The subscriber is no longer reachable
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("subscriber disconnected")]
pub struct SubscriberGone;

/// Errors that end a relay session early
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Result store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to encode stream message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Receiving end of a relay session
#[async_trait]
pub trait Subscriber: Send {
    /// Deliver one JSON text message
    async fn deliver(&mut self, payload: String) -> Result<(), SubscriberGone>;

    /// Resolves once the subscriber has gone away. Must be safe to drop
    /// before completion and to call again afterwards.
    async fn closed(&mut self);
}

#[async_trait]
impl Subscriber for mpsc::Sender<String> {
    async fn deliver(&mut self, payload: String) -> Result<(), SubscriberGone> {
        self.send(payload).await.map_err(|_| SubscriberGone)
    }

    async fn closed(&mut self) {
        mpsc::Sender::closed(self).await
    }
}

/// How a relay session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Every batch and the terminal marker were delivered
    Completed { delivered: usize },
    /// The subscriber left before the test finished
    Disconnected { delivered: usize },
}

impl RelayOutcome {
    fn label(&self) -> &'static str {
        match self {
            RelayOutcome::Completed { .. } => "completed",
            RelayOutcome::Disconnected { .. } => "disconnected",
        }
    }
}

pub struct StreamRelay {
    store: Arc<dyn ResultStore>,
    poll_interval: Duration,
}

impl StreamRelay {
    pub fn new(store: Arc<dyn ResultStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    /// Forward entries `[*last_index, upto)`. Returns `Err(SubscriberGone)`
    /// if a delivery fails; `last_index` counts only delivered entries.
    async fn forward<S: Subscriber + ?Sized>(
        &self,
        test_id: &str,
        last_index: &mut usize,
        upto: usize,
        subscriber: &mut S,
    ) -> Result<Result<(), SubscriberGone>, RelayError> {
        if upto <= *last_index {
            return Ok(Ok(()));
        }
        let batches = self.store.range(test_id, *last_index, upto).await?;
        for batch in batches {
            let payload = serde_json::to_string(&batch)?;
            if let Err(gone) = subscriber.deliver(payload).await {
                return Ok(Err(gone));
            }
            *last_index += 1;
        }
        Ok(Ok(()))
    }

    /// Stream the test's log to `subscriber` until the terminal marker has
    /// been delivered or the subscriber disconnects.
    pub async fn run<S: Subscriber + ?Sized>(
        &self,
        test_id: &str,
        subscriber: &mut S,
    ) -> Result<RelayOutcome, RelayError> {
        let outcome = self.stream(test_id, subscriber).await?;
        counter!("ratescope_relay_sessions_total", "outcome" => outcome.label()).increment(1);
        match outcome {
            RelayOutcome::Completed { delivered } => {
                info!("Relay for test {} finished after {} batches", test_id, delivered)
            }
            RelayOutcome::Disconnected { delivered } => {
                info!(
                    "Subscriber left test {} after {} batches",
                    test_id, delivered
                )
            }
        }
        Ok(outcome)
    }

    async fn stream<S: Subscriber + ?Sized>(
        &self,
        test_id: &str,
        subscriber: &mut S,
    ) -> Result<RelayOutcome, RelayError> {
        let mut last_index = 0;

        loop {
            let current_len = self.store.len(test_id).await?;
            if self
                .forward(test_id, &mut last_index, current_len, subscriber)
                .await?
                .is_err()
            {
                return Ok(RelayOutcome::Disconnected {
                    delivered: last_index,
                });
            }

            if self.store.is_complete(test_id).await? {
                let final_len = self.store.len(test_id).await?;
                if final_len > current_len {
                    debug!(
                        "Test {}: {} batches landed before the completion flag was seen",
                        test_id,
                        final_len - current_len
                    );
                }
                if self
                    .forward(test_id, &mut last_index, final_len, subscriber)
                    .await?
                    .is_err()
                {
                    return Ok(RelayOutcome::Disconnected {
                        delivered: last_index,
                    });
                }

                let marker = serde_json::to_string(&StreamMessage::TestComplete {
                    test_id: test_id.to_string(),
                })?;
                if subscriber.deliver(marker).await.is_err() {
                    return Ok(RelayOutcome::Disconnected {
                        delivered: last_index,
                    });
                }
                return Ok(RelayOutcome::Completed {
                    delivered: last_index,
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = subscriber.closed() => {
                    return Ok(RelayOutcome::Disconnected { delivered: last_index });
                }
            }
        }
    }
}
