//! Messaging sink port: where committed domain events are delivered.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;

use lotkeeper_events::{EventBus, EventEnvelope};
use lotkeeper_inventory::StockEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("message transport failed: {0}")]
    Transport(String),
}

/// Accepts batches of committed domain events.
///
/// Delivery retries are the transport's concern; callers only log failures.
pub trait MessageSink: Send + Sync {
    fn send(&self, batch: &[StockEvent]) -> Result<(), SinkError>;
}

impl<S> MessageSink for Arc<S>
where
    S: MessageSink + ?Sized,
{
    fn send(&self, batch: &[StockEvent]) -> Result<(), SinkError> {
        (**self).send(batch)
    }
}

/// Sink publishing each event to an [`EventBus`] as a tenant-scoped
/// envelope, filed under the event's own aggregate stream.
#[derive(Debug)]
pub struct BusMessageSink<B> {
    bus: B,
    sequence: AtomicU64,
}

impl<B> BusMessageSink<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> MessageSink for BusMessageSink<B>
where
    B: EventBus<EventEnvelope<StockEvent>>,
{
    fn send(&self, batch: &[StockEvent]) -> Result<(), SinkError> {
        for event in batch {
            let (aggregate_type, aggregate_id) = event.stream();
            // Delivery position across the sink, 1-based.
            let sequence_number = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let envelope = EventEnvelope::wrap(
                event.tenant_id(),
                aggregate_id,
                aggregate_type,
                sequence_number,
                event.clone(),
            );
            self.bus
                .publish(envelope)
                .map_err(|e| SinkError::Transport(format!("{e:?}")))?;
        }
        Ok(())
    }
}

/// Sink recording every batch in memory; can be switched to fail.
#[derive(Debug, Default)]
pub struct InMemoryMessageSink {
    batches: Mutex<Vec<Vec<StockEvent>>>,
    failing: AtomicBool,
}

impl InMemoryMessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<StockEvent>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// All delivered events, flattened in delivery order.
    pub fn events(&self) -> Vec<StockEvent> {
        self.batches().into_iter().flatten().collect()
    }
}

impl MessageSink for InMemoryMessageSink {
    fn send(&self, batch: &[StockEvent]) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Transport("sink switched to failing".to_string()));
        }
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| SinkError::Transport("sink lock poisoned".to_string()))?;
        batches.push(batch.to_vec());
        Ok(())
    }
}
