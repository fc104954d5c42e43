//! Event commit coordinator.
//!
//! Every mutating operation hands the events it raised to
//! [`EventCommitCoordinator::publish`]:
//!
//! - inside a unit of work, delivery is deferred to its after-commit hook, so
//!   nothing reaches the sink before the store accepted the writes and
//!   nothing at all is delivered on rollback
//! - without a unit of work, delivery happens immediately
//!
//! A delivery failure is logged and swallowed: the business operation has
//! already succeeded.

use std::sync::Arc;

use tracing::{debug, error};

use lotkeeper_events::Event;
use lotkeeper_inventory::StockEvent;

use crate::sink::MessageSink;
use crate::unit_of_work::UnitOfWork;

#[derive(Clone)]
pub struct EventCommitCoordinator {
    sink: Arc<dyn MessageSink>,
}

impl core::fmt::Debug for EventCommitCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventCommitCoordinator").finish_non_exhaustive()
    }
}

impl EventCommitCoordinator {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    pub fn publish(&self, uow: Option<&mut UnitOfWork>, events: Vec<StockEvent>) {
        if events.is_empty() {
            return;
        }

        match uow {
            Some(uow) => {
                let sink = Arc::clone(&self.sink);
                uow.on_commit(move || deliver(sink.as_ref(), &events));
            }
            None => deliver(self.sink.as_ref(), &events),
        }
    }
}

fn deliver(sink: &dyn MessageSink, events: &[StockEvent]) {
    match sink.send(events) {
        Ok(()) => debug!(count = events.len(), "domain events delivered"),
        Err(err) => {
            let event_types: Vec<&'static str> = events.iter().map(|e| e.event_type()).collect();
            error!(
                error = %err,
                count = events.len(),
                event_types = ?event_types,
                "post-commit event delivery failed"
            );
        }
    }
}
