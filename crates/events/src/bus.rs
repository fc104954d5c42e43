//! Transport seam between committed stock events and their consumers.
//!
//! The bus is the **transport** a messaging sink hands committed events to:
//!
//! - **Transport-agnostic**: in-memory channels, a broker client, etc.
//! - **At-least-once delivery**: consumers must be idempotent
//! - **No persistence**: the stores are the source of truth, not the bus
//!
//! Retrying a failed delivery is the transport's job. Publishers never roll
//! back a committed business operation because the bus refused a message.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use lotkeeper_core::TenantId;

use crate::tenant::TenantScoped;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics). Subscriptions are meant to be drained by a
/// single thread.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// for envelope in subscription.drain_tenant(tenant_id) {
///     replenishment_feed.push(envelope.into_payload());
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Next queued message, if any.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Wait at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything that is already queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }

    /// Drain queued messages, keeping only those of `tenant_id`.
    pub fn drain_tenant(&self, tenant_id: TenantId) -> Vec<M>
    where
        M: TenantScoped,
    {
        self.receiver
            .try_iter()
            .filter(|m| m.tenant_id() == tenant_id)
            .collect()
    }
}

/// Publish/subscribe transport.
///
/// ```text
/// Operation → UnitOfWork::commit → after-commit hook → MessageSink → EventBus → Consumers
/// ```
///
/// `publish()` can fail (bus full, broker down). The failure is surfaced to
/// the publisher, which decides whether it is fatal. After a commit it never
/// is: the failure is logged and the business result stands.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
