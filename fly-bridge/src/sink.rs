//! Event sink: the long-lived native event callback and its dispatcher task.
//!
//! The callback decodes on the native thread and pushes into an unbounded queue; a single
//! dispatcher task drains the queue and awaits the host handler one event at a time. Delivery
//! order is receipt order and handler runs never overlap.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::Codec;
use crate::lifecycle::Lifecycle;
use crate::native::Callback;

/// Host-side consumer of decoded events.
pub trait EventHandler<E>: Send + Sync + 'static {
    fn handle(&self, event: E) -> impl Future<Output = ()> + Send;
}

impl<E, F, Fut> EventHandler<E> for F
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn handle(&self, event: E) -> impl Future<Output = ()> + Send {
        self(event)
    }
}

/// Counters for the event path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    /// Payloads the native core delivered.
    pub received: u64,
    /// Events the handler finished processing.
    pub delivered: u64,
    /// Payloads dropped because they did not decode.
    pub malformed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    delivered: AtomicU64,
    malformed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> EventStats {
        EventStats {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

struct EventSink<E> {
    codec: Codec,
    lifecycle: Arc<Lifecycle>,
    counters: Arc<Counters>,
    queue: mpsc::UnboundedSender<E>,
    _event: PhantomData<fn() -> E>,
}

impl<E: DeserializeOwned + Send + 'static> EventSink<E> {
    fn deliver(&self, raw: String) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        if self.lifecycle.is_disposed() {
            tracing::debug!(payload = %raw, "event after disposal; discarded");
            return;
        }
        let event = match self.codec.decode::<E>(&raw) {
            Ok(event) => event,
            Err(e) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(payload = %raw, error = %e, "dropping malformed native event");
                return;
            }
        };
        if self.queue.send(event).is_err() {
            tracing::debug!("event dispatcher stopped; event discarded");
        }
    }
}

/// Owner side of a running sink.
pub(crate) struct SinkHandle {
    dispatcher: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl SinkHandle {
    pub(crate) fn stats(&self) -> EventStats {
        self.counters.snapshot()
    }

    /// Stop handing events to the host. Queued events are dropped.
    pub(crate) fn stop(&self) {
        self.dispatcher.abort();
    }
}

/// Start the dispatcher on the current tokio runtime and return the callback to register with
/// the native core.
pub(crate) fn spawn_sink<E, H>(
    codec: Codec,
    lifecycle: Arc<Lifecycle>,
    handler: H,
) -> (Callback, SinkHandle)
where
    E: DeserializeOwned + Send + 'static,
    H: EventHandler<E>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<E>();
    let counters = Arc::new(Counters::default());

    let delivered = counters.clone();
    let dispatcher = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            handler.handle(event).await;
            delivered.delivered.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!("event dispatcher finished");
    });

    let sink = EventSink {
        codec,
        lifecycle,
        counters: counters.clone(),
        queue: tx,
        _event: PhantomData,
    };
    let callback: Callback = Arc::new(move |raw: String| sink.deliver(raw));
    (
        callback,
        SinkHandle {
            dispatcher,
            counters,
        },
    )
}
