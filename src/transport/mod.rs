//! Asynchronous delivery between the engine and a client surface.
//!
//! Two unbounded queues, each drained by a pump task on the owning loop.
//! Outbound entries are whole batches, written to the client back to back.
//! Outbound delivery is held back until the client sends `ClientReady`;
//! inbound traffic is decoded and republished on the [`Exchange`].

pub mod memory;
mod pump;
pub mod sink;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::exchange::Exchange;
use crate::message::Message;
use crate::runtime::LoopHandle;

pub use memory::{MemorySink, MemorySurfaceFactory};
pub use sink::{ClientSink, InboundHandler, ObserverId, SinkError, SurfaceFactory, SurfaceOptions};

/// Queue entry: a payload or the sentinel that stops the pump.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    Deliver(T),
    Shutdown,
}

/// Posts raw client data onto the inbound queue. Safe to call from any thread.
#[derive(Clone)]
pub struct InboundPoster {
    tx: mpsc::UnboundedSender<Envelope<String>>,
}

impl InboundPoster {
    /// Returns false once the inbound pump has stopped.
    pub fn post(&self, raw: impl Into<String>) -> bool {
        self.tx.send(Envelope::Deliver(raw.into())).is_ok()
    }

    /// Turn this poster into a handler a [`ClientSink`] can call.
    pub fn handler(&self) -> InboundHandler {
        let poster = self.clone();
        Arc::new(move |raw: String| {
            if !poster.post(raw) {
                tracing::debug!("inbound queue closed, dropping client payload");
            }
        })
    }
}

impl std::fmt::Debug for InboundPoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundPoster")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

pub struct Transport {
    outbound: mpsc::UnboundedSender<Envelope<Vec<Message>>>,
    inbound: mpsc::UnboundedSender<Envelope<String>>,
    sink: watch::Sender<pump::SinkSlot>,
    ready: watch::Receiver<bool>,
    outbound_task: JoinHandle<()>,
    inbound_task: JoinHandle<()>,
}

impl Transport {
    /// Create both queues and spawn their pumps on `handle`.
    pub fn start(handle: &LoopHandle, exchange: Arc<Exchange>, topic: impl Into<String>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(false);
        let (sink_tx, sink_rx) = watch::channel::<pump::SinkSlot>(None);

        let outbound_task = handle.spawn(pump::outbound_pump(outbound_rx, ready_rx.clone(), sink_rx));
        let inbound_task = handle.spawn(pump::inbound_pump(
            inbound_rx,
            ready_tx,
            outbound_tx.clone(),
            exchange,
            topic.into(),
        ));

        Self {
            outbound: outbound_tx,
            inbound: inbound_tx,
            sink: sink_tx,
            ready: ready_rx,
            outbound_task,
            inbound_task,
        }
    }

    /// Queue `batch` as one uninterrupted run: nothing else queued, the ready
    /// ack included, reaches the client between its messages. Returns false if
    /// the pump is gone.
    pub fn enqueue(&self, batch: Vec<Message>) -> bool {
        if batch.is_empty() {
            return true;
        }
        self.outbound.send(Envelope::Deliver(batch)).is_ok()
    }

    pub fn inbound_poster(&self) -> InboundPoster {
        InboundPoster {
            tx: self.inbound.clone(),
        }
    }

    /// Route subsequent deliveries to `sink`. Messages already dequeued while
    /// no sink was attached go to this one.
    pub fn set_sink(&self, sink: Arc<dyn ClientSink>) {
        self.sink.send_replace(Some(sink));
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Close the queues and wait for both pumps to finish.
    ///
    /// The inbound side drains first so a late `ClientReady` still gets its
    /// ack queued ahead of the outbound sentinel.
    pub async fn closed(self) {
        let Self {
            outbound,
            inbound,
            sink,
            outbound_task,
            inbound_task,
            ..
        } = self;

        let _ = inbound.send(Envelope::Shutdown);
        if let Err(e) = inbound_task.await {
            tracing::warn!(pump = "inbound", error = %e, "transport pump failed");
        }

        let _ = outbound.send(Envelope::Shutdown);
        drop(sink);
        if let Err(e) = outbound_task.await {
            tracing::warn!(pump = "outbound", error = %e, "transport pump failed");
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("ready", &self.is_ready())
            .finish()
    }
}
