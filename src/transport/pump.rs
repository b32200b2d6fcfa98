//! The two pump tasks that drain the transport queues.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::sink::ClientSink;
use super::Envelope;
use crate::exchange::Exchange;
use crate::message::{self, Message, MessageKind, Payload};

pub(crate) type SinkSlot = Option<Arc<dyn ClientSink>>;

/// Deliver queued batches to the client, in order, once it reports ready.
///
/// Each batch goes to a single sink without yielding, so batches never
/// interleave. Returns without sending anything if the readiness sender goes
/// away before the client ever became ready.
pub(crate) async fn outbound_pump(
    mut rx: mpsc::UnboundedReceiver<Envelope<Vec<Message>>>,
    mut ready: watch::Receiver<bool>,
    mut sink: watch::Receiver<SinkSlot>,
) {
    if ready.wait_for(|ready| *ready).await.is_err() {
        tracing::debug!("outbound pump closed before client became ready");
        return;
    }
    tracing::debug!("client ready, draining outbound queue");

    let mut delivered = 0usize;
    while let Some(envelope) = rx.recv().await {
        let batch = match envelope {
            Envelope::Deliver(batch) => batch,
            Envelope::Shutdown => break,
        };

        let payloads: Vec<(MessageKind, String)> = batch
            .iter()
            .filter_map(|message| match message::encode(message) {
                Ok(payload) => Some((message.kind(), payload)),
                Err(e) => {
                    tracing::error!(kind = %message.kind(), error = %e, "failed to encode outbound message");
                    None
                }
            })
            .collect();

        let target = match sink.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => slot.clone(),
            Err(_) => {
                tracing::debug!("sink slot dropped, stopping outbound pump");
                break;
            }
        };
        let Some(target) = target else {
            continue;
        };

        for (kind, payload) in &payloads {
            match target.send(payload) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(kind = %kind, error = %e, "failed to deliver message to client"),
            }
        }
    }
    tracing::debug!(delivered, "outbound pump stopped");
}

/// Decode client traffic, answer the readiness handshake and republish the
/// rest on the exchange.
pub(crate) async fn inbound_pump(
    mut rx: mpsc::UnboundedReceiver<Envelope<String>>,
    ready: watch::Sender<bool>,
    outbound: mpsc::UnboundedSender<Envelope<Vec<Message>>>,
    exchange: Arc<Exchange>,
    topic: String,
) {
    while let Some(envelope) = rx.recv().await {
        let raw = match envelope {
            Envelope::Deliver(raw) => raw,
            Envelope::Shutdown => break,
        };

        let message = match message::decode(&raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed inbound payload");
                continue;
            }
        };
        tracing::trace!(kind = %message.kind(), id = message.id, "inbound message");

        if matches!(message.payload, Payload::ClientReady) {
            if !*ready.borrow() {
                tracing::info!("client reported ready");
            }
            ready.send_replace(true);
            if outbound
                .send(Envelope::Deliver(vec![Message::new(Payload::ClientReadyAck)]))
                .is_err()
            {
                tracing::debug!("outbound queue closed, ready ack dropped");
            }
        }

        exchange.publish(&message, &topic);
    }
    tracing::debug!("inbound pump stopped");
}
