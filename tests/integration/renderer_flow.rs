//! Integration tests for the surface renderer
//!
//! Tests the flow: producer -> Exchange -> SurfaceRenderer -> Transport -> MemorySink
//! and the reverse path for client traffic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracesync::message::{self, MetricValue, Payload};
use tracesync::{Config, Message, MessageKind, Renderer, DEFAULT_TOPIC};

use super::common::{client_view, wait_until, Harness};

fn kinds(messages: &[Message]) -> Vec<MessageKind> {
    messages.iter().map(Message::kind).collect()
}

fn status_of(message: &Message) -> Option<&MetricValue> {
    match &message.payload {
        Payload::Metric(metric) if metric.name == "status" => Some(&metric.value),
        _ => None,
    }
}

/// Test that backtracking and completion leave the client on the causal path
#[tokio::test]
async fn test_renderer_replays_causal_path_to_client() {
    let h = Harness::new();
    let started = Arc::new(AtomicUsize::new(0));
    {
        let started = started.clone();
        h.exchange.subscribe(move |message: &Message, _topic: &str| {
            if message.kind() == MessageKind::ExecutionStarted {
                started.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    h.node(1, None);
    h.node(2, Some(1));
    h.node(3, Some(2));
    h.node(4, Some(1));

    h.trace(1);
    h.trace(2);
    h.trace(3);
    h.renderer.settled().await;
    h.client_ready();

    h.trace(4);
    assert_eq!(h.env.complete(false), 1);
    h.renderer.settled().await;
    assert_eq!(h.renderer.last_trace_id(), Some(4));

    let surface = h.surface();
    h.renderer.closed().await;

    let (acks, delivered): (Vec<Message>, Vec<Message>) = surface
        .sent_messages()
        .into_iter()
        .partition(|m| m.kind() == MessageKind::ClientReadyAck);
    assert_eq!(acks.len(), 1);
    assert_eq!(client_view(&delivered), vec![1, 4]);
    assert_eq!(
        delivered.last().and_then(status_of),
        Some(&MetricValue::Text("Done".into()))
    );
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(h.factory.surfaces().len(), 1);
}

/// Test that nothing reaches the client until it reports ready
#[tokio::test]
async fn test_nothing_delivered_before_client_ready() {
    let h = Harness::new();
    h.node(1, None);
    h.trace(1);
    h.renderer.settled().await;

    let surface = h.surface();
    assert!(surface.is_attached());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(surface.sent().is_empty());

    h.client_ready();
    surface.wait_for_sent(5).await;

    assert_eq!(
        kinds(&surface.sent_messages()),
        vec![
            MessageKind::ResetDisplay,
            MessageKind::ExecutionStarted,
            MessageKind::Metric,
            MessageKind::Trace,
            MessageKind::ClientReadyAck,
        ]
    );
    h.renderer.closed().await;
}

/// Test that a new execution context gets a fresh surface and the old one is unobserved
#[tokio::test]
async fn test_new_context_replaces_surface() {
    let h = Harness::new();
    h.node(1, None);
    h.trace(1);
    h.renderer.settled().await;
    h.client_ready();

    let first = h.surface();
    wait_until(|| {
        first
            .sent_messages()
            .iter()
            .any(|m| m.kind() == MessageKind::ClientReadyAck)
    })
    .await;

    h.env.enter_context("cell-2");
    h.node(10, None);
    h.trace(10);
    h.renderer.settled().await;

    let surfaces = h.factory.surfaces();
    assert_eq!(surfaces.len(), 2);
    let second = surfaces[1].clone();
    assert_eq!(first.observer_count(), 0);
    assert_eq!(second.observer_count(), 1);
    assert!(second.is_attached());

    wait_until(|| client_view(&second.sent_messages()) == vec![10]).await;
    assert!(second.sent_messages()[0].is_reset());
    assert_eq!(client_view(&first.sent_messages()), vec![1]);

    // The interrupted run in cell-1 left its hook pending; only that one fires.
    assert_eq!(h.env.complete(false), 1);
    h.renderer.settled().await;
    h.renderer.closed().await;
    assert_eq!(second.observer_count(), 0);

    let done = second
        .sent_messages()
        .iter()
        .filter(|m| status_of(m) == Some(&MetricValue::Text("Done".into())))
        .count();
    assert_eq!(done, 1);
    assert_eq!(client_view(&second.sent_messages()), vec![10]);
}

/// Test that a client output request replays the retained log
#[tokio::test]
async fn test_client_output_request_replays_log() {
    let h = Harness::new();
    h.node(1, None);
    h.node(2, Some(1));
    h.trace(1);
    h.trace(2);
    h.renderer.settled().await;
    h.client_ready();

    let surface = h.surface();
    surface.wait_for_sent(6).await;
    let before = surface.sent().len();

    surface.emit(message::encode(&Message::new(Payload::OutputRequest)).unwrap());
    wait_until(|| surface.sent().len() >= before + 3).await;

    let delivered = surface.sent_messages();
    assert_eq!(
        kinds(&delivered[before..]),
        vec![MessageKind::ResetDisplay, MessageKind::Trace, MessageKind::Trace]
    );
    assert_eq!(client_view(&delivered), vec![1, 2]);
    h.renderer.closed().await;
}

/// Test that an erroring execution ends with an Error status and idle metrics are dropped
#[tokio::test]
async fn test_error_completion_and_idle_metrics() {
    let config = Config {
        debug_capture: true,
        ..Config::default()
    };
    let h = Harness::with_config(config);
    h.node(1, None);
    h.node(2, Some(1));
    h.trace(1);
    h.trace(2);
    h.publish(Message::metric("tokens", 7.0));
    h.env.complete(true);
    h.renderer.settled().await;

    let export: serde_json::Value = serde_json::from_str(&h.renderer.debug_data().unwrap()).unwrap();
    let captured = export["messageCount"].as_u64().unwrap();
    let messages = export["messages"].as_array().unwrap();
    let last = messages.last().unwrap();
    assert_eq!(last["kind"], "MetricMessage");
    assert_eq!(last["name"], "status");
    assert_eq!(last["value"], "Error");

    h.publish(Message::metric("tokens", 8.0));
    h.renderer.settled().await;
    let export: serde_json::Value = serde_json::from_str(&h.renderer.debug_data().unwrap()).unwrap();
    assert_eq!(export["messageCount"].as_u64().unwrap(), captured);

    h.client_ready();
    let surface = h.surface();
    h.renderer.closed().await;
    let delivered: Vec<Message> = surface
        .sent_messages()
        .into_iter()
        .filter(|m| m.kind() != MessageKind::ClientReadyAck)
        .collect();
    assert_eq!(client_view(&delivered), vec![1, 2]);
    assert_eq!(
        delivered.last().and_then(status_of),
        Some(&MetricValue::Text("Error".into()))
    );
}

/// Test debug capture lifecycle through the renderer
#[tokio::test]
async fn test_debug_capture_lifecycle() {
    let h = Harness::new();
    assert!(!h.renderer.is_debug_enabled());

    h.node(1, None);
    h.trace(1);
    h.renderer.settled().await;
    assert!(h.renderer.debug_data().is_none());

    h.renderer.enable_debug();
    h.node(2, Some(1));
    h.renderer.update(Message::trace(2, Some(1), None), DEFAULT_TOPIC);
    h.renderer.settled().await;

    let export: serde_json::Value = serde_json::from_str(&h.renderer.debug_data().unwrap()).unwrap();
    assert_eq!(export["messageCount"], 1);
    assert_eq!(export["messages"][0]["kind"], "TraceMessage");
    assert_eq!(export["messages"][0]["trace_id"], 2);

    h.renderer.clear_debug_data();
    assert!(h.renderer.debug_data().is_none());
    assert!(h.renderer.is_debug_enabled());
    h.renderer.closed().await;
}

/// Test that traffic published after shutdown is dropped without effect
#[tokio::test]
async fn test_publish_after_shutdown_is_dropped() {
    let h = Harness::new();
    h.node(1, None);
    h.node(2, Some(1));
    h.trace(1);
    h.renderer.settled().await;
    h.renderer.closed().await;

    h.trace(2);
    h.renderer.update(Message::trace(2, Some(1), None), DEFAULT_TOPIC);
    h.renderer.settled().await;

    assert_eq!(h.renderer.last_trace_id(), Some(1));
    assert_eq!(h.factory.surfaces().len(), 1);
}

/// Test that each controller batch reaches the client as one uninterrupted
/// run while the client keeps reporting ready from another thread
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batches_stay_contiguous_under_client_traffic() {
    const DEPTH: u64 = 60;
    const SWITCHES: usize = 40;

    let h = Harness::new();
    for n in 1..=DEPTH {
        h.node(n, (n > 1).then(|| n - 1));
        h.node(1000 + n, (n > 1).then(|| 1000 + n - 1));
    }
    let leaves = [DEPTH, 1000 + DEPTH];

    h.trace(leaves[0]);
    h.renderer.settled().await;
    h.client_ready();

    let client = h.surface();
    let chatter = std::thread::spawn(move || {
        for _ in 0..1000 {
            client.emit(super::common::ready_payload());
        }
    });
    for switch in 1..=SWITCHES {
        h.trace(leaves[switch % 2]);
        tokio::task::yield_now().await;
    }
    chatter.join().unwrap();

    let surface = h.surface();
    h.renderer.closed().await;

    let delivered = surface.sent_messages();
    let mut batches = 0;
    for (start, message) in delivered.iter().enumerate() {
        if !message.is_reset() {
            continue;
        }
        batches += 1;
        let run = &delivered[start..start + DEPTH as usize + 1];
        assert!(
            run.iter().all(|m| m.kind() != MessageKind::ClientReadyAck),
            "ready ack delivered inside batch {batches}"
        );
    }
    assert_eq!(batches, SWITCHES + 1);

    let view: Vec<_> = delivered
        .into_iter()
        .filter(|m| m.kind() != MessageKind::ClientReadyAck)
        .collect();
    assert_eq!(client_view(&view), (1..=DEPTH).collect::<Vec<_>>());
}

/// Test a synchronous host driving the renderer on a background loop, with
/// client traffic arriving from a separate thread
#[test]
fn test_renderer_on_background_loop() {
    use tracesync::{
        BackgroundLoop, EnvironmentKind, Exchange, MemorySurfaceFactory, RenderContext,
        ScriptedEnvironment, SurfaceRenderer, TraceArena,
    };

    let background = BackgroundLoop::start().unwrap();
    let arena = Arc::new(TraceArena::new());
    let exchange = Arc::new(Exchange::new());
    let factory = Arc::new(MemorySurfaceFactory::new());
    let env = Arc::new(ScriptedEnvironment::new(EnvironmentKind::Notebook, "cell-1"));
    let ctx = RenderContext::new(exchange.clone(), arena.clone(), env.clone(), background.handle());
    let renderer = SurfaceRenderer::new(&ctx, factory.clone(), &Config::default());

    let root = arena.insert_root();
    let child = arena.insert_child(root).unwrap();
    exchange.publish(&Message::trace(root, None, None), DEFAULT_TOPIC);
    exchange.publish(&Message::trace(child, Some(root), None), DEFAULT_TOPIC);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let surface = loop {
        if let Some(surface) = factory.latest() {
            break surface;
        }
        assert!(std::time::Instant::now() < deadline, "surface never created");
        std::thread::sleep(Duration::from_millis(5));
    };

    let client = surface.clone();
    std::thread::spawn(move || client.emit(super::common::ready_payload()))
        .join()
        .unwrap();

    while client_view(&surface.sent_messages()) != vec![root, child] {
        assert!(std::time::Instant::now() < deadline, "client never caught up");
        std::thread::sleep(Duration::from_millis(5));
    }

    drop(renderer);
    drop(background);
}
