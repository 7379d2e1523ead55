//! Engine-to-dispatcher integration: committed state changes reach
//! registered endpoints with quota snapshots attached, and delivery
//! failures never disturb engine state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use moderation::dispatch::EndpointEntry;
use moderation::{
    Author, Engine, EngineConfig, Envelope, MemoryStore, NotificationTransport, TransportError,
};

struct RecordingTransport {
    delivered: Mutex<Vec<Envelope>>,
    fail_everything: bool,
}

impl RecordingTransport {
    fn new(fail_everything: bool) -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
            fail_everything,
        })
    }

    fn envelopes(&self) -> Vec<Envelope> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn deliver(
        &self,
        _endpoint: &EndpointEntry,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        if self.fail_everything {
            return Err(TransportError::Rejected(500));
        }
        self.delivered.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

async fn settle() {
    // Let the dispatcher loop drain the bus.
    tokio::time::sleep(Duration::from_millis(100)).await;
}

fn cfg() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.dispatch.retry_backoff_ms = 1;
    cfg
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn test_comment_event_carries_recipient_quota_snapshot() {
    init_tracing();
    let engine = Engine::new(MemoryStore::shared(), cfg());
    let transport = RecordingTransport::new(false);
    engine.spawn_dispatcher(transport.clone());

    engine.register_agent("writer", "Writer").unwrap();
    engine.register_agent("watcher", "Watcher").unwrap();
    engine
        .register_endpoint("writer", "http://writer/hook", "tw")
        .unwrap();
    engine
        .register_endpoint("watcher", "http://watcher/hook", "tx")
        .unwrap();

    let post_id = engine
        .publish_post(
            Author::Human {
                name: "ed".to_string(),
            },
            "general",
            "Thread",
            "Discuss.",
        )
        .unwrap()
        .post
        .id;
    // watcher has standing on the post before writer's comment fans out.
    engine
        .submit_comment("watcher", &post_id, "early note", "t-0")
        .await
        .unwrap();
    engine
        .submit_comment("writer", &post_id, "main point", "t-1")
        .await
        .unwrap();
    settle().await;

    let envelopes = transport.envelopes();
    // writer never receives their own comment event.
    let writer_got: Vec<_> = envelopes
        .iter()
        .filter(|e| e.recipient == "writer" && e.event.event_type() == "comment_created")
        .collect();
    assert!(writer_got
        .iter()
        .all(|e| e.event.author() != Some("writer")));

    // watcher's envelope for writer's comment carries watcher's snapshot.
    let watcher_envelope = envelopes
        .iter()
        .find(|e| {
            e.recipient == "watcher"
                && e.event.event_type() == "comment_created"
                && e.event.author() == Some("writer")
        })
        .expect("watcher should be notified of writer's comment");
    let quota = watcher_envelope.quota.as_ref().expect("snapshot attached");
    assert_eq!(quota.comments_made, 1);
}

#[tokio::test]
async fn test_delivery_failures_never_touch_engine_state() {
    init_tracing();
    let engine = Engine::new(MemoryStore::shared(), cfg());
    let transport = RecordingTransport::new(true);
    engine.spawn_dispatcher(transport.clone());

    engine.register_agent("writer", "Writer").unwrap();
    engine.register_agent("watcher", "Watcher").unwrap();
    engine
        .register_endpoint("watcher", "http://watcher/hook", "tx")
        .unwrap();

    let post_id = engine
        .publish_post(
            Author::Human {
                name: "ed".to_string(),
            },
            "general",
            "Thread",
            "Discuss.",
        )
        .unwrap()
        .post
        .id;
    let receipt = engine
        .submit_comment("writer", &post_id, "still counts", "t-1")
        .await
        .unwrap();
    settle().await;

    // The comment landed despite every delivery failing.
    assert_eq!(receipt.sequence, 1);
    let snapshot = engine.get_quota_status("writer", &post_id).unwrap();
    assert_eq!(snapshot.comments_made, 1);
    assert!(transport.envelopes().is_empty());

    // The endpoint's health recorded the failures.
    let registry = engine.registry();
    let registry = registry.read().unwrap();
    let health = &registry.get("watcher").unwrap().health;
    assert!(health.error_count >= 3);
}

#[tokio::test]
async fn test_mentions_fan_out_to_named_agents() {
    let engine = Engine::new(MemoryStore::shared(), cfg());
    let transport = RecordingTransport::new(false);
    engine.spawn_dispatcher(transport.clone());

    engine.register_agent("writer", "Writer").unwrap();
    engine.register_agent("expert", "Expert").unwrap();
    engine
        .register_endpoint("expert", "http://expert/hook", "te")
        .unwrap();

    let post_id = engine
        .publish_post(
            Author::Human {
                name: "ed".to_string(),
            },
            "general",
            "Thread",
            "Discuss.",
        )
        .unwrap()
        .post
        .id;
    engine
        .submit_comment("writer", &post_id, "curious what @expert thinks", "t-1")
        .await
        .unwrap();
    settle().await;

    assert!(transport
        .envelopes()
        .iter()
        .any(|e| e.recipient == "expert" && e.event.event_type() == "mention_created"));
}

#[tokio::test]
async fn test_health_pings_reach_registered_endpoints() {
    init_tracing();
    let engine = Engine::new(MemoryStore::shared(), cfg());
    let transport = RecordingTransport::new(false);
    engine.spawn_dispatcher(transport.clone());

    engine.register_agent("bot-1", "Bot One").unwrap();
    engine
        .register_endpoint("bot-1", "http://bot/hook", "tb")
        .unwrap();

    let pinger = engine.spawn_health_pings(Duration::from_millis(10));
    settle().await;
    pinger.abort();

    assert!(transport
        .envelopes()
        .iter()
        .any(|e| e.recipient == "bot-1" && e.event.event_type() == "health_ping"));
}
