use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::handler::EventHandler;
use super::kinds::EventKind;
use super::transport::{DEFAULT_CHANNEL_PREFIX, Transport, TransportError, channel_for};
use super::types::Event;

const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(2);

type HandlerList = Vec<Arc<dyn EventHandler>>;

/// Outcome of one [`EventBus::publish`] call
///
/// Informational only: handler and transport failures have already been
/// logged and never fail the publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers invoked (type-specific plus wildcard)
    pub handled: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
    /// Whether the event reached the distributed transport
    pub forwarded: bool,
}

/// Event Bus
///
/// Dispatches events to:
/// 1. Local handlers, type-specific first, then wildcard (`"*"`), each tier
///    in registration order
/// 2. The distributed transport (best-effort, after local dispatch)
pub struct EventBus {
    handlers: RwLock<HashMap<String, HandlerList>>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    channel_prefix: String,
    forward_timeout: Duration,
}

impl EventBus {
    /// Bus without a distributed transport
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            transport: Mutex::new(None),
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
        }
    }

    /// Bus that forwards every published event to `transport`
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            ..Self::new()
        }
    }

    pub fn channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    pub fn forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }

    /// Register `handler` for `event_type`, or for every type with `"*"`
    ///
    /// Duplicates are allowed and all fire.
    pub fn subscribe<H>(&self, event_type: impl Into<String>, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.subscribe_arc(event_type, Arc::new(handler));
    }

    pub fn subscribe_arc(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let event_type = event_type.into();
        debug!(event_type = %event_type, handler = handler.name(), "handler subscribed");

        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.entry(event_type).or_default().push(handler);
    }

    /// Number of handlers registered for exactly `event_type`
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.read_handlers(event_type).len()
    }

    /// Publish an event
    ///
    /// Local handlers always run to completion (or isolated failure) before
    /// the transport is attempted. Never fails.
    pub async fn publish(&self, event: Event) -> PublishReport {
        let mut report = PublishReport::default();

        // Snapshot both tiers up front; subscriptions added mid-publish
        // are not guaranteed to see this event.
        let specific = if event.event_type == EventKind::WILDCARD {
            Vec::new()
        } else {
            self.read_handlers(&event.event_type)
        };
        let wildcard = self.read_handlers(EventKind::WILDCARD);

        for handler in specific.iter().chain(wildcard.iter()) {
            report.handled += 1;
            if !self.invoke(handler.as_ref(), &event).await {
                report.failed += 1;
            }
        }

        report.forwarded = match self.forward(&event).await {
            Ok(forwarded) => forwarded,
            Err(e) => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "transport publish failed"
                );
                false
            }
        };

        report
    }

    /// Publish on a separate task and wait for it
    ///
    /// Dropping the returned future (e.g. a request whose client went away)
    /// does not cancel dispatch: every handler and the transport forward
    /// still run.
    pub async fn publish_detached(self: &Arc<Self>, event: Event) -> PublishReport {
        let bus = Arc::clone(self);
        let event_id = event.id;

        match tokio::spawn(async move { bus.publish(event).await }).await {
            Ok(report) => report,
            Err(e) => {
                error!(event_id = %event_id, error = %e, "publish task failed");
                PublishReport::default()
            }
        }
    }

    /// Release the distributed transport. Idempotent.
    pub async fn close(&self) {
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.close().await;
            debug!("event bus transport closed");
        }
    }

    fn read_handlers(&self, event_type: &str) -> HandlerList {
        let handlers = match self.handlers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.get(event_type).cloned().unwrap_or_default()
    }

    /// Run one handler, containing errors and panics. Returns success.
    async fn invoke(&self, handler: &dyn EventHandler, event: &Event) -> bool {
        let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;

        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(
                    handler = handler.name(),
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "event handler failed"
                );
                false
            }
            Err(_) => {
                error!(
                    handler = handler.name(),
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "event handler panicked"
                );
                false
            }
        }
    }

    /// Returns `Ok(false)` when no transport is configured
    async fn forward(&self, event: &Event) -> Result<bool, TransportError> {
        let Some(transport) = self.transport.lock().await.clone() else {
            return Ok(false);
        };

        let channel = channel_for(&self.channel_prefix, &event.event_type);
        let payload = event.to_json()?;

        tokio::time::timeout(self.forward_timeout, transport.publish(&channel, &payload))
            .await
            .map_err(|_| TransportError::Timeout {
                channel: channel.clone(),
            })??;

        Ok(true)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::handler::{handler_fn, sync_handler};
    use crate::event_bus::transport::{LocalTransport, decode_forwarded};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(log: &Arc<StdMutex<Vec<String>>>, label: &str) -> Arc<dyn EventHandler> {
        let log = log.clone();
        let label = label.to_string();
        Arc::new(sync_handler(label.clone(), move |_event: &Event| {
            log.lock().unwrap().push(label.clone());
            Ok(())
        }))
    }

    #[tokio::test]
    async fn test_specific_handlers_run_before_wildcard() {
        let bus = EventBus::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        // Register a wildcard first to show order is by tier, not by time
        bus.subscribe_arc("*", recorder(&log, "wild-1"));
        bus.subscribe_arc("user.created", recorder(&log, "specific-1"));
        bus.subscribe_arc("*", recorder(&log, "wild-2"));
        bus.subscribe_arc("user.created", recorder(&log, "specific-2"));
        bus.subscribe_arc("user.deleted", recorder(&log, "other"));

        let report = bus.publish(Event::new("user.created", json!({}))).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["specific-1", "specific-2", "wild-1", "wild-2"]
        );
        assert_eq!(report.handled, 4);
        assert_eq!(report.failed, 0);
        assert!(!report.forwarded);
    }

    #[tokio::test]
    async fn test_failing_handlers_do_not_stop_others() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let count = |counter: &Arc<AtomicUsize>| {
            let counter = counter.clone();
            sync_handler("counter", move |_event: &Event| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        bus.subscribe("task.created", sync_handler("err", |_event: &Event| {
            Err(anyhow::anyhow!("handler failed"))
        }));
        bus.subscribe("task.created", count(&counter));
        bus.subscribe("*", sync_handler("panics", |_event: &Event| -> anyhow::Result<()> {
            panic!("handler panicked")
        }));
        bus.subscribe("*", count(&counter));

        let report = bus.publish(Event::new("task.created", json!({}))).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(report.handled, 4);
        assert_eq!(report.failed, 2);
    }

    #[tokio::test]
    async fn test_async_handlers_complete_before_wildcard_tier() {
        let bus = EventBus::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let slow_log = log.clone();
        bus.subscribe(
            "order.created",
            handler_fn("slow", move |_event: Event| {
                let log = slow_log.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    log.lock().unwrap().push("slow".to_string());
                    Ok(())
                }
            }),
        );
        bus.subscribe_arc("*", recorder(&log, "wild"));

        bus.publish(Event::new("order.created", json!({}))).await;

        assert_eq!(*log.lock().unwrap(), vec!["slow", "wild"]);
    }

    #[tokio::test]
    async fn test_detached_publish_survives_dropped_caller() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(StdMutex::new(Vec::new()));

        let slow_log = log.clone();
        bus.subscribe(
            "order.created",
            handler_fn("slow", move |_event: Event| {
                let log = slow_log.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    log.lock().unwrap().push("slow".to_string());
                    Ok(())
                }
            }),
        );
        bus.subscribe_arc("*", recorder(&log, "wild"));

        let caller = tokio::time::timeout(
            Duration::from_millis(10),
            bus.publish_detached(Event::new("order.created", json!({}))),
        )
        .await;
        assert!(caller.is_err());

        for _ in 0..50 {
            if log.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(*log.lock().unwrap(), vec!["slow", "wild"]);
    }

    #[tokio::test]
    async fn test_detached_publish_returns_report() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(StdMutex::new(Vec::new()));
        bus.subscribe_arc("*", recorder(&log, "wild"));

        let report = bus
            .publish_detached(Event::new("user.created", json!({})))
            .await;

        assert_eq!(report.handled, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_duplicate_subscriptions_all_fire() {
        let bus = EventBus::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let shared = recorder(&log, "dup");

        bus.subscribe_arc("user.updated", shared.clone());
        bus.subscribe_arc("user.updated", shared);

        bus.publish(Event::new("user.updated", json!({}))).await;

        assert_eq!(bus.handler_count("user.updated"), 2);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_forwards_to_transport_channel() {
        let transport = Arc::new(LocalTransport::default());
        let mut rx = transport.subscribe();
        let bus = EventBus::with_transport(transport.clone());

        let event = Event::new("order.shipped", json!({"carrier": "acme"}));
        let report = bus.publish(event.clone()).await;

        assert!(report.forwarded);
        let message = rx.recv().await.unwrap();
        assert_eq!(message.channel, "events:order.shipped");
        assert_eq!(decode_forwarded(&message.payload).unwrap(), event);
    }

    struct BrokenTransport;

    #[async_trait]
    impl Transport for BrokenTransport {
        async fn publish(&self, channel: &str, _payload: &str) -> Result<(), TransportError> {
            Err(TransportError::Publish {
                channel: channel.to_string(),
                message: "connection refused".to_string(),
            })
        }

        async fn close(&self) {}
    }

    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn publish(&self, _channel: &str, _payload: &str) -> Result<(), TransportError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_affect_local_delivery() {
        let bus = EventBus::with_transport(Arc::new(BrokenTransport));
        let log = Arc::new(StdMutex::new(Vec::new()));
        bus.subscribe_arc("*", recorder(&log, "wild"));

        let report = bus.publish(Event::new("user.created", json!({}))).await;

        assert_eq!(*log.lock().unwrap(), vec!["wild"]);
        assert_eq!(report.failed, 0);
        assert!(!report.forwarded);
    }

    #[tokio::test]
    async fn test_hanging_transport_is_bounded() {
        let bus = EventBus::with_transport(Arc::new(HangingTransport))
            .forward_timeout(Duration::from_millis(20));
        let log = Arc::new(StdMutex::new(Vec::new()));
        bus.subscribe_arc("*", recorder(&log, "wild"));

        let report = bus.publish(Event::new("user.created", json!({}))).await;

        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(!report.forwarded);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = Arc::new(LocalTransport::default());
        let bus = EventBus::with_transport(transport.clone());

        bus.close().await;
        bus.close().await;
        assert!(transport.is_closed());

        // Publishing after close still delivers locally
        let log = Arc::new(StdMutex::new(Vec::new()));
        bus.subscribe_arc("*", recorder(&log, "wild"));
        let report = bus.publish(Event::new("user.created", json!({}))).await;
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(!report.forwarded);

        // A bus that never had a transport can be closed too
        EventBus::new().close().await;
    }

    #[tokio::test]
    async fn test_concurrent_publish_and_subscribe() {
        let bus = Arc::new(EventBus::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        bus.subscribe("*", sync_handler("count", move |_event: &Event| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move {
                bus.subscribe(format!("type.{i}"), sync_handler("noop", |_event: &Event| Ok(())));
                bus.publish(Event::new(format!("type.{i}"), json!({}))).await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }
}
