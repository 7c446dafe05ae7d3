//! Priority-tiered event stream.
//!
//! Events are admitted through [`EventStream::submit`], which validates
//! shape and assigns a monotonic sequence number under the backlog lock,
//! so intra-tier FIFO order is total. [`EventStream::dispatch_cycle`]
//! drains the backlog in fixed tier order and delivers each event to the
//! handlers registered for its kind before the cycle started. A handler
//! fault is isolated: it is logged and other handlers still run.
//!
//! The backlog is capacity-bounded. Over capacity, items are dropped from
//! the lowest-priority tier first (most recent first within that tier) and
//! every drop is recorded in the audit trail.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::domain::error::Result;
use crate::domain::event::{AgentEvent, EventKind, PriorityTier};
use crate::security::audit::AuditLog;

/// Receives events of the kinds it subscribed to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &AgentEvent) -> Result<()>;
}

/// Event stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum events held across all tiers.
    pub capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone)]
struct QueuedEvent {
    seq: u64,
    event: AgentEvent,
}

#[derive(Default)]
struct Backlog {
    /// One FIFO queue per tier, indexed by tier order.
    tiers: [VecDeque<QueuedEvent>; 4],
    next_seq: u64,
}

impl Backlog {
    fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    /// Pop the most recent event from the lowest-priority non-empty tier.
    fn evict_lowest(&mut self) -> Option<AgentEvent> {
        for queue in self.tiers.iter_mut().rev() {
            if let Some(item) = queue.pop_back() {
                return Some(item.event);
            }
        }
        None
    }
}

/// Priority-tiered ingestion and delivery of events to subscribers.
pub struct EventStream {
    config: StreamConfig,
    backlog: Mutex<Backlog>,
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    audit: Arc<AuditLog>,
}

impl EventStream {
    pub fn new(config: StreamConfig, audit: Arc<AuditLog>) -> Self {
        Self {
            config,
            backlog: Mutex::new(Backlog::default()),
            handlers: RwLock::new(HashMap::new()),
            audit,
        }
    }

    /// Register a handler for one event kind. Handlers registered during a
    /// dispatch cycle only see subsequent cycles.
    pub async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.entry(kind).or_default().push(handler);
    }

    /// Validate and enqueue an event. Returns its admission sequence
    /// number. Rejects malformed events; over capacity, evicts from the
    /// lowest tier and records each eviction in the audit trail.
    pub async fn submit(&self, event: AgentEvent) -> Result<u64> {
        event.validate()?;

        let (seq, dropped) = {
            let mut backlog = self.backlog.lock().await;
            let seq = backlog.next_seq;
            backlog.next_seq += 1;

            let tier = event.tier() as usize;
            backlog.tiers[tier].push_back(QueuedEvent { seq, event });

            let mut dropped = Vec::new();
            while backlog.len() > self.config.capacity {
                match backlog.evict_lowest() {
                    Some(evicted) => dropped.push(evicted),
                    None => break,
                }
            }
            (seq, dropped)
        };

        for evicted in &dropped {
            warn!(event_id = %evicted.id, tier = %evicted.tier(), "event dropped: backlog over capacity");
            self.audit.record_event_dropped(evicted).await?;
        }
        Ok(seq)
    }

    /// Events currently queued.
    pub async fn backlog_len(&self) -> usize {
        self.backlog.lock().await.len()
    }

    /// Deliver all queued events in tier order (FIFO within a tier) to the
    /// handlers registered before this call. Returns the number of events
    /// delivered. Handler errors are isolated and logged.
    pub async fn dispatch_cycle(&self) -> Result<usize> {
        // Snapshot of the subscriber table as of cycle start.
        let handlers = self.handlers.read().await.clone();

        let batch: Vec<QueuedEvent> = {
            let mut backlog = self.backlog.lock().await;
            let mut batch = Vec::with_capacity(backlog.len());
            for queue in backlog.tiers.iter_mut() {
                // Queues are FIFO by admission seq already.
                batch.extend(queue.drain(..));
            }
            batch
        };

        let mut delivered = 0usize;
        for item in &batch {
            let Some(subscribers) = handlers.get(&item.event.kind) else {
                continue;
            };
            // Subscribers of one event run concurrently; events are still
            // delivered one at a time, so per-subscriber order holds.
            let results = futures::future::join_all(
                subscribers.iter().map(|handler| handler.handle(&item.event)),
            )
            .await;
            for result in results {
                if let Err(e) = result {
                    warn!(
                        event_id = %item.event.id,
                        seq = item.seq,
                        error = %e,
                        "event handler failed; continuing"
                    );
                }
            }
            delivered += 1;
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    use foreman_state::MemoryKvStore;

    use crate::domain::error::AgentError;

    fn make_stream(capacity: usize) -> EventStream {
        let audit = Arc::new(AuditLog::new(Arc::new(MemoryKvStore::new())));
        EventStream::new(StreamConfig { capacity }, audit)
    }

    struct Recorder {
        seen: StdMutex<Vec<AgentEvent>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: StdMutex::new(Vec::new()),
            })
        }
        fn seen(&self) -> Vec<AgentEvent> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &AgentEvent) -> Result<()> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn status_event(n: u64) -> AgentEvent {
        AgentEvent::new(EventKind::SystemStatus, json!({"n": n}), "monitor")
    }

    #[tokio::test]
    async fn submit_rejects_malformed_event() {
        let stream = make_stream(8);
        let bad = AgentEvent::new(EventKind::UserMessage, json!({}), "user");
        let err = stream.submit(bad).await.unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
        assert_eq!(stream.backlog_len().await, 0);
    }

    #[tokio::test]
    async fn tier_order_beats_arrival_order() {
        let stream = make_stream(8);
        let recorder = Recorder::new();
        stream
            .subscribe(EventKind::SystemStatus, recorder.clone())
            .await;
        stream
            .subscribe(EventKind::UserMessage, recorder.clone())
            .await;

        // Lower-tier event arrives first.
        stream.submit(status_event(1)).await.unwrap();
        stream
            .submit(AgentEvent::new(
                EventKind::UserMessage,
                json!({"text": "hi"}),
                "user",
            ))
            .await
            .unwrap();

        stream.dispatch_cycle().await.unwrap();
        let seen = recorder.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].kind, EventKind::UserMessage);
        assert_eq!(seen[1].kind, EventKind::SystemStatus);
    }

    #[tokio::test]
    async fn fifo_within_tier() {
        let stream = make_stream(16);
        let recorder = Recorder::new();
        stream
            .subscribe(EventKind::SystemStatus, recorder.clone())
            .await;

        for n in 0..5 {
            stream.submit(status_event(n)).await.unwrap();
        }
        stream.dispatch_cycle().await.unwrap();

        let ns: Vec<u64> = recorder
            .seen()
            .iter()
            .map(|e| e.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
    }

    struct Faulty;

    #[async_trait]
    impl EventHandler for Faulty {
        async fn handle(&self, _event: &AgentEvent) -> Result<()> {
            Err(AgentError::Infrastructure("handler exploded".to_string()))
        }
    }

    #[tokio::test]
    async fn handler_fault_does_not_block_other_handlers() {
        let stream = make_stream(8);
        let recorder = Recorder::new();
        stream
            .subscribe(EventKind::SystemStatus, Arc::new(Faulty))
            .await;
        stream
            .subscribe(EventKind::SystemStatus, recorder.clone())
            .await;

        stream.submit(status_event(7)).await.unwrap();
        let delivered = stream.dispatch_cycle().await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(recorder.seen().len(), 1);
    }

    #[tokio::test]
    async fn over_capacity_drops_lowest_tier_first() {
        let audit = Arc::new(AuditLog::new(Arc::new(MemoryKvStore::new())));
        let stream = EventStream::new(StreamConfig { capacity: 2 }, audit.clone());

        // Fill with a background and a status event, then push a user
        // message over capacity: the background event must be evicted.
        stream
            .submit(AgentEvent::new(
                EventKind::PlanUpdate,
                json!({"step": 1}),
                "tracker",
            ))
            .await
            .unwrap();
        stream.submit(status_event(1)).await.unwrap();
        stream
            .submit(AgentEvent::new(
                EventKind::UserMessage,
                json!({"text": "urgent"}),
                "user",
            ))
            .await
            .unwrap();

        assert_eq!(stream.backlog_len().await, 2);
        let records = audit.records().await;
        assert_eq!(records.len(), 1);
        assert!(matches!(
            records[0].outcome,
            crate::security::audit::AuditOutcome::EventDropped { ref tier } if tier == "background"
        ));
    }

    #[tokio::test]
    async fn handler_registered_after_cycle_sees_next_cycle_only() {
        let stream = make_stream(8);
        let early = Recorder::new();
        stream
            .subscribe(EventKind::SystemStatus, early.clone())
            .await;

        stream.submit(status_event(1)).await.unwrap();
        stream.dispatch_cycle().await.unwrap();

        let late = Recorder::new();
        stream.subscribe(EventKind::SystemStatus, late.clone()).await;
        stream.submit(status_event(2)).await.unwrap();
        stream.dispatch_cycle().await.unwrap();

        assert_eq!(early.seen().len(), 2);
        assert_eq!(late.seen().len(), 1);
    }
}
