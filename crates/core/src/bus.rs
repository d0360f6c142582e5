//! The `AgentBus` facade: the public entry point tying the registry,
//! router, and priority-queued worker pool together behind
//! `register_agent`/`send`/`broadcast`/`start`/`stop`.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent_bus_governance::{ErrorKind, Message, MessagePriority};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio::task::JoinSet;

use crate::error::{BusError, BusResult};
use crate::processor::{MessageProcessor, ProcessOutcome};
use crate::registry::{AgentRecord, AgentRegistry};
use crate::router::Router;

type Reply = oneshot::Sender<(Message, ProcessOutcome)>;

/// One entry in a shard's priority queue. `BinaryHeap` is a max-heap;
/// ordered so that higher `priority` always pops first and, among
/// equal priorities, the lower (earlier) `seq` pops first — giving
/// per-shard FIFO at a fixed priority, matching `spec.md` §5's
/// "priority honored at dequeue time" plus per-conversation FIFO.
struct QueueEntry {
    priority: MessagePriority,
    seq: u64,
    message: Message,
    reply: Reply,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A priority queue plus its dedicated worker. Every message is
/// sharded onto a fixed worker index by hashing its `conversation_id`
/// (`spec.md` §5), so all messages belonging to one conversation are
/// drained by the same worker in submission order; priority only
/// reorders *across* conversations landing on the same shard.
struct Shard {
    heap: SyncMutex<BinaryHeap<QueueEntry>>,
    notify: Notify,
    capacity: Semaphore,
}

impl Shard {
    fn new(capacity: usize) -> Self {
        Self {
            heap: SyncMutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            capacity: Semaphore::new(capacity),
        }
    }
}

/// Coordinates the registry, router, and a sharded priority-queue
/// worker pool for a single bus instance.
pub struct AgentBus {
    registry: AgentRegistry,
    processor: Arc<MessageProcessor>,
    shards: Vec<Arc<Shard>>,
    seq: AtomicU64,
    running: Arc<AtomicBool>,
    workers: SyncMutex<JoinSet<()>>,
    shutdown_deadline: Duration,
    deliberation_sweep_interval: Duration,
}

impl AgentBus {
    /// `worker_count` shards are created, each with its own bounded
    /// priority queue of `queue_capacity` entries. No workers run
    /// until [`AgentBus::start`] is called.
    pub fn new(processor: MessageProcessor, worker_count: usize, queue_capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        let shards = (0..worker_count)
            .map(|_| Arc::new(Shard::new(queue_capacity.max(1))))
            .collect();
        Self {
            registry: AgentRegistry::new(),
            processor: Arc::new(processor),
            shards,
            seq: AtomicU64::new(0),
            running: Arc::new(AtomicBool::new(false)),
            workers: SyncMutex::new(JoinSet::new()),
            shutdown_deadline: Duration::from_millis(30_000),
            deliberation_sweep_interval: Duration::from_millis(1_000),
        }
    }

    pub fn with_shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = deadline;
        self
    }

    pub fn with_deliberation_sweep_interval(mut self, interval: Duration) -> Self {
        self.deliberation_sweep_interval = interval;
        self
    }

    /// Current state of a conversation suspended in deliberation, for a
    /// caller polling on the `conversation_id` an earlier `send()`
    /// returned as `PENDING_DELIBERATION`.
    pub fn deliberation_state(&self, conversation_id: uuid::Uuid) -> Option<crate::deliberation::DeliberationState> {
        self.processor.deliberation_state(conversation_id)
    }

    /// Post a reviewer's decision for a message suspended in
    /// deliberation and resume it immediately.
    pub async fn post_deliberation_result(
        &self,
        conversation_id: uuid::Uuid,
        decision: agent_bus_governance::Decision,
        reviewer: &str,
    ) -> BusResult<(Message, ProcessOutcome)> {
        self.processor.post_deliberation_result(conversation_id, decision, reviewer).await
    }

    /// `false` if `agent_id` was already registered; the existing
    /// record is left untouched.
    pub fn register_agent(&self, record: AgentRecord) -> bool {
        self.registry.register(record)
    }

    /// `false` if `agent_id` was not registered.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        self.registry.unregister(agent_id)
    }

    pub fn list_agents(&self) -> Vec<String> {
        self.registry.list_agents()
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<AgentRecord>> {
        self.registry.get(agent_id)
    }

    /// Spawn one worker per shard plus a background deliberation-
    /// timeout sweep. Idempotent: calling `start` while already
    /// running is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut workers = self.workers.lock();
        for shard in &self.shards {
            let shard = Arc::clone(shard);
            let processor = Arc::clone(&self.processor);
            let running = Arc::clone(&self.running);
            workers.spawn(Self::worker_loop(shard, processor, running));
        }
        workers.spawn(Self::deliberation_sweep_loop(
            Arc::clone(&self.processor),
            Arc::clone(&self.running),
            self.deliberation_sweep_interval,
        ));
    }

    /// Periodically finalizes any deliberation past its deadline with
    /// `FAILED`/`DENY`/`DELIBERATION_TIMEOUT`, per `spec.md` §4.8.
    async fn deliberation_sweep_loop(processor: Arc<MessageProcessor>, running: Arc<AtomicBool>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                return;
            }
            processor.sweep_deliberation_timeouts().await;
        }
    }

    async fn worker_loop(shard: Arc<Shard>, processor: Arc<MessageProcessor>, running: Arc<AtomicBool>) {
        loop {
            let popped = shard.heap.lock().pop();
            match popped {
                Some(entry) => {
                    // Ingress capacity is freed the moment an entry
                    // leaves the queue, not when processing finishes —
                    // the queue bounds backlog, not in-flight work.
                    shard.capacity.add_permits(1);
                    let QueueEntry { mut message, reply, .. } = entry;
                    let outcome = processor.process(&mut message).await;
                    let _ = reply.send((message, outcome));
                }
                None => {
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    shard.notify.notified().await;
                }
            }
        }
    }

    /// Stop accepting new dispatch and wait for every shard to drain,
    /// up to `shutdown_deadline`; workers still running past the
    /// deadline are aborted.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for shard in &self.shards {
            shard.notify.notify_waiters();
        }
        let mut set = {
            let mut workers = self.workers.lock();
            std::mem::replace(&mut *workers, JoinSet::new())
        };
        let drained = tokio::time::timeout(self.shutdown_deadline, async {
            while set.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("shutdown deadline exceeded, aborting remaining bus workers");
            set.abort_all();
            while set.join_next().await.is_some() {}
        }
    }

    fn shard_for(&self, conversation_id: uuid::Uuid) -> usize {
        (conversation_id.as_u128() as usize) % self.shards.len()
    }

    /// Route, enqueue, and await the processed result for a single
    /// message. Fails fast with `NO_ROUTE` if `to_agent` isn't
    /// registered — the queue is never touched in that case. If the
    /// target shard's queue is full, blocks up to `enqueue_timeout`
    /// before failing with `QUEUE_FULL` (`spec.md` §5 backpressure
    /// policy).
    pub async fn send(&self, message: Message, enqueue_timeout: Duration) -> BusResult<(Message, ProcessOutcome)> {
        Router::new(&self.registry).route(&message)?;

        let shard = Arc::clone(&self.shards[self.shard_for(message.conversation_id)]);
        let permit = tokio::time::timeout(enqueue_timeout, shard.capacity.acquire())
            .await
            .map_err(|_| BusError::new(ErrorKind::QueueFull, "ingress queue full"))?
            .map_err(|_| BusError::new(ErrorKind::QueueFull, "ingress queue closed"))?;
        // Capacity is released explicitly by the worker when the entry
        // leaves the heap, not on permit drop.
        permit.forget();

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        shard.heap.lock().push(QueueEntry {
            priority: message.priority,
            seq,
            message,
            reply,
        });
        shard.notify.notify_one();

        rx.await
            .map_err(|_| BusError::new(ErrorKind::HandlerFailure, "worker terminated before responding"))
    }

    /// Route and enqueue a message to every other registered agent.
    /// Each target gets an independent copy (with its own `to_agent`)
    /// pushed through the full pipeline; one target's failure does not
    /// affect the others — each result is reported independently.
    pub async fn broadcast(
        &self,
        message: Message,
        enqueue_timeout: Duration,
    ) -> BusResult<Vec<(String, BusResult<(Message, ProcessOutcome)>)>> {
        let targets = Router::new(&self.registry).route_broadcast(&message)?;
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            let mut copy = message.clone();
            copy.to_agent = target.clone();
            let outcome = self.send(copy, enqueue_timeout).await;
            results.push((target, outcome));
        }
        Ok(results)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn processor(&self) -> &MessageProcessor {
        &self.processor
    }

    /// The chaos-injection singleton the bus exclusively owns
    /// (`spec.md` §3.2); the processor consults it on the hot path.
    pub fn chaos(&self) -> &crate::chaos::ChaosEngine {
        self.processor.chaos()
    }

    /// Aggregate health snapshot derived from every circuit breaker
    /// observed by this bus's processor.
    pub fn health_snapshot(&self) -> crate::health::HealthSnapshot {
        self.processor.health_snapshot()
    }
}
