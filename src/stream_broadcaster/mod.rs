//! StreamBroadcaster - Live State Distribution
//!
//! ## Responsibilities
//!
//! - Subscriber registration for SSE / WebSocket transports
//! - One ticker reading the store per cadence and fanning the snapshot out
//! - Pruning subscribers whose transport went away
//!
//! Each subscriber holds a single latest-value slot. A slow consumer skips
//! the ticks it missed and resumes at the newest snapshot; the ticker never
//! waits on it.

use crate::sensor_state::{SensorSnapshot, SensorStateStore};
use futures::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Broadcaster settings
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    pub cadence: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(1),
        }
    }
}

struct Subscriber {
    tx: watch::Sender<Arc<SensorSnapshot>>,
}

/// Receiving end handed to a transport
pub struct Subscription {
    id: Uuid,
    rx: watch::Receiver<Arc<SensorSnapshot>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Newest snapshot published since the last call; `None` once the
    /// broadcaster dropped this subscriber
    pub async fn recv(&mut self) -> Option<Arc<SensorSnapshot>> {
        self.rx.changed().await.ok()?;
        let snapshot = self.rx.borrow_and_update().clone();
        Some(snapshot)
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<SensorSnapshot>> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let item = sub.recv().await?;
            Some((item, sub))
        })
    }
}

pub struct StreamBroadcaster {
    store: Arc<SensorStateStore>,
    config: BroadcasterConfig,
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    subscriber_count: AtomicU64,
}

impl StreamBroadcaster {
    pub fn new(store: Arc<SensorStateStore>, config: BroadcasterConfig) -> Self {
        Self {
            store,
            config,
            subscribers: RwLock::new(HashMap::new()),
            subscriber_count: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber
    pub async fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        // Seeded value counts as seen; the first delivery is the next tick
        let (tx, rx) = watch::channel(Arc::new(self.store.read()));

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(id, Subscriber { tx });
        }
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(subscriber_id = %id, "Stream subscriber connected");

        Subscription { id, rx }
    }

    /// Remove a subscriber explicitly. Dropping the `Subscription` has the
    /// same effect on the next tick.
    pub async fn unregister(&self, id: &Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(id).is_some() {
            self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(subscriber_id = %id, "Stream subscriber disconnected");
        }
    }

    /// Snapshot for on-demand queries
    pub fn current(&self) -> SensorSnapshot {
        self.store.read()
    }

    pub fn subscriber_count(&self) -> u64 {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    /// Ticker loop. Runs for the process lifetime.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.broadcast_once().await;
        }
    }

    /// Deliver the current snapshot to every subscriber
    async fn broadcast_once(&self) {
        let snapshot = Arc::new(self.store.read());
        let mut closed = Vec::new();

        {
            let subscribers = self.subscribers.read().await;
            for (id, sub) in subscribers.iter() {
                if sub.tx.is_closed() {
                    closed.push(*id);
                    continue;
                }
                // Overwrites an unread snapshot
                sub.tx.send_replace(snapshot.clone());
            }
        }

        for id in closed {
            self.unregister(&id).await;
        }
    }
}
