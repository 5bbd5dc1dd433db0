use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use futures::future::join_all;
use futures::stream::{self, Stream};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use log::{debug, error, info, warn};

use crate::config::{DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_EVENT_QUEUE_TIMEOUT_SECS, DEFAULT_LISTEN_POLL_TIMEOUT_SECS};
use crate::data::events::Event;

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("subscriber registry lock poisoned")]
    LockPoisoned,
    #[error("event queue put timed out after {0:?}")]
    Timeout(Duration),
    #[error("event queue closed")]
    Closed,
}

/// Per-subscriber queue limits.
#[derive(Debug, Clone)]
pub struct SubscriberSettings {
    pub queue_capacity: usize,
    pub queue_timeout: Duration,
    pub poll_timeout: Duration,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            queue_timeout: Duration::from_secs_f64(DEFAULT_EVENT_QUEUE_TIMEOUT_SECS),
            poll_timeout: Duration::from_secs_f64(DEFAULT_LISTEN_POLL_TIMEOUT_SECS),
        }
    }
}

/// One connected viewer: a bounded FIFO of pending events plus activity tracking.
pub struct Subscriber {
    uid: Uuid,
    sender: mpsc::Sender<Arc<Event>>,
    receiver: AsyncMutex<mpsc::Receiver<Arc<Event>>>,
    last_activity: Mutex<Instant>,
    stopped: AtomicBool,
    queue_timeout: Duration,
    poll_timeout: Duration,
}

impl Subscriber {
    pub fn new(settings: &SubscriberSettings) -> Arc<Self> {
        // mpsc::channel panics on a zero capacity
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        Arc::new(Self {
            uid: Uuid::new_v4(),
            sender,
            receiver: AsyncMutex::new(receiver),
            last_activity: Mutex::new(Instant::now()),
            stopped: AtomicBool::new(false),
            queue_timeout: settings.queue_timeout,
            poll_timeout: settings.poll_timeout,
        })
    }

    pub fn uid(&self) -> Uuid {
        self.uid
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity.lock()
            .map(|last| *last)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.last_activity().elapsed() > threshold
    }

    /// Enqueue an event, dropping it if the queue stays full past the timeout.
    ///
    /// A `StreamStop` marks the subscriber stopped before it is enqueued, so the
    /// listener ends on its next poll even when the queue is backed up.
    pub async fn update(&self, event: Arc<Event>) -> Result<(), PubSubError> {
        self.touch();
        if event.is_stream_stop() {
            self.stop();
        }

        match time::timeout(self.queue_timeout, self.sender.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                warn!("Subscriber {} queue closed, dropping event", self.uid);
                Err(PubSubError::Closed)
            }
            Err(_) => {
                warn!("Subscriber {} queue timeout - may be disconnected", self.uid);
                Err(PubSubError::Timeout(self.queue_timeout))
            }
        }
    }

    /// Serialized events in queue order. Poll timeouts are retried; the
    /// sequence ends on `StreamStop` or once the subscriber is stopped.
    pub fn listen(self: &Arc<Self>) -> impl Stream<Item = String> + Send + 'static {
        stream::unfold(Arc::clone(self), |subscriber| async move {
            loop {
                if subscriber.is_stopped() {
                    debug!("Subscriber {} stopped, ending stream", subscriber.uid);
                    return None;
                }

                let next = {
                    let mut receiver = subscriber.receiver.lock().await;
                    time::timeout(subscriber.poll_timeout, receiver.recv()).await
                };
                subscriber.touch();

                let event = match next {
                    Ok(Some(event)) => event,
                    Ok(None) => return None,
                    Err(_) => continue,
                };

                if event.is_stream_stop() || subscriber.is_stopped() {
                    debug!("Subscriber {} received stream stop", subscriber.uid);
                    return None;
                }

                match event.to_json() {
                    Ok(payload) => return Some((payload, subscriber)),
                    Err(e) => error!("Failed to serialize event for subscriber {}: {}", subscriber.uid, e),
                }
            }
        })
    }
}

/// Registry of active subscribers. Broadcasts go to a snapshot of the
/// registry taken when the broadcast starts.
pub struct Publisher {
    subscribers: Mutex<HashMap<Uuid, Arc<Subscriber>>>,
    settings: SubscriberSettings,
}

impl Publisher {
    pub fn new(settings: SubscriberSettings) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn new_subscriber(&self) -> Arc<Subscriber> {
        Subscriber::new(&self.settings)
    }

    fn registry(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Arc<Subscriber>>>, PubSubError> {
        self.subscribers.lock().map_err(|_| PubSubError::LockPoisoned)
    }

    pub fn subscribe(&self, subscriber: Arc<Subscriber>) {
        match self.registry() {
            Ok(mut registry) => {
                let uid = subscriber.uid();
                registry.insert(uid, subscriber);
                info!("Subscriber {} registered ({} active)", uid, registry.len());
            }
            Err(e) => error!("Failed to register subscriber {}: {}", subscriber.uid(), e),
        }
    }

    pub fn unsubscribe(&self, subscriber: &Subscriber) {
        match self.registry() {
            Ok(mut registry) => {
                if registry.remove(&subscriber.uid()).is_some() {
                    info!("Subscriber {} unregistered ({} active)", subscriber.uid(), registry.len());
                }
            }
            Err(e) => error!("Failed to unregister subscriber {}: {}", subscriber.uid(), e),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().map(|registry| registry.len()).unwrap_or(0)
    }

    pub fn is_subscribed(&self, uid: Uuid) -> bool {
        self.registry().map(|registry| registry.contains_key(&uid)).unwrap_or(false)
    }

    fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        match self.registry() {
            Ok(registry) => registry.values().cloned().collect(),
            Err(e) => {
                error!("Failed to snapshot subscribers: {}", e);
                Vec::new()
            }
        }
    }

    /// Deliver to every subscriber registered at call time. Returns the number
    /// of successful deliveries; failures are logged by the subscriber.
    pub async fn notify(&self, event: Event) -> usize {
        let subscribers = self.snapshot();
        if subscribers.is_empty() {
            return 0;
        }

        let event = Arc::new(event);
        let results = join_all(
            subscribers.iter().map(|subscriber| subscriber.update(Arc::clone(&event)))
        ).await;

        let delivered = results.iter().filter(|result| result.is_ok()).count();
        if delivered < subscribers.len() {
            warn!("Delivered {:?} event to {}/{} subscribers",
                  event.event_type(), delivered, subscribers.len());
        } else {
            debug!("Delivered {:?} event to {} subscribers", event.event_type(), delivered);
        }
        delivered
    }

    /// Deliver to one subscriber. Returns false if it is no longer registered
    /// or the delivery failed.
    pub async fn notify_by_uid(&self, uid: Uuid, event: Event) -> bool {
        let subscriber = match self.registry() {
            Ok(registry) => registry.get(&uid).cloned(),
            Err(e) => {
                error!("Failed to look up subscriber {}: {}", uid, e);
                None
            }
        };

        match subscriber {
            Some(subscriber) => subscriber.update(Arc::new(event)).await.is_ok(),
            None => false,
        }
    }

    /// Evict and stop every subscriber idle for longer than `timeout`.
    /// A zero timeout evicts everyone.
    pub fn cleanup_stale_subscribers(&self, timeout: Duration) -> Result<usize, PubSubError> {
        let evicted: Vec<Arc<Subscriber>> = {
            let mut registry = self.registry()?;
            let stale: Vec<Uuid> = registry.iter()
                .filter(|(_, subscriber)| timeout.is_zero() || subscriber.is_stale(timeout))
                .map(|(uid, _)| *uid)
                .collect();
            stale.iter().filter_map(|uid| registry.remove(uid)).collect()
        };

        for subscriber in &evicted {
            subscriber.stop();
            info!("Cleaned up stale subscriber: {}", subscriber.uid());
        }

        Ok(evicted.len())
    }
}

/// Periodically evict stale subscribers until `shutdown` is cancelled.
pub fn spawn_cleanup_task(
    publisher: Arc<Publisher>,
    interval: Duration,
    stale_after: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        info!("Started subscriber cleanup task (every {:?}, stale after {:?})", interval, stale_after);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Subscriber cleanup task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match publisher.cleanup_stale_subscribers(stale_after) {
                        Ok(0) => {}
                        Ok(count) => info!("Evicted {} stale subscribers ({} active)",
                                           count, publisher.subscriber_count()),
                        Err(e) => error!("Error in cleanup task: {}", e),
                    }
                }
            }
        }
    })
}
