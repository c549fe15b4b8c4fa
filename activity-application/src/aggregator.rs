use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use activity_domain::{
    ActivityFeed, ActivityItem, ActivityMapper, InsertCallback, RawRecord, RealtimeClient,
    ResourceWatch, RuntimeConfig, SeedSource, SubscriptionId, DEFAULT_CAPACITY,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::ops::{FeedStreamHub, FeedUpdate};
use crate::retry::RetryPolicy;
use crate::Metrics;

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub capacity: usize,
    pub subscribe_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            subscribe_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&RuntimeConfig> for FeedSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            capacity: config.capacity,
            subscribe_timeout: Duration::from_secs(config.subscribe_timeout_seconds.max(1)),
            retry: RetryPolicy {
                initial: Duration::from_millis(config.retry_initial_millis.max(1)),
                max: Duration::from_millis(config.retry_max_millis),
                max_attempts: config.retry_max_attempts,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WatchStatus {
    Pending,
    Active,
    Retrying { attempts: u32, last_error: String },
    Failed { attempts: u32, last_error: String },
    Released,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchState {
    pub watch: ResourceWatch,
    #[serde(flatten)]
    pub status: WatchStatus,
    #[serde(skip)]
    subscription: Option<SubscriptionId>,
}

enum FeedCommand {
    Insert(RawRecord),
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

/// Starts live activity feeds against one realtime backend.
pub struct ActivityFeedAggregator {
    client: Arc<dyn RealtimeClient>,
    mapper: Arc<ActivityMapper>,
    settings: FeedSettings,
    metrics: Arc<Metrics>,
}

impl ActivityFeedAggregator {
    pub fn new(
        client: Arc<dyn RealtimeClient>,
        mapper: Arc<ActivityMapper>,
        settings: FeedSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            mapper,
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// Installs `seed` and opens one watch per entry in the background.
    ///
    /// Fails only when a watch names a resource without a mapping; nothing is
    /// opened in that case. Must be called inside a tokio runtime.
    pub fn start(
        &self,
        seed: Vec<ActivityItem>,
        watches: Vec<ResourceWatch>,
    ) -> Result<FeedHandle, FeedError> {
        self.check_watches(&watches)?;

        let feed = ActivityFeed::seeded(seed, self.settings.capacity);
        info!(
            "activity feed starting: seed={}, capacity={}, watches={}",
            feed.len(),
            feed.capacity(),
            watches.len()
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(FeedShared {
            feed: RwLock::new(feed),
            stopped: AtomicBool::new(false),
            watched: watches
                .iter()
                .map(|watch| normalize_resource(watch.resource()))
                .collect(),
            hub: FeedStreamHub::default(),
            watches: RwLock::new(
                watches
                    .iter()
                    .map(|watch| WatchState {
                        watch: watch.clone(),
                        status: WatchStatus::Pending,
                        subscription: None,
                    })
                    .collect(),
            ),
            mapper: self.mapper.clone(),
            metrics: self.metrics.clone(),
        });

        let writer = tokio::spawn(run_writer(shared.clone(), command_rx));

        let mut tasks = Vec::with_capacity(watches.len());
        for (index, watch) in watches.into_iter().enumerate() {
            let callback = make_callback(shared.clone(), command_tx.clone());
            tasks.push(tokio::spawn(establish_watch(
                shared.clone(),
                self.client.clone(),
                self.settings.clone(),
                index,
                watch,
                callback,
                shutdown_rx.clone(),
            )));
        }

        Ok(FeedHandle {
            inner: Arc::new(HandleInner {
                shared,
                client: self.client.clone(),
                command_tx,
                shutdown_tx,
                tasks: Mutex::new(tasks),
                writer: Mutex::new(Some(writer)),
                released: OnceCell::new(),
            }),
        })
    }

    /// Like [`start`](Self::start), fetching the seed first. A failed fetch
    /// degrades to an empty seed.
    pub async fn start_with_source(
        &self,
        source: &dyn SeedSource,
        watches: Vec<ResourceWatch>,
    ) -> Result<FeedHandle, FeedError> {
        self.check_watches(&watches)?;

        let seed = match source.load(self.settings.capacity).await {
            Ok(items) => {
                info!("seed loaded from {}: {} items", source.describe(), items.len());
                items
            }
            Err(err) => {
                let err = FeedError::SeedLoad(err.to_string());
                warn!("{} ({}), starting with empty feed", err, source.describe());
                self.metrics.record_seed_failure();
                Vec::new()
            }
        };
        self.start(seed, watches)
    }

    fn check_watches(&self, watches: &[ResourceWatch]) -> Result<(), FeedError> {
        match watches
            .iter()
            .find(|watch| !self.mapper.supports(watch.resource()))
        {
            Some(unmapped) => Err(FeedError::UnmappedResource(unmapped.resource().to_string())),
            None => Ok(()),
        }
    }
}

struct FeedShared {
    feed: RwLock<ActivityFeed>,
    stopped: AtomicBool,
    watched: HashSet<String>,
    hub: FeedStreamHub,
    watches: RwLock<Vec<WatchState>>,
    mapper: Arc<ActivityMapper>,
    metrics: Arc<Metrics>,
}

impl FeedShared {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn set_status(&self, index: usize, status: WatchStatus) {
        if let Some(state) = self.watches.write().await.get_mut(index) {
            state.status = status;
        }
    }

    fn apply(&self, feed: &mut ActivityFeed, record: RawRecord) {
        if !self.watched.contains(&normalize_resource(&record.resource)) {
            warn!("dropping notification for unwatched resource '{}'", record.resource);
            self.metrics.record_dropped();
            return;
        }
        let item = match self.mapper.map(&record) {
            Ok(item) => item,
            Err(err) => {
                warn!("dropping notification: {}", FeedError::from(err));
                self.metrics.record_dropped();
                return;
            }
        };
        debug!("activity insert: resource={}, id={}", record.resource, item.id);
        let evicted = feed.push_front(item.clone());
        self.metrics.record_insert(evicted.is_some());
        self.hub.publish(FeedUpdate::Insert {
            item,
            evicted: evicted.map(|old| old.id),
        });
    }
}

fn normalize_resource(resource: &str) -> String {
    resource.trim().to_lowercase()
}

fn make_callback(
    shared: Arc<FeedShared>,
    command_tx: mpsc::UnboundedSender<FeedCommand>,
) -> InsertCallback {
    Arc::new(move |record: RawRecord| {
        if shared.is_stopped() {
            return;
        }
        let _ = command_tx.send(FeedCommand::Insert(record));
    })
}

/// Single writer: the only place the feed is mutated after start.
async fn run_writer(shared: Arc<FeedShared>, mut commands: mpsc::UnboundedReceiver<FeedCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            FeedCommand::Insert(record) => {
                if shared.is_stopped() {
                    debug!("discarding notification for {} after stop", record.resource);
                    continue;
                }
                let mut feed = shared.feed.write().await;
                shared.apply(&mut feed, record);
            }
            FeedCommand::Barrier(done) => {
                let _ = done.send(());
            }
            FeedCommand::Shutdown => break,
        }
    }
}

async fn establish_watch(
    shared: Arc<FeedShared>,
    client: Arc<dyn RealtimeClient>,
    settings: FeedSettings,
    index: usize,
    watch: ResourceWatch,
    callback: InsertCallback,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempts = 0u32;
    loop {
        if *shutdown.borrow() {
            return;
        }
        attempts += 1;
        shared.metrics.record_subscribe_attempt();

        // The subscribe call is not raced against shutdown so an id obtained
        // here is always recorded and later released by stop.
        let outcome = match timeout(
            settings.subscribe_timeout,
            client.subscribe(&watch, callback.clone()),
        )
        .await
        {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "timed out after {}s",
                settings.subscribe_timeout.as_secs_f32()
            )),
        };

        match outcome {
            Ok(id) => {
                if let Some(state) = shared.watches.write().await.get_mut(index) {
                    state.subscription = Some(id);
                    state.status = WatchStatus::Active;
                }
                shared.metrics.record_subscribed();
                info!("watch established: {} as {} (attempt {})", watch, id, attempts);
                return;
            }
            Err(reason) => {
                let err = FeedError::Subscription {
                    resource: watch.resource().to_string(),
                    reason,
                };
                shared.metrics.record_subscribe_failure();
                if !settings.retry.allows_another(attempts) {
                    warn!("{}; giving up after {} attempts", err, attempts);
                    shared
                        .set_status(
                            index,
                            WatchStatus::Failed {
                                attempts,
                                last_error: err.to_string(),
                            },
                        )
                        .await;
                    return;
                }
                let delay = settings.retry.delay_after(attempts);
                warn!("{}; retrying in {:?}", err, delay);
                shared
                    .set_status(
                        index,
                        WatchStatus::Retrying {
                            attempts,
                            last_error: err.to_string(),
                        },
                    )
                    .await;
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
}

struct HandleInner {
    shared: Arc<FeedShared>,
    client: Arc<dyn RealtimeClient>,
    command_tx: mpsc::UnboundedSender<FeedCommand>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    released: OnceCell<()>,
}

impl HandleInner {
    /// Every caller returns only after the single teardown has finished.
    async fn release(&self) {
        self.released.get_or_init(|| self.teardown()).await;
    }

    async fn teardown(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            let _ = task.await;
        }

        let subscriptions: Vec<SubscriptionId> = {
            let mut watches = self.shared.watches.write().await;
            watches
                .iter_mut()
                .filter_map(|state| {
                    state.status = WatchStatus::Released;
                    state.subscription.take()
                })
                .collect()
        };
        for id in &subscriptions {
            if let Err(err) = self.client.unsubscribe(*id).await {
                warn!("failed to release {}: {}", id, err);
            }
        }
        self.shared.metrics.record_released(subscriptions.len());

        let _ = self.command_tx.send(FeedCommand::Shutdown);
        if let Some(writer) = self.writer.lock().await.take() {
            let _ = writer.await;
        }
        self.shared.hub.publish(FeedUpdate::Stopped);
        info!(
            "activity feed stopped: released {} subscriptions",
            subscriptions.len()
        );
    }
}

/// Owns every subscription opened by one `start` call.
///
/// Dropping the handle without calling [`stop`](Self::stop) releases the
/// subscriptions on the current tokio runtime.
pub struct FeedHandle {
    inner: Arc<HandleInner>,
}

impl FeedHandle {
    /// Idempotent. After this returns the list is never mutated again.
    pub async fn stop(&self) {
        self.inner.release().await;
    }

    pub fn is_running(&self) -> bool {
        !self.inner.shared.is_stopped()
    }

    /// Entry point used by realtime callbacks; hosts bridging their own
    /// transport may call it directly.
    pub fn on_insert(&self, record: RawRecord) {
        if self.inner.shared.is_stopped() {
            return;
        }
        let _ = self.inner.command_tx.send(FeedCommand::Insert(record));
    }

    /// Resolves once every notification queued before the call is applied.
    pub async fn sync(&self) {
        if self.inner.shared.is_stopped() {
            return;
        }
        let (done_tx, done_rx) = oneshot::channel();
        if self.inner.command_tx.send(FeedCommand::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    pub async fn snapshot(&self) -> Vec<ActivityItem> {
        self.inner.shared.feed.read().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.inner.shared.feed.read().await.len()
    }

    pub async fn capacity(&self) -> usize {
        self.inner.shared.feed.read().await.capacity()
    }

    pub async fn watches(&self) -> Vec<WatchState> {
        self.inner.shared.watches.read().await.clone()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<FeedUpdate> {
        self.inner.shared.hub.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.shared.hub.viewer_count()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        if self.inner.shared.is_stopped() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = self.inner.clone();
                runtime.spawn(async move { inner.release().await });
            }
            Err(_) => {
                self.inner.shared.stopped.store(true, Ordering::SeqCst);
                let _ = self.inner.shutdown_tx.send(true);
                warn!("feed handle dropped outside a runtime; subscriptions left to the client");
            }
        }
    }
}
