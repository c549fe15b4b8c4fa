use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    inserts_applied: AtomicU64,
    inserts_dropped: AtomicU64,
    evictions: AtomicU64,
    subscribe_attempts: AtomicU64,
    subscribe_failures: AtomicU64,
    active_subscriptions: AtomicU64,
    seed_failures: AtomicU64,
}

impl Metrics {
    pub fn record_insert(&self, evicted: bool) {
        self.inserts_applied.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dropped(&self) {
        self.inserts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscribe_attempt(&self) {
        self.subscribe_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscribe_failure(&self) {
        self.subscribe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscribed(&self) {
        self.active_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self, count: usize) {
        let _ = self
            .active_subscriptions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(count as u64))
            });
    }

    pub fn record_seed_failure(&self) {
        self.seed_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inserts_applied(&self) -> u64 {
        self.inserts_applied.load(Ordering::Relaxed)
    }

    pub fn inserts_dropped(&self) -> u64 {
        self.inserts_dropped.load(Ordering::Relaxed)
    }

    pub fn subscribe_failures(&self) -> u64 {
        self.subscribe_failures.load(Ordering::Relaxed)
    }

    pub fn active_subscriptions(&self) -> u64 {
        self.active_subscriptions.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let applied = self.inserts_applied.load(Ordering::Relaxed);
        let dropped = self.inserts_dropped.load(Ordering::Relaxed);
        let evictions = self.evictions.load(Ordering::Relaxed);
        let attempts = self.subscribe_attempts.load(Ordering::Relaxed);
        let failures = self.subscribe_failures.load(Ordering::Relaxed);
        let active = self.active_subscriptions.load(Ordering::Relaxed);
        let seed_failures = self.seed_failures.load(Ordering::Relaxed);

        format!(
            "# TYPE activity_feed_inserts_applied_total counter\n\
activity_feed_inserts_applied_total {}\n\
# TYPE activity_feed_inserts_dropped_total counter\n\
activity_feed_inserts_dropped_total {}\n\
# TYPE activity_feed_evictions_total counter\n\
activity_feed_evictions_total {}\n\
# TYPE activity_feed_subscribe_attempts_total counter\n\
activity_feed_subscribe_attempts_total {}\n\
# TYPE activity_feed_subscribe_failures_total counter\n\
activity_feed_subscribe_failures_total {}\n\
# TYPE activity_feed_active_subscriptions gauge\n\
activity_feed_active_subscriptions {}\n\
# TYPE activity_feed_seed_failures_total counter\n\
activity_feed_seed_failures_total {}\n",
            applied, dropped, evictions, attempts, failures, active, seed_failures
        )
    }
}
