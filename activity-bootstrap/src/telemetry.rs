use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "activity-feed.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Stderr-only subscriber for the work done before the config, and with it
/// `log_dir`, is known.
pub fn startup_subscriber() -> impl tracing::Subscriber + Send + Sync + 'static {
    fmt().with_env_filter(env_filter()).finish()
}

/// Installs the global subscriber. With `log_dir` set, events are also
/// written to a daily rolling file; keep the returned guard alive until exit
/// so buffered lines are flushed.
pub fn init(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = env_filter();

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(Path::new(dir), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .try_init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tracing::instrument::WithSubscriber;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use activity_infrastructure::AppConfig;

    struct CountWarnings(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for CountWarnings {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn config_load_warnings_reach_a_scoped_subscriber() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber =
            tracing_subscriber::registry().with(CountWarnings(warnings.clone()));
        let missing = std::env::temp_dir()
            .join("activity-feed-missing-config")
            .join("config.toml");

        let config = AppConfig::load_from(&missing, |_| None)
            .with_subscriber(subscriber)
            .await
            .expect("defaults load");
        assert_eq!(config.capacity, 15);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }
}
