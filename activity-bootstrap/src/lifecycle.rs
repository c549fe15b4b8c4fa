use std::future::Future;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use activity_application::AppState;
use activity_infrastructure::{AppConfig, CONFIG_ENV};
use activity_interfaces_http::build_router;

use crate::context::AppContext;

/// Feed server running on its own thread and runtime.
pub struct FeedServiceHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl FeedServiceHandle {
    /// Stops accepting requests, releases the feed and joins the thread.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn build_router_with_layers(state: AppState) -> Router {
    build_router(state.clone())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(
            usize::try_from(state.config.max_body_bytes).unwrap_or(usize::MAX),
        ))
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(
            state.config.request_timeout_seconds,
        )))
        .layer(TraceLayer::new_for_http())
}

pub async fn run_standalone() -> Result<()> {
    let config = AppConfig::load().await?;
    run_with_config(config).await
}

pub async fn run_with_config(config: AppConfig) -> Result<()> {
    serve(config, shutdown_signal()).await
}

pub fn start_embedded(config_path: impl AsRef<std::path::Path>) -> Result<FeedServiceHandle> {
    std::env::set_var(
        CONFIG_ENV,
        config_path.as_ref().to_string_lossy().to_string(),
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let worker = std::thread::Builder::new()
        .name("activity-feed".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .thread_name("activity-feed-rt")
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("embedded feed runtime init failed: {}", err);
                    return;
                }
            };

            runtime.block_on(async move {
                let result = match AppConfig::load().await {
                    Ok(config) => {
                        serve(config, async move {
                            let _ = shutdown_rx.await;
                        })
                        .await
                    }
                    Err(err) => Err(err),
                };
                if let Err(err) = result {
                    error!("embedded feed exited: {}", err);
                }
            });
        })?;

    Ok(FeedServiceHandle {
        shutdown_tx: Some(shutdown_tx),
        worker: Some(worker),
    })
}

async fn serve<S>(config: AppConfig, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr: std::net::SocketAddr = config.bind_addr.parse()?;
    let context = AppContext::new(config).await?;

    let app = build_router_with_layers(context.state.clone());
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            context.shutdown().await;
            return Err(err.into());
        }
    };
    info!("activity feed listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    context.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
