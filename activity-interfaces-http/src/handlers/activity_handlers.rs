use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use activity_application::queries::activity_queries::{self, ActivityQuery};
use activity_application::{AppState, FeedUpdate, WatchState};
use activity_domain::ActivityItem;

use crate::error::HttpError;
use crate::middleware::{authorize, authorize_stream};

#[derive(serde::Deserialize)]
pub struct StreamQuery {
    pub access_token: Option<String>,
}

pub async fn list_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityItem>>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let items = activity_queries::list_activity(&state, query).await?;
    Ok(Json(items))
}

pub async fn list_watches(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<WatchState>>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    Ok(Json(activity_queries::list_watches(&state).await))
}

pub async fn stream_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    if !authorize_stream(&state.config, &headers, query.access_token.as_deref()) {
        return HttpError::Unauthorized.into_response();
    }
    match ws {
        Some(ws) => ws.on_upgrade(move |socket| run_stream(socket, state)),
        None => HttpError::BadRequest("websocket upgrade required".to_string()).into_response(),
    }
}

/// Sends a `snapshot` frame, then one frame per feed update until either
/// side goes away. A viewer that lags behind gets a fresh snapshot.
async fn run_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before reading the snapshot so no insert falls in between;
    // an insert may then appear in both, viewers key items by id.
    let mut updates = state.feed.subscribe_updates();

    if send_snapshot(&mut sender, &state).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let delivered = match next_step(update) {
                    StreamStep::Forward(text) => sender.send(Message::Text(text)).await.is_ok(),
                    StreamStep::Finish(text) => {
                        let _ = sender.send(Message::Text(text)).await;
                        false
                    }
                    StreamStep::Resnapshot => send_snapshot(&mut sender, &state).await.is_ok(),
                    StreamStep::Skip => true,
                    StreamStep::Close => false,
                };
                if !delivered {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(bytes))) => {
                        if sender.send(Message::Pong(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    let _ = sender.close().await;
}

/// What the stream does with one result from the update channel.
#[derive(Debug, PartialEq)]
enum StreamStep {
    Forward(String),
    /// Last frame before the stream ends.
    Finish(String),
    Resnapshot,
    Skip,
    Close,
}

fn next_step(update: Result<FeedUpdate, RecvError>) -> StreamStep {
    match update {
        Ok(update) => {
            let stopped = matches!(update, FeedUpdate::Stopped);
            match serde_json::to_string(&update) {
                Ok(text) if stopped => StreamStep::Finish(text),
                Ok(text) => StreamStep::Forward(text),
                Err(err) => {
                    warn!("failed to encode feed update: {}", err);
                    StreamStep::Skip
                }
            }
        }
        Err(RecvError::Lagged(skipped)) => {
            debug!("stream viewer lagged by {} updates, resending snapshot", skipped);
            StreamStep::Resnapshot
        }
        Err(RecvError::Closed) => StreamStep::Close,
    }
}

async fn send_snapshot<S>(sender: &mut S, state: &AppState) -> Result<(), axum::Error>
where
    S: SinkExt<Message, Error = axum::Error> + Unpin,
{
    let items = state.feed.snapshot().await;
    let frame = json!({"type": "snapshot", "items": items}).to_string();
    sender.send(Message::Text(frame)).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use activity_application::{ActivityFeedAggregator, FeedSettings, Metrics};
    use activity_domain::{
        ActivityItem, ActivityKind, ActivityMapper, HealthCheckService, InsertCallback, RawRecord,
        RealtimeClient, ResourceWatch, RuntimeConfig, SeedMode, SubscriptionId, ORDERS,
    };
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::Value;
    use tower::ServiceExt;

    use activity_application::{AppState, FeedUpdate};
    use futures_util::StreamExt;
    use tokio::net::TcpListener;
    use tokio::sync::broadcast::error::RecvError;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use super::{next_step, StreamStep};
    use crate::routes::build_router;

    fn seed_item(id: &str, kind: ActivityKind) -> ActivityItem {
        let mut item = ActivityItem::synthetic(kind, "Seed", "seeded", Utc::now());
        item.id = id.to_string();
        item
    }

    struct OfflineRealtime;

    #[async_trait]
    impl RealtimeClient for OfflineRealtime {
        async fn subscribe(
            &self,
            _watch: &ResourceWatch,
            _callback: InsertCallback,
        ) -> anyhow::Result<SubscriptionId> {
            Ok(SubscriptionId::next())
        }

        async fn unsubscribe(&self, _id: SubscriptionId) -> anyhow::Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    struct FixedHealth {
        realtime: bool,
    }

    #[async_trait]
    impl HealthCheckService for FixedHealth {
        async fn check_realtime(&self) -> anyhow::Result<bool> {
            Ok(self.realtime)
        }

        async fn check_feed(&self) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    fn runtime_config(api_token: Option<&str>) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            api_token: api_token.map(ToString::to_string),
            capacity: 15,
            watches: vec![ResourceWatch::inserts(ORDERS)],
            seed_mode: SeedMode::None,
            seed_path: String::new(),
            subscribe_timeout_seconds: 1,
            retry_initial_millis: 10,
            retry_max_millis: 10,
            retry_max_attempts: 0,
            max_body_bytes: 1024,
            request_timeout_seconds: 1,
        }
    }

    fn state(api_token: Option<&str>, realtime_up: bool) -> AppState {
        let config = runtime_config(api_token);
        let metrics = Arc::new(Metrics::default());
        let aggregator = ActivityFeedAggregator::new(
            Arc::new(OfflineRealtime),
            Arc::new(ActivityMapper::default()),
            FeedSettings::from(&config),
            metrics.clone(),
        );
        let feed = aggregator
            .start(
                vec![
                    seed_item("a", ActivityKind::Spin),
                    seed_item("b", ActivityKind::Tournament),
                ],
                config.watches.clone(),
            )
            .expect("start feed");
        AppState {
            config,
            feed: Arc::new(feed),
            health: Arc::new(FixedHealth {
                realtime: realtime_up,
            }),
            metrics,
        }
    }

    async fn get(state: AppState, uri: &str, token: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().uri(uri);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        let response = build_router(state)
            .oneshot(request.body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn activity_lists_newest_first_with_limit() {
        let state = state(None, true);
        state.feed.on_insert(
            RawRecord::from_value(
                ORDERS,
                serde_json::json!({"id": "live", "total_amount": 100}),
            )
            .expect("object"),
        );
        state.feed.sync().await;

        let (status, body) = get(state.clone(), "/v1/activity?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        let items: Value = serde_json::from_slice(&body).expect("json");
        let items = items.as_array().expect("array");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], "live");
        assert_eq!(items[0]["kind"], "order");
        assert_eq!(items[1]["id"], "a");
        state.feed.stop().await;
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let state = state(None, true);
        let (status, _) = get(state.clone(), "/v1/activity?limit=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        state.feed.stop().await;
    }

    #[tokio::test]
    async fn token_is_enforced_when_configured() {
        let state = state(Some("secret"), true);
        let (status, _) = get(state.clone(), "/v1/activity", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = get(state.clone(), "/v1/activity", Some("secret")).await;
        assert_eq!(status, StatusCode::OK);
        state.feed.stop().await;
    }

    #[tokio::test]
    async fn watches_report_status() {
        let state = state(None, true);
        for _ in 0..100 {
            if state.feed.watches().await[0].status == activity_application::WatchStatus::Active {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let (status, body) = get(state.clone(), "/v1/activity/watches", None).await;
        assert_eq!(status, StatusCode::OK);
        let watches: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(watches[0]["watch"]["table"], "orders");
        assert_eq!(watches[0]["state"], "active");
        state.feed.stop().await;
    }

    #[tokio::test]
    async fn readiness_follows_realtime_connection() {
        let up = state(None, true);
        let (status, _) = get(up.clone(), "/v1/ops/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        up.feed.stop().await;

        let down = state(None, false);
        let (status, body) = get(down.clone(), "/v1/ops/health/ready", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["realtime"], false);
        down.feed.stop().await;
    }

    #[tokio::test]
    async fn metrics_are_rendered() {
        let state = state(None, true);
        let (status, body) = get(state.clone(), "/v1/ops/metrics/prometheus", None).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).expect("utf8");
        assert!(text.contains("activity_feed_inserts_applied_total"));
        state.feed.stop().await;
    }

    fn order(id: &str) -> RawRecord {
        RawRecord::from_value(ORDERS, serde_json::json!({"id": id, "total_amount": 7}))
            .expect("object")
    }

    async fn next_json<S>(socket: &mut S) -> Value
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let message = tokio::time::timeout(std::time::Duration::from_secs(5), socket.next())
                .await
                .expect("frame in time")
                .expect("open stream")
                .expect("valid frame");
            if let WsMessage::Text(text) = message {
                return serde_json::from_str(text.as_str()).expect("json frame");
            }
        }
    }

    #[tokio::test]
    async fn stream_sends_snapshot_then_inserts_then_stopped() {
        let state = state(None, true);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = build_router(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let (mut socket, _) =
            tokio_tungstenite::connect_async(format!("ws://{}/v1/activity/stream", addr))
                .await
                .expect("connect stream");

        let snapshot = next_json(&mut socket).await;
        assert_eq!(snapshot["type"], "snapshot");
        let ids: Vec<&str> = snapshot["items"]
            .as_array()
            .expect("items")
            .iter()
            .filter_map(|item| item["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        state.feed.on_insert(order("live"));
        state.feed.sync().await;
        let insert = next_json(&mut socket).await;
        assert_eq!(insert["type"], "insert");
        assert_eq!(insert["item"]["id"], "live");
        assert!(insert.get("evicted").is_none());

        state.feed.stop().await;
        let stopped = next_json(&mut socket).await;
        assert_eq!(stopped["type"], "stopped");
    }

    #[tokio::test]
    async fn stream_checks_token_before_upgrade() {
        let state = state(Some("secret"), true);
        let (status, _) = get(state.clone(), "/v1/activity/stream", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = get(state.clone(), "/v1/activity/stream?access_token=secret", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        state.feed.stop().await;
    }

    #[tokio::test]
    async fn lagging_viewer_gets_a_fresh_snapshot() {
        let state = state(None, true);
        let mut updates = state.feed.subscribe_updates();
        for n in 0..100 {
            state.feed.on_insert(order(&format!("o{}", n)));
        }
        state.feed.sync().await;

        assert_eq!(next_step(updates.recv().await), StreamStep::Resnapshot);
        match next_step(updates.recv().await) {
            StreamStep::Forward(text) => assert!(text.contains("\"type\":\"insert\"")),
            other => panic!("unexpected step {:?}", other),
        }
        state.feed.stop().await;
    }

    #[test]
    fn stopped_update_ends_the_stream() {
        match next_step(Ok(FeedUpdate::Stopped)) {
            StreamStep::Finish(text) => assert_eq!(text, r#"{"type":"stopped"}"#),
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(next_step(Err(RecvError::Closed)), StreamStep::Close);
    }
}
