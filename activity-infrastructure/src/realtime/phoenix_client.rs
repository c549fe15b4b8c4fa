use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use activity_domain::{
    BackendConfig, InsertCallback, RawRecord, RealtimeClient, ResourceWatch, SubscriptionId,
};

use super::protocol::{
    extract_change, heartbeat_frame, join_frame, leave_frame, parse_frame, reply_status,
    socket_url, system_error, PhoenixFrame, EVENT_CLOSE, EVENT_ERROR,
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct Channel {
    topic: String,
    watch: ResourceWatch,
    callback: InsertCallback,
}

struct ClientInner {
    config: BackendConfig,
    channels: RwLock<HashMap<SubscriptionId, Channel>>,
    pending_replies: Mutex<HashMap<String, oneshot::Sender<Result<(), String>>>>,
    outbound: RwLock<Option<mpsc::UnboundedSender<Message>>>,
    connected: AtomicBool,
    next_ref: AtomicU64,
    join_timeout: Duration,
}

impl ClientInner {
    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    async fn send(&self, frame: PhoenixFrame) -> Result<()> {
        let outbound = self.outbound.read().await;
        let Some(tx) = outbound.as_ref() else {
            return Err(anyhow!("realtime socket not connected"));
        };
        tx.send(Message::Text(frame.to_text().into()))
            .map_err(|_| anyhow!("realtime socket closed"))
    }

    async fn forget(&self, id: SubscriptionId) -> Option<Channel> {
        self.channels.write().await.remove(&id)
    }

    async fn dispatch(&self, frame: PhoenixFrame) {
        if let Some(status) = reply_status(&frame) {
            if let Some(reference) = &frame.reference {
                if let Some(waiter) = self.pending_replies.lock().await.remove(reference) {
                    let _ = waiter.send(status);
                }
            }
            return;
        }

        if let Some(message) = system_error(&frame) {
            warn!("realtime channel error: topic={}, message={}", frame.topic, message);
            return;
        }

        if frame.event == EVENT_ERROR || frame.event == EVENT_CLOSE {
            self.rejoin_topic(&frame.topic, &frame.event).await;
            return;
        }

        let Some(change) = extract_change(&frame) else {
            return;
        };
        let channels = self.channels.read().await;
        for channel in channels.values().filter(|channel| channel.topic == frame.topic) {
            if !channel.watch.event.matches(&change.event_type) {
                continue;
            }
            let resource = change
                .table
                .clone()
                .unwrap_or_else(|| channel.watch.table.clone());
            match RawRecord::from_value(resource, change.record.clone()) {
                Some(record) => (channel.callback)(record),
                None => debug!("ignoring non-object record on {}", frame.topic),
            }
        }
    }

    async fn rejoin_topic(&self, topic: &str, event: &str) {
        let watch = {
            let channels = self.channels.read().await;
            channels
                .values()
                .find(|channel| channel.topic == topic)
                .map(|channel| channel.watch.clone())
        };
        let Some(watch) = watch else {
            return;
        };
        warn!("realtime channel {} received {}, rejoining", topic, event);
        let frame = join_frame(
            topic,
            &watch,
            self.config.api_key.as_deref(),
            &self.next_ref(),
        );
        if let Err(err) = self.send(frame).await {
            warn!("rejoin of {} failed: {}", topic, err);
        }
    }

    async fn rejoin_all(&self) {
        let joins: Vec<PhoenixFrame> = {
            let channels = self.channels.read().await;
            channels
                .values()
                .map(|channel| {
                    join_frame(
                        &channel.topic,
                        &channel.watch,
                        self.config.api_key.as_deref(),
                        &self.next_ref(),
                    )
                })
                .collect()
        };
        if !joins.is_empty() {
            info!("rejoining {} realtime channels", joins.len());
        }
        for frame in joins {
            if let Err(err) = self.send(frame).await {
                warn!("rejoin failed: {}", err);
            }
        }
    }

    async fn on_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.outbound.write().await = None;
        let waiters: Vec<_> = self.pending_replies.lock().await.drain().collect();
        for (_, waiter) in waiters {
            let _ = waiter.send(Err("realtime socket disconnected".to_string()));
        }
    }
}

/// Cleans up a channel registration if `subscribe` is abandoned midway.
struct PendingJoin {
    inner: Arc<ClientInner>,
    id: SubscriptionId,
    armed: bool,
}

impl Drop for PendingJoin {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let inner = self.inner.clone();
        let id = self.id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                inner.forget(id).await;
            });
        }
    }
}

/// Realtime change feed client over a single Phoenix-channel websocket.
///
/// The socket is owned by a background task that reconnects after a fixed
/// delay and rejoins every registered channel.
pub struct PhoenixRealtimeClient {
    inner: Arc<ClientInner>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PhoenixRealtimeClient {
    pub fn connect(config: BackendConfig) -> Self {
        let inner = Arc::new(ClientInner {
            config,
            channels: RwLock::new(HashMap::new()),
            pending_replies: Mutex::new(HashMap::new()),
            outbound: RwLock::new(None),
            connected: AtomicBool::new(false),
            next_ref: AtomicU64::new(1),
            join_timeout: JOIN_TIMEOUT,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(run_connection(inner.clone(), shutdown_rx));
        Self {
            inner,
            shutdown_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if self.is_connected() {
                return true;
            }
            sleep(Duration::from_millis(50)).await;
        }
        self.is_connected()
    }

    pub async fn channel_count(&self) -> usize {
        self.inner.channels.read().await.len()
    }

    async fn await_join(
        &self,
        topic: &str,
        reply_rx: oneshot::Receiver<Result<(), String>>,
    ) -> Result<()> {
        match timeout(self.inner.join_timeout, reply_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(anyhow!("join of {} rejected: {}", topic, reason)),
            Ok(Err(_)) => Err(anyhow!("join of {} abandoned", topic)),
            Err(_) => Err(anyhow!(
                "no join reply for {} within {}s",
                topic,
                self.inner.join_timeout.as_secs_f32()
            )),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(worker) = self.worker.lock().await.take() {
            let _ = worker.await;
        }
    }
}

#[async_trait]
impl RealtimeClient for PhoenixRealtimeClient {
    async fn subscribe(
        &self,
        watch: &ResourceWatch,
        callback: InsertCallback,
    ) -> Result<SubscriptionId> {
        if !self.is_connected() {
            return Err(anyhow!("realtime socket not connected"));
        }

        let id = SubscriptionId::next();
        let topic = format!("{}:{}", watch.topic(), id.0);
        let reference = self.inner.next_ref();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.inner.channels.write().await.insert(
            id,
            Channel {
                topic: topic.clone(),
                watch: watch.clone(),
                callback,
            },
        );
        let mut guard = PendingJoin {
            inner: self.inner.clone(),
            id,
            armed: true,
        };
        self.inner
            .pending_replies
            .lock()
            .await
            .insert(reference.clone(), reply_tx);

        let frame = join_frame(
            &topic,
            watch,
            self.inner.config.api_key.as_deref(),
            &reference,
        );
        let result = match self.inner.send(frame).await {
            Ok(()) => self.await_join(&topic, reply_rx).await,
            Err(err) => Err(err),
        };
        self.inner.pending_replies.lock().await.remove(&reference);
        if result.is_err() {
            self.inner.forget(id).await;
        }
        guard.armed = false;
        result.map(|()| {
            debug!("joined {} for {}", topic, watch);
            id
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let Some(channel) = self.inner.forget(id).await else {
            return Ok(());
        };
        if !self.is_connected() {
            return Ok(());
        }
        self.inner
            .send(leave_frame(&channel.topic, &self.inner.next_ref()))
            .await
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

async fn run_connection(inner: Arc<ClientInner>, mut shutdown: watch::Receiver<bool>) {
    let url = socket_url(&inner.config.realtime_url, inner.config.api_key.as_deref());
    let reconnect_delay = Duration::from_secs(inner.config.reconnect_delay_seconds.max(1));
    loop {
        if *shutdown.borrow() {
            break;
        }
        match connect_ws(&url).await {
            Ok(ws) => {
                info!("realtime socket connected: {}", inner.config.realtime_url);
                if let Err(err) = run_socket_loop(&inner, ws, &mut shutdown).await {
                    warn!("realtime socket loop exited: {}", err);
                }
                inner.on_disconnected().await;
            }
            Err(err) => {
                warn!(
                    "realtime socket connect failed: url={}, err={}",
                    inner.config.realtime_url, err
                );
            }
        }
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = sleep(reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    inner.on_disconnected().await;
    info!("realtime socket closed");
}

async fn connect_ws(url: &str) -> Result<WsStream> {
    let request = url.into_client_request()?;
    let (socket, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(socket)
}

async fn run_socket_loop(
    inner: &Arc<ClientInner>,
    ws: WsStream,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (mut sink, mut stream) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    *inner.outbound.write().await = Some(outbound_tx);
    inner.connected.store(true, Ordering::SeqCst);
    inner.rejoin_all().await;

    let mut heartbeat = interval(Duration::from_secs(inner.config.heartbeat_seconds.max(1)));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            next = stream.next() => {
                match next {
                    Some(Ok(Message::Text(text))) => {
                        match parse_frame(&text) {
                            Some(frame) => inner.dispatch(frame).await,
                            None => debug!("ignoring malformed realtime frame"),
                        }
                    }
                    Some(Ok(Message::Ping(bytes))) => {
                        sink.send(Message::Pong(bytes)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Err(anyhow!("ws closed by peer: {:?}", frame));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        return Err(anyhow!("ws stream error: {}", err));
                    }
                    None => return Err(anyhow!("ws stream ended")),
                }
            }
            Some(message) = outbound_rx.recv() => {
                sink.send(message).await?;
            }
            _ = heartbeat.tick() => {
                let frame = heartbeat_frame(&inner.next_ref());
                sink.send(Message::Text(frame.to_text().into())).await?;
            }
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}
