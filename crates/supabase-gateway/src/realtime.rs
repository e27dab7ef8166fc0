//! Supabase Realtime client (Phoenix channels over one websocket).

use crate::error::{GatewayError, GatewayResult};
use crate::messages::{JoinReply, PhoenixMessage, PHX_CLOSE, PHX_ERROR};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use saathi_backend::{BackendResult, ChangeFeed, ChangeSink, ChannelHandle, ChannelRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Realtime client configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Full websocket URL including `apikey` and `vsn` query parameters.
    pub socket_url: String,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// How long to wait for the `phx_reply` to a join.
    pub join_timeout: Duration,
}

impl RealtimeConfig {
    pub fn new(socket_url: impl Into<String>) -> Self {
        Self {
            socket_url: socket_url.into(),
            heartbeat_interval: Duration::from_secs(25),
            join_timeout: Duration::from_secs(10),
        }
    }

    /// Derive the websocket endpoint from the project API URL.
    ///
    /// `https://xyz.supabase.co` becomes
    /// `wss://xyz.supabase.co/realtime/v1/websocket?apikey=..&vsn=1.0.0`.
    pub fn from_project_url(project_url: &str, api_key: &str) -> GatewayResult<Self> {
        let mut url = Url::parse(project_url)?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(GatewayError::Config(format!(
                    "unsupported project URL scheme: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| GatewayError::Config(format!("cannot switch scheme to {scheme}")))?;
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", api_key)
            .append_pair("vsn", "1.0.0");
        Ok(Self::new(url.to_string()))
    }

    /// Socket URL without the query string, for logs.
    fn redacted_url(&self) -> &str {
        self.socket_url
            .split_once('?')
            .map_or(self.socket_url.as_str(), |(base, _)| base)
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State shared between the client and its socket tasks.
struct Shared {
    state: RwLock<ConnectionState>,
    /// Bumped on every connect; a reader only cleans up its own generation.
    generation: AtomicU64,
    next_ref: AtomicU64,
    routes: Mutex<HashMap<String, ChangeSink>>,
    pending: Mutex<HashMap<String, oneshot::Sender<JoinReply>>>,
}

impl Shared {
    fn next_ref(&self) -> String {
        (self.next_ref.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn dispatch(&self, msg: PhoenixMessage) {
        if let Some(reply) = msg.reply() {
            let waiter = msg
                .reference
                .as_ref()
                .and_then(|reference| self.pending.lock().remove(reference));
            match waiter {
                Some(waiter) => {
                    let _ = waiter.send(reply);
                }
                None => debug!(topic = %msg.topic, "Reply without waiter"),
            }
            return;
        }

        if let Some(change) = msg.row_change() {
            let mut routes = self.routes.lock();
            if let Some(sink) = routes.get(&msg.topic) {
                if sink.send(change).is_err() {
                    debug!(topic = %msg.topic, "Dropping route with no receiver");
                    routes.remove(&msg.topic);
                }
            }
            return;
        }

        if let Some(reason) = msg.system_error() {
            warn!(topic = %msg.topic, reason = %reason, "Realtime channel error");
            self.routes.lock().remove(&msg.topic);
            return;
        }

        match msg.event.as_str() {
            PHX_ERROR | PHX_CLOSE => {
                if self.routes.lock().remove(&msg.topic).is_some() {
                    warn!(topic = %msg.topic, event = %msg.event, "Realtime channel closed by server");
                }
            }
            _ => debug!(topic = %msg.topic, event = %msg.event, "Ignoring realtime message"),
        }
    }

    /// Close every event stream and fail every outstanding join.
    fn connection_lost(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        *self.state.write() = ConnectionState::Disconnected;
        let dropped = {
            let mut routes = self.routes.lock();
            let count = routes.len();
            routes.clear();
            count
        };
        self.pending.lock().clear();
        if dropped > 0 {
            warn!(channels = dropped, "Realtime connection lost, channels closed");
        }
    }
}

/// Live socket plus the tasks driving it.
struct Connection {
    outgoing: mpsc::Sender<Message>,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Realtime change feed over a single, lazily connected websocket.
///
/// Every `subscribe` joins its own channel topic, so two subscriptions for
/// the same table never share a handle. A lost socket closes every open event
/// stream; nothing is rejoined automatically.
pub struct RealtimeClient {
    config: RealtimeConfig,
    access_token: RwLock<Option<String>>,
    connection: tokio::sync::Mutex<Option<Connection>>,
    shared: Arc<Shared>,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            access_token: RwLock::new(None),
            connection: tokio::sync::Mutex::new(None),
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectionState::Disconnected),
                generation: AtomicU64::new(0),
                next_ref: AtomicU64::new(0),
                routes: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// User JWT sent with every join so row-level security applies.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Number of channels currently routing events.
    pub fn open_channels(&self) -> usize {
        self.shared.routes.lock().len()
    }

    /// Join a postgres_changes channel and route its events into `sink`.
    pub async fn join_channel(
        &self,
        request: &ChannelRequest,
        sink: ChangeSink,
    ) -> GatewayResult<ChannelHandle> {
        let outgoing = self.ensure_connected().await?;

        let topic = format!("realtime:{}-{}", request.table, Uuid::new_v4().simple());
        let reference = self.shared.next_ref();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .insert(reference.clone(), reply_tx);
        self.shared.routes.lock().insert(topic.clone(), sink);

        let token = self.access_token.read().clone();
        let join = PhoenixMessage::join(&topic, request, token.as_deref(), &reference);
        if let Err(err) = send(&outgoing, &join).await {
            self.forget(&topic, &reference);
            return Err(err);
        }
        debug!(topic = %topic, filter = %request.filter_expression(), "Sent phx_join");

        match timeout(self.config.join_timeout, reply_rx).await {
            Ok(Ok(JoinReply::Ok)) => {
                info!(topic = %topic, table = %request.table, "Joined realtime channel");
                Ok(ChannelHandle::new(topic))
            }
            Ok(Ok(JoinReply::Error(reason))) => {
                self.forget(&topic, &reference);
                warn!(topic = %topic, reason = %reason, "Realtime join rejected");
                Err(GatewayError::JoinRejected { topic, reason })
            }
            Ok(Err(_)) => {
                self.forget(&topic, &reference);
                Err(GatewayError::ConnectionClosed)
            }
            Err(_) => {
                self.forget(&topic, &reference);
                let leave = PhoenixMessage::leave(&topic, &self.shared.next_ref());
                let _ = send(&outgoing, &leave).await;
                warn!(topic = %topic, "Realtime join timed out");
                Err(GatewayError::Timeout)
            }
        }
    }

    /// Stop routing `handle`'s events and leave the channel.
    pub async fn leave_channel(&self, handle: ChannelHandle) -> GatewayResult<()> {
        let topic = handle.id().to_string();
        drop(handle);
        self.shared.routes.lock().remove(&topic);

        let outgoing = self
            .connection
            .lock()
            .await
            .as_ref()
            .map(|connection| connection.outgoing.clone());
        match outgoing {
            Some(outgoing) if self.state() == ConnectionState::Connected => {
                let leave = PhoenixMessage::leave(&topic, &self.shared.next_ref());
                send(&outgoing, &leave).await?;
                debug!(topic = %topic, "Sent phx_leave");
            }
            _ => debug!(topic = %topic, "Socket gone, nothing to leave"),
        }
        Ok(())
    }

    /// Close the socket. Open event streams end.
    pub async fn disconnect(&self) {
        if let Some(connection) = self.connection.lock().await.take() {
            self.shared.connection_lost(connection.generation);
            info!("Disconnected from realtime");
        }
    }

    fn forget(&self, topic: &str, reference: &str) {
        self.shared.routes.lock().remove(topic);
        self.shared.pending.lock().remove(reference);
    }

    /// Return the outgoing queue of a live socket, connecting if needed.
    async fn ensure_connected(&self) -> GatewayResult<mpsc::Sender<Message>> {
        let mut connection = self.connection.lock().await;
        if let Some(existing) = connection.as_ref() {
            if self.state() == ConnectionState::Connected && !existing.outgoing.is_closed() {
                return Ok(existing.outgoing.clone());
            }
        }
        if let Some(stale) = connection.take() {
            self.shared.connection_lost(stale.generation);
        }

        *self.shared.state.write() = ConnectionState::Connecting;
        info!(url = %self.config.redacted_url(), "Connecting to realtime");

        let ws_stream = match connect_async(self.config.socket_url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(err) => {
                *self.shared.state.write() = ConnectionState::Disconnected;
                error!(error = %err, "Realtime connection failed");
                return Err(err.into());
            }
        };
        let (mut write, mut read) = ws_stream.split();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(100);

        // Spawn message sender task
        let writer = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Spawn heartbeat task
        let heartbeat_sender = msg_tx.clone();
        let heartbeat_shared = self.shared.clone();
        let heartbeat_every = self.config.heartbeat_interval;
        let heartbeat = tokio::spawn(async move {
            let mut ticker = interval(heartbeat_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let beat = PhoenixMessage::heartbeat(&heartbeat_shared.next_ref());
                if send(&heartbeat_sender, &beat).await.is_err() {
                    break;
                }
            }
        });

        // Process incoming messages
        let reader_shared = self.shared.clone();
        let pong_sender = msg_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match PhoenixMessage::from_json(&text) {
                        Ok(msg) => reader_shared.dispatch(msg),
                        Err(e) => warn!(error = %e, "Failed to parse realtime message"),
                    },
                    Ok(Message::Ping(data)) => {
                        let _ = pong_sender.send(Message::Pong(data)).await;
                    }
                    Ok(Message::Close(_)) => {
                        info!("Realtime connection closed");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Realtime WebSocket error");
                        break;
                    }
                }
            }
            reader_shared.connection_lost(generation);
        });

        *self.shared.state.write() = ConnectionState::Connected;
        info!("Connected to realtime");

        *connection = Some(Connection {
            outgoing: msg_tx.clone(),
            generation,
            tasks: vec![writer, heartbeat, reader],
        });
        Ok(msg_tx)
    }
}

async fn send(outgoing: &mpsc::Sender<Message>, msg: &PhoenixMessage) -> GatewayResult<()> {
    let json = msg.to_json()?;
    outgoing
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| GatewayError::ConnectionClosed)
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(
        &self,
        request: ChannelRequest,
        sink: ChangeSink,
    ) -> BackendResult<ChannelHandle> {
        Ok(self.join_channel(&request, sink).await?)
    }

    async fn remove_channel(&self, handle: ChannelHandle) -> BackendResult<()> {
        Ok(self.leave_channel(handle).await?)
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.config.redacted_url())
            .field("state", &self.state())
            .field("open_channels", &self.open_channels())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_from_https_project() {
        let config =
            RealtimeConfig::from_project_url("https://xyz.supabase.co", "pk_123").unwrap();
        assert_eq!(
            config.socket_url,
            "wss://xyz.supabase.co/realtime/v1/websocket?apikey=pk_123&vsn=1.0.0"
        );
        assert_eq!(config.redacted_url(), "wss://xyz.supabase.co/realtime/v1/websocket");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(25));
        assert_eq!(config.join_timeout, Duration::from_secs(10));
    }

    #[test]
    fn socket_url_from_local_project() {
        let config = RealtimeConfig::from_project_url("http://127.0.0.1:54321", "anon").unwrap();
        assert_eq!(
            config.socket_url,
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            RealtimeConfig::from_project_url("ftp://example.com", "k"),
            Err(GatewayError::Config(_))
        ));
        assert!(matches!(
            RealtimeConfig::from_project_url("not a url", "k"),
            Err(GatewayError::Url(_))
        ));
    }

    #[tokio::test]
    async fn initial_state_is_disconnected() {
        let client = RealtimeClient::new(RealtimeConfig::new("ws://127.0.0.1:9"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.open_channels(), 0);
    }

    #[test]
    fn refs_are_monotonic() {
        let client = RealtimeClient::new(RealtimeConfig::new("ws://127.0.0.1:9"));
        assert_eq!(client.shared.next_ref(), "1");
        assert_eq!(client.shared.next_ref(), "2");
    }
}
