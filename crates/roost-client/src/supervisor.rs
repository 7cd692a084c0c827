// ABOUTME: Connection supervisor owning the single live gateway link
// ABOUTME: Serialized handshakes, generation tracking, pending-call invalidation

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use roost_proto::{ErrorPayload, Frame};

use crate::config::GatewayConfig;
use crate::diagnostics::mask_endpoint;
use crate::error::{GatewayError, Result};
use crate::models::GatewayEvent;
use crate::transport::{Connector, TransportRx, TransportTx};

/// Capacity of the event fan-out channel. Slow subscribers lose the oldest
/// events rather than backpressuring the reader.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the per-link outbound write queue.
const WRITE_QUEUE_CAPACITY: usize = 64;

/// Lifecycle states of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome delivered to one in-flight call.
pub(crate) enum CallReply {
    Ok(Option<Value>),
    Err(ErrorPayload),
}

/// Registry of in-flight calls for one connection generation. Once the
/// generation dies the registry closes: the slots are drained (dropping a
/// sender resolves its caller with `ConnectionLost`) and late registrations
/// are refused so a call racing a reconnect fails fast instead of hanging
/// out its full timeout against a dead link.
struct PendingCalls {
    open: bool,
    slots: HashMap<String, oneshot::Sender<CallReply>>,
}

impl PendingCalls {
    fn new() -> Self {
        Self {
            open: true,
            slots: HashMap::new(),
        }
    }

    fn register(&mut self, id: String, tx: oneshot::Sender<CallReply>) -> bool {
        if !self.open {
            return false;
        }
        self.slots.insert(id, tx);
        true
    }

    fn take(&mut self, id: &str) -> Option<oneshot::Sender<CallReply>> {
        self.slots.remove(id)
    }

    fn fail_all(&mut self, reason: &str) {
        self.open = false;
        let count = self.slots.len();
        self.slots.clear();
        if count > 0 {
            tracing::warn!(count, reason, "failed in-flight gateway calls");
        }
    }
}

type PendingMap = Mutex<PendingCalls>;

/// One live connection generation. The writer channel feeds the write task;
/// dropping it closes the socket.
struct Link {
    generation: u64,
    writer: mpsc::Sender<String>,
    pending: Arc<PendingMap>,
}

struct SupervisorState {
    status: ConnectionStatus,
    generation: u64,
    /// Completed reconnect attempts; lets concurrent force_reconnect callers
    /// detect that the attempt they queued behind already ran.
    reconnect_epoch: u64,
    connected_since_ms: Option<i64>,
    last_disconnected_at_ms: Option<i64>,
    link: Option<Link>,
}

/// State shared with the background reader task.
struct Shared {
    state: Mutex<SupervisorState>,
    events: broadcast::Sender<GatewayEvent>,
}

impl Shared {
    fn handle_frame(&self, text: &str, pending: &PendingMap) {
        match Frame::from_json(text) {
            Ok(Frame::Res {
                id,
                ok,
                payload,
                error,
            }) => {
                let slot = pending.lock().expect("lock poisoned").take(&id);
                match slot {
                    Some(sender) => {
                        let reply = if ok {
                            CallReply::Ok(payload)
                        } else {
                            CallReply::Err(error.unwrap_or_else(|| {
                                ErrorPayload::new("error", "gateway rejected request")
                            }))
                        };
                        let _ = sender.send(reply);
                    }
                    // Late response after a timeout already resolved the call.
                    None => tracing::debug!(%id, "response with no pending call"),
                }
            }
            Ok(Frame::Event {
                event,
                seq,
                payload,
            }) => {
                let _ = self.events.send(GatewayEvent {
                    event,
                    seq,
                    payload,
                });
            }
            Ok(Frame::Req { method, .. }) => {
                tracing::debug!(%method, "ignoring request frame from gateway");
            }
            Err(e) => tracing::warn!(error = %e, "dropping unparseable gateway frame"),
        }
    }

    /// Transport-level close or error. Only acts if this generation is still
    /// current; a link already retired by force_reconnect/close is done.
    fn on_transport_down(&self, generation: u64) {
        let link = {
            let mut st = self.state.lock().expect("lock poisoned");
            let is_current = st.link.as_ref().map(|l| l.generation) == Some(generation);
            if !is_current {
                return;
            }
            let link = st.link.take();
            if st.status != ConnectionStatus::Closed {
                st.status = ConnectionStatus::Disconnected;
            }
            st.last_disconnected_at_ms = Some(now_ms());
            link
        };
        if let Some(link) = link {
            link.pending
                .lock()
                .expect("lock poisoned")
                .fail_all("connection lost");
        }
    }

    /// Retire the current link (if any): stamp the disconnect, drop the
    /// writer so the socket closes, and fail every pending call.
    fn retire_current_link(&self, reason: &str) {
        let link = {
            let mut st = self.state.lock().expect("lock poisoned");
            let link = st.link.take();
            if link.is_some() {
                if st.status != ConnectionStatus::Closed {
                    st.status = ConnectionStatus::Disconnected;
                }
                st.last_disconnected_at_ms = Some(now_ms());
            }
            link
        };
        if let Some(link) = link {
            link.pending.lock().expect("lock poisoned").fail_all(reason);
        }
    }
}

/// Owns the single logical connection to the gateway.
///
/// The gateway enforces one connection per device identity: a second
/// handshake under the same identity evicts the first. Every connection this
/// process makes therefore goes through this type, and handshakes are
/// serialized so two callers can never race replacement connections into
/// evicting each other.
pub struct ConnectionSupervisor {
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl ConnectionSupervisor {
    pub fn new(config: GatewayConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            config,
            connector,
            shared: Arc::new(Shared {
                state: Mutex::new(SupervisorState {
                    status: ConnectionStatus::Disconnected,
                    generation: 0,
                    reconnect_epoch: 0,
                    connected_since_ms: None,
                    last_disconnected_at_ms: None,
                    link: None,
                }),
                events,
            }),
            connect_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().expect("lock poisoned").status
    }

    pub fn connected_since_ms(&self) -> Option<i64> {
        self.shared
            .state
            .lock()
            .expect("lock poisoned")
            .connected_since_ms
    }

    pub fn last_disconnected_at_ms(&self) -> Option<i64> {
        self.shared
            .state
            .lock()
            .expect("lock poisoned")
            .last_disconnected_at_ms
    }

    /// Subscribe to gateway push events (agent output, chat finals, ...).
    pub fn subscribe_events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.shared.events.subscribe()
    }

    /// Ensure a live connection exists. Idempotent: when the connection is
    /// already up this returns immediately, and concurrent callers queue
    /// behind the one in-flight handshake instead of starting their own.
    /// Failure is surfaced to the caller; there is no automatic retry.
    pub async fn ensure_started(&self) -> Result<()> {
        match self.status() {
            ConnectionStatus::Connected => return Ok(()),
            ConnectionStatus::Closed => {
                return Err(GatewayError::ConnectionUnavailable(
                    "client has been closed".into(),
                ))
            }
            _ => {}
        }

        let _guard = self.connect_lock.lock().await;
        match self.status() {
            ConnectionStatus::Connected => Ok(()),
            ConnectionStatus::Closed => Err(GatewayError::ConnectionUnavailable(
                "client has been closed".into(),
            )),
            _ => self.handshake_locked().await,
        }
    }

    /// Probe the existing connection with a lightweight status call.
    ///
    /// Never creates or replaces the connection: a probe that reconnected
    /// would evict the very connection it is trying to verify, since the
    /// gateway allows one connection per device identity. Reconnection is
    /// the explicit, caller-invoked `force_reconnect`.
    pub async fn check_liveness(&self) -> Result<()> {
        self.call_raw("status", json!({}), self.config.probe_timeout)
            .await
            .map(|_| ())
    }

    /// Tear down the current connection (if any) and perform a fresh
    /// handshake. Every call pending on the old generation fails with
    /// `ConnectionLost` before the replacement reports `Connected`.
    ///
    /// Serialized: callers arriving while a reconnect is in flight wait for
    /// that attempt and share its outcome instead of racing their own.
    pub async fn force_reconnect(&self) -> Result<()> {
        let epoch_before = {
            let st = self.shared.state.lock().expect("lock poisoned");
            if st.status == ConnectionStatus::Closed {
                return Err(GatewayError::ConnectionUnavailable(
                    "client has been closed".into(),
                ));
            }
            st.reconnect_epoch
        };

        let _guard = self.connect_lock.lock().await;
        {
            let st = self.shared.state.lock().expect("lock poisoned");
            if st.status == ConnectionStatus::Closed {
                return Err(GatewayError::ConnectionUnavailable(
                    "client has been closed".into(),
                ));
            }
            if st.reconnect_epoch != epoch_before && st.status == ConnectionStatus::Connected {
                // A reconnect completed while we waited for the lock.
                return Ok(());
            }
        }

        self.shared.retire_current_link("connection replaced");
        let result = self.handshake_locked().await;
        self.shared
            .state
            .lock()
            .expect("lock poisoned")
            .reconnect_epoch += 1;
        result
    }

    /// Deliberate shutdown. Fails all pending calls and moves to the
    /// terminal `Closed` state; the supervisor accepts no further work.
    pub async fn close(&self) {
        let _guard = self.connect_lock.lock().await;
        self.shared.state.lock().expect("lock poisoned").status = ConnectionStatus::Closed;
        self.shared.retire_current_link("client closed");
        tracing::info!("gateway client closed");
    }

    // =========================================================================
    // Internal: handshake and link lifecycle
    // =========================================================================

    /// Perform the handshake. Caller must hold `connect_lock`.
    async fn handshake_locked(&self) -> Result<()> {
        self.shared.state.lock().expect("lock poisoned").status = ConnectionStatus::Connecting;
        tracing::info!(
            endpoint = %mask_endpoint(&self.config.url),
            "connecting to gateway"
        );

        let handshake = tokio::time::timeout(self.config.connect_timeout, self.perform_handshake());
        match handshake.await {
            Ok(Ok((tx, rx))) => {
                self.install_link(tx, rx);
                Ok(())
            }
            Ok(Err(e)) => {
                self.note_connect_failure(&e);
                Err(e)
            }
            Err(_) => {
                let e = GatewayError::ConnectionUnavailable(format!(
                    "handshake timed out after {:?}",
                    self.config.connect_timeout
                ));
                self.note_connect_failure(&e);
                Err(e)
            }
        }
    }

    /// Open the transport and run the connect exchange: the gateway opens
    /// with a `connect.challenge` event, the client answers with a `connect`
    /// request, and the gateway acks it before serving RPC traffic.
    async fn perform_handshake(&self) -> Result<(Box<dyn TransportTx>, Box<dyn TransportRx>)> {
        let (mut tx, mut rx) = self.connector.connect().await?;

        loop {
            match next_handshake_frame(&mut rx).await? {
                Frame::Event { event, .. } if event == "connect.challenge" => break,
                // Unrelated pushes before the challenge are harmless.
                Frame::Event { .. } => continue,
                other => {
                    return Err(GatewayError::Protocol(format!(
                        "expected connect.challenge, got {:?}",
                        other
                    )))
                }
            }
        }

        let connect_id = Uuid::new_v4().to_string();
        let params = match &self.config.token {
            Some(token) => json!({ "token": token }),
            None => json!({}),
        };
        let request = Frame::req(connect_id.as_str(), "connect", params)
            .to_json()
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        tx.send(request).await.map_err(|_| {
            GatewayError::ConnectionUnavailable("gateway closed during handshake".into())
        })?;

        loop {
            match next_handshake_frame(&mut rx).await? {
                Frame::Res { id, ok, error, .. } if id == connect_id => {
                    if ok {
                        return Ok((tx, rx));
                    }
                    let detail = error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "connect request rejected".into());
                    return Err(GatewayError::ConnectionUnavailable(detail));
                }
                // Events and stale responses may interleave before the ack.
                _ => continue,
            }
        }
    }

    fn note_connect_failure(&self, error: &GatewayError) {
        let mut st = self.shared.state.lock().expect("lock poisoned");
        if st.status != ConnectionStatus::Closed {
            st.status = ConnectionStatus::Disconnected;
        }
        st.last_disconnected_at_ms = Some(now_ms());
        tracing::warn!(error = %error, "gateway handshake failed");
    }

    fn install_link(&self, tx: Box<dyn TransportTx>, rx: Box<dyn TransportRx>) {
        let (writer, write_queue) = mpsc::channel::<String>(WRITE_QUEUE_CAPACITY);
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(PendingCalls::new()));

        let generation = {
            let mut st = self.shared.state.lock().expect("lock poisoned");
            st.generation += 1;
            st.status = ConnectionStatus::Connected;
            st.connected_since_ms = Some(now_ms());
            st.link = Some(Link {
                generation: st.generation,
                writer,
                pending: Arc::clone(&pending),
            });
            st.generation
        };

        tokio::spawn(write_loop(tx, write_queue));
        tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            rx,
            generation,
            pending,
        ));
        tracing::info!(generation, "gateway connected");
    }

    // =========================================================================
    // Internal: correlated calls over the current link
    // =========================================================================

    /// Issue one request over the current connection and await its terminal
    /// outcome. Does not connect; callers wanting establishment go through
    /// `ensure_started` first. The link is re-resolved on every call, never
    /// cached across a reconnect boundary.
    pub(crate) async fn call_raw(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let (writer, pending) = {
            let st = self.shared.state.lock().expect("lock poisoned");
            match (&st.status, &st.link) {
                (ConnectionStatus::Connected, Some(link)) => {
                    (link.writer.clone(), Arc::clone(&link.pending))
                }
                _ => {
                    return Err(GatewayError::ConnectionUnavailable(
                        "no live gateway connection".into(),
                    ))
                }
            }
        };

        let id = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        if !pending
            .lock()
            .expect("lock poisoned")
            .register(id.clone(), reply_tx)
        {
            // The link died between snapshot and registration.
            return Err(GatewayError::ConnectionLost);
        }

        let text = match Frame::req(id.as_str(), method, params).to_json() {
            Ok(text) => text,
            Err(e) => {
                pending.lock().expect("lock poisoned").take(&id);
                return Err(GatewayError::Protocol(e.to_string()));
            }
        };

        tracing::debug!(%id, %method, "rpc request");
        if writer.send(text).await.is_err() {
            pending.lock().expect("lock poisoned").take(&id);
            return Err(GatewayError::ConnectionLost);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(CallReply::Ok(payload))) => Ok(payload.unwrap_or(Value::Null)),
            Ok(Ok(CallReply::Err(err))) => {
                if err.is_method_not_found() {
                    Err(GatewayError::MethodNotFound(method.to_string()))
                } else {
                    Err(GatewayError::Rejected {
                        code: err.code,
                        message: err.message,
                    })
                }
            }
            // Sender dropped: the link died or was replaced under us.
            Ok(Err(_)) => Err(GatewayError::ConnectionLost),
            Err(_) => {
                // Expiry removes the registration but leaves the connection
                // alone; a slow call is not evidence the link is dead.
                pending.lock().expect("lock poisoned").take(&id);
                Err(GatewayError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }
}

async fn next_handshake_frame(rx: &mut Box<dyn TransportRx>) -> Result<Frame> {
    match rx.next().await {
        Some(Ok(text)) => Frame::from_json(&text)
            .map_err(|e| GatewayError::Protocol(format!("bad frame during handshake: {e}"))),
        Some(Err(e)) => Err(GatewayError::ConnectionUnavailable(e.to_string())),
        None => Err(GatewayError::ConnectionUnavailable(
            "gateway closed during handshake".into(),
        )),
    }
}

/// Feed queued outbound frames to the transport until the queue closes or
/// the transport rejects a write, then close the socket.
async fn write_loop(mut tx: Box<dyn TransportTx>, mut queue: mpsc::Receiver<String>) {
    while let Some(text) = queue.recv().await {
        if tx.send(text).await.is_err() {
            break;
        }
    }
    tx.close().await;
}

/// Route inbound frames for one connection generation until the transport
/// goes down, then invalidate everything keyed to that generation.
async fn read_loop(
    shared: Arc<Shared>,
    mut rx: Box<dyn TransportRx>,
    generation: u64,
    pending: Arc<PendingMap>,
) {
    loop {
        match rx.next().await {
            Some(Ok(text)) => shared.handle_frame(&text, &pending),
            Some(Err(e)) => {
                tracing::warn!(error = %e, generation, "gateway transport error");
                break;
            }
            None => {
                tracing::info!(generation, "gateway closed the connection");
                break;
            }
        }
    }
    shared.on_transport_down(generation);
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedGateway, ScriptedReply};

    fn test_config() -> GatewayConfig {
        GatewayConfig::new("ws://127.0.0.1:18789")
            .with_connect_timeout(Duration::from_millis(500))
            .with_call_timeout(Duration::from_millis(500))
            .with_probe_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_ensure_started_transitions_to_connected() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());

        assert_eq!(sup.status(), ConnectionStatus::Disconnected);
        assert!(sup.connected_since_ms().is_none());

        sup.ensure_started().await.unwrap();
        assert_eq!(sup.status(), ConnectionStatus::Connected);
        assert!(sup.connected_since_ms().is_some());
        assert_eq!(gateway.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_ensure_started_is_idempotent() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());

        sup.ensure_started().await.unwrap();
        sup.ensure_started().await.unwrap();
        sup.ensure_started().await.unwrap();
        assert_eq!(gateway.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_started_shares_one_handshake() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let sup = Arc::clone(&sup);
                tokio::spawn(async move { sup.ensure_started().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(gateway.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_and_stamps_disconnect() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        gateway.refuse_connections(true);
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());

        let err = sup.ensure_started().await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionUnavailable(_)));
        assert_eq!(sup.status(), ConnectionStatus::Disconnected);
        assert!(sup.last_disconnected_at_ms().is_some());
        assert!(sup.connected_since_ms().is_none());
    }

    #[tokio::test]
    async fn test_connect_rejected_by_gateway() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        gateway.reject_connect(true);
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());

        let err = sup.ensure_started().await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_check_liveness_never_connects() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());

        let err = sup.check_liveness().await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionUnavailable(_)));
        // The probe must not have opened a connection.
        assert_eq!(gateway.connection_count(), 0);
        assert_eq!(sup.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_check_liveness_leaves_timestamps_alone() {
        let gateway = ScriptedGateway::ok_for_all(json!({"status": "ok"}));
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());
        sup.ensure_started().await.unwrap();

        let since = sup.connected_since_ms();
        let last = sup.last_disconnected_at_ms();
        sup.check_liveness().await.unwrap();
        assert_eq!(sup.connected_since_ms(), since);
        assert_eq!(sup.last_disconnected_at_ms(), last);
        assert_eq!(gateway.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_liveness_probe_failure_does_not_replace_connection() {
        let gateway = ScriptedGateway::new(|method, _| {
            if method == "status" {
                ScriptedReply::Ignore
            } else {
                ScriptedReply::Ok(json!({}))
            }
        });
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());
        sup.ensure_started().await.unwrap();
        let since = sup.connected_since_ms();

        let err = sup.check_liveness().await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert_eq!(sup.status(), ConnectionStatus::Connected);
        assert_eq!(sup.connected_since_ms(), since);
        assert_eq!(gateway.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_force_reconnect_replaces_connection() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());

        sup.ensure_started().await.unwrap();
        sup.force_reconnect().await.unwrap();
        assert_eq!(sup.status(), ConnectionStatus::Connected);
        assert_eq!(gateway.connection_count(), 2);
        assert!(sup.last_disconnected_at_ms().is_some());
    }

    #[tokio::test]
    async fn test_force_reconnect_fails_pending_calls() {
        let gateway = ScriptedGateway::new(|method, _| {
            if method == "chat.send" {
                ScriptedReply::Ignore
            } else {
                ScriptedReply::Ok(json!({}))
            }
        });
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());
        sup.ensure_started().await.unwrap();

        let caller = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move {
                sup.call_raw("chat.send", json!({"message": "hi"}), Duration::from_secs(5))
                    .await
            })
        };
        // Let the call register before replacing the connection.
        tokio::time::sleep(Duration::from_millis(50)).await;

        sup.force_reconnect().await.unwrap();
        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionLost));
    }

    #[tokio::test]
    async fn test_gateway_close_fails_pending_and_stamps() {
        let gateway = ScriptedGateway::new(|method, _| {
            if method == "chat.send" {
                ScriptedReply::Ignore
            } else {
                ScriptedReply::Ok(json!({}))
            }
        });
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());
        sup.ensure_started().await.unwrap();

        let caller = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move {
                sup.call_raw("chat.send", json!({}), Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        gateway.drop_connections();
        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionLost));

        // The reader task notices the close shortly after.
        tokio::time::timeout(Duration::from_secs(1), async {
            while sup.status() != ConnectionStatus::Disconnected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(sup.last_disconnected_at_ms().is_some());
    }

    #[tokio::test]
    async fn test_no_auto_retry_after_transport_loss() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());
        sup.ensure_started().await.unwrap();

        gateway.drop_connections();
        tokio::time::timeout(Duration::from_secs(1), async {
            while sup.status() != ConnectionStatus::Disconnected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        // Nothing reconnects on its own.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(gateway.connection_count(), 1);
        assert_eq!(sup.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());
        sup.ensure_started().await.unwrap();

        sup.close().await;
        assert_eq!(sup.status(), ConnectionStatus::Closed);

        let err = sup.ensure_started().await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionUnavailable(_)));
        let err = sup.force_reconnect().await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionUnavailable(_)));
        assert_eq!(gateway.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_events_fan_out_to_subscribers() {
        let gateway = ScriptedGateway::ok_for_all(json!({}));
        let sup = ConnectionSupervisor::new(test_config(), gateway.connector());
        sup.ensure_started().await.unwrap();

        let mut events = sup.subscribe_events();
        gateway.push_event("chat", 1, json!({"state": "final"}));
        gateway.push_event("chat", 2, json!({"state": "final"}));

        let first = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.event, "chat");
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
    }

    #[tokio::test]
    async fn test_status_display() {
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionStatus::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionStatus::Closed.to_string(), "closed");
    }
}
