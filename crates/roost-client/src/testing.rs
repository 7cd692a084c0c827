// ABOUTME: In-memory scripted gateway for tests
// ABOUTME: Channel-backed Connector speaking the wire protocol without sockets

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use roost_proto::{ErrorPayload, Frame};

use crate::error::{GatewayError, Result};
use crate::transport::{Connector, TransportRx, TransportTx};

/// What the scripted gateway does with one RPC request.
pub enum ScriptedReply {
    /// Respond ok with the given payload.
    Ok(Value),
    /// Respond with a structured error.
    Err { code: String, message: String },
    /// Never respond; the call is left to time out or die with the link.
    Ignore,
}

impl ScriptedReply {
    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptedReply::Err {
            code: code.into(),
            message: message.into(),
        }
    }
}

type Handler = dyn Fn(&str, Option<Value>) -> ScriptedReply + Send + Sync;

enum ServerCmd {
    Close,
    Event {
        event: String,
        seq: i64,
        payload: Value,
    },
}

struct GatewayInner {
    handler: Box<Handler>,
    refuse_connections: AtomicBool,
    reject_connect: AtomicBool,
    connections: AtomicUsize,
    methods: Mutex<Vec<String>>,
    links: Mutex<Vec<mpsc::UnboundedSender<ServerCmd>>>,
}

/// An in-process gateway that speaks the frame protocol over channels.
///
/// Performs the challenge/connect handshake like the real gateway, then
/// routes every request frame through the scripted handler. Test knobs
/// cover refused sockets, rejected handshakes, server-side disconnects,
/// and pushed events.
pub struct ScriptedGateway {
    inner: Arc<GatewayInner>,
}

impl ScriptedGateway {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, Option<Value>) -> ScriptedReply + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(GatewayInner {
                handler: Box::new(handler),
                refuse_connections: AtomicBool::new(false),
                reject_connect: AtomicBool::new(false),
                connections: AtomicUsize::new(0),
                methods: Mutex::new(Vec::new()),
                links: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A gateway answering every method with the same ok payload.
    pub fn ok_for_all(payload: Value) -> Self {
        Self::new(move |_, _| ScriptedReply::Ok(payload.clone()))
    }

    /// The connector to hand to a supervisor under test.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(ScriptedConnector {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Refuse new sockets at the transport level.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Accept the socket but reject the connect request.
    pub fn reject_connect(&self, reject: bool) {
        self.inner.reject_connect.store(reject, Ordering::SeqCst);
    }

    /// Total sockets ever accepted.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Methods received over all connections, in arrival order
    /// (the `connect` handshake request is not recorded).
    pub fn method_log(&self) -> Vec<String> {
        self.inner.methods.lock().expect("lock poisoned").clone()
    }

    /// Close every open connection from the gateway side.
    pub fn drop_connections(&self) {
        let links = self.inner.links.lock().expect("lock poisoned");
        for link in links.iter() {
            let _ = link.send(ServerCmd::Close);
        }
    }

    /// Push an event frame on the most recent connection.
    pub fn push_event(&self, event: impl Into<String>, seq: i64, payload: Value) {
        let links = self.inner.links.lock().expect("lock poisoned");
        if let Some(link) = links.last() {
            let _ = link.send(ServerCmd::Event {
                event: event.into(),
                seq,
                payload,
            });
        }
    }
}

struct ScriptedConnector {
    inner: Arc<GatewayInner>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<(Box<dyn TransportTx>, Box<dyn TransportRx>)> {
        if self.inner.refuse_connections.load(Ordering::SeqCst) {
            return Err(GatewayError::ConnectionUnavailable(
                "connection refused".into(),
            ));
        }

        let (client_tx, server_rx) = mpsc::unbounded_channel::<String>();
        let (server_tx, client_rx) = mpsc::unbounded_channel::<String>();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ServerCmd>();

        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        self.inner
            .links
            .lock()
            .expect("lock poisoned")
            .push(cmd_tx);

        tokio::spawn(serve(
            Arc::clone(&self.inner),
            server_rx,
            server_tx,
            cmd_rx,
        ));

        Ok((
            Box::new(ChanTx { tx: client_tx }),
            Box::new(ChanRx { rx: client_rx }),
        ))
    }
}

/// One scripted connection: challenge first, then request/response routing.
async fn serve(
    inner: Arc<GatewayInner>,
    mut from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
    mut commands: mpsc::UnboundedReceiver<ServerCmd>,
) {
    let challenge = Frame::Event {
        event: "connect.challenge".into(),
        seq: 0,
        payload: Some(json!({"nonce": 1})),
    };
    if to_client.send(frame_text(&challenge)).is_err() {
        return;
    }

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(ServerCmd::Close) | None => return,
                Some(ServerCmd::Event { event, seq, payload }) => {
                    let frame = Frame::Event { event, seq, payload: Some(payload) };
                    if to_client.send(frame_text(&frame)).is_err() {
                        return;
                    }
                }
            },
            text = from_client.recv() => {
                let Some(text) = text else { return };
                let frame = Frame::from_json(&text).expect("client sent invalid frame");
                let Frame::Req { id, method, params } = frame else { continue };

                if method == "connect" {
                    let response = if inner.reject_connect.load(Ordering::SeqCst) {
                        Frame::Res {
                            id,
                            ok: false,
                            payload: None,
                            error: Some(ErrorPayload::new("unauthorized", "connect rejected")),
                        }
                    } else {
                        Frame::Res { id, ok: true, payload: Some(json!({})), error: None }
                    };
                    if to_client.send(frame_text(&response)).is_err() {
                        return;
                    }
                    continue;
                }

                inner.methods.lock().expect("lock poisoned").push(method.clone());
                let response = match (inner.handler)(&method, params) {
                    ScriptedReply::Ok(payload) => Frame::Res {
                        id,
                        ok: true,
                        payload: Some(payload),
                        error: None,
                    },
                    ScriptedReply::Err { code, message } => Frame::Res {
                        id,
                        ok: false,
                        payload: None,
                        error: Some(ErrorPayload::new(code, message)),
                    },
                    ScriptedReply::Ignore => continue,
                };
                if to_client.send(frame_text(&response)).is_err() {
                    return;
                }
            }
        }
    }
}

fn frame_text(frame: &Frame) -> String {
    frame.to_json().expect("frame serialization")
}

struct ChanTx {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl TransportTx for ChanTx {
    async fn send(&mut self, text: String) -> Result<()> {
        self.tx.send(text).map_err(|_| GatewayError::ConnectionLost)
    }

    async fn close(&mut self) {}
}

struct ChanRx {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl TransportRx for ChanRx {
    async fn next(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }
}
