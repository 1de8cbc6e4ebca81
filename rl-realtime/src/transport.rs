//! Message-oriented transport.
//!
//! A [`Connector`] opens connections; each open connection is represented
//! by a [`Connection`] handle owned by the session runtime and a pump task
//! that reports what happens on the socket as [`TransportSignal`]s tagged
//! with the connection id. Late signals from a discarded connection are
//! recognisable by that id.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use rl_core::error::{RlError, RlResult};

/// Identity of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Lifecycle events of a connection.
///
/// Per connection: one `Open`, any number of `Message`, at most one
/// `Error`, then exactly one `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
    Closed,
}

/// A transport event tagged with the connection it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSignal {
    pub connection: ConnectionId,
    pub event: TransportEvent,
}

impl TransportSignal {
    pub fn new(connection: ConnectionId, event: TransportEvent) -> Self {
        Self { connection, event }
    }
}

/// Handle to an open connection.
///
/// Sending on a closed handle is a logged no-op. Closing is idempotent and
/// also happens on drop, which releases the socket.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

impl Connection {
    /// Wrap the outgoing queue of a pump task.
    pub fn new(id: ConnectionId, outgoing: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            outgoing: Some(outgoing),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.outgoing.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Queue a text frame. Never fails.
    pub fn send(&self, text: String) {
        match &self.outgoing {
            Some(tx) => {
                if tx.send(text).is_err() {
                    debug!("{}: send on finished connection dropped", self.id);
                }
            }
            None => debug!("{}: send on closed connection dropped", self.id),
        }
    }

    /// Close the connection. Subsequent calls do nothing.
    pub fn close(&mut self) {
        if self.outgoing.take().is_some() {
            debug!("{}: closing", self.id);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`. Events for it are sent on `signals`.
    ///
    /// Fails with [`RlError::Connect`] if the peer cannot be reached; in
    /// that case no signals are emitted.
    async fn open(
        &self,
        url: &str,
        connection: ConnectionId,
        signals: mpsc::UnboundedSender<TransportSignal>,
    ) -> RlResult<Connection>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
    headers: HashMap<String, String>,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            headers: HashMap::new(),
        }
    }

    /// Extra headers sent with the upgrade request.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(
        &self,
        url: &str,
        connection: ConnectionId,
        signals: mpsc::UnboundedSender<TransportSignal>,
    ) -> RlResult<Connection> {
        let mut request = url
            .into_client_request()
            .map_err(|e| RlError::Connect(format!("invalid websocket url {url}: {e}")))?;
        for (key, value) in &self.headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                _ => warn!("skipping invalid header {key}"),
            }
        }

        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| RlError::Connect(format!("timed out connecting to {url}")))?
                .map_err(|e| RlError::Connect(format!("{url}: {e}")))?;

        info!("{connection}: websocket open to {url}");

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(connection, stream, outgoing_rx, signals));
        Ok(Connection::new(connection, outgoing_tx))
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Shuttle frames between the socket and the session until either side ends.
async fn pump(
    id: ConnectionId,
    stream: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    signals: mpsc::UnboundedSender<TransportSignal>,
) {
    let (mut sink, mut source) = stream.split();
    let emit = |event| {
        let _ = signals.send(TransportSignal::new(id, event));
    };
    emit(TransportEvent::Open);

    loop {
        tokio::select! {
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => emit(TransportEvent::Message(text.to_string())),
                Some(Ok(Message::Close(frame))) => {
                    debug!("{id}: peer closed: {frame:?}");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("{id}: websocket error: {e}");
                    emit(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
            queued = outgoing.recv() => match queued {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!("{id}: websocket send failed: {e}");
                        emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    emit(TransportEvent::Closed);
    debug!("{id}: pump finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_close_is_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conn = Connection::new(ConnectionId(1), tx);
        assert!(conn.is_open());

        conn.send("a".into());
        conn.close();
        conn.close();
        conn.send("b".into());

        assert!(!conn.is_open());
        assert_eq!(rx.try_recv().unwrap(), "a");
        // The queue is closed once the handle released its sender.
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_drop_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        drop(Connection::new(ConnectionId(2), tx));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_send_to_finished_pump_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(rx);
        let conn = Connection::new(ConnectionId(3), tx);
        assert!(!conn.is_open());
        conn.send("ignored".into());
    }

    #[tokio::test]
    async fn test_ws_connect_refused() {
        let connector = WsConnector::new(Duration::from_secs(2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = connector
            .open("ws://127.0.0.1:9/websocket", ConnectionId(4), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, RlError::Connect(_)));
        assert!(rx.try_recv().is_err());
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportSignal>) -> TransportEvent {
        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a transport signal")
            .expect("signal channel closed");
        signal.event
    }

    async fn local_server() -> (tokio::net::TcpListener, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/websocket", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn test_ws_exchange_then_drop_sends_close() {
        let (listener, url) = local_server().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"msg":"connected"}"#.into())).await.unwrap();
            let mut received = Vec::new();
            while let Some(frame) = ws.next().await {
                match frame.unwrap() {
                    Message::Text(text) => received.push(text.as_str().to_string()),
                    Message::Close(_) => {
                        received.push("<close>".to_string());
                        break;
                    }
                    _ => {}
                }
            }
            received
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = WsConnector::new(Duration::from_secs(5))
            .open(&url, ConnectionId(5), tx)
            .await
            .unwrap();
        assert_eq!(next_event(&mut rx).await, TransportEvent::Open);
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message(r#"{"msg":"connected"}"#.to_string())
        );

        conn.send(r#"{"msg":"ping"}"#.to_string());
        drop(conn);
        assert_eq!(next_event(&mut rx).await, TransportEvent::Closed);
        // Nothing follows Closed; the pump released its sender.
        assert!(rx.recv().await.is_none());

        let received = server.await.unwrap();
        assert_eq!(received, vec![r#"{"msg":"ping"}"#.to_string(), "<close>".to_string()]);
    }

    #[tokio::test]
    async fn test_ws_abrupt_server_drop_reports_error_then_closed() {
        let (listener, url) = local_server().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            // Drop the socket without a closing handshake.
            drop(ws);
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _conn = WsConnector::new(Duration::from_secs(5))
            .open(&url, ConnectionId(6), tx)
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Open);
        assert!(matches!(next_event(&mut rx).await, TransportEvent::Error(_)));
        assert_eq!(next_event(&mut rx).await, TransportEvent::Closed);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(7).to_string(), "conn#7");
    }
}
