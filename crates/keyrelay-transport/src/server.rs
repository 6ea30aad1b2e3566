//! HTTP + WebSocket transport server.
//!
//! One TCP listener serves both surfaces. Every plain HTTP request is a
//! signal dispatch handed to the `RelayHandler`. WebSocket upgrades are
//! accepted only on the listen path; an upgrade to any other path aborts the
//! connection before a single byte is written back.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, Request, Response, StatusCode, Uri, header},
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use hyper::{body::Incoming, server::conn::http1};
use hyper_util::rt::TokioIo;
use keyrelay_protocol::{DispatchError, KeyboardId};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::ConnectionHandle;
use crate::config::TransportConfig;

/// Implemented by the relay server; the transport calls it for every
/// registration, disconnect and signal request.
pub trait RelayHandler: Send + Sync + 'static {
    /// Associate `keyboard` with `handle`, replacing any previous association.
    fn register(&self, keyboard: KeyboardId, handle: ConnectionHandle);

    /// The connection has closed; forget every keyboard still pointing at it.
    fn disconnect(&self, connection_id: Uuid);

    /// Route one signal request. `body` is the complete request body.
    fn dispatch(&self, path: &str, body: &[u8]) -> Result<(), DispatchError>;
}

/// Errors raised while starting the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid listen address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Returned from the connection service to make hyper drop the socket
/// without writing a response.
#[derive(Debug, Error)]
#[error("websocket upgrade rejected for {0}")]
struct RejectedUpgrade(String);

/// Shared state for the axum handlers.
struct AppState<H: RelayHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    shutdown: watch::Receiver<bool>,
    /// HTTP connections and upgraded sockets still running
    tracker: TaskTracker,
}

/// The two routers a request can land in, chosen per request.
struct Routes {
    listen_path: String,
    listen: Router,
    relay: Router,
}

/// Idempotent trigger for a graceful shutdown. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Stop accepting connections and close open ones.
    ///
    /// Returns `true` for the call that initiated the shutdown and `false`
    /// for every later call, which does nothing.
    pub fn shutdown(&self) -> bool {
        let initiated = self.tx.send_if_modified(|stopping| {
            if *stopping {
                false
            } else {
                *stopping = true;
                true
            }
        });
        if initiated {
            info!("Relay shutting down");
        }
        initiated
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The transport server: accept loop plus shutdown control.
pub struct TransportServer {
    shutdown: ShutdownHandle,
    /// Accept loop task
    handle: Option<tokio::task::JoinHandle<()>>,
    tracker: TaskTracker,
    shutdown_grace: std::time::Duration,
    /// Actual bound address
    local_addr: SocketAddr,
}

impl TransportServer {
    /// Bind the configured address and start serving with `handler`.
    pub async fn start<H: RelayHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tracker = TaskTracker::new();

        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
            shutdown: shutdown_rx.clone(),
            tracker: tracker.clone(),
        });

        let routes = Arc::new(Routes {
            listen_path: config.listen_path.clone(),
            listen: Router::new()
                .route(&config.listen_path, get(ws_upgrade_handler::<H>))
                .with_state(state.clone()),
            relay: Router::new()
                .fallback(dispatch_handler::<H>)
                .layer(TraceLayer::new_for_http())
                .with_state(state),
        });

        let addr = config.listen.to_string();
        let listener = TcpListener::bind((config.listen.host.as_str(), config.listen.port))
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!(
            "Relay listening on http://{local_addr} (keyboards connect to ws://{local_addr}{})",
            config.listen_path
        );

        let handle = tokio::spawn(accept_loop(listener, routes, tracker.clone(), shutdown_rx));

        Ok(Self {
            shutdown: ShutdownHandle {
                tx: Arc::new(shutdown_tx),
            },
            handle: Some(handle),
            tracker,
            shutdown_grace: config.shutdown_grace,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// A handle that can trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// See [`ShutdownHandle::shutdown`].
    pub fn shutdown(&self) -> bool {
        self.shutdown.shutdown()
    }

    /// Wait for the accept loop to exit (after a shutdown has been requested),
    /// then give open connections up to the configured grace period to send
    /// their close frames and unregister.
    pub async fn wait(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = handle.await {
            error!("Accept loop task failed: {e}");
        }

        self.tracker.close();
        if tokio::time::timeout(self.shutdown_grace, self.tracker.wait()).await.is_err() {
            warn!(
                "{} connection(s) still open after {:?}",
                self.tracker.len(),
                self.shutdown_grace
            );
        }
    }

    /// Shut down and wait for the accept loop. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.shutdown();
        self.wait().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accept loop
// ─────────────────────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    routes: Arc<Routes>,
    tracker: TaskTracker,
    mut shutdown: watch::Receiver<bool>,
) {
    let conn_shutdown = shutdown.clone();

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracker.spawn(serve_connection(stream, peer, routes.clone(), conn_shutdown.clone()));
                }
                Err(e) => warn!("Accept failed: {e}"),
            },
        }
    }

    drop(listener);
    info!("Relay listener closed");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    routes: Arc<Routes>,
    mut shutdown: watch::Receiver<bool>,
) {
    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
        let routes = routes.clone();
        async move { routes.route(req).await }
    });

    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!("Connection from {peer} ended: {e}");
            }
        }
        _ = stopped(&mut shutdown) => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                debug!("Connection from {peer} ended during shutdown: {e}");
            }
        }
    }
}

impl Routes {
    async fn route(&self, req: Request<Incoming>) -> Result<Response<Body>, RejectedUpgrade> {
        let router = if is_upgrade_request(req.headers()) {
            let path = req.uri().path();
            if path != self.listen_path {
                debug!("Rejected websocket upgrade to {path}");
                return Err(RejectedUpgrade(path.to_owned()));
            }
            self.listen.clone()
        } else {
            self.relay.clone()
        };

        match router.oneshot(req).await {
            Ok(response) => Ok(response),
            Err(never) => match never {},
        }
    }
}

/// Resolves once shutdown is requested, or the server is dropped.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

/// `Connection: upgrade` together with an `Upgrade` header.
fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    connection_upgrade && headers.contains_key(header::UPGRADE)
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn dispatch_handler<H: RelayHandler>(
    State(state): State<Arc<AppState<H>>>,
    uri: Uri,
    body: Bytes,
) -> Response<Body> {
    match state.handler.dispatch(uri.path(), &body) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            debug!("Dispatch to {} refused: {e}", uri.path());
            (state.config.error_status.status_for(&e), e.to_string()).into_response()
        }
    }
}

async fn ws_upgrade_handler<H: RelayHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    // Taken before the HTTP connection task hands the socket over
    let token = state.tracker.token();
    ws.on_upgrade(move |socket| async move {
        handle_ws_connection(socket, state).await;
        drop(token);
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection<H: RelayHandler>(socket: WebSocket, state: Arc<AppState<H>>) {
    let (handle, mut outbound_rx) = ConnectionHandle::channel(state.config.outbound_queue);
    let connection_id = handle.id();
    info!("New listen connection: {connection_id}");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    // Every text frame is the connection's (new) keyboard id
                    Some(Ok(Message::Text(text))) => match KeyboardId::parse(text.as_str()) {
                        Ok(keyboard) => state.handler.register(keyboard, handle.clone()),
                        Err(e) => warn!("Ignoring registration from {connection_id}: {e}"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Listen connection closed by peer: {connection_id}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {connection_id}: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            outbound = outbound_rx.recv() => {
                let Some(text) = outbound else { break };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    error!("Failed to relay to {connection_id}: {e}");
                    break;
                }
            }

            _ = stopped(&mut shutdown) => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // Later pushes must see a closed queue, not vanish into it
    outbound_rx.close();
    state.handler.disconnect(connection_id);
    info!("Listen connection closed: {connection_id}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn detects_websocket_upgrade() {
        let map = headers(&[
            (header::CONNECTION, "Upgrade"),
            (header::UPGRADE, "websocket"),
        ]);
        assert!(is_upgrade_request(&map));
    }

    #[test]
    fn detects_upgrade_in_token_list() {
        let map = headers(&[
            (header::CONNECTION, "keep-alive, Upgrade"),
            (header::UPGRADE, "websocket"),
        ]);
        assert!(is_upgrade_request(&map));
    }

    #[test]
    fn plain_requests_are_not_upgrades() {
        assert!(!is_upgrade_request(&HeaderMap::new()));
        assert!(!is_upgrade_request(&headers(&[(header::CONNECTION, "keep-alive")])));
        assert!(!is_upgrade_request(&headers(&[(header::UPGRADE, "websocket")])));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (tx, rx) = watch::channel(false);
        let handle = ShutdownHandle { tx: Arc::new(tx) };

        assert!(!handle.is_shutdown());
        assert!(handle.shutdown());
        assert!(!handle.shutdown());
        assert!(!handle.clone().shutdown());
        assert!(handle.is_shutdown());
        assert!(*rx.borrow());
    }
}
