//! HTTPS server: client page, WebSocket signaling, device lifetime
//!
//! Startup order:
//! 1. certificate files are checked (missing material aborts before binding)
//! 2. the virtual camera and microphone are opened once for the whole run
//! 3. the port is bound and `running` is published
//!
//! Shutdown runs the other way: signaling clients are told to leave and
//! their sessions torn down, then the devices close and `stopped` goes out.
//!
//! Each accepted connection is a TLS stream served by hyper with upgrades
//! enabled, routed through axum.

pub mod tls;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tower::Service;

use crate::audio::{AudioSink, CpalAudioOutput};
use crate::config::RelayConfig;
use crate::errors::RelayError;
use crate::session::MediaSinks;
use crate::signaling::{ClientGate, ClientSlot, ClientTracker, InboundMessage, SignalingEndpoint};
use crate::status::{ServerStatus, StatusNotifier};
use crate::video;
use crate::webrtc::{PeerFactory, WebRtcPeerFactory};

/// Grace period for open connections after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Outbound signaling frames buffered per client
const OUTBOUND_BUFFER: usize = 16;

#[derive(Clone)]
pub struct AppState {
    endpoint: Arc<SignalingEndpoint>,
    gate: ClientGate,
    clients: ClientTracker,
    static_dir: PathBuf,
}

pub struct RelayServer {
    config: RelayConfig,
    factory: Arc<dyn PeerFactory>,
    notifier: StatusNotifier,
    gate: ClientGate,
}

impl RelayServer {
    pub fn new(config: RelayConfig, notifier: StatusNotifier) -> Self {
        let factory = Arc::new(WebRtcPeerFactory::new(&config.webrtc, &config.audio));
        Self::with_factory(config, factory, notifier)
    }

    pub fn with_factory(config: RelayConfig, factory: Arc<dyn PeerFactory>, notifier: StatusNotifier) -> Self {
        Self {
            config,
            factory,
            notifier,
            gate: ClientGate::new(),
        }
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), RelayError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            log::info!("Shutdown requested");
        })
        .await
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send,
    {
        let tls_config = tls::load_server_config(&self.config.tls)?;
        let acceptor = TlsAcceptor::from(tls_config);

        let sinks = open_sinks(&self.config).await;
        log_banner(&self.config, &sinks);

        let addr = SocketAddr::new(self.config.server.bind_address, self.config.connection.port);
        let listener = TcpListener::bind(addr).await?;
        log::info!("Listening on {}", addr);

        let endpoint = SignalingEndpoint::new(self.factory.clone(), sinks.clone(), self.notifier.clone());
        let state = AppState::new(endpoint, self.gate.clone(), self.config.server.static_dir.clone());
        let app = router(state.clone());

        self.notifier.notify(ServerStatus::Running, None);

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            log::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    connections.spawn(serve_connection(stream, remote, acceptor.clone(), app.clone()));
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        drop(listener);
        stop(&state, connections, sinks, &self.notifier).await;
        log::info!("Server stopped");
        Ok(())
    }
}

/// Orderly stop: signaling clients leave and their sessions are torn down
/// before the devices close and `stopped` is published.
async fn stop(state: &AppState, mut connections: JoinSet<()>, sinks: MediaSinks, notifier: &StatusNotifier) {
    state.gate.close();
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;

    if tokio::time::timeout_at(deadline, state.clients.wait_idle()).await.is_err() {
        log::warn!(
            "{} signaling client(s) still open after {:?}",
            state.clients.active(),
            SHUTDOWN_GRACE
        );
    }

    let drained = tokio::time::timeout_at(deadline, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        log::warn!("Connections still open after {:?}, aborting them", SHUTDOWN_GRACE);
        connections.shutdown().await;
    }

    close_sinks(sinks).await;
    notifier.notify(ServerStatus::Stopped, None);
}

/// Routes: `/` client page, `/ws` signaling
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

impl AppState {
    pub fn new(endpoint: SignalingEndpoint, gate: ClientGate, static_dir: PathBuf) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            gate,
            clients: ClientTracker::new(),
            static_dir,
        }
    }
}

async fn serve_connection(stream: tokio::net::TcpStream, remote: SocketAddr, acceptor: TlsAcceptor, app: Router) {
    let tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(e) => {
            // Browsers drop the first attempt while the user accepts a self-signed cert
            log::debug!("TLS handshake with {} failed: {}", remote, e);
            return;
        }
    };

    let service = hyper::service::service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(remote));
        app.clone().call(request)
    });

    if let Err(e) = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(tls), service)
        .with_upgrades()
        .await
    {
        log::debug!("Connection from {} ended with error: {}", remote, e);
    }
}

async fn index(State(state): State<AppState>) -> Response {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            log::warn!("Client page {} unavailable: {}", path.display(), e);
            (StatusCode::NOT_FOUND, "client page not found").into_response()
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Response {
    // Taken before the upgrade so shutdown also waits for clients still upgrading
    let slot = state.clients.register();
    ws.on_upgrade(move |socket| serve_socket(socket, state, remote, slot))
}

async fn serve_socket(socket: WebSocket, state: AppState, remote: SocketAddr, slot: ClientSlot) {
    log::info!("Signaling client connected from {}", remote);

    let (mut ws_tx, ws_rx) = socket.split();
    let inbound = ws_rx.map(|frame| match frame {
        Ok(Message::Text(text)) => InboundMessage::Text(text),
        Ok(Message::Close(_)) => InboundMessage::Close,
        Ok(_) => InboundMessage::Other,
        Err(e) => InboundMessage::Error(e.to_string()),
    });

    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    run_client(&state, inbound, out_tx).await;
    let _ = writer.await;
    log::info!("Signaling client {} disconnected", remote);
    drop(slot);
}

/// Admit one client and run its signaling loop to the end
async fn run_client<S>(state: &AppState, inbound: S, outbound: mpsc::Sender<String>)
where
    S: futures::Stream<Item = InboundMessage> + Unpin + Send,
{
    let preempted = state.gate.admit();
    state.endpoint.run(inbound, outbound, preempted).await;
}

/// Open both sinks; a failure leaves that sink inactive
async fn open_sinks(config: &RelayConfig) -> MediaSinks {
    let camera = video::open_shared(&config.video);

    let audio_config = config.audio.clone();
    let audio = match tokio::task::spawn_blocking(move || CpalAudioOutput::open(&audio_config)).await {
        Ok(Ok(output)) => {
            if !output.matched_hint() {
                log::warn!(
                    "Audio output '{}' is not the virtual cable ('{}')",
                    output.name(),
                    config.audio.device_hint
                );
            }
            Some(Arc::new(output) as Arc<dyn AudioSink>)
        }
        Ok(Err(e)) => {
            log::warn!("Virtual microphone unavailable, audio will be discarded: {}", e);
            None
        }
        Err(e) => {
            log::warn!("Audio output open task failed: {}", e);
            None
        }
    };

    MediaSinks {
        camera,
        audio,
        audio_channels: config.audio.channels,
        queue_capacity: config.audio.queue_capacity,
    }
}

async fn close_sinks(sinks: MediaSinks) {
    if let Some(mut camera) = sinks.camera.lock().await.take() {
        camera.close();
    }
    if let Some(audio) = sinks.audio {
        let _ = tokio::task::spawn_blocking(move || audio.close()).await;
    }
}

fn log_banner(config: &RelayConfig, sinks: &MediaSinks) {
    let camera = match sinks.camera.try_lock() {
        Ok(guard) => match guard.as_ref() {
            Some(camera) => {
                let (width, height) = camera.resolution();
                format!("{} ({}x{} @ {} fps)", camera.name(), width, height, camera.fps())
            }
            None => "inactive".to_string(),
        },
        Err(_) => "busy".to_string(),
    };
    let microphone = match &sinks.audio {
        Some(audio) => format!(
            "{} ({} Hz, {} ch)",
            audio.name(),
            config.audio.sample_rate,
            config.audio.channels
        ),
        None => "inactive".to_string(),
    };

    log::info!("relaycam {}", crate::VERSION);
    log::info!("  Open on the headset: {}", config.advertised_url());
    log::info!("  Virtual camera:      {}", camera);
    log::info!("  Virtual microphone:  {}", microphone);
}
