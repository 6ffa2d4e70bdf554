//! Server lifecycle and the UDP listener loop.
//!
//! The loop is one background tokio task, the only writer of registry
//! membership. It blocks on the socket for at most the configured listen
//! timeout, routes whatever arrives, then runs one maintenance sweep:
//! event translation, a single action dispatch, and the liveness sweep.
//! Stop is cooperative; the stop flag is polled once per iteration.

use crate::config::ServerConfig;
use crate::dispatch::{self, ActionSink};
use crate::registry::SessionRegistry;
use crate::session::ButtonCode;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use shared::{Packet, MAX_PACKET_SIZE, PROTOCOL_TAG};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Name the advertisement is published and removed under.
pub const SERVICE_NAME: &str = "services.remote-events";

/// Errors fatal to one server run. The host may call `start` again.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("could not bind udp socket on ports {start}..={end}: {source}")]
    Bind {
        start: u16,
        end: u16,
        source: io::Error,
    },
    #[error("socket receive failed: {0}")]
    Receive(io::Error),
}

/// Service-discovery collaborator. `publish` is called once after a
/// successful bind, `remove` on stop.
pub trait Announcer: Send + Sync {
    fn publish(
        &self,
        name: &str,
        protocol_tag: &str,
        device_name: &str,
        port: u16,
        txt: &[(String, String)],
    );
    fn remove(&self, name: &str);
}

/// Announcer that advertises nothing.
pub struct NullAnnouncer;

impl Announcer for NullAnnouncer {
    fn publish(
        &self,
        _name: &str,
        _protocol_tag: &str,
        _device_name: &str,
        _port: u16,
        _txt: &[(String, String)],
    ) {
    }
    fn remove(&self, _name: &str) {}
}

/// Listener-loop lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// State shared between the loop task and host-side callers.
struct Shared {
    registry: Mutex<SessionRegistry>,
    state: AtomicU8,
    stop: AtomicBool,
    /// Deferred settings change, picked up on the next sweep.
    refresh: Mutex<Option<ServerConfig>>,
}

impl Shared {
    fn state(&self) -> LoopState {
        match self.state.load(Ordering::SeqCst) {
            1 => LoopState::Starting,
            2 => LoopState::Running,
            3 => LoopState::Stopping,
            _ => LoopState::Stopped,
        }
    }

    fn set_state(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Read-only view of the server for the host input layer, cloneable into
/// any thread or task.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Current registry size.
    pub fn client_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// First non-zero mapped code for the mapping name, in registry
    /// order.
    pub fn button_code(&self, map_name: &str) -> Option<ButtonCode> {
        self.shared.registry.lock().button_code(map_name)
    }

    /// First valid pointer position, in registry order.
    pub fn mouse_pos(&self) -> Option<(f32, f32)> {
        self.shared.registry.lock().mouse_pos()
    }

    pub fn state(&self) -> LoopState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state() == LoopState::Running
    }
}

/// The remote-events UDP server, owned by the host application.
pub struct EventServer {
    config: ServerConfig,
    shared: Arc<Shared>,
    sink: Arc<dyn ActionSink>,
    announcer: Arc<dyn Announcer>,
    task: Option<JoinHandle<()>>,
}

impl EventServer {
    /// Builds a stopped server. The configuration is sanitized here;
    /// invalid values are clamped with a logged error, never refused.
    pub fn new(
        config: ServerConfig,
        sink: Arc<dyn ActionSink>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        let config = config.sanitized();
        let shared = Arc::new(Shared {
            registry: Mutex::new(SessionRegistry::new(&config)),
            state: AtomicU8::new(LoopState::Stopped as u8),
            stop: AtomicBool::new(false),
            refresh: Mutex::new(None),
        });
        Self {
            config,
            shared,
            sink,
            announcer,
            task: None,
        }
    }

    /// Query-surface handle for other threads and tasks.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Spawns the listener loop. No-op when a run is already under way.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.shared.state() != LoopState::Stopped {
            return;
        }
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.set_state(LoopState::Starting);

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let sink = Arc::clone(&self.sink);
        let announcer = Arc::clone(&self.announcer);
        self.task = Some(tokio::spawn(async move {
            listener_loop(shared, config, sink, announcer).await;
        }));
    }

    /// Removes the advertisement and signals the loop to stop. With
    /// `wait` the call returns only once the loop has exited and the
    /// socket is released.
    pub async fn stop(&mut self, wait: bool) {
        self.announcer.remove(SERVICE_NAME);
        self.shared.stop.store(true, Ordering::SeqCst);
        if wait {
            if let Some(task) = self.task.take() {
                if let Err(e) = task.await {
                    error!("Listener task ended abnormally: {}", e);
                }
            }
        }
    }

    /// Stages a settings change. Live sessions pick it up on the next
    /// maintenance sweep; the bind address and port apply on the next
    /// start.
    pub fn notify_settings_changed(&mut self, config: ServerConfig) {
        let config = config.sanitized();
        *self.shared.refresh.lock() = Some(config.clone());
        self.config = config;
    }

    pub fn client_count(&self) -> usize {
        self.handle().client_count()
    }

    pub fn is_running(&self) -> bool {
        self.handle().is_running()
    }
}

/// Candidate ports for one bind attempt: the configured port plus up to
/// `range - 1` forward probes, truncated at the top of the port space so
/// no port is tried twice.
fn probe_ports(start: u16, range: u16) -> std::ops::RangeInclusive<u16> {
    start..=start.saturating_add(range - 1)
}

/// Binds the configured port, probing forward through the port range when
/// it is taken.
async fn bind_socket(config: &ServerConfig) -> Result<UdpSocket, ServerError> {
    let ip = config.bind_ip();
    let range = config.port_range as u16; // sanitized to 1..=100
    let ports = probe_ports(config.port, range);
    let mut last_err = None;

    for port in ports.clone() {
        match UdpSocket::bind(SocketAddr::new(ip, port)).await {
            Ok(socket) => {
                if port != config.port {
                    warn!("Port {} was taken, bound {} instead", config.port, port);
                }
                return Ok(socket);
            }
            Err(e) => {
                debug!("Bind attempt {}:{} failed: {}", ip, port, e);
                last_err = Some(e);
            }
        }
    }

    Err(ServerError::Bind {
        start: *ports.start(),
        end: *ports.end(),
        source: last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "no ports attempted")),
    })
}

/// Decodes and routes one datagram. Invalid packets are dropped before
/// any session is touched.
fn route_datagram(shared: &Shared, buf: &[u8], addr: SocketAddr) {
    let packet = match Packet::decode(buf) {
        Ok(packet) => packet,
        Err(e) => {
            debug!("Received invalid packet from {}: {}", addr, e);
            return;
        }
    };
    shared.registry.lock().route(packet, addr);
}

/// One maintenance sweep: translate buffered events, dispatch at most one
/// action, then evict dead sessions and apply any pending settings
/// refresh.
fn maintenance_sweep(shared: &Shared, sink: &dyn ActionSink) {
    shared.registry.lock().process_events();
    dispatch::dispatch_next(&shared.registry, sink);
    let refreshed = shared.refresh.lock().take();
    shared.registry.lock().sweep(refreshed.as_ref());
}

/// The Running body: bounded receive, routing, one maintenance sweep per
/// iteration. Returns when stop is requested or the socket fails.
async fn serve(
    shared: &Shared,
    socket: &UdpSocket,
    config: &ServerConfig,
    sink: &dyn ActionSink,
) -> Result<(), ServerError> {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    while !shared.stop.load(Ordering::SeqCst) {
        match tokio::time::timeout(config.listen_timeout(), socket.recv_from(&mut buf)).await {
            // Timeout is not an error, just an empty pass; the sweep
            // below still runs.
            Err(_elapsed) => {}
            Ok(Ok((len, addr))) => route_datagram(shared, &buf[..len], addr),
            Ok(Err(e)) => return Err(ServerError::Receive(e)),
        }

        maintenance_sweep(shared, sink);
    }
    Ok(())
}

/// The listener loop body, driving Starting → Running → Stopping →
/// Stopped. Bind and receive failures are fatal for this run; the host
/// restarts by calling `EventServer::start` again.
async fn listener_loop(
    shared: Arc<Shared>,
    config: ServerConfig,
    sink: Arc<dyn ActionSink>,
    announcer: Arc<dyn Announcer>,
) {
    info!("Starting UDP event server on port {}", config.port);

    // Idempotent cleanup of any prior run's sessions.
    shared.registry.lock().clear();

    let socket = match bind_socket(&config).await {
        Ok(socket) => socket,
        Err(e) => {
            error!("Could not listen on port {}: {}", config.port, e);
            shared.set_state(LoopState::Stopped);
            return;
        }
    };

    let bound_port = socket
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(config.port);
    info!("UDP event server listening on port {}", bound_port);
    announcer.publish(
        SERVICE_NAME,
        PROTOCOL_TAG,
        &config.device_name,
        bound_port,
        &[],
    );

    shared.set_state(LoopState::Running);
    if let Err(e) = serve(&shared, &socket, &config, sink.as_ref()).await {
        error!("Error reading from event socket, stopping server: {}", e);
    }

    shared.set_state(LoopState::Stopping);
    shared.registry.lock().clear();
    drop(socket);
    info!("UDP event server stopped");
    shared.set_state(LoopState::Stopped);
}
