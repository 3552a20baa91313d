//! Socket server implementation for the launcher daemon.
//!
//! Two TCP endpoints: the status channel, where subscribers receive launcher
//! broadcasts, and the command channel, where clients send requests and get
//! routed replies. A socket loop dispatches peer events, a poll loop drives
//! the supervisor and publisher, and the controller tears both down on
//! SIGINT/SIGTERM.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mklauncher_core::{ImportanceStore, LauncherRecord, NodeConfig, ProcessSupervisor, ServerSettings};
use mklauncher_rpc::{
    COMMAND_SERVICE_TYPE, Container, LAUNCHER_TOPIC, Multipart, MultipartCodec,
    STATUS_SERVICE_TYPE, ServiceDescriptor, Subscription, broadcast_message, split_envelope,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::announcer::{ServiceAnnouncer, announce_host, service_name};
use crate::error::Result;
use crate::handlers::{HandlerContext, handle_frame};
use crate::publisher::StatusPublisher;
use crate::session::{Channel, PeerEvent, PeerId, StatusPeer};
use crate::shutdown::SystemShutdown;

/// Interval between checks while waiting for children at shutdown
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the daemon needs to start
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Directory trees scanned for `launcher.ini`
    pub directories: Vec<PathBuf>,
    /// Base service name
    pub name: String,
    /// Announce `name` without the hostname suffix
    pub suppress_host: bool,
    pub node: NodeConfig,
    pub settings: ServerSettings,
    pub importance_file: PathBuf,
    /// Status endpoint port, 0 for any free port
    pub status_port: u16,
    /// Command endpoint port, 0 for any free port
    pub command_port: u16,
}

pub struct DaemonState {
    pub records: Vec<LauncherRecord>,
    pub supervisor: ProcessSupervisor,
    pub importance: ImportanceStore,
    pub publisher: StatusPublisher,
    pub status_peers: HashMap<PeerId, StatusPeer>,
    pub command_peers: HashMap<PeerId, mpsc::UnboundedSender<Multipart>>,
    shutdown: Arc<dyn SystemShutdown>,
}

impl DaemonState {
    #[must_use]
    pub fn new(
        records: Vec<LauncherRecord>,
        importance: ImportanceStore,
        settings: &ServerSettings,
        shutdown: Arc<dyn SystemShutdown>,
    ) -> Self {
        Self {
            records,
            supervisor: ProcessSupervisor::new(),
            importance,
            publisher: StatusPublisher::new(settings),
            status_peers: HashMap::new(),
            command_peers: HashMap::new(),
            shutdown,
        }
    }

    pub fn create_handler_context(&mut self) -> HandlerContext<'_> {
        HandlerContext {
            records: &mut self.records,
            supervisor: &mut self.supervisor,
            importance: &mut self.importance,
            shutdown: self.shutdown.as_ref(),
        }
    }

    /// One poll tick: collect process state, then publish what changed.
    pub fn poll(&mut self) {
        self.supervisor.poll(&mut self.records);
        let messages = self.publisher.tick(&self.records);
        for container in &messages {
            self.broadcast(LAUNCHER_TOPIC, container);
        }
    }

    /// Send a broadcast to every subscriber of `topic`.
    pub fn broadcast(&self, topic: &str, container: &Container) {
        let message = match broadcast_message(topic, container) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to encode {} broadcast: {e}", container.kind);
                return;
            }
        };
        for (peer, subscriber) in &self.status_peers {
            if subscriber.wants(topic) && subscriber.sender.send(message.clone()).is_err() {
                trace!("[{peer}] subscriber gone");
            }
        }
    }

    fn subscribe(&mut self, peer: &PeerId, topic: String) {
        let Some(subscriber) = self.status_peers.get_mut(peer) else {
            return;
        };
        debug!("[{peer}] subscribe '{topic}'");
        self.publisher.subscribe(&topic);
        subscriber.topics.insert(topic);
    }

    fn unsubscribe(&mut self, peer: &PeerId, topic: &str) {
        let Some(subscriber) = self.status_peers.get_mut(peer) else {
            return;
        };
        if subscriber.topics.remove(topic) {
            debug!("[{peer}] unsubscribe '{topic}'");
            self.release_topic(topic);
        }
    }

    /// Tell the publisher once nobody is subscribed to `topic` anymore.
    fn release_topic(&mut self, topic: &str) {
        if !self.status_peers.values().any(|p| p.topics.contains(topic)) {
            self.publisher.unsubscribe(topic);
        }
    }

    fn remove_peer(&mut self, peer: &PeerId, channel: Channel) {
        match channel {
            Channel::Status => {
                if let Some(subscriber) = self.status_peers.remove(peer) {
                    for topic in &subscriber.topics {
                        self.release_topic(topic);
                    }
                }
            }
            Channel::Command => {
                self.command_peers.remove(peer);
            }
        }
    }

    /// Route a reply to the peer named by the first identity frame.
    fn route_reply(&self, identity: &[bytes::Bytes], reply: &Container) {
        let Some((first, hops)) = identity.split_first() else {
            return;
        };
        let peer = PeerId::from_frame(first);
        let Some(sender) = self.command_peers.get(&peer) else {
            debug!("[{peer}] reply dropped, peer gone");
            return;
        };

        let envelope = match mklauncher_rpc::encode_container(reply) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Failed to encode reply: {e}");
                return;
            }
        };
        let mut frames = hops.to_vec();
        frames.push(envelope);
        if sender.send(frames).is_err() {
            debug!("[{peer}] reply dropped, connection closing");
        }
    }
}

/// A running daemon
pub struct Daemon {
    state: Arc<Mutex<DaemonState>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    status_addr: SocketAddr,
    command_addr: SocketAddr,
    announcer: Box<dyn ServiceAnnouncer>,
    shutdown_timeout: Duration,
}

impl Daemon {
    /// Scan the catalog, bind both endpoints, announce them and start the loops.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or importance file is invalid, a port
    /// cannot be bound or the announcement fails.
    pub async fn start(
        config: DaemonConfig,
        mut announcer: Box<dyn ServiceAnnouncer>,
        shutdown: Arc<dyn SystemShutdown>,
    ) -> Result<Self> {
        config.settings.validate()?;

        let mut records = mklauncher_core::scan(&config.directories)?;
        let importance = ImportanceStore::load(&config.importance_file)?;
        importance.apply(&mut records);

        let bind_host = config.node.bind_host();
        let status_listener = TcpListener::bind((bind_host, config.status_port)).await?;
        let command_listener = TcpListener::bind((bind_host, config.command_port)).await?;
        let status_addr = status_listener.local_addr()?;
        let command_addr = command_listener.local_addr()?;
        info!("Status channel listening on {status_addr}");
        info!("Command channel listening on {command_addr}");

        // Announce before any loop runs so a failure leaves nothing behind
        let name = service_name(&config.name, config.suppress_host);
        let host = announce_host(bind_host);
        for (kind, addr) in [
            (STATUS_SERVICE_TYPE, status_addr),
            (COMMAND_SERVICE_TYPE, command_addr),
        ] {
            let published = announcer.publish(&ServiceDescriptor {
                name: name.clone(),
                kind: kind.to_string(),
                uuid: config.node.uuid.clone(),
                address: format!("tcp://{host}:{}", addr.port()),
                port: addr.port(),
            });
            if let Err(e) = published {
                if let Err(withdraw) = announcer.unpublish() {
                    warn!("Failed to withdraw announcements: {withdraw}");
                }
                return Err(e.into());
            }
        }

        let state = Arc::new(Mutex::new(DaemonState::new(
            records,
            importance,
            &config.settings,
            shutdown,
        )));
        let cancel = CancellationToken::new();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let listeners = Listeners {
            status: status_listener,
            command: command_listener,
        };

        let tasks = vec![
            tokio::spawn(socket_loop(
                state.clone(),
                listeners,
                events_tx,
                events_rx,
                cancel.clone(),
            )),
            tokio::spawn(poll_loop(
                state.clone(),
                config.settings.poll_interval,
                cancel.clone(),
            )),
        ];

        Ok(Self {
            state,
            cancel,
            tasks,
            status_addr,
            command_addr,
            announcer,
            shutdown_timeout: config.settings.shutdown_timeout,
        })
    }

    #[must_use]
    pub fn status_addr(&self) -> SocketAddr {
        self.status_addr
    }

    #[must_use]
    pub fn command_addr(&self) -> SocketAddr {
        self.command_addr
    }

    #[must_use]
    pub fn state(&self) -> Arc<Mutex<DaemonState>> {
        self.state.clone()
    }

    /// Ordered teardown: terminate children, stop both loops, withdraw announcements.
    ///
    /// # Errors
    ///
    /// Currently infallible; failures during teardown are logged.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down");
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.supervisor.terminate_all(&mut state.records);
        }

        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let loops = futures_util::future::join_all(self.tasks.drain(..));
        if tokio::time::timeout_at(deadline, loops).await.is_err() {
            warn!(
                "Loops did not stop within {:?}, continuing teardown",
                self.shutdown_timeout
            );
        }

        // Give terminated children the rest of the budget to exit
        while tokio::time::Instant::now() < deadline {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.supervisor.poll(&mut state.records);
            if state.supervisor.running_count() == 0 {
                break;
            }
            drop(guard);
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        if let Err(e) = self.announcer.unpublish() {
            warn!("Failed to withdraw service announcements: {e}");
        }
        info!("Daemon stopped");
        Ok(())
    }
}

/// Run the daemon until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if startup fails or signal handlers cannot be installed.
pub async fn run(
    config: DaemonConfig,
    announcer: Box<dyn ServiceAnnouncer>,
    shutdown: Arc<dyn SystemShutdown>,
) -> Result<()> {
    let daemon = Daemon::start(config, announcer, shutdown).await?;
    info!("Ready to accept connections");

    wait_for_signal().await?;
    daemon.shutdown().await
}

async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received SIGINT");
        }
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

struct Listeners {
    status: TcpListener,
    command: TcpListener,
}

async fn socket_loop(
    state: Arc<Mutex<DaemonState>>,
    listeners: Listeners,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    mut events_rx: mpsc::UnboundedReceiver<PeerEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listeners.status.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("Accepted status connection from {addr}");
                    spawn_peer(Channel::Status, stream, events_tx.clone(), cancel.clone());
                }
                Err(e) => error!("Status accept error: {e}"),
            },
            accepted = listeners.command.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("Accepted command connection from {addr}");
                    spawn_peer(Channel::Command, stream, events_tx.clone(), cancel.clone());
                }
                Err(e) => error!("Command accept error: {e}"),
            },
            Some(event) = events_rx.recv() => handle_event(&state, event).await,
        }
    }
    debug!("Socket loop stopped");
}

async fn handle_event(state: &Arc<Mutex<DaemonState>>, event: PeerEvent) {
    match event {
        PeerEvent::Connected {
            peer,
            channel,
            sender,
        } => {
            let mut guard = state.lock().await;
            match channel {
                Channel::Status => {
                    guard.status_peers.insert(peer, StatusPeer::new(sender));
                }
                Channel::Command => {
                    guard.command_peers.insert(peer, sender);
                }
            }
        }
        PeerEvent::Message {
            peer,
            channel: Channel::Status,
            frames,
        } => {
            let [frame] = frames.as_slice() else {
                debug!("[{peer}] ignoring {}-frame status message", frames.len());
                return;
            };
            let mut guard = state.lock().await;
            match Subscription::parse(frame) {
                Some(Subscription::Subscribe(topic)) => guard.subscribe(&peer, topic),
                Some(Subscription::Unsubscribe(topic)) => guard.unsubscribe(&peer, &topic),
                None => debug!("[{peer}] ignoring non-subscription status message"),
            }
        }
        PeerEvent::Message {
            peer,
            channel: Channel::Command,
            frames,
        } => {
            if frames.is_empty() {
                return;
            }
            let mut routed = Vec::with_capacity(frames.len() + 1);
            routed.push(peer.to_frame());
            routed.extend(frames);
            let Some((identity, envelope)) = split_envelope(routed) else {
                return;
            };

            let mut guard = state.lock().await;
            let reply = handle_frame(&mut guard.create_handler_context(), &envelope);
            if let Some(reply) = reply {
                guard.route_reply(&identity, &reply);
            }
        }
        PeerEvent::Disconnected { peer, channel } => {
            debug!("[{peer}] disconnected");
            state.lock().await.remove_peer(&peer, channel);
        }
    }
}

fn spawn_peer(
    channel: Channel,
    stream: TcpStream,
    events: mpsc::UnboundedSender<PeerEvent>,
    cancel: CancellationToken,
) {
    let peer = PeerId::new();
    let (mut sink, mut frames) = Framed::new(stream, MultipartCodec::new()).split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Multipart>();

    if events
        .send(PeerEvent::Connected {
            peer: peer.clone(),
            channel,
            sender: tx,
        })
        .is_err()
    {
        return;
    }

    let peer_clone = peer.clone();
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                warn!("[{peer_clone}] send failed: {e}");
                break;
            }
        }
        trace!("[{peer_clone}] send task ended");
    });

    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                next = frames.next() => match next {
                    Some(Ok(message)) => {
                        let event = PeerEvent::Message {
                            peer: peer.clone(),
                            channel,
                            frames: message,
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("[{peer}] read error: {e}");
                        break;
                    }
                    None => break,
                },
            }
        }
        let _ = events.send(PeerEvent::Disconnected { peer, channel });
        send_task.abort();
    });
}

async fn poll_loop(state: Arc<Mutex<DaemonState>>, poll_interval: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => state.lock().await.poll(),
        }
    }
    debug!("Poll loop stopped");
}
