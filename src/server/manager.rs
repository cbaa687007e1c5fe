// src/server/manager.rs

//! The connection manager: accepts sockets, drives handshakes, keeps the
//! live-connection set keyed by device identity, dispatches inbound frames
//! to typed handlers and performs graceful shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::connection::{DeviceLink, handshake};
use crate::core::FleetError;
use crate::core::device::{DeviceId, DeviceState};
use crate::core::events::{EventArg, NotificationBus, TOPIC_DEVICE_OFFLINE, TOPIC_DEVICE_ONLINE};
use crate::core::protocol::{Denied, Frame, MessageType, Pong};
use crate::core::registry::DeviceRegistry;
use crate::server::stream::AnyStream;

const MODE_RUNNING: u8 = 0;
const MODE_SHUTTING_DOWN: u8 = 1;

/// Handler invoked for one inbound frame on an established connection.
/// Errors are logged and never terminate the connection by themselves.
pub type FrameHandler = Arc<
    dyn Fn(Frame, Arc<DeviceLink<AnyStream>>) -> BoxFuture<'static, Result<(), FleetError>>
        + Send
        + Sync,
>;

struct LiveConn {
    link: Arc<DeviceLink<AnyStream>>,
    kill_tx: broadcast::Sender<()>,
}

pub struct ConnectionManager {
    registry: Arc<dyn DeviceRegistry>,
    bus: Arc<NotificationBus>,
    conns: RwLock<HashMap<DeviceId, LiveConn>>,
    handlers: HashMap<MessageType, FrameHandler>,
    mode: AtomicU8,
    shutdown_tx: broadcast::Sender<()>,
    accepting: AtomicBool,
    accept_closed_tx: watch::Sender<bool>,
    accept_closed_rx: watch::Receiver<bool>,
    handshake_timeout: Duration,
    idle_window: Duration,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        bus: Arc<NotificationBus>,
        handshake_timeout: Duration,
        idle_window: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (accept_closed_tx, accept_closed_rx) = watch::channel(false);

        let mut handlers: HashMap<MessageType, FrameHandler> = HashMap::new();
        handlers.insert(MessageType::Pong, Arc::new(handle_pong));
        handlers.insert(MessageType::Denied, Arc::new(handle_denied));

        Self {
            registry,
            bus,
            conns: RwLock::new(HashMap::new()),
            handlers,
            mode: AtomicU8::new(MODE_RUNNING),
            shutdown_tx,
            accepting: AtomicBool::new(false),
            accept_closed_tx,
            accept_closed_rx,
            handshake_timeout,
            idle_window,
        }
    }

    /// Replaces or adds the handler for one message type. Must be called
    /// before [`serve`](Self::serve).
    pub fn register_handler(&mut self, msg_type: MessageType, handler: FrameHandler) {
        self.handlers.insert(msg_type, handler);
    }

    pub fn live_connections(&self) -> usize {
        self.conns.read().len()
    }

    pub fn is_connected(&self, id: DeviceId) -> bool {
        self.conns.read().contains_key(&id)
    }

    fn is_shutting_down(&self) -> bool {
        self.mode.load(Ordering::Relaxed) == MODE_SHUTTING_DOWN
    }

    /// The accept loop. Sockets are admitted serially: TLS accept and the
    /// protocol handshake each run under the handshake deadline before the
    /// next socket is taken. Runs until [`shutdown`](Self::shutdown).
    pub async fn serve(self: Arc<Self>, listener: TcpListener, acceptor: Option<TlsAcceptor>) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, tls = acceptor.is_some(), "device listener ready");
        }
        self.accepting.store(true, Ordering::Relaxed);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut read_tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("stopping accept loop");
                    break;
                }

                Some(res) = read_tasks.join_next(), if !read_tasks.is_empty() => {
                    if let Err(e) = res {
                        if e.is_panic() {
                            error!("a connection read loop panicked: {e:?}");
                        }
                    }
                }

                res = listener.accept() => {
                    match res {
                        Ok((socket, peer)) => {
                            self.clone().admit(socket, peer, acceptor.clone(), &mut read_tasks).await;
                        }
                        Err(e) => error!(error = %e, "accepting connection"),
                    }
                }
            }
        }

        // Close the listener before confirming, so no new work is admitted
        // once shutdown observes the flag.
        drop(listener);
        let _ = self.accept_closed_tx.send(true);
        read_tasks.shutdown().await;
        info!("accept loop stopped");
    }

    async fn admit(
        self: Arc<Self>,
        socket: TcpStream,
        peer: SocketAddr,
        acceptor: Option<TlsAcceptor>,
        read_tasks: &mut JoinSet<()>,
    ) {
        let stream = match acceptor {
            Some(acceptor) => match timeout(self.handshake_timeout, acceptor.accept(socket)).await
            {
                Ok(Ok(tls)) => AnyStream::Tls(Box::new(tls)),
                Ok(Err(e)) => {
                    warn!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    warn!(%peer, "TLS handshake timed out");
                    return;
                }
            },
            None => AnyStream::Plain(socket),
        };

        let mut link = DeviceLink::new(stream, peer, self.idle_window);
        if let Err(e) = handshake(&mut link, self.registry.as_ref(), self.handshake_timeout).await
        {
            let soft = !e.is_permanent();
            warn!(%peer, error = %e, soft, "handshake rejected");
            if let Err(deny_err) = link.deny(&e.to_string(), soft).await {
                debug!(%peer, error = %deny_err, "error denying connection");
            }
            return;
        }

        self.register(link, read_tasks).await;
    }

    /// Registers a handshaked link, closing any pre-existing connection for
    /// the same device first: at most one live connection per device.
    async fn register(self: Arc<Self>, link: DeviceLink<AnyStream>, read_tasks: &mut JoinSet<()>) {
        let device = link.device().clone();
        let id = match device.id {
            Some(id) => id,
            None => {
                error!(peer = %link.peer(), "refusing to register a device without a numeric id");
                return;
            }
        };

        let prior = self.conns.write().remove(&id);
        if let Some(old) = prior {
            warn!(device_id = %id, "connection exists, closing it");
            let _ = old.kill_tx.send(());
            if let Err(e) = old.link.close().await {
                debug!(device_id = %id, error = %e, "closing replaced connection");
            }
        }

        let link = Arc::new(link);
        let (kill_tx, kill_rx) = broadcast::channel(1);
        self.conns.write().insert(
            id,
            LiveConn {
                link: link.clone(),
                kill_tx,
            },
        );

        info!(device_id = %id, device_uuid = %device.uuid, peer = %link.peer(), "device online");
        self.bus
            .publish(TOPIC_DEVICE_ONLINE, &[EventArg::Device(device)]);

        let manager = self.clone();
        read_tasks.spawn(async move {
            manager.read_loop(link, kill_rx).await;
        });
    }

    /// Receives frames until the connection dies or is killed, dispatching
    /// each by message type. A kill signal means another party (replacement
    /// or shutdown) already owns the bookkeeping, so removal is skipped.
    async fn read_loop(
        self: Arc<Self>,
        link: Arc<DeviceLink<AnyStream>>,
        mut kill_rx: broadcast::Receiver<()>,
    ) {
        let device_id = link.device().id;
        loop {
            tokio::select! {
                biased;

                _ = kill_rx.recv() => {
                    debug!(?device_id, "read loop killed");
                    return;
                }

                res = link.receive() => match res {
                    Ok(frame) => self.dispatch(frame, &link).await,
                    Err(e) => {
                        debug!(?device_id, error = %e, "reading frame");
                        // During shutdown the central drain owns removal;
                        // doing it here too would double-bookkeep.
                        if !self.is_shutting_down() {
                            self.remove_connection(&link).await;
                        }
                        return;
                    }
                }
            }
        }
    }

    async fn dispatch(&self, frame: Frame, link: &Arc<DeviceLink<AnyStream>>) {
        let Some(msg_type) = frame.message_type() else {
            warn!(raw = frame.header.message_type, "unrecognized message type, skipping");
            return;
        };
        let Some(handler) = self.handlers.get(&msg_type) else {
            warn!(%msg_type, "no handler registered, skipping");
            return;
        };

        debug!(
            request_id = frame.header.request_id,
            %msg_type,
            body_len = frame.header.body_len,
            "incoming frame"
        );
        if let Err(e) = handler(frame, link.clone()).await {
            warn!(%msg_type, error = %e, "handler error");
        }
    }

    /// Tears one connection down: map mutation under the lock, then close,
    /// registry mark and the offline publish outside it so other connections
    /// are never blocked on I/O. Identity-checked, so a connection that was
    /// already replaced cannot evict its successor.
    pub async fn remove_connection(&self, link: &Arc<DeviceLink<AnyStream>>) {
        let Some(id) = link.device().id else { return };

        let removed = {
            let mut conns = self.conns.write();
            match conns.get(&id) {
                Some(live) if Arc::ptr_eq(&live.link, link) => conns.remove(&id),
                _ => None,
            }
        };
        let Some(live) = removed else { return };

        if let Err(e) = live.link.close().await {
            debug!(device_id = %id, error = %e, "closing connection");
        }
        if let Err(e) = self.registry.mark(id, DeviceState::Offline).await {
            error!(device_id = %id, error = %e, "marking device offline");
        }

        info!(device_id = %id, "device offline");
        self.bus.publish(
            TOPIC_DEVICE_OFFLINE,
            &[EventArg::Device(live.link.device().clone())],
        );
    }

    /// Graceful shutdown: stops the accept loop (listener closed first, so
    /// no new admissions), kills and closes every live connection, then
    /// bulk-marks the fleet offline. Drain work is synchronous up to the
    /// deadline; on expiry the caller gets a timeout error.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), FleetError> {
        self.mode.store(MODE_SHUTTING_DOWN, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(());

        let drain = async {
            if self.accepting.load(Ordering::Relaxed) {
                let mut closed = self.accept_closed_rx.clone();
                while !*closed.borrow() {
                    if closed.changed().await.is_err() {
                        break;
                    }
                }
            }

            let drained: Vec<(DeviceId, LiveConn)> = self.conns.write().drain().collect();
            for (id, live) in &drained {
                let _ = live.kill_tx.send(());
                if let Err(e) = live.link.close().await {
                    debug!(device_id = %id, error = %e, "closing connection at shutdown");
                }
            }

            if let Err(e) = self.registry.mark_all(DeviceState::Offline).await {
                error!(error = %e, "bulk-marking devices offline");
            }
            info!(drained = drained.len(), "connections drained");
        };

        match timeout(deadline, drain).await {
            Ok(()) => Ok(()),
            Err(_) => Err(FleetError::DeadlineExceeded("shutdown")),
        }
    }
}

fn handle_pong(
    frame: Frame,
    _link: Arc<DeviceLink<AnyStream>>,
) -> BoxFuture<'static, Result<(), FleetError>> {
    Box::pin(async move {
        let pong: Pong = frame.decode_body()?;
        // The successful read already pushed the idle window forward.
        debug!(seq = pong.seq, "liveness pong");
        Ok(())
    })
}

fn handle_denied(
    frame: Frame,
    link: Arc<DeviceLink<AnyStream>>,
) -> BoxFuture<'static, Result<(), FleetError>> {
    Box::pin(async move {
        let denied: Denied = frame.decode_body()?;
        warn!(
            device_id = ?link.device().id,
            reason = %denied.reason,
            soft = denied.soft,
            "client reported a denial"
        );
        Ok(())
    })
}
