//! Real-time media room connector.
//!
//! The connector is transport-agnostic: a [`RoomTransport`] performs the
//! actual connection and pushes [`RoomEvent`]s into a channel, and the
//! connector routes them to the handlers registered with
//! [`RoomConnector::on_track_subscribed`], [`RoomConnector::on_data_received`]
//! and [`RoomConnector::on_disconnected`].
//!
//! Disconnect notifications are only delivered for disconnects the connector
//! did not initiate itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::base::{AvatarResult, MediaTrack, SessionDescriptor, TrackCallback};

/// Event produced by a room transport.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A remote audio or video track became available
    TrackSubscribed(MediaTrack),
    /// Raw data-channel payload
    DataReceived(Bytes),
    /// The room connection ended
    Disconnected { reason: String },
}

/// Sender half handed to a transport on connect.
pub type RoomEventSender = mpsc::UnboundedSender<RoomEvent>;

/// Callback type for raw data-channel payloads.
pub type DataCallback =
    Arc<dyn Fn(Bytes) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for unexpected disconnects.
pub type DisconnectCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A live connection returned by a transport.
#[async_trait]
pub trait RoomHandle: Send + Sync {
    /// Leave the room. Called at most once per handle by the connector.
    async fn disconnect(&mut self) -> AvatarResult<()>;
}

/// Media room transport implementation.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Pre-warm the connection to the room server. Best-effort.
    async fn prepare_connection(&self, descriptor: &SessionDescriptor) -> AvatarResult<()>;

    /// Join the room. Every event observed afterwards is sent on `events`.
    async fn connect(
        &self,
        descriptor: &SessionDescriptor,
        events: RoomEventSender,
    ) -> AvatarResult<Box<dyn RoomHandle>>;
}

#[derive(Default, Clone)]
struct Subscriptions {
    track: Option<TrackCallback>,
    data: Option<DataCallback>,
    disconnected: Option<DisconnectCallback>,
}

struct ConnectorInner {
    transport: Arc<dyn RoomTransport>,
    handle: tokio::sync::Mutex<Option<Box<dyn RoomHandle>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    subscriptions: RwLock<Subscriptions>,
    local_close: AtomicBool,
    connected: AtomicBool,
}

/// Owns the room handle of one session.
///
/// Cloning yields another reference to the same connection.
#[derive(Clone)]
pub struct RoomConnector {
    inner: Arc<ConnectorInner>,
}

impl RoomConnector {
    pub fn new(transport: Arc<dyn RoomTransport>) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                transport,
                handle: tokio::sync::Mutex::new(None),
                pump: Mutex::new(None),
                subscriptions: RwLock::new(Subscriptions::default()),
                local_close: AtomicBool::new(false),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Register the handler attaching each subscribed track to the render target.
    pub fn on_track_subscribed(&self, callback: TrackCallback) {
        self.inner.subscriptions.write().track = Some(callback);
    }

    /// Register the handler receiving raw data-channel payloads.
    pub fn on_data_received(&self, callback: DataCallback) {
        self.inner.subscriptions.write().data = Some(callback);
    }

    /// Register the handler for disconnects not initiated by [`RoomConnector::disconnect`].
    pub fn on_disconnected(&self, callback: DisconnectCallback) {
        self.inner.subscriptions.write().disconnected = Some(callback);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Pre-warm the room connection. Failures are logged and ignored.
    pub async fn prepare_connection(&self, descriptor: &SessionDescriptor) {
        match self.inner.transport.prepare_connection(descriptor).await {
            Ok(()) => debug!("Room connection prepared"),
            Err(e) => warn!("Room pre-connect failed, continuing: {}", e),
        }
    }

    /// Join the room and start routing its events to the registered handlers.
    pub async fn connect(&self, descriptor: &SessionDescriptor) -> AvatarResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<RoomEvent>();

        let handle = self.inner.transport.connect(descriptor, tx).await?;
        *self.inner.handle.lock().await = Some(handle);
        self.inner.connected.store(true, Ordering::SeqCst);
        info!("Room connected for session {}", descriptor.session_id);

        let inner = self.inner.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let subscriptions = inner.subscriptions.read().clone();
                match event {
                    RoomEvent::TrackSubscribed(track) => {
                        debug!("Track subscribed: {} ({})", track.sid, track.kind);
                        if let Some(cb) = subscriptions.track {
                            cb(track).await;
                        }
                    }
                    RoomEvent::DataReceived(payload) => {
                        if let Some(cb) = subscriptions.data {
                            cb(payload).await;
                        }
                    }
                    RoomEvent::Disconnected { reason } => {
                        inner.connected.store(false, Ordering::SeqCst);
                        if inner.local_close.load(Ordering::SeqCst) {
                            debug!("Room disconnected after local close: {}", reason);
                        } else {
                            warn!("Room disconnected unexpectedly: {}", reason);
                            if let Some(cb) = subscriptions.disconnected {
                                cb(reason).await;
                            }
                        }
                        break;
                    }
                }
            }
            debug!("Room event pump ended");
        });
        *self.inner.pump.lock() = Some(pump);

        Ok(())
    }

    /// Leave the room. Safe to call repeatedly and on a never-connected connector.
    pub async fn disconnect(&self) {
        self.inner.local_close.store(true, Ordering::SeqCst);

        let handle = self.inner.handle.lock().await.take();
        if let Some(mut handle) = handle {
            match handle.disconnect().await {
                Ok(()) => info!("Room disconnected"),
                Err(e) => warn!("Room disconnect reported an error: {}", e),
            }
        }
        self.inner.connected.store(false, Ordering::SeqCst);

        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
    }
}
