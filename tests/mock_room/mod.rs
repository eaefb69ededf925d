//! In-process room transport for session tests.
//!
//! Records every prepare/connect/disconnect call and lets a test inject room
//! events (tracks, data payloads, server-side disconnects) after connect.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use waav_avatar::core::avatar::{
    AvatarError, AvatarResult, MediaTrack, RoomEvent, RoomEventSender, RoomHandle, RoomTransport,
    SessionDescriptor, TrackKind,
};

#[derive(Default)]
pub struct MockRoomState {
    pub prepares: AtomicUsize,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub drop_after_connect: AtomicBool,
    pub connect_delay_ms: AtomicUsize,
    pub last_room_url: Mutex<Option<String>>,
    sender: Mutex<Option<RoomEventSender>>,
}

/// Cloneable handle shared between the test and the session.
#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Arc<MockRoomState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.state.fail_connect.store(true, Ordering::SeqCst);
        transport
    }

    /// Joins the room, then immediately reports a server-side disconnect.
    pub fn dropping_after_connect() -> Self {
        let transport = Self::default();
        transport
            .state
            .drop_after_connect
            .store(true, Ordering::SeqCst);
        transport
    }

    pub fn with_connect_delay(delay: Duration) -> Self {
        let transport = Self::default();
        transport
            .state
            .connect_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
        transport
    }

    pub fn prepares(&self) -> usize {
        self.state.prepares.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    fn emit(&self, event: RoomEvent) {
        if let Some(tx) = self.state.sender.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn emit_data(&self, json: &str) {
        self.emit(RoomEvent::DataReceived(Bytes::copy_from_slice(
            json.as_bytes(),
        )));
    }

    pub fn emit_start_speaking(&self) {
        self.emit_data(r#"{"type":"avatar_start_speaking"}"#);
    }

    pub fn emit_stop_talking(&self) {
        self.emit_data(r#"{"type":"avatar_stop_talking"}"#);
    }

    pub fn emit_track(&self, sid: &str, kind: TrackKind) {
        self.emit(RoomEvent::TrackSubscribed(MediaTrack {
            sid: sid.to_string(),
            kind,
            participant: Some("heygen".to_string()),
            source: None,
        }));
    }

    pub fn emit_disconnect(&self, reason: &str) {
        self.emit(RoomEvent::Disconnected {
            reason: reason.to_string(),
        });
    }
}

struct MockHandle {
    state: Arc<MockRoomState>,
}

#[async_trait]
impl RoomHandle for MockHandle {
    async fn disconnect(&mut self) -> AvatarResult<()> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.state.sender.lock().take();
        Ok(())
    }
}

#[async_trait]
impl RoomTransport for MockTransport {
    async fn prepare_connection(&self, _descriptor: &SessionDescriptor) -> AvatarResult<()> {
        self.state.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(
        &self,
        descriptor: &SessionDescriptor,
        events: RoomEventSender,
    ) -> AvatarResult<Box<dyn RoomHandle>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        *self.state.last_room_url.lock() = Some(descriptor.room_url.clone());

        let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(AvatarError::ConnectionFailed(
                "could not establish signal connection".to_string(),
            ));
        }

        if self.state.drop_after_connect.load(Ordering::SeqCst) {
            let _ = events.send(RoomEvent::Disconnected {
                reason: "SignalClose".to_string(),
            });
        }
        *self.state.sender.lock() = Some(events);
        Ok(Box::new(MockHandle {
            state: self.state.clone(),
        }))
    }
}
