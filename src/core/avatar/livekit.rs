//! LiveKit implementation of [`RoomTransport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use livekit::track::RemoteTrack;
use livekit::{Room, RoomEvent as LiveKitEvent, RoomOptions};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use url::Url;

use super::base::{AvatarError, AvatarResult, MediaTrack, SessionDescriptor, TrackKind};
use super::room::{RoomEvent, RoomEventSender, RoomHandle, RoomTransport};

const PREPARE_TIMEOUT: Duration = Duration::from_secs(5);

/// Joins the avatar's LiveKit room as a subscriber.
pub struct LiveKitTransport {
    http: reqwest::Client,
}

impl LiveKitTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// HTTP(S) form of a room URL, used to warm DNS and TLS before joining.
    fn warmup_url(room_url: &str) -> AvatarResult<Url> {
        let mut url = Url::parse(room_url)
            .map_err(|e| AvatarError::ConnectionFailed(format!("Invalid room URL: {e}")))?;
        let scheme = match url.scheme() {
            "wss" | "https" => "https",
            "ws" | "http" => "http",
            other => {
                return Err(AvatarError::ConnectionFailed(format!(
                    "Unsupported room URL scheme '{other}'"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| AvatarError::ConnectionFailed("Invalid room URL scheme".to_string()))?;
        Ok(url)
    }
}

impl Default for LiveKitTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomTransport for LiveKitTransport {
    async fn prepare_connection(&self, descriptor: &SessionDescriptor) -> AvatarResult<()> {
        let url = Self::warmup_url(&descriptor.room_url)?;
        // Any response means the connection is warm
        self.http
            .get(url)
            .timeout(PREPARE_TIMEOUT)
            .send()
            .await
            .map_err(|e| AvatarError::ConnectionFailed(format!("Pre-connect failed: {e}")))?;
        Ok(())
    }

    async fn connect(
        &self,
        descriptor: &SessionDescriptor,
        events: RoomEventSender,
    ) -> AvatarResult<Box<dyn RoomHandle>> {
        let mut options = RoomOptions::default();
        options.adaptive_stream = true;
        options.dynacast = true;

        let (room, mut room_events) = Room::connect(
            &descriptor.room_url,
            &descriptor.room_access_token,
            options,
        )
        .await
        .map_err(|e| AvatarError::ConnectionFailed(e.to_string()))?;
        info!("Joined LiveKit room {}", descriptor.room_url);

        let forward = tokio::spawn(async move {
            while let Some(event) = room_events.recv().await {
                let Some(event) = translate_event(event) else {
                    continue;
                };
                let last = matches!(event, RoomEvent::Disconnected { .. });
                if events.send(event).is_err() || last {
                    break;
                }
            }
            debug!("LiveKit event forwarding ended");
        });

        Ok(Box::new(LiveKitRoomHandle {
            room: Some(room),
            forward: Some(forward),
        }))
    }
}

fn translate_event(event: LiveKitEvent) -> Option<RoomEvent> {
    match event {
        LiveKitEvent::TrackSubscribed {
            track, participant, ..
        } => {
            let (sid, kind) = match &track {
                RemoteTrack::Audio(audio) => (audio.sid().to_string(), TrackKind::Audio),
                RemoteTrack::Video(video) => (video.sid().to_string(), TrackKind::Video),
            };
            Some(RoomEvent::TrackSubscribed(MediaTrack {
                sid,
                kind,
                participant: Some(participant.identity().0),
                source: Some(Arc::new(track)),
            }))
        }
        LiveKitEvent::DataReceived { payload, .. } => {
            Some(RoomEvent::DataReceived(Bytes::copy_from_slice(&payload)))
        }
        LiveKitEvent::Disconnected { reason } => Some(RoomEvent::Disconnected {
            reason: format!("{reason:?}"),
        }),
        other => {
            trace!("Ignoring LiveKit event: {:?}", other);
            None
        }
    }
}

struct LiveKitRoomHandle {
    room: Option<Room>,
    forward: Option<JoinHandle<()>>,
}

#[async_trait]
impl RoomHandle for LiveKitRoomHandle {
    async fn disconnect(&mut self) -> AvatarResult<()> {
        if let Some(forward) = self.forward.take() {
            forward.abort();
        }
        if let Some(room) = self.room.take() {
            room.close()
                .await
                .map_err(|e| AvatarError::ConnectionFailed(format!("Room close failed: {e}")))?;
        }
        Ok(())
    }
}
