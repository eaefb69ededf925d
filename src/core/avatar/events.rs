//! Decoding of avatar events carried on the room data channel.

use tracing::{debug, trace};

use super::base::{AvatarError, AvatarResult, SpeakingState};
use super::messages::DataChannelMessage;

/// Data-channel `type` announcing the avatar started an utterance.
pub const EVENT_START_SPEAKING: &str = "avatar_start_speaking";

/// Data-channel `type` announcing the avatar finished an utterance.
pub const EVENT_STOP_TALKING: &str = "avatar_stop_talking";

/// A speaking-state change reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarEvent {
    StartSpeaking,
    StopSpeaking,
}

impl AvatarEvent {
    /// Speaking state the event establishes.
    pub fn speaking_state(&self) -> SpeakingState {
        match self {
            AvatarEvent::StartSpeaking => SpeakingState::Speaking,
            AvatarEvent::StopSpeaking => SpeakingState::Idle,
        }
    }
}

/// Stateless decoder for data-channel payloads.
pub struct EventRelay;

impl EventRelay {
    /// Decode a raw payload.
    ///
    /// Returns `Ok(None)` for well-formed messages of any other type. Payloads
    /// that are not UTF-8 JSON objects with a `type` field are `InvalidEvent`.
    pub fn decode(payload: &[u8]) -> AvatarResult<Option<AvatarEvent>> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| AvatarError::InvalidEvent(format!("payload is not UTF-8: {e}")))?;

        let message: DataChannelMessage = serde_json::from_str(text)
            .map_err(|e| AvatarError::InvalidEvent(format!("payload is not an event: {e}")))?;

        let event = match message.event_type.as_str() {
            EVENT_START_SPEAKING => Some(AvatarEvent::StartSpeaking),
            EVENT_STOP_TALKING => Some(AvatarEvent::StopSpeaking),
            other => {
                trace!("Ignoring data-channel message of type '{}'", other);
                None
            }
        };

        if let Some(event) = event {
            debug!(
                "Decoded {:?} (task: {})",
                event,
                message.task_id.as_deref().unwrap_or("-")
            );
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_start_and_stop() {
        assert_eq!(
            EventRelay::decode(br#"{"type":"avatar_start_speaking"}"#).unwrap(),
            Some(AvatarEvent::StartSpeaking)
        );
        assert_eq!(
            EventRelay::decode(br#"{"type":"avatar_stop_talking","task_id":"t1"}"#).unwrap(),
            Some(AvatarEvent::StopSpeaking)
        );
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        assert_eq!(
            EventRelay::decode(br#"{"type":"avatar_talking_message","message":"hi"}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_malformed_payloads() {
        let payloads: [&[u8]; 4] = [b"not json", b"{}", b"[1,2]", &[0xff, 0xfe, 0x00]];
        for payload in payloads {
            assert!(matches!(
                EventRelay::decode(payload),
                Err(AvatarError::InvalidEvent(_))
            ));
        }
    }

    #[test]
    fn test_event_speaking_state() {
        assert_eq!(
            AvatarEvent::StartSpeaking.speaking_state(),
            SpeakingState::Speaking
        );
        assert_eq!(AvatarEvent::StopSpeaking.speaking_state(), SpeakingState::Idle);
    }
}
