//! Speaking-state arbitration and utterance dispatch.
//!
//! At most one utterance is in flight per session. A dispatch flips the state
//! to `Speaking` before the request goes out, so a second dispatch racing the
//! first is rejected with `Busy`. Inbound server events always win: a failed
//! dispatch only reverts the optimistic state if no event arrived meanwhile.

use tracing::{debug, info};

use super::api::StreamingApiClient;
use super::base::{AvatarError, AvatarResult, SessionToken, SpeakingState};
use super::events::AvatarEvent;

/// Proof that a dispatch claimed the speaking slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct DispatchTicket {
    epoch: u64,
}

/// Speaking state of one session plus a change counter.
#[derive(Debug, Default)]
pub struct SpeakingTracker {
    state: SpeakingState,
    epoch: u64,
}

impl SpeakingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SpeakingState {
        self.state
    }

    /// Claim the speaking slot for a new utterance.
    pub fn try_begin(&mut self) -> AvatarResult<DispatchTicket> {
        if self.state == SpeakingState::Speaking {
            return Err(AvatarError::Busy);
        }
        self.state = SpeakingState::Speaking;
        self.epoch = self.epoch.wrapping_add(1);
        Ok(DispatchTicket { epoch: self.epoch })
    }

    /// Undo a claim whose request failed.
    ///
    /// Returns `false` when an inbound event changed the state after the
    /// claim, in which case the state is left as the event set it.
    pub fn revert(&mut self, ticket: DispatchTicket) -> bool {
        if self.epoch != ticket.epoch {
            return false;
        }
        self.state = SpeakingState::Idle;
        self.epoch = self.epoch.wrapping_add(1);
        true
    }

    /// Apply a server-reported speaking event.
    pub fn apply(&mut self, event: AvatarEvent) {
        self.state = event.speaking_state();
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Return to `Idle` when the session ends.
    pub fn reset(&mut self) {
        self.state = SpeakingState::Idle;
        self.epoch = self.epoch.wrapping_add(1);
    }
}

/// Sends utterances to the server for the avatar to speak.
#[derive(Clone)]
pub struct SpeechDispatcher {
    api: StreamingApiClient,
}

impl SpeechDispatcher {
    pub fn new(api: StreamingApiClient) -> Self {
        Self { api }
    }

    /// Reject text that can never be spoken.
    pub fn validate(text: &str) -> AvatarResult<()> {
        if text.trim().is_empty() {
            return Err(AvatarError::InvalidRequest(
                "text must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Submit `text` as a repeat task for `session_id`.
    pub async fn dispatch(
        &self,
        token: &SessionToken,
        session_id: &str,
        text: &str,
    ) -> AvatarResult<()> {
        debug!("Dispatching utterance ({} chars)", text.chars().count());
        self.api.send_task(token, session_id, text).await?;
        info!("Utterance accepted for session {}", session_id);
        Ok(())
    }
}
