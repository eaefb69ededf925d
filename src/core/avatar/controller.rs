//! Lifecycle controller for a streaming avatar session.
//!
//! [`AvatarSession`] owns the whole handshake (token, session, room, event
//! channel), the lifecycle state machine and teardown ordering:
//!
//! ```text
//! Disconnected -> Initializing -> Ready -> Closing -> Disconnected
//!                      |                                  ^
//!                      +------------ failure -------------+
//! ```
//!
//! All mutable state sits behind one short-held lock that is never held
//! across an `.await`. Handlers registered on the room and the event channel
//! capture a weak reference plus the generation of the session they belong
//! to, so events from a finished session can never touch the next one.

use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::api::StreamingApiClient;
use super::base::{
    AvatarError, AvatarResult, LifecyclePhase, SessionDescriptor, SessionErrorCallback,
    SessionToken, SpeakingCallback, SpeakingState, TrackCallback,
};
use super::chat::EventChannel;
use super::config::SessionConfig;
use super::dispatcher::{SpeakingTracker, SpeechDispatcher};
use super::events::{AvatarEvent, EventRelay};
use super::livekit::LiveKitTransport;
use super::liveness::LivenessKeeper;
use super::provisioner::SessionProvisioner;
use super::room::{RoomConnector, RoomTransport};

/// Host message sent when the event channel drops while the session is active.
pub const CHANNEL_LOST_MESSAGE: &str = "Server timed out.";

#[derive(Default, Clone)]
struct HostCallbacks {
    start_speaking: Option<SpeakingCallback>,
    stop_speaking: Option<SpeakingCallback>,
    session_error: Option<SessionErrorCallback>,
    track: Option<TrackCallback>,
}

/// Resources that exist exactly while a remote session is allocated.
struct ActiveSession {
    descriptor: SessionDescriptor,
    room: RoomConnector,
    chat: Option<EventChannel>,
}

/// Latest host prompt and the one waiting for the session to become Ready.
#[derive(Default)]
struct PromptBinding {
    last: Option<String>,
    pending: Option<String>,
}

struct SessionState {
    phase: LifecyclePhase,
    generation: u64,
    tracker: SpeakingTracker,
    token: Option<SessionToken>,
    active: Option<ActiveSession>,
    keeper: LivenessKeeper,
    close_requested: bool,
    fault: Option<String>,
    prompt: PromptBinding,
    started_at: Option<Instant>,
}

enum StartFailure {
    /// `close` was called while initializing
    Closed,
    Failed(AvatarError),
}

impl From<AvatarError> for StartFailure {
    fn from(err: AvatarError) -> Self {
        StartFailure::Failed(err)
    }
}

struct SessionInner {
    config: SessionConfig,
    api: StreamingApiClient,
    provisioner: SessionProvisioner,
    dispatcher: SpeechDispatcher,
    transport: Arc<dyn RoomTransport>,
    state: Mutex<SessionState>,
    phase_tx: watch::Sender<LifecyclePhase>,
    callbacks: RwLock<HostCallbacks>,
}

/// Client-side controller of one streaming avatar session at a time.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct AvatarSession {
    inner: Arc<SessionInner>,
}

impl AvatarSession {
    /// Create a controller using `transport` for the media room.
    pub fn new(config: SessionConfig, transport: Arc<dyn RoomTransport>) -> AvatarResult<Self> {
        config.validate()?;

        let api = StreamingApiClient::new(&config.api_url)?;
        let provisioner = SessionProvisioner::new(api.clone(), config.avatar.clone());
        let dispatcher = SpeechDispatcher::new(api.clone());
        let (phase_tx, _) = watch::channel(LifecyclePhase::Disconnected);

        let state = SessionState {
            phase: LifecyclePhase::Disconnected,
            generation: 0,
            tracker: SpeakingTracker::new(),
            token: None,
            active: None,
            keeper: LivenessKeeper::new(config.liveness),
            close_requested: false,
            fault: None,
            prompt: PromptBinding::default(),
            started_at: None,
        };

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                api,
                provisioner,
                dispatcher,
                transport,
                state: Mutex::new(state),
                phase_tx,
                callbacks: RwLock::new(HostCallbacks::default()),
            }),
        })
    }

    /// Create a controller joining rooms through LiveKit.
    pub fn with_livekit(config: SessionConfig) -> AvatarResult<Self> {
        Self::new(config, Arc::new(LiveKitTransport::new()))
    }

    // =========================================================================
    // Host notifications
    // =========================================================================

    pub fn on_start_speaking(&self, callback: SpeakingCallback) {
        self.inner.callbacks.write().start_speaking = Some(callback);
    }

    pub fn on_stop_speaking(&self, callback: SpeakingCallback) {
        self.inner.callbacks.write().stop_speaking = Some(callback);
    }

    /// Register the handler receiving a human-readable message for every
    /// failed start and every fatal error of an active session.
    pub fn on_session_error(&self, callback: SessionErrorCallback) {
        self.inner.callbacks.write().session_error = Some(callback);
    }

    /// Register the render target hook. Called for every subscribed track.
    pub fn on_track(&self, callback: TrackCallback) {
        self.inner.callbacks.write().track = Some(callback);
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn phase(&self) -> LifecyclePhase {
        self.inner.state.lock().phase
    }

    pub fn speaking_state(&self) -> SpeakingState {
        self.inner.state.lock().tracker.state()
    }

    /// Watch lifecycle phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<LifecyclePhase> {
        self.inner.phase_tx.subscribe()
    }

    /// Server-side id of the current session, if one is allocated.
    pub fn session_id(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .active
            .as_ref()
            .map(|a| a.descriptor.session_id.clone())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Run the start sequence: token, session, pre-connect, start, room, event
    /// channel. On success the session is Ready and any buffered prompt has
    /// been dispatched.
    ///
    /// Fails with `InvalidState` unless the controller is Disconnected. Any
    /// other failure has already been cleaned up and reported to the
    /// session-error handler when this returns.
    pub async fn start(&self) -> AvatarResult<()> {
        let generation = {
            let mut state = self.inner.state.lock();
            if state.phase != LifecyclePhase::Disconnected {
                return Err(AvatarError::InvalidState(format!(
                    "cannot start while {}",
                    state.phase
                )));
            }
            state.generation = state.generation.wrapping_add(1);
            state.close_requested = false;
            state.fault = None;
            state.tracker.reset();
            self.inner.set_phase(&mut state, LifecyclePhase::Initializing);
            state.generation
        };

        let begun = Instant::now();
        match self.inner.run_start_sequence(generation).await {
            Ok(pending) => {
                info!("Streaming started in {:.2?}", begun.elapsed());
                if let Some(text) = pending {
                    if let Err(e) = self.speak(&text).await {
                        warn!("Buffered prompt was not delivered: {}", e);
                    }
                }
                Ok(())
            }
            Err(StartFailure::Closed) => {
                info!("Session closed while initializing, cleaning up");
                self.inner.teardown(generation, None).await;
                Err(AvatarError::InvalidState(
                    "session closed while initializing".to_string(),
                ))
            }
            Err(StartFailure::Failed(e)) => {
                error!("Session initialization failed: {}", e);
                self.inner
                    .teardown(generation, Some(format!("Failed to initialize session: {e}")))
                    .await;
                Err(e)
            }
        }
    }

    /// Close the session and release every resource it holds.
    ///
    /// Concurrent calls share one teardown and all return once the controller
    /// is Disconnected. A close during initialization takes effect after the
    /// step in flight completes.
    pub async fn close(&self) {
        enum Action {
            Nothing,
            Teardown(u64),
            Wait,
        }

        let action = {
            let mut state = self.inner.state.lock();
            match state.phase {
                LifecyclePhase::Disconnected => Action::Nothing,
                LifecyclePhase::Closing => Action::Wait,
                LifecyclePhase::Initializing => {
                    state.close_requested = true;
                    self.inner.set_phase(&mut state, LifecyclePhase::Closing);
                    Action::Wait
                }
                LifecyclePhase::Ready => {
                    self.inner.set_phase(&mut state, LifecyclePhase::Closing);
                    state.keeper.stop();
                    Action::Teardown(state.generation)
                }
            }
        };

        match action {
            Action::Nothing => debug!("Close requested with no active session"),
            Action::Teardown(generation) => {
                info!("Closing session");
                self.inner.teardown(generation, None).await;
            }
            Action::Wait => {
                debug!("Close already in progress, waiting");
                let mut phases = self.inner.phase_tx.subscribe();
                let _ = phases
                    .wait_for(|phase| *phase == LifecyclePhase::Disconnected)
                    .await;
            }
        }
    }

    // =========================================================================
    // Speech
    // =========================================================================

    /// Ask the avatar to speak `text`.
    ///
    /// Fails with `NotReady` unless Ready, with `Busy` while an utterance is
    /// in progress and with `InvalidRequest` for blank text; none of these is
    /// reported to the session-error handler. A failed request reverts the
    /// speaking state and, when the error is fatal, reports it and closes the
    /// session.
    pub async fn speak(&self, text: &str) -> AvatarResult<()> {
        let (ticket, token, session_id, generation) = {
            let mut state = self.inner.state.lock();
            if state.phase != LifecyclePhase::Ready {
                warn!("Cannot send text, session is {}", state.phase);
                return Err(AvatarError::NotReady);
            }
            if state.tracker.state() == SpeakingState::Speaking {
                warn!("Avatar is already speaking, text rejected");
                return Err(AvatarError::Busy);
            }
            SpeechDispatcher::validate(text)?;
            let (Some(token), Some(active)) = (state.token.clone(), state.active.as_ref()) else {
                return Err(AvatarError::InvalidState(
                    "Ready without an allocated session".to_string(),
                ));
            };
            let session_id = active.descriptor.session_id.clone();
            let ticket = state.tracker.try_begin()?;
            (ticket, token, session_id, state.generation)
        };

        match self
            .inner
            .dispatcher
            .dispatch(&token, &session_id, text)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                {
                    let mut state = self.inner.state.lock();
                    if state.generation == generation && !state.tracker.revert(ticket) {
                        debug!("Speaking state changed by the server, keeping it");
                    }
                }
                if e.is_fatal() {
                    error!("Error sending text: {}", e);
                    self.inner
                        .clone()
                        .fail(generation, format!("Failed to send message: {e}"))
                        .await;
                } else {
                    warn!("Text was not sent: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Bind the host prompt.
    ///
    /// Only a value different from the last one applied is acted on. While
    /// Ready it is spoken immediately; before that it is kept and spoken once
    /// the session becomes Ready. Empty prompts are recorded but never spoken.
    /// A prompt that could not be spoken (for example `Busy`) is not recorded,
    /// so binding the same text again retries it.
    pub async fn set_prompt(&self, text: &str) -> AvatarResult<()> {
        let generation = {
            let mut state = self.inner.state.lock();
            if state.prompt.last.as_deref() == Some(text) {
                debug!("Prompt unchanged, ignoring");
                return Ok(());
            }

            if text.trim().is_empty() {
                state.prompt.last = Some(text.to_string());
                state.prompt.pending = None;
                return Ok(());
            }
            if state.phase != LifecyclePhase::Ready {
                debug!("Session is {}, buffering prompt", state.phase);
                state.prompt.last = Some(text.to_string());
                state.prompt.pending = Some(text.to_string());
                return Ok(());
            }
            state.generation
        };

        self.speak(text).await?;

        let mut state = self.inner.state.lock();
        if state.generation == generation && state.phase == LifecyclePhase::Ready {
            state.prompt.last = Some(text.to_string());
        }
        Ok(())
    }
}

impl SessionInner {
    fn set_phase(&self, state: &mut SessionState, phase: LifecyclePhase) {
        if state.phase != phase {
            info!("Session phase: {} -> {}", state.phase, phase);
            state.phase = phase;
            self.phase_tx.send_replace(phase);
        }
    }

    /// Abort the start sequence if it was closed or faulted meanwhile.
    fn checkpoint(&self, generation: u64) -> Result<(), StartFailure> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return Err(StartFailure::Closed);
        }
        if state.close_requested {
            return Err(StartFailure::Closed);
        }
        if let Some(fault) = state.fault.take() {
            return Err(StartFailure::Failed(AvatarError::ConnectionFailed(fault)));
        }
        Ok(())
    }

    /// Returns the buffered prompt to speak once Ready.
    async fn run_start_sequence(
        self: &Arc<Self>,
        generation: u64,
    ) -> Result<Option<String>, StartFailure> {
        let token = self
            .provisioner
            .fetch_token(self.config.api_key.as_str())
            .await?;
        self.state.lock().token = Some(token.clone());
        self.checkpoint(generation)?;

        let descriptor = self.provisioner.create_session(&token).await?;
        let room = RoomConnector::new(self.transport.clone());
        self.wire_room(&room, generation);
        self.state.lock().active = Some(ActiveSession {
            descriptor: descriptor.clone(),
            room: room.clone(),
            chat: None,
        });
        self.checkpoint(generation)?;

        room.prepare_connection(&descriptor).await;
        self.checkpoint(generation)?;

        info!("Starting streaming session {}", descriptor.session_id);
        self.api
            .start_session(&token, &descriptor.session_id)
            .await?;
        self.checkpoint(generation)?;

        room.connect(&descriptor).await?;
        self.checkpoint(generation)?;

        if self.config.event_channel {
            match self.open_event_channel(&token, &descriptor.session_id, generation).await {
                Ok(chat) => {
                    if let Some(active) = self.state.lock().active.as_mut() {
                        active.chat = Some(chat);
                    }
                }
                Err(e) => warn!("Event channel unavailable, continuing without it: {}", e),
            }
            self.checkpoint(generation)?;
        }

        let mut state = self.state.lock();
        if state.generation != generation || state.close_requested {
            return Err(StartFailure::Closed);
        }
        if let Some(fault) = state.fault.take() {
            return Err(StartFailure::Failed(AvatarError::ConnectionFailed(fault)));
        }
        self.set_phase(&mut state, LifecyclePhase::Ready);
        state.started_at = Some(Instant::now());
        state
            .keeper
            .start(self.api.clone(), token, descriptor.session_id.clone());
        info!("Session {} is ready", descriptor.session_id);
        Ok(state.prompt.pending.take())
    }

    async fn open_event_channel(
        self: &Arc<Self>,
        token: &SessionToken,
        session_id: &str,
        generation: u64,
    ) -> AvatarResult<EventChannel> {
        let url = self.api.event_channel_url(token, session_id)?;
        let weak = Arc::downgrade(self);
        EventChannel::open(
            &url,
            Arc::new(move |reason| {
                let weak = weak.clone();
                Box::pin(async move {
                    debug!("Event channel lost: {}", reason);
                    spawn_fault(weak, generation, CHANNEL_LOST_MESSAGE.to_string());
                })
            }),
        )
        .await
    }

    fn wire_room(self: &Arc<Self>, room: &RoomConnector, generation: u64) {
        let weak = Arc::downgrade(self);
        room.on_track_subscribed(Arc::new(move |track| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let callback = inner.callbacks.read().track.clone();
                match callback {
                    Some(cb) => {
                        tokio::spawn(cb(track));
                    }
                    None => debug!("No render target for track {}", track.sid),
                }
            })
        }));

        let weak = Arc::downgrade(self);
        room.on_data_received(Arc::new(move |payload| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_payload(generation, payload);
                }
            })
        }));

        let weak = Arc::downgrade(self);
        room.on_disconnected(Arc::new(move |reason| {
            let weak = weak.clone();
            Box::pin(async move {
                spawn_fault(weak, generation, format!("Connection lost: {reason}"));
            })
        }));
    }

    /// Apply a data-channel event. Host notifications run on their own tasks
    /// so a host calling back into the controller never runs on the room pump.
    fn handle_payload(&self, generation: u64, payload: Bytes) {
        let event = match EventRelay::decode(&payload) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                warn!("Dropping data-channel payload: {}", e);
                return;
            }
        };

        {
            let mut state = self.state.lock();
            if state.generation != generation || !state.phase.is_active() {
                debug!("Ignoring {:?} outside an active session", event);
                return;
            }
            state.tracker.apply(event);
        }

        let callbacks = self.callbacks.read().clone();
        match event {
            AvatarEvent::StartSpeaking => {
                info!("Avatar started speaking");
                if let Some(cb) = callbacks.start_speaking {
                    tokio::spawn(cb());
                }
            }
            AvatarEvent::StopSpeaking => {
                info!("Avatar stopped speaking");
                if let Some(cb) = callbacks.stop_speaking {
                    tokio::spawn(cb());
                }
            }
        }
    }

    /// Handle a fatal error of the session identified by `generation`.
    async fn fail(self: Arc<Self>, generation: u64, message: String) {
        enum Next {
            Teardown,
            Deferred,
            Ignore,
        }

        let next = {
            let mut state = self.state.lock();
            if state.generation != generation {
                Next::Ignore
            } else {
                match state.phase {
                    LifecyclePhase::Ready => {
                        self.set_phase(&mut state, LifecyclePhase::Closing);
                        state.keeper.stop();
                        Next::Teardown
                    }
                    LifecyclePhase::Initializing => {
                        if state.fault.is_none() {
                            state.fault = Some(message.clone());
                        }
                        Next::Deferred
                    }
                    _ => Next::Ignore,
                }
            }
        };

        match next {
            Next::Teardown => {
                error!("Session failed: {}", message);
                self.teardown(generation, Some(message)).await;
            }
            Next::Deferred => warn!("Fault while initializing: {}", message),
            Next::Ignore => debug!("Ignoring fault of a closed session: {}", message),
        }
    }

    /// Release everything the session holds and return to Disconnected.
    ///
    /// Runs once per session: callers reach it only after winning the
    /// transition out of Ready, or from the start sequence itself. The work
    /// happens on a task of its own, so it completes even when the caller is
    /// a room or channel task that the release aborts.
    async fn teardown(self: &Arc<Self>, generation: u64, notify: Option<String>) {
        let inner = self.clone();
        let release = tokio::spawn(async move { inner.release(generation, notify).await });
        if let Err(e) = release.await {
            error!("Session teardown task failed: {}", e);
        }
    }

    async fn release(&self, generation: u64, notify: Option<String>) {
        let (active, token, started_at) = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.keeper.stop();
            (
                state.active.take(),
                state.token.take(),
                state.started_at.take(),
            )
        };

        if let Some(mut active) = active {
            let session_id = active.descriptor.session_id.clone();
            if let Some(token) = token.as_ref() {
                info!("Stopping streaming session {}", session_id);
                match self.api.stop_session(token, &session_id).await {
                    Ok(()) => info!("Streaming session {} stopped", session_id),
                    Err(e) => warn!("Error stopping session {}: {}", session_id, e),
                }
            }
            active.room.disconnect().await;
            if let Some(mut chat) = active.chat.take() {
                chat.close().await;
            }
        }

        if let Some(started_at) = started_at {
            info!(
                "Total session duration: {:.2} seconds",
                started_at.elapsed().as_secs_f64()
            );
        }

        {
            let mut state = self.state.lock();
            self.provisioner.release();
            state.tracker.reset();
            state.close_requested = false;
            state.fault = None;
            state.prompt = PromptBinding::default();
            self.set_phase(&mut state, LifecyclePhase::Disconnected);
        }
        drop(token);
        info!("Cleanup complete");

        if let Some(message) = notify {
            let callback = self.callbacks.read().session_error.clone();
            if let Some(cb) = callback {
                cb(message).await;
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(active) = self.state.get_mut().active.as_ref() {
            warn!(
                "Session controller dropped while session {} is allocated; call close() first",
                active.descriptor.session_id
            );
        }
    }
}

/// Run [`SessionInner::fail`] on its own task.
///
/// Faults are raised from inside room and channel tasks that teardown stops,
/// so the teardown must not run on them.
fn spawn_fault(weak: Weak<SessionInner>, generation: u64, message: String) {
    if let Some(inner) = weak.upgrade() {
        tokio::spawn(inner.fail(generation, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::avatar::room::{RoomEventSender, RoomHandle};
    use async_trait::async_trait;

    struct NoopTransport;

    struct NoopHandle;

    #[async_trait]
    impl RoomHandle for NoopHandle {
        async fn disconnect(&mut self) -> AvatarResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl RoomTransport for NoopTransport {
        async fn prepare_connection(&self, _descriptor: &SessionDescriptor) -> AvatarResult<()> {
            Ok(())
        }

        async fn connect(
            &self,
            _descriptor: &SessionDescriptor,
            _events: RoomEventSender,
        ) -> AvatarResult<Box<dyn RoomHandle>> {
            Ok(Box::new(NoopHandle))
        }
    }

    fn session() -> AvatarSession {
        AvatarSession::new(SessionConfig::new("K"), Arc::new(NoopTransport)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(matches!(
            AvatarSession::new(SessionConfig::new(""), Arc::new(NoopTransport)),
            Err(AvatarError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_initial_state() {
        let session = session();
        assert_eq!(session.phase(), LifecyclePhase::Disconnected);
        assert_eq!(session.speaking_state(), SpeakingState::Idle);
        assert!(session.session_id().is_none());
        assert_eq!(*session.subscribe_phase().borrow(), LifecyclePhase::Disconnected);
    }

    #[tokio::test]
    async fn test_speak_before_start_is_not_ready() {
        let session = session();
        assert_eq!(session.speak("Hello").await, Err(AvatarError::NotReady));
        assert_eq!(session.speak("").await, Err(AvatarError::NotReady));
    }

    #[tokio::test]
    async fn test_close_without_session_is_noop() {
        let session = session();
        session.close().await;
        session.close().await;
        assert_eq!(session.phase(), LifecyclePhase::Disconnected);
    }

    #[tokio::test]
    async fn test_prompt_before_start_is_buffered() {
        let session = session();
        session.set_prompt("Hello").await.unwrap();
        assert_eq!(
            session.inner.state.lock().prompt.pending.as_deref(),
            Some("Hello")
        );

        // Same value again is ignored, empty clears the buffer
        session.set_prompt("Hello").await.unwrap();
        session.set_prompt("").await.unwrap();
        assert!(session.inner.state.lock().prompt.pending.is_none());
    }
}
