//! Keeps a Ready session from hitting the server idle timeout.
//!
//! Under [`LivenessPolicy::Active`] a background task posts a keep-alive every
//! interval, the first one a full interval after start. Under
//! [`LivenessPolicy::Passive`] nothing runs and the session relies on the idle
//! timeout negotiated at creation.

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::StreamingApiClient;
use super::base::SessionToken;
use super::config::LivenessPolicy;
use super::messages::KEEP_ALIVE_SUCCESS;

pub struct LivenessKeeper {
    policy: LivenessPolicy,
    task: Option<(CancellationToken, JoinHandle<()>)>,
}

impl LivenessKeeper {
    pub fn new(policy: LivenessPolicy) -> Self {
        Self { policy, task: None }
    }

    pub fn policy(&self) -> LivenessPolicy {
        self.policy
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Begin keeping `session_id` alive.
    ///
    /// Returns `true` if a keep-alive task was spawned. Calling this while a
    /// task is already running does nothing.
    pub fn start(
        &mut self,
        api: StreamingApiClient,
        token: SessionToken,
        session_id: String,
    ) -> bool {
        let LivenessPolicy::Active { interval } = self.policy else {
            debug!("Passive liveness; relying on the server idle timeout");
            return false;
        };
        if self.task.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        match api.keep_alive(&token, &session_id).await {
                            Ok(Some(message)) if message == KEEP_ALIVE_SUCCESS => {
                                debug!("Keep-alive acknowledged for session {}", session_id);
                            }
                            Ok(message) => {
                                info!(
                                    "Keep-alive for session {} returned: {}",
                                    session_id,
                                    message.as_deref().unwrap_or("<no message>")
                                );
                            }
                            Err(e) => warn!("Keep-alive failed: {}", e),
                        }
                    }
                }
            }
            debug!("Keep-alive task stopped");
        });

        info!("Keep-alive started (every {:?})", interval);
        self.task = Some((cancel, handle));
        true
    }

    /// Stop the keep-alive task. No further requests are issued afterwards.
    pub fn stop(&mut self) {
        if let Some((cancel, handle)) = self.task.take() {
            cancel.cancel();
            handle.abort();
            debug!("Keep-alive cancelled");
        }
    }
}

impl Drop for LivenessKeeper {
    fn drop(&mut self) {
        self.stop();
    }
}
