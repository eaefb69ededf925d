//! Out-of-band WebSocket event channel of a streaming session.
//!
//! The server pushes session notifications on this socket. Their content is
//! only logged; what matters is the socket itself, because the server closes
//! it when it ends the session. A close the client did not ask for is reported
//! through the callback given to [`EventChannel::open`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::base::{AvatarError, AvatarResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Callback invoked with a reason when the server ends the channel.
pub type ChannelClosedCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventChannel {
    intentional_close: Arc<AtomicBool>,
    sender: Option<mpsc::UnboundedSender<Message>>,
    task: Option<JoinHandle<()>>,
}

impl EventChannel {
    /// Connect to `url` and start reading notifications.
    pub async fn open(url: &Url, on_closed: ChannelClosedCallback) -> AvatarResult<Self> {
        // The query carries the session token
        debug!("Opening event channel: {}{}", url.origin().ascii_serialization(), url.path());

        let (ws_stream, _) = match timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                return Err(AvatarError::ChannelError(format!(
                    "WebSocket connection failed: {e}"
                )));
            }
            Err(_) => {
                return Err(AvatarError::ChannelError(
                    "WebSocket connection timed out".to_string(),
                ));
            }
        };
        info!("Event channel connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let intentional_close = Arc::new(AtomicBool::new(false));
        let intentional = intentional_close.clone();

        let task = tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    Some(msg) = rx.recv() => {
                        let closing = matches!(msg, Message::Close(_));
                        if let Err(e) = ws_write.send(msg).await {
                            break format!("send failed: {e}");
                        }
                        if closing {
                            break "closed by client".to_string();
                        }
                    }
                    result = ws_read.next() => {
                        match result {
                            Some(Ok(Message::Text(text))) => {
                                trace!("Event channel message: {}", text.as_str());
                            }
                            Some(Ok(Message::Ping(data))) => {
                                let _ = ws_write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                break match frame {
                                    Some(frame) => format!("closed by server ({}): {}", frame.code, frame.reason.as_str()),
                                    None => "closed by server".to_string(),
                                };
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => break format!("WebSocket error: {e}"),
                            None => break "stream ended".to_string(),
                        }
                    }
                }
            };

            if intentional.load(Ordering::SeqCst) {
                debug!("Event channel closed: {}", reason);
            } else {
                warn!("Event channel closed unexpectedly: {}", reason);
                on_closed(reason).await;
            }
        });

        Ok(Self {
            intentional_close,
            sender: Some(tx),
            task: Some(task),
        })
    }

    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Close the channel. The close callback is not invoked. Idempotent.
    pub async fn close(&mut self) {
        self.intentional_close.store(true, Ordering::SeqCst);

        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Message::Close(None));
        }
        if let Some(mut task) = self.task.take() {
            if timeout(CLOSE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
            info!("Event channel closed");
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.intentional_close.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    /// Accepts one WebSocket client. If `close_after` is set the server closes
    /// the socket after that delay, otherwise it echoes until the client leaves.
    async fn spawn_server(close_after: Option<Duration>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"event_type":"connected"}"#.into()))
                .await
                .unwrap();
            match close_after {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    let _ = ws.close(None).await;
                }
                None => while let Some(Ok(_)) = ws.next().await {},
            }
        });

        Url::parse(&format!(
            "ws://{addr}/v1/ws/streaming.chat?session_id=S1&session_token=T1"
        ))
        .unwrap()
    }

    fn counting_callback(counter: Arc<AtomicUsize>) -> ChannelClosedCallback {
        Arc::new(move |_reason| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_server_close_is_reported() {
        let url = spawn_server(Some(Duration::from_millis(50))).await;
        let closed = Arc::new(AtomicUsize::new(0));

        let channel = EventChannel::open(&url, counting_callback(closed.clone()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn test_client_close_is_silent() {
        let url = spawn_server(None).await;
        let closed = Arc::new(AtomicUsize::new(0));

        let mut channel = EventChannel::open(&url, counting_callback(closed.clone()))
            .await
            .unwrap();
        assert!(channel.is_open());

        channel.close().await;
        channel.close().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(closed.load(Ordering::SeqCst), 0);
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn test_open_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/v1/ws/streaming.chat")).unwrap();
        let result = EventChannel::open(&url, counting_callback(Arc::new(AtomicUsize::new(0)))).await;
        assert!(matches!(result, Err(AvatarError::ChannelError(_))));
    }
}
