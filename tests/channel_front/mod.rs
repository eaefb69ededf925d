//! Local front for the streaming API that also serves the event channel.
//!
//! WebSocket upgrades on `/v1/ws/` are accepted here; every other connection
//! is piped through to the wiremock server holding the REST mocks, so a
//! session pointed at [`ChannelFront::uri`] gets both from one base URL.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::MockServer;

const EVENT_CHANNEL_PREFIX: &[u8] = b"GET /v1/ws/";

pub struct ChannelFront {
    uri: String,
    opened: Arc<AtomicUsize>,
    drop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ChannelFront {
    pub async fn start(upstream: &MockServer) -> Self {
        Self::start_with_handshake_delay(upstream, Duration::ZERO).await
    }

    /// Like [`ChannelFront::start`], but every WebSocket handshake is held
    /// back for `delay` before it is answered.
    pub async fn start_with_handshake_delay(upstream: &MockServer, delay: Duration) -> Self {
        let upstream = *upstream.address();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let opened = Arc::new(AtomicUsize::new(0));
        let (drop_tx, drop_rx) = watch::channel(false);

        let counter = opened.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    upstream,
                    delay,
                    counter.clone(),
                    drop_rx.clone(),
                ));
            }
        });

        Self {
            uri: format!("http://{addr}"),
            opened,
            drop_tx,
            task,
        }
    }

    pub fn uri(&self) -> String {
        self.uri.clone()
    }

    /// Number of event channels accepted so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Close every open event channel from the server side. Channels opened
    /// afterwards are closed right after their handshake.
    pub fn drop_channels(&self) {
        self.drop_tx.send_replace(true);
    }
}

impl Drop for ChannelFront {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn is_event_channel(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 16];
    loop {
        let n = match stream.peek(&mut buf).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => n,
        };
        if n >= EVENT_CHANNEL_PREFIX.len() || !EVENT_CHANNEL_PREFIX.starts_with(&buf[..n]) {
            return buf[..n].starts_with(EVENT_CHANNEL_PREFIX);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

async fn serve(
    mut stream: TcpStream,
    upstream: SocketAddr,
    delay: Duration,
    opened: Arc<AtomicUsize>,
    mut drop_rx: watch::Receiver<bool>,
) {
    if !is_event_channel(&stream).await {
        if let Ok(mut backend) = TcpStream::connect(upstream).await {
            let _ = copy_bidirectional(&mut stream, &mut backend).await;
        }
        return;
    }

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    opened.fetch_add(1, Ordering::SeqCst);

    loop {
        let dropped = *drop_rx.borrow_and_update();
        if dropped {
            let _ = ws.close(None).await;
            return;
        }
        tokio::select! {
            changed = drop_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
