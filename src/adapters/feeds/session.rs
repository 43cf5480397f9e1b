//! Live Feed Session - Single-Writer Websocket Multiplexer
//!
//! Owns one connection to a push-style source. A read task forwards
//! inbound text frames to a dispatch task that calls the `FeedHandler`
//! in arrival order. The writer loop is the only code that touches the
//! sink; it selects among:
//! - the shutdown signal (send a close frame, wait briefly for the read
//!   side to finish, return)
//! - the read side finishing (remote closed or read error)
//! - the heartbeat tick
//! - the next queued outbound frame
//!
//! The outbound queue is unbounded and order-preserving. It outlives
//! the session: `join` and `shutdown` hand it back so a supervisor can
//! start the next session on it without losing queued messages.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, info, warn};

use crate::domain::{LendError, LendResult};
use crate::ports::live_feed::{FeedConnection, FeedHandler, Frame, FrameSink, FrameStream};

/// Timing and protocol settings of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Interval between keep-alive frames.
    pub heartbeat: Duration,
    /// Text of the keep-alive frame.
    pub heartbeat_frame: String,
    /// How long shutdown waits for the remote to finish after close.
    pub close_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(5),
            heartbeat_frame: "2".to_string(),
            close_grace: Duration::from_secs(1),
        }
    }
}

/// Cloneable handle for queueing outbound frames.
#[derive(Debug, Clone)]
pub struct FeedPublisher {
    tx: mpsc::UnboundedSender<String>,
}

impl FeedPublisher {
    /// Queue a text frame without waiting for delivery.
    ///
    /// Returns `false` once the queue itself has been dropped.
    pub fn publish(&self, message: impl Into<String>) -> bool {
        self.tx.send(message.into()).is_ok()
    }
}

/// Receiving end of the outbound queue.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::UnboundedReceiver<String>,
}

impl OutboundQueue {
    /// Number of frames waiting to be written.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a new outbound queue and its publisher.
pub fn outbound_queue() -> (FeedPublisher, OutboundQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FeedPublisher { tx }, OutboundQueue { rx })
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// Shutdown was requested.
    Shutdown,
    /// The remote closed the connection or the read side failed.
    RemoteClosed,
    /// Writing a frame failed.
    WriteFailed(String),
}

/// A running session.
pub struct LiveFeedSession {
    publisher: FeedPublisher,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<(SessionExit, OutboundQueue)>>,
}

impl LiveFeedSession {
    /// Spawn the session tasks on `connection`.
    pub fn start(
        connection: FeedConnection,
        handler: Arc<dyn FeedHandler>,
        settings: SessionSettings,
        publisher: FeedPublisher,
        queue: OutboundQueue,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(connection, handler, settings, queue, shutdown_rx));
        Self {
            publisher,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Queue an outbound text frame.
    pub fn publish(&self, message: impl Into<String>) -> bool {
        self.publisher.publish(message)
    }

    pub fn publisher(&self) -> FeedPublisher {
        self.publisher.clone()
    }

    /// Wait for the session to end on its own.
    ///
    /// Cancel-safe: dropping the returned future leaves the session
    /// running and `join` or `shutdown` can be called again.
    pub async fn join(&mut self) -> LendResult<(SessionExit, OutboundQueue)> {
        let Some(task) = self.task.as_mut() else {
            return Err(LendError::external("live feed session already joined"));
        };
        let result = task.await;
        self.task = None;
        result.map_err(|e| LendError::external(format!("live feed task failed: {e}")))
    }

    /// Close the connection gracefully and wait for the session to end.
    pub async fn shutdown(mut self) -> LendResult<(SessionExit, OutboundQueue)> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join().await
    }
}

async fn run(
    connection: FeedConnection,
    handler: Arc<dyn FeedHandler>,
    settings: SessionSettings,
    mut queue: OutboundQueue,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> (SessionExit, OutboundQueue) {
    let FeedConnection { mut sink, stream } = connection;

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let reader = tokio::spawn(read_loop(stream, inbound_tx, done_tx));
    let dispatcher = tokio::spawn(dispatch_loop(inbound_rx, handler));

    let mut heartbeat = interval_at(Instant::now() + settings.heartbeat, settings.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                info!("Live feed shutdown requested, closing connection");
                if let Err(e) = sink.send(Frame::Close).await {
                    debug!(error = %e, "Close frame not delivered");
                }
                if timeout(settings.close_grace, &mut done_rx).await.is_err() {
                    debug!("Remote did not finish within close grace");
                }
                break SessionExit::Shutdown;
            }
            _ = &mut done_rx => {
                warn!("Live feed inbound closed");
                break SessionExit::RemoteClosed;
            }
            _ = heartbeat.tick() => {
                if let Err(e) = write(&mut sink, settings.heartbeat_frame.clone()).await {
                    break SessionExit::WriteFailed(e.to_string());
                }
            }
            Some(message) = queue.rx.recv() => {
                debug!(len = message.len(), "Live feed outbound frame");
                if let Err(e) = write(&mut sink, message).await {
                    break SessionExit::WriteFailed(e.to_string());
                }
            }
        }
    };

    reader.abort();
    // The dispatcher drains what was already read, then ends with the reader.
    let _ = dispatcher.await;

    info!(exit = ?exit, "Live feed session ended");
    (exit, queue)
}

async fn write(sink: &mut FrameSink, text: String) -> LendResult<()> {
    sink.send(Frame::Text(text)).await.inspect_err(|e| {
        warn!(error = %e, "Live feed write failed");
    })
}

async fn read_loop(
    mut stream: FrameStream,
    inbound_tx: mpsc::UnboundedSender<String>,
    done_tx: oneshot::Sender<()>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Frame::Text(text)) => {
                if inbound_tx.send(text).is_err() {
                    break;
                }
            }
            Ok(Frame::Close) => {
                debug!("Live feed close frame received");
                break;
            }
            Ok(other) => debug!(frame = ?other, "Live feed control frame"),
            Err(e) => {
                warn!(error = %e, "Live feed read failed");
                break;
            }
        }
    }
    let _ = done_tx.send(());
}

async fn dispatch_loop(mut inbound_rx: mpsc::UnboundedReceiver<String>, handler: Arc<dyn FeedHandler>) {
    while let Some(text) = inbound_rx.recv().await {
        handler.on_text(&text).await;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures_util::{sink, stream};
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FeedHandler for Recorder {
        async fn on_text(&self, text: &str) {
            self.seen.lock().await.push(text.to_string());
        }
    }

    /// Connection whose outbound frames land in the returned receiver and
    /// whose inbound frames come from the returned sender.
    fn loopback() -> (
        FeedConnection,
        mpsc::UnboundedReceiver<Frame>,
        mpsc::UnboundedSender<LendResult<Frame>>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Frame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LendResult<Frame>>();

        let sink: FrameSink = Box::pin(sink::unfold(out_tx, |tx, frame: Frame| async move {
            tx.send(frame).map_err(|_| LendError::external("peer gone"))?;
            Ok::<_, LendError>(tx)
        }));
        let stream: FrameStream = Box::pin(stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        }));
        (FeedConnection::new(sink, stream), out_rx, in_tx)
    }

    fn settings(heartbeat_ms: u64) -> SessionSettings {
        SessionSettings {
            heartbeat: Duration::from_millis(heartbeat_ms),
            heartbeat_frame: "2".into(),
            close_grace: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_outbound_in_publish_order_then_heartbeat() {
        let (conn, mut out_rx, _in_tx) = loopback();
        let (publisher, queue) = outbound_queue();
        publisher.publish("first");
        publisher.publish("second");

        let session = LiveFeedSession::start(
            conn,
            Arc::new(Recorder::default()),
            settings(50),
            publisher,
            queue,
        );

        assert_eq!(out_rx.recv().await, Some(Frame::Text("first".into())));
        assert_eq!(out_rx.recv().await, Some(Frame::Text("second".into())));
        let beat = timeout(Duration::from_secs(2), out_rx.recv()).await.unwrap();
        assert_eq!(beat, Some(Frame::Text("2".into())));

        let (exit, _queue) = session.shutdown().await.unwrap();
        assert_eq!(exit, SessionExit::Shutdown);

        let mut close_seen = false;
        while let Ok(frame) = out_rx.try_recv() {
            close_seen |= frame == Frame::Close;
        }
        assert!(close_seen);
    }

    #[tokio::test]
    async fn test_inbound_dispatched_until_remote_close() {
        let (conn, _out_rx, in_tx) = loopback();
        let (publisher, queue) = outbound_queue();
        let recorder = Arc::new(Recorder::default());

        let mut session =
            LiveFeedSession::start(conn, recorder.clone(), settings(10_000), publisher, queue);

        in_tx.send(Ok(Frame::Text("431[]".into()))).unwrap();
        in_tx.send(Ok(Frame::Ping(vec![1]))).unwrap();
        in_tx.send(Ok(Frame::Text("3".into()))).unwrap();
        drop(in_tx);

        let (exit, _queue) = session.join().await.unwrap();
        assert_eq!(exit, SessionExit::RemoteClosed);
        assert_eq!(*recorder.seen.lock().await, vec!["431[]".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn test_write_failure_ends_session_and_keeps_queue() {
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LendResult<Frame>>();
        let failing: FrameSink = Box::pin(sink::unfold((), |(), _frame: Frame| async move {
            Err::<(), _>(LendError::external("broken pipe"))
        }));
        let stream: FrameStream = Box::pin(stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        }));

        let (publisher, queue) = outbound_queue();
        let mut session = LiveFeedSession::start(
            FeedConnection::new(failing, stream),
            Arc::new(Recorder::default()),
            settings(10_000),
            publisher.clone(),
            queue,
        );
        publisher.publish("lost");
        publisher.publish("kept");

        let (exit, queue) = session.join().await.unwrap();
        assert!(matches!(exit, SessionExit::WriteFailed(ref e) if e.contains("broken pipe")));
        assert_eq!(queue.len(), 1);
        drop(in_tx);
    }
}
