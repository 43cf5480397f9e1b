//! Feed Task Supervisor - Live Feed Restart Policy
//!
//! Runs the live-feed session as one long-lived task: connect, run the
//! session until it ends, wait, reconnect. The outbound queue is handed
//! from session to session so requests queued while disconnected are
//! written after the next connect. A broadcast shutdown closes the
//! current session gracefully. Uses `tokio::select!` for event-driven
//! waiting (never polling).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use super::session::{FeedPublisher, LiveFeedSession, OutboundQueue, SessionExit, SessionSettings};
use crate::adapters::metrics::MetricsRegistry;
use crate::ports::live_feed::{FeedConnector, FeedHandler};

/// Delay before reconnecting after a session ends.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Supervises the live-feed session.
pub struct FeedSupervisor {
    connector: Arc<dyn FeedConnector>,
    handler: Arc<dyn FeedHandler>,
    settings: SessionSettings,
    reconnect_delay: Duration,
    /// Whether a session is currently running.
    connected: AtomicBool,
    /// Sessions started after the first one.
    reconnects: AtomicU32,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl FeedSupervisor {
    pub fn new(
        connector: Arc<dyn FeedConnector>,
        handler: Arc<dyn FeedHandler>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            connector,
            handler,
            settings,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connected: AtomicBool::new(false),
            reconnects: AtomicU32::new(0),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Run sessions until shutdown; returns the outbound queue.
    #[instrument(skip_all, fields(endpoint = self.connector.endpoint()))]
    pub async fn run(
        &self,
        publisher: FeedPublisher,
        mut queue: OutboundQueue,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Option<OutboundQueue> {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                self.reconnects.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.feed_reconnects.inc();
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => return Some(queue),
                    () = sleep(self.reconnect_delay) => {}
                }
            }
            attempt += 1;

            let connection = tokio::select! {
                _ = shutdown_rx.recv() => return Some(queue),
                result = self.connector.connect() => result,
            };
            let connection = match connection {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(error = %e, attempt, "Live feed connect failed");
                    continue;
                }
            };

            info!(attempt, "Live feed connected");
            self.set_connected(true);
            let mut session = LiveFeedSession::start(
                connection,
                Arc::clone(&self.handler),
                self.settings.clone(),
                publisher.clone(),
                queue,
            );

            let ended = tokio::select! {
                _ = shutdown_rx.recv() => None,
                result = session.join() => Some(result),
            };
            self.set_connected(false);

            let result = match ended {
                Some(result) => result,
                None => {
                    return match session.shutdown().await {
                        Ok((_, queue)) => Some(queue),
                        Err(e) => {
                            error!(error = %e, "Live feed session failed during shutdown");
                            None
                        }
                    };
                }
            };

            match result {
                Ok((exit, returned)) => {
                    if exit != SessionExit::Shutdown {
                        warn!(exit = ?exit, pending = returned.len(), "Live feed session ended, reconnecting");
                    }
                    queue = returned;
                }
                Err(e) => {
                    error!(error = %e, "Live feed session crashed");
                    return None;
                }
            }
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.feed_connected.set(i64::from(connected));
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures_util::{sink, stream};
    use tokio::sync::{Mutex, mpsc};
    use tokio::time::timeout;

    use super::*;
    use crate::adapters::feeds::outbound_queue;
    use crate::domain::{LendError, LendResult};
    use crate::ports::live_feed::{FeedConnection, Frame, FrameSink, FrameStream};

    struct NoopHandler;

    #[async_trait]
    impl FeedHandler for NoopHandler {
        async fn on_text(&self, _text: &str) {}
    }

    /// First connection is closed by the remote at once; later ones
    /// stay open and forward written frames to `written`.
    struct FlakyConnector {
        calls: Mutex<u32>,
        written: mpsc::UnboundedSender<Frame>,
    }

    #[async_trait]
    impl FeedConnector for FlakyConnector {
        fn endpoint(&self) -> &str {
            "loopback"
        }

        async fn connect(&self) -> LendResult<FeedConnection> {
            let mut calls = self.calls.lock().await;
            *calls += 1;
            let tx = self.written.clone();
            let sink: FrameSink = Box::pin(sink::unfold(tx, |tx, frame: Frame| async move {
                tx.send(frame).map_err(|_| LendError::external("gone"))?;
                Ok::<_, LendError>(tx)
            }));
            let stream: FrameStream = if *calls == 1 {
                Box::pin(stream::empty::<LendResult<Frame>>())
            } else {
                Box::pin(stream::pending::<LendResult<Frame>>())
            };
            Ok(FeedConnection::new(sink, stream))
        }
    }

    #[tokio::test]
    async fn test_reconnects_and_keeps_queue() {
        let (written_tx, mut written_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(FlakyConnector {
            calls: Mutex::new(0),
            written: written_tx,
        });
        let settings = SessionSettings {
            heartbeat: Duration::from_secs(60),
            heartbeat_frame: "2".into(),
            close_grace: Duration::from_millis(50),
        };
        let supervisor = Arc::new(
            FeedSupervisor::new(connector, Arc::new(NoopHandler), settings)
                .with_reconnect_delay(Duration::from_millis(20)),
        );

        let (publisher, queue) = outbound_queue();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = {
            let supervisor = Arc::clone(&supervisor);
            let publisher = publisher.clone();
            tokio::spawn(async move { supervisor.run(publisher, queue, shutdown_rx).await })
        };

        publisher.publish("find");
        let mut delivered = false;
        while let Ok(Some(frame)) = timeout(Duration::from_secs(2), written_rx.recv()).await {
            if frame == Frame::Text("find".into()) {
                delivered = true;
                break;
            }
        }
        assert!(delivered);
        for _ in 0..100 {
            if supervisor.reconnects() >= 1 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert!(supervisor.reconnects() >= 1);

        shutdown_tx.send(()).unwrap();
        let queue = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(queue.is_some());
        assert!(!supervisor.is_connected());
    }
}
