//! Live Feed Port - Streaming Transport and Inbound Handlers
//!
//! The live-feed session never sees the concrete websocket type. A
//! `FeedConnector` produces a frame sink and a frame stream; inbound
//! text frames are handed to a `FeedHandler`.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, Stream};

use crate::domain::{LendError, LendResult};

/// Transport-independent websocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
  Text(String),
  Binary(Vec<u8>),
  Ping(Vec<u8>),
  Pong(Vec<u8>),
  /// Normal-closure close frame.
  Close,
}

/// Writing half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = LendError> + Send>>;

/// Reading half of a connection. Ends when the remote closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = LendResult<Frame>> + Send>>;

/// An open connection split into its two halves.
pub struct FeedConnection {
  pub sink: FrameSink,
  pub stream: FrameStream,
}

impl FeedConnection {
  pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
    Self { sink, stream }
  }
}

impl std::fmt::Debug for FeedConnection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FeedConnection").finish_non_exhaustive()
  }
}

/// Opens connections to a push-style source.
#[async_trait]
pub trait FeedConnector: Send + Sync + 'static {
  /// Human-readable endpoint for logs.
  fn endpoint(&self) -> &str;

  async fn connect(&self) -> LendResult<FeedConnection>;
}

/// Consumes inbound text frames, in arrival order.
#[async_trait]
pub trait FeedHandler: Send + Sync + 'static {
  async fn on_text(&self, text: &str);
}
