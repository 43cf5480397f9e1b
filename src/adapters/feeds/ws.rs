//! Websocket Connector - tokio-tungstenite Transport
//!
//! Opens a websocket and adapts tungstenite messages to the transport
//! independent `Frame` type used by the live-feed session.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{info, instrument};

use crate::domain::{LendError, LendResult};
use crate::ports::live_feed::{FeedConnection, FeedConnector, Frame};

/// Connector for a `ws://` or `wss://` endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close => Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })),
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text),
        Message::Binary(data) => Frame::Binary(data),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(_) => Frame::Close,
        Message::Frame(raw) => Frame::Binary(raw.into_data()),
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    fn endpoint(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&self) -> LendResult<FeedConnection> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| LendError::external(format!("websocket connect failed: {e}")))?;
        info!("Live feed websocket connected");

        let (write, read) = ws.split();
        let sink = write
            .sink_map_err(LendError::external)
            .with(|frame: Frame| future::ready(Ok::<_, LendError>(to_message(frame))));
        let stream = read.map(|message| message.map(from_message).map_err(LendError::external));

        Ok(FeedConnection::new(Box::pin(sink), Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_mapping() {
        assert_eq!(to_message(Frame::Text("2".into())), Message::Text("2".into()));
        assert!(matches!(
            to_message(Frame::Close),
            Message::Close(Some(ref f)) if f.code == CloseCode::Normal
        ));
        assert_eq!(from_message(Message::Text("431[]".into())), Frame::Text("431[]".into()));
        assert_eq!(from_message(Message::Close(None)), Frame::Close);
    }
}
