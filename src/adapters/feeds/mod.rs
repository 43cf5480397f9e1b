//! Live Feed Adapters - Push-Style Marketplace Streaming
//!
//! - Session: single-writer multiplexer over one connection
//! - Websocket connector: tokio-tungstenite transport
//! - Solsea handler: trade frames into the ingestion sink
//! - Task Supervisor: reconnects the session and keeps its queue

pub mod session;
pub mod solsea;
pub mod task_supervisor;
pub mod ws;

pub use session::{
    FeedPublisher, LiveFeedSession, OutboundQueue, SessionExit, SessionSettings, outbound_queue,
};
pub use solsea::SolseaTradeHandler;
pub use task_supervisor::FeedSupervisor;
pub use ws::WsConnector;
