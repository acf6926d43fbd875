//! Streaming chat
//!
//! # Module Layout
//!
//! - [`types`]   -- request/response bodies and [`ChatStreamHandler`]
//! - [`sse`]     -- line reassembly and the event state machine
//! - [`stream`]  -- [`ApiClient::send_chat_message_stream`](crate::http::ApiClient::send_chat_message_stream)
//! - [`session`] -- [`ChatSession`], one conversation with cancellation

pub mod session;
pub mod sse;
pub mod stream;
pub mod types;

pub use session::{ChatCanceller, ChatSession, ChatTurn};
pub use stream::CHAT_STREAM_PATH;
pub use types::{
    ChatMeta, ChatRequest, ChatResponse, ChatStreamEvent, ChatStreamHandler, StreamOutcome,
};
