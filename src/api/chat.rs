//! Non-streaming chat (project key)

use crate::chat::{ChatRequest, ChatResponse};
use crate::error::Result;
use crate::http::{ApiClient, ApiRequest};

/// Non-streaming chat endpoint.
const CHAT_PATH: &str = "/chat";

impl ApiClient {
    /// Sends one message and waits for the complete reply.
    ///
    /// Unlike the stream, this call is subject to the request timeout and to
    /// the usual 401 handling.
    pub async fn send_chat_message(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.require_project_key()?;
        let mut body = request.clone();
        body.stream = false;
        self.send_json(ApiRequest::post(CHAT_PATH).json(&body)?)
            .await
    }
}
