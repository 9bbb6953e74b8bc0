//! Chat model stubs for tests and LLM-free deployments.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::traits::{ChatMessage, ChatModel};

/// Replays a fixed sequence of replies, then repeats the last one. Records
/// every request so tests can assert on prompts.
pub struct ScriptedChatModel {
    replies: Vec<String>,
    state: Mutex<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    cursor: usize,
    requests: Vec<Vec<ChatMessage>>,
}

impl ScriptedChatModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            state: Mutex::new(ScriptState::default()),
        }
    }

    pub fn single(reply: impl Into<String>) -> Self {
        Self::new(vec![reply.into()])
    }

    /// Number of chat calls made so far.
    pub fn calls(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Copy of the recorded requests.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.state.lock().requests.clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> CoreResult<String> {
        let mut state = self.state.lock();
        state.requests.push(messages.to_vec());
        if self.replies.is_empty() {
            return Err(CoreError::LlmUnavailable("no scripted reply".to_string()));
        }
        let idx = state.cursor.min(self.replies.len() - 1);
        state.cursor += 1;
        Ok(self.replies[idx].clone())
    }
}

/// Always fails; exercises every degradation path.
#[derive(Default)]
pub struct UnavailableChatModel;

#[async_trait]
impl ChatModel for UnavailableChatModel {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> CoreResult<String> {
        Err(CoreError::LlmUnavailable("stubbed outage".to_string()))
    }
}
