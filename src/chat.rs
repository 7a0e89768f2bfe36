//! Turn-based text conversation with the waiter model.
//!
//! A [`ChatSession`] owns one long-lived conversational context and runs each
//! user message through the send, tool-resolve, respond cycle until the model
//! produces a human-readable reply. Tool calls mutate the externally owned
//! cart through [`crate::cart::CartSink`].

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, warn};

use crate::cart::{resolve_function_calls, CartSink};
use crate::prompt::{system_instruction, DONE_TEXT, KITCHEN_ERROR_TEXT};
use crate::transcript::SharedTranscript;
use nexspice_types::tools::add_to_cart_declaration;
use nexspice_types::{FunctionCall, FunctionDeclaration, FunctionResponse, Menu, Role};

/// Upper bound on tool-resolution round trips within one user turn, so a
/// model that keeps calling tools cannot spin the loop forever.
const MAX_TOOL_ROUNDS: usize = 8;

/// One model response: optional display text plus any tool calls that must
/// be answered before the turn can finish.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatTurn {
    pub text: Option<String>,
    pub function_calls: Vec<FunctionCall>,
}

/// An open conversational context. Implementations own the message history
/// the model sees; dropping one discards that history.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Conversation: Send {
    async fn send_text(&mut self, text: &str) -> anyhow::Result<ChatTurn>;

    async fn send_function_responses(
        &mut self,
        responses: Vec<FunctionResponse>,
    ) -> anyhow::Result<ChatTurn>;
}

/// Creates conversational contexts primed with a system prompt and tools.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn start_conversation(
        &self,
        system_instruction: &str,
        tools: Vec<FunctionDeclaration>,
    ) -> anyhow::Result<Box<dyn Conversation>>;
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("cannot send an empty message")]
    EmptyMessage,
}

/// Text ordering assistant. Not cancel-safe: the caller serializes `send`
/// calls, e.g. by disabling input while one is outstanding.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    menu: Arc<Menu>,
    cart: Arc<dyn CartSink>,
    transcript: SharedTranscript,
    conversation: Option<Box<dyn Conversation>>,
}

impl ChatSession {
    pub fn new<B>(
        backend: B,
        menu: Arc<Menu>,
        cart: Arc<dyn CartSink>,
        transcript: SharedTranscript,
    ) -> Self
    where
        B: ChatBackend + 'static,
    {
        Self {
            backend: Arc::new(backend),
            menu,
            cart,
            transcript,
            conversation: None,
        }
    }

    /// Runs one full user turn. The user entry is appended before the network
    /// round trip so the UI reflects the input immediately; transport failures
    /// surface as a fixed in-character apology rather than an error, and the
    /// conversational context is discarded so the next turn starts fresh.
    pub async fn send(&mut self, user_text: &str) -> Result<(), ChatError> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.append(Role::User, text);
        match self.run_turn(text).await {
            Ok(reply) => self.append(Role::Model, reply),
            Err(err) => {
                warn!("chat turn failed: {err:#}");
                self.conversation = None;
                self.append(Role::Model, KITCHEN_ERROR_TEXT);
            }
        }
        Ok(())
    }

    async fn run_turn(&mut self, text: &str) -> anyhow::Result<String> {
        if self.conversation.is_none() {
            debug!("starting a fresh conversation");
            let instruction = system_instruction(&self.menu);
            let tools = vec![add_to_cart_declaration()];
            self.conversation = Some(self.backend.start_conversation(&instruction, tools).await?);
        }
        let conversation = self
            .conversation
            .as_mut()
            .context("conversation missing after creation")?;

        let mut turn = conversation.send_text(text).await?;
        let mut rounds = 0;
        while !turn.function_calls.is_empty() {
            if rounds == MAX_TOOL_ROUNDS {
                warn!("giving up on tool resolution after {MAX_TOOL_ROUNDS} rounds");
                break;
            }
            rounds += 1;

            let calls = std::mem::take(&mut turn.function_calls);
            let results = resolve_function_calls(self.menu.as_ref(), self.cart.as_ref(), &calls);
            if results.is_empty() {
                break;
            }
            turn = conversation.send_function_responses(results).await?;
        }

        Ok(turn
            .text
            .map(|reply| reply.trim().to_string())
            .filter(|reply| !reply.is_empty())
            .unwrap_or_else(|| DONE_TEXT.to_string()))
    }

    fn append(&self, role: Role, text: impl Into<String>) {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.push(role, text);
        }
    }
}
