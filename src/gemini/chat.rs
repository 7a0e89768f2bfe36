//! REST chat backend. Each conversation owns the history the model sees;
//! every round trip replays it in full, which is how `generateContent`
//! expects statelessness to be papered over.

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::rest::{
    generate_content_url, Candidate, GenerateContentRequest, GenerateContentResponse, RestContent,
    RestTools,
};
use crate::chat::{ChatBackend, ChatTurn, Conversation};
use crate::config::Config;
use nexspice_types::{FunctionDeclaration, FunctionResponse};

pub struct GeminiChat {
    client: Client,
    api_key: SecretString,
    model: String,
}

impl GeminiChat {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiChat {
    async fn start_conversation(
        &self,
        system_instruction: &str,
        tools: Vec<FunctionDeclaration>,
    ) -> anyhow::Result<Box<dyn Conversation>> {
        debug!(model = %self.model, "opening a chat conversation");
        Ok(Box::new(GeminiConversation {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            url: generate_content_url(&self.model),
            system_instruction: RestContent::instruction(system_instruction),
            tools,
            history: Vec::new(),
        }))
    }
}

struct GeminiConversation {
    client: Client,
    api_key: SecretString,
    url: String,
    system_instruction: RestContent,
    tools: Vec<FunctionDeclaration>,
    history: Vec<RestContent>,
}

#[async_trait]
impl Conversation for GeminiConversation {
    async fn send_text(&mut self, text: &str) -> anyhow::Result<ChatTurn> {
        self.history.push(RestContent::user_text(text));
        self.round_trip().await
    }

    async fn send_function_responses(
        &mut self,
        responses: Vec<FunctionResponse>,
    ) -> anyhow::Result<ChatTurn> {
        self.history.push(RestContent::function_responses(responses));
        self.round_trip().await
    }
}

impl GeminiConversation {
    async fn round_trip(&mut self) -> anyhow::Result<ChatTurn> {
        let request = GenerateContentRequest {
            system_instruction: Some(self.system_instruction.clone()),
            contents: self.history.clone(),
            tools: Some(vec![RestTools {
                function_declarations: self.tools.clone(),
            }]),
            generation_config: None,
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("chat request did not reach the backend")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("chat backend answered {status}: {body}");
        }
        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("could not parse the chat response")?;

        Ok(digest(parsed, &mut self.history))
    }
}

/// Pulls display text and tool calls out of the first candidate, appending
/// the model content to `history` so later round trips replay it. A turn
/// carrying tool calls must stay in the history ahead of our results or the
/// endpoint rejects the follow-up.
fn digest(response: GenerateContentResponse, history: &mut Vec<RestContent>) -> ChatTurn {
    let Some(Candidate {
        content: Some(content),
    }) = response.candidates.into_iter().next()
    else {
        return ChatTurn::default();
    };

    let mut turn = ChatTurn::default();
    for part in &content.parts {
        if let Some(text) = &part.text {
            match &mut turn.text {
                Some(collected) => collected.push_str(text),
                None => turn.text = Some(text.clone()),
            }
        }
        if let Some(call) = &part.function_call {
            turn.function_calls.push(call.clone());
        }
    }
    history.push(RestContent {
        role: Some("model".to_string()),
        parts: content.parts,
    });
    turn
}
