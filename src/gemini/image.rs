//! REST image backend. One `generateContent` call per dish photo, with the
//! response modality pinned to images; the interesting part is telling a
//! retryable rate limit apart from everything else.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};

use super::rest::{
    generate_content_url, GenerateContentRequest, GenerateContentResponse, GenerationOptions,
    ImageOptions, RestContent,
};
use crate::config::Config;
use crate::images::{ImageBackend, ImageError, ImagePayload};
use nexspice_utils::audio::decode_base64;

pub struct GeminiImages {
    client: Client,
    api_key: SecretString,
    model: String,
}

impl GeminiImages {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            model: config.image_model.clone(),
        }
    }
}

#[async_trait]
impl ImageBackend for GeminiImages {
    async fn generate(
        &self,
        prompt: &str,
        aspect_ratio: &str,
    ) -> Result<Option<ImagePayload>, ImageError> {
        let request = GenerateContentRequest {
            system_instruction: None,
            contents: vec![RestContent::user_text(prompt)],
            tools: None,
            generation_config: Some(GenerationOptions {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                image_config: Some(ImageOptions {
                    aspect_ratio: aspect_ratio.to_string(),
                }),
            }),
        };

        let response = self
            .client
            .post(generate_content_url(&self.model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("image request did not reach the backend")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }
        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("could not parse the image response")?;

        first_inline_image(parsed)
    }
}

fn classify_failure(status: StatusCode, body: &str) -> ImageError {
    if is_rate_limit(status.as_u16(), body) {
        ImageError::RateLimited(format!("{status}: {body}"))
    } else {
        ImageError::Backend(anyhow!("image backend answered {status}: {body}"))
    }
}

/// The quota signal shows up in several shapes depending on which layer
/// rejected the call: a bare 429, an error envelope with code 429 or status
/// RESOURCE_EXHAUSTED, or that token buried in a plain-text body.
fn is_rate_limit(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &value["error"];
        if error["code"].as_u64() == Some(429) {
            return true;
        }
        if error["status"].as_str() == Some("RESOURCE_EXHAUSTED") {
            return true;
        }
    }
    body.contains("RESOURCE_EXHAUSTED")
}

fn first_inline_image(
    response: GenerateContentResponse,
) -> Result<Option<ImagePayload>, ImageError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(None);
    };
    let Some(content) = candidate.content else {
        return Ok(None);
    };
    for part in content.parts {
        if let Some(inline) = part.inline_data {
            let bytes = decode_base64(&inline.data)
                .context("image data from the backend was not valid base64")?;
            return Ok(Some(ImagePayload {
                bytes,
                mime_type: inline.mime_type.unwrap_or_else(|| "image/png".to_string()),
            }));
        }
    }
    Ok(None)
}
