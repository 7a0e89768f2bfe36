//! Wire types for the `generateContent` REST endpoint, shared by the chat
//! and image backends.

use nexspice_types::{FunctionCall, FunctionResponse};

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<RestContent>,
    pub contents: Vec<RestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<RestTools>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationOptions>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RestTools {
    pub function_declarations: Vec<nexspice_types::FunctionDeclaration>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageOptions>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImageOptions {
    pub aspect_ratio: String,
}

/// One conversational turn as the endpoint sees it. Also reused for the
/// system instruction, which carries parts but no role.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct RestContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<RestPart>,
}

impl RestContent {
    pub fn instruction(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![RestPart::text(text)],
        }
    }

    pub fn user_text(text: &str) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![RestPart::text(text)],
        }
    }

    /// Tool results go back under the user role, one part per answered call.
    pub fn function_responses(responses: Vec<FunctionResponse>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: responses
                .into_iter()
                .map(|response| RestPart {
                    function_response: Some(response),
                    ..RestPart::default()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RestPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<RestInlineData>,
}

impl RestPart {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RestInlineData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct Candidate {
    pub content: Option<RestContent>,
}

pub(crate) fn generate_content_url(model: &str) -> String {
    format!(
        "{}/models/{}:generateContent",
        crate::config::REST_BASE_URL,
        model
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexspice_types::tools::add_to_cart_declaration;
    use serde_json::json;

    #[test]
    fn request_serializes_in_endpoint_shape() {
        let request = GenerateContentRequest {
            system_instruction: Some(RestContent::instruction("You are a waiter.")),
            contents: vec![RestContent::user_text("hi")],
            tools: Some(vec![RestTools {
                function_declarations: vec![add_to_cart_declaration()],
            }]),
            generation_config: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "You are a waiter.");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(
            value["tools"][0]["functionDeclarations"][0]["name"],
            "addToCart"
        );
        assert!(value.get("generationConfig").is_none());
    }

    #[test]
    fn function_responses_ride_under_the_user_role() {
        let call = FunctionCall {
            id: None,
            name: "addToCart".to_string(),
            args: json!({ "dishId": "5", "quantity": 1 }),
        };
        let content =
            RestContent::function_responses(vec![FunctionResponse::success(&call, "Added 1 x Butter Paneer Masala".to_string())]);

        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(
            value["parts"][0]["functionResponse"]["response"]["result"],
            "Added 1 x Butter Paneer Masala"
        );
    }

    #[test]
    fn image_request_carries_modalities_and_aspect_ratio() {
        let request = GenerateContentRequest {
            system_instruction: None,
            contents: vec![RestContent::user_text("a dish photo")],
            tools: None,
            generation_config: Some(GenerationOptions {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                image_config: Some(ImageOptions {
                    aspect_ratio: "4:3".to_string(),
                }),
            }),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["generationConfig"]["responseModalities"][0], "IMAGE");
        assert_eq!(value["generationConfig"]["imageConfig"]["aspectRatio"], "4:3");
    }
}
