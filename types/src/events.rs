mod server;

pub use server::{
    InlineData, LiveEvent, ModelTurn, Part, ServerContent, ServerMessage, SetupComplete,
    ToolCallMessage, Transcription,
};

use crate::audio::{pcm_mime_type, Base64EncodedAudioBytes};
use crate::session::SessionSetup;
use crate::tools::FunctionResponse;

// Outgoing frames. Each serializes as a single-key object, the key naming
// the frame kind: `{"setup": ...}`, `{"realtimeInput": ...}`,
// `{"toolResponse": ...}`.
#[derive(Debug, Clone, serde::Serialize)]
pub enum ClientEvent {
    #[serde(rename = "setup")]
    Setup(SessionSetup),
    #[serde(rename = "realtimeInput")]
    RealtimeInput(RealtimeInput),
    #[serde(rename = "toolResponse")]
    ToolResponse(ToolResponse),
}

impl ClientEvent {
    /// One captured audio block, already framed and base64 encoded.
    pub fn audio(data: Base64EncodedAudioBytes, sample_rate: u32) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media: MediaBlob {
                data,
                mime_type: pcm_mime_type(sample_rate),
            },
        })
    }

    pub fn tool_response(function_responses: Vec<FunctionResponse>) -> Self {
        Self::ToolResponse(ToolResponse { function_responses })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeInput {
    pub media: MediaBlob,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MediaBlob {
    pub data: Base64EncodedAudioBytes,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}
