use crate::audio::Base64EncodedAudioBytes;
use crate::tools::FunctionCall;

// Incoming messages. The stream never tags frames; each message is an object
// with at most one of these top-level fields populated.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<SetupComplete>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallMessage>,
}

/// Acknowledges the `setup` frame; the stream is ready for realtime input.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<ModelTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub data: Base64EncodedAudioBytes,
}

/// An incremental speech-to-text or synthesis-transcript fragment. Deltas
/// are always appended by the consumer, never substituted.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Transcription {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCallMessage {
    pub function_calls: Vec<FunctionCall>,
}

/// A typed event a live session consumes from its event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// One synthesized audio chunk, base64 PCM16, ready for deframing.
    Audio(Base64EncodedAudioBytes),
    /// Delta of the model's speech transcript.
    OutputTranscript(String),
    /// Delta of the user's speech transcript.
    InputTranscript(String),
    /// The current exchange finished; partial transcripts become history.
    TurnComplete,
    /// Mid-stream function calls awaiting correlated responses.
    ToolCall(Vec<FunctionCall>),
    /// The model detected user barge-in; scheduled playback must be dropped.
    Interrupted,
    /// The stream ended, cleanly or not.
    Closed { reason: Option<String> },
}

impl ServerMessage {
    /// Flattens one wire message into typed events, preserving the handling
    /// order the product relies on: audio first, then transcript deltas,
    /// turn completion, tool calls, and the interruption signal last.
    pub fn into_events(self) -> Vec<LiveEvent> {
        let mut events = Vec::new();
        let mut interrupted = false;
        if let Some(content) = self.server_content {
            if let Some(turn) = content.model_turn {
                for part in turn.parts {
                    if let Some(inline) = part.inline_data {
                        events.push(LiveEvent::Audio(inline.data));
                    }
                }
            }
            if let Some(output) = content.output_transcription {
                events.push(LiveEvent::OutputTranscript(output.text));
            }
            if let Some(input) = content.input_transcription {
                events.push(LiveEvent::InputTranscript(input.text));
            }
            if content.turn_complete.unwrap_or(false) {
                events.push(LiveEvent::TurnComplete);
            }
            interrupted = content.interrupted.unwrap_or(false);
        }
        if let Some(tool_call) = self.tool_call {
            if !tool_call.function_calls.is_empty() {
                events.push(LiveEvent::ToolCall(tool_call.function_calls));
            }
        }
        if interrupted {
            events.push(LiveEvent::Interrupted);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audio_with_transcript_delta() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "UklGRg==" } }
                    ]
                },
                "outputTranscription": { "text": "Wel" }
            }
        }"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        let events = message.into_events();
        assert_eq!(
            events,
            vec![
                LiveEvent::Audio("UklGRg==".to_string()),
                LiveEvent::OutputTranscript("Wel".to_string()),
            ]
        );
    }

    #[test]
    fn turn_complete_follows_transcripts() {
        let raw = r#"{
            "serverContent": {
                "inputTranscription": { "text": "two naan please" },
                "turnComplete": true
            }
        }"#;
        let events = serde_json::from_str::<ServerMessage>(raw).unwrap().into_events();
        assert_eq!(
            events,
            vec![
                LiveEvent::InputTranscript("two naan please".to_string()),
                LiveEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn tool_calls_carry_ids_and_args() {
        let raw = r#"{
            "toolCall": {
                "functionCalls": [
                    { "id": "fc-9", "name": "addToCart", "args": { "dishId": "12", "quantity": 2 } }
                ]
            }
        }"#;
        let events = serde_json::from_str::<ServerMessage>(raw).unwrap().into_events();
        match &events[..] {
            [LiveEvent::ToolCall(calls)] => {
                assert_eq!(calls[0].id.as_deref(), Some("fc-9"));
                assert_eq!(calls[0].args["quantity"], 2);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn interruption_and_setup_complete() {
        let raw = r#"{ "serverContent": { "interrupted": true } }"#;
        let events = serde_json::from_str::<ServerMessage>(raw).unwrap().into_events();
        assert_eq!(events, vec![LiveEvent::Interrupted]);

        let raw = r#"{ "setupComplete": {} }"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(message.setup_complete.is_some());
        assert!(message.into_events().is_empty());
    }
}
