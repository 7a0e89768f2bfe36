use crate::tools::FunctionDeclaration;

/// The `setup` payload opening a live stream: model, voice, system prompt,
/// tool declarations, and transcription switches for both speech directions.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    /// Full model resource name, e.g. "models/gemini-2.5-flash-native-audio-preview-12-2025".
    model: String,

    generation_config: GenerationConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,

    /// Present (even empty) to request incremental user speech transcripts.
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<TranscriptionConfig>,

    /// Present (even empty) to request incremental model speech transcripts.
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    response_modalities: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Content {
    parts: Vec<TextPart>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TextPart {
    text: String,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

/// Empty on the wire; its mere presence switches the transcript stream on.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TranscriptionConfig {}

impl SessionSetup {
    pub fn builder() -> SetupBuilder {
        SetupBuilder::new()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

pub struct SetupBuilder {
    setup: SessionSetup,
}

impl Default for SetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupBuilder {
    pub fn new() -> Self {
        Self {
            setup: SessionSetup {
                model: String::new(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: None,
                },
                system_instruction: None,
                tools: Vec::new(),
                input_audio_transcription: None,
                output_audio_transcription: None,
            },
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.setup.model = model.to_string();
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.setup.system_instruction = Some(Content {
            parts: vec![TextPart {
                text: instructions.to_string(),
            }],
        });
        self
    }

    pub fn with_voice(mut self, voice_name: &str) -> Self {
        self.setup.generation_config.speech_config = Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.to_string(),
                },
            },
        });
        self
    }

    pub fn with_tools(mut self, declarations: Vec<FunctionDeclaration>) -> Self {
        self.setup.tools = vec![ToolDeclarations {
            function_declarations: declarations,
        }];
        self
    }

    pub fn with_input_transcription(mut self) -> Self {
        self.setup.input_audio_transcription = Some(TranscriptionConfig::default());
        self
    }

    pub fn with_output_transcription(mut self) -> Self {
        self.setup.output_audio_transcription = Some(TranscriptionConfig::default());
        self
    }

    pub fn build(self) -> SessionSetup {
        self.setup
    }
}
