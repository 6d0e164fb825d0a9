//! Wire types for the BidiGenerateContent protocol.
//!
//! Outbound frames use snake_case keys, inbound frames use camelCase keys.
//! Inbound frames are read section by section: a malformed `usageMetadata`,
//! `turnComplete` or part only drops that piece, never the rest of the frame.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

// --- Outbound ---

/// Frames sent from the client once the connection is open.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ClientFrame {
    Setup(SessionSetup),
    ClientContent(ClientContent),
    RealtimeInput(RealtimeInput),
}

/// Optional first frame, consumed by a relay that authenticates on the
/// client's behalf.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AuthFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    pub service_url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    pub speech_config: SpeechConfig,
}

/// Output kinds a session can request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

impl std::str::FromStr for ResponseModality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TEXT" => Ok(Self::Text),
            "AUDIO" => Ok(Self::Audio),
            other => Err(format!("unknown response modality '{}'", other)),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
    pub language_code: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ClientContent {
    pub turns: Vec<Turn>,
    pub turn_complete: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: String,
    pub parts: Vec<TextPart>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TextPart {
    pub text: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl ClientFrame {
    /// A complete single-part user turn.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::ClientContent(ClientContent {
            turns: vec![Turn {
                role: "user".to_string(),
                parts: vec![TextPart { text: text.into() }],
            }],
            turn_complete: true,
        })
    }

    /// One realtime media chunk. The payload encoding is the caller's choice.
    pub fn media_chunk(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: mime_type.into(),
                data: data.into(),
            }],
        })
    }
}

// --- Inbound ---

/// A frame received from the server. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerFrame {
    pub setup_complete: Option<Value>,
    pub usage_metadata: Option<UsageMetadata>,
    pub server_content: Option<ServerContent>,
}

/// Converts one section of a frame, logging and discarding it when it does
/// not have the expected shape. `null` counts as absent.
fn section<T: DeserializeOwned>(value: Option<&Value>, name: &'static str) -> Option<T> {
    let value = value.filter(|v| !v.is_null())?;
    match T::deserialize(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(section = name, error = %e, "Ignoring malformed frame section.");
            None
        }
    }
}

impl ServerFrame {
    /// Fails only when `raw` is not JSON at all.
    pub fn from_slice(raw: &[u8]) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_slice(raw)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        Self {
            setup_complete: value.get("setupComplete").cloned(),
            usage_metadata: section(value.get("usageMetadata"), "usageMetadata"),
            server_content: value
                .get("serverContent")
                .filter(|v| v.is_object())
                .map(ServerContent::from_value),
        }
    }

    /// `setupComplete` is usually an empty object; any value other than
    /// null, false, zero or an empty string counts as the signal.
    pub fn signals_setup_complete(&self) -> bool {
        match &self.setup_complete {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    pub fn turn_complete(&self) -> Option<bool> {
        self.server_content.as_ref().and_then(|c| c.turn_complete)
    }

    pub fn first_part(&self) -> Option<&ServerPart> {
        self.server_content
            .as_ref()
            .and_then(|c| c.model_turn.as_ref())
            .and_then(|turn| turn.parts.first())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageMetadata {
    pub prompt_token_count: Option<u64>,
    pub candidates_token_count: Option<u64>,
    pub total_token_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub turn_complete: Option<bool>,
}

impl ServerContent {
    fn from_value(value: &Value) -> Self {
        let model_turn = value.get("modelTurn").filter(|v| !v.is_null()).map(|turn| {
            let parts = match turn.get("parts") {
                Some(Value::Array(parts)) => parts.iter().map(ServerPart::from_value).collect(),
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    tracing::warn!(parts = %other, "Ignoring modelTurn parts that are not a list.");
                    Vec::new()
                }
            };
            ModelTurn { parts }
        });
        Self {
            model_turn,
            turn_complete: section(value.get("turnComplete"), "turnComplete"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerPart {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

impl ServerPart {
    fn from_value(value: &Value) -> Self {
        Self {
            text: section(value.get("text"), "text"),
            inline_data: section(value.get("inlineData"), "inlineData"),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}
