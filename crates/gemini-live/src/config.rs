//! Per-connection session configuration.

use crate::protocol::{
    AuthFrame, ClientFrame, GenerationConfig, PrebuiltVoiceConfig, ResponseModality,
    SessionSetup, SpeechConfig, SystemInstruction, TextPart, VoiceConfig,
};

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_API_HOST: &str = "us-central1-aiplatform.googleapis.com";
pub const DEFAULT_VOICE_NAME: &str = "puck";
pub const DEFAULT_LANGUAGE_CODE: &str = "en-US";

/// Everything the setup handshake needs. A copy is taken at every `connect`,
/// so edits only affect the next connection.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Address the duplex connection is opened against, usually a relay.
    pub endpoint: String,
    pub project_id: String,
    pub location: String,
    pub model: String,
    /// Host of the upstream service, advertised in the auth frame.
    pub api_host: String,
    pub response_modalities: Vec<ResponseModality>,
    pub system_instruction: String,
    pub voice_name: String,
    pub language_code: String,
    /// Send the auth frame ahead of the setup frame. Off unless the relay
    /// expects the client to supply its own token.
    pub send_auth_frame: bool,
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_response_modalities(mut self, modalities: Vec<ResponseModality>) -> Self {
        self.response_modalities = modalities;
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn with_voice(
        mut self,
        voice_name: impl Into<String>,
        language_code: impl Into<String>,
    ) -> Self {
        self.voice_name = voice_name.into();
        self.language_code = language_code.into();
        self
    }

    pub fn with_auth_frame(mut self, enabled: bool) -> Self {
        self.send_auth_frame = enabled;
        self
    }

    /// Fully qualified publisher model resource name.
    pub fn model_uri(&self) -> String {
        format!(
            "projects/{}/locations/{}/publishers/google/models/{}",
            self.project_id, self.location, self.model
        )
    }

    pub fn service_url(&self) -> String {
        format!(
            "wss://{}/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent",
            self.api_host
        )
    }

    pub fn auth_frame(&self, bearer_token: Option<String>) -> AuthFrame {
        AuthFrame {
            bearer_token,
            service_url: self.service_url(),
        }
    }

    pub fn setup_frame(&self) -> ClientFrame {
        ClientFrame::Setup(SessionSetup {
            model: self.model_uri(),
            generation_config: GenerationConfig {
                response_modalities: self.response_modalities.clone(),
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice_name.clone(),
                        },
                    },
                    language_code: self.language_code.clone(),
                },
            },
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: self.system_instruction.clone(),
                }],
            },
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_id: String::new(),
            location: DEFAULT_LOCATION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_host: DEFAULT_API_HOST.to_string(),
            response_modalities: vec![ResponseModality::Audio],
            system_instruction: String::new(),
            voice_name: DEFAULT_VOICE_NAME.to_string(),
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            send_auth_frame: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_uri_composition() {
        let config = SessionConfig::new("ws://relay", "my-project").with_model("gemini-live");
        assert_eq!(
            config.model_uri(),
            "projects/my-project/locations/us-central1/publishers/google/models/gemini-live"
        );
    }

    #[test]
    fn test_service_url_uses_api_host() {
        let config = SessionConfig {
            api_host: "europe-west4-aiplatform.googleapis.com".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.service_url(),
            "wss://europe-west4-aiplatform.googleapis.com/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent"
        );
    }

    #[test]
    fn test_setup_frame_shape() {
        let config = SessionConfig::new("ws://relay", "p")
            .with_model("m")
            .with_response_modalities(vec![ResponseModality::Text, ResponseModality::Audio])
            .with_system_instruction("Be brief.")
            .with_voice("aoede", "de-DE");

        assert_eq!(
            serde_json::to_value(config.setup_frame()).unwrap(),
            json!({
                "setup": {
                    "model": "projects/p/locations/us-central1/publishers/google/models/m",
                    "generation_config": {
                        "response_modalities": ["TEXT", "AUDIO"],
                        "speech_config": {
                            "voice_config": { "prebuilt_voice_config": { "voice_name": "aoede" } },
                            "language_code": "de-DE"
                        }
                    },
                    "system_instruction": { "parts": [{ "text": "Be brief." }] }
                }
            })
        );
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.endpoint, "ws://localhost:8080");
        assert_eq!(config.response_modalities, vec![ResponseModality::Audio]);
        assert_eq!(config.voice_name, "puck");
        assert_eq!(config.language_code, "en-US");
        assert!(!config.send_auth_frame);
    }
}
