//! Gemini Live wire messages.
//!
//! Client messages are externally tagged JSON objects (`{"setup": ..}`,
//! `{"realtimeInput": ..}`). Server messages may carry several optional
//! sections at once; unknown fields are ignored.

use serde::{Deserialize, Serialize};

use crate::audio::frame::EncodedChunk;
use crate::session::config::SessionConfig;
use crate::session::transport::InboundEvent;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

impl ClientMessage {
    pub fn setup(config: &SessionConfig) -> Self {
        ClientMessage::Setup(Setup {
            model: config.model_path(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: config.instruction.clone(),
                }],
            },
        })
    }

    pub fn audio(chunk: &EncodedChunk) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: chunk.mime_type().to_string(),
                data: chunk.text().to_string(),
            }],
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelTurn {
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerPart {
    pub text: Option<String>,
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoAway {
    pub time_left: Option<String>,
}

impl ServerMessage {
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .is_some_and(|content| content.turn_complete)
    }

    /// Audio and text from every part, in order. Empty parts are skipped.
    pub fn events(&self) -> Vec<InboundEvent> {
        let Some(turn) = self
            .server_content
            .as_ref()
            .and_then(|content| content.model_turn.as_ref())
        else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for part in &turn.parts {
            if let Some(blob) = part.inline_data.as_ref().filter(|b| !b.data.is_empty()) {
                events.push(InboundEvent::Audio(blob.data.clone()));
            }
            if let Some(text) = part.text.as_ref().filter(|t| !t.is_empty()) {
                events.push(InboundEvent::Transcript(text.clone()));
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::audio::frame::AudioBuffer;

    #[test]
    fn test_setup_shape() {
        let config = SessionConfig {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".into(),
            voice: "Zephyr".into(),
            instruction: "Be helpful.".into(),
        };
        let value: Value =
            serde_json::from_str(&ClientMessage::setup(&config).to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/gemini-2.5-flash-native-audio-preview-12-2025",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Zephyr"}}
                        }
                    },
                    "systemInstruction": {"parts": [{"text": "Be helpful."}]}
                }
            })
        );
    }

    #[test]
    fn test_realtime_input_shape() {
        let chunk = EncodedChunk::encode(&AudioBuffer::<f32, 1, 16000>::mono(vec![0.0, 1.0, -1.0]));
        let value: Value =
            serde_json::from_str(&ClientMessage::audio(&chunk).to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "realtimeInput": {
                    "mediaChunks": [{"mimeType": "audio/pcm;rate=16000", "data": "AAD/fwCA"}]
                }
            })
        );
    }

    #[test]
    fn test_setup_complete() {
        let msg = ServerMessage::parse(br#"{"setupComplete": {}}"#).unwrap();
        assert!(msg.is_setup_complete());
        assert!(msg.events().is_empty());

        let msg = ServerMessage::parse(br#"{"serverContent": {"turnComplete": true}}"#).unwrap();
        assert!(!msg.is_setup_complete());
        assert!(msg.turn_complete());
    }

    #[test]
    fn test_events_from_every_part() {
        let msg = ServerMessage::parse(
            br#"{
                "serverContent": {
                    "modelTurn": {
                        "parts": [
                            {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}},
                            {"text": "Welcome to the villa tour."},
                            {"inlineData": {"data": "BBBB"}, "text": ""},
                            {}
                        ]
                    }
                },
                "usageMetadata": {"totalTokenCount": 12}
            }"#,
        )
        .unwrap();

        assert_eq!(
            msg.events(),
            vec![
                InboundEvent::Audio("AAAA".into()),
                InboundEvent::Transcript("Welcome to the villa tour.".into()),
                InboundEvent::Audio("BBBB".into()),
            ]
        );
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(ServerMessage::parse(b"not json").is_err());
    }
}
