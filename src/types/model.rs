//! Model types and invocation parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of model kinds a handler can be registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelType {
    /// Small text generation
    #[serde(rename = "TEXT_SMALL")]
    TextSmall,
    /// Large text generation
    #[serde(rename = "TEXT_LARGE")]
    TextLarge,
    /// Text embedding
    #[serde(rename = "TEXT_EMBEDDING")]
    TextEmbedding,
    /// Tokenizer encode
    #[serde(rename = "TEXT_TOKENIZER_ENCODE")]
    TextTokenizerEncode,
    /// Tokenizer decode
    #[serde(rename = "TEXT_TOKENIZER_DECODE")]
    TextTokenizerDecode,
    /// Small reasoning tier
    #[serde(rename = "REASONING_SMALL")]
    ReasoningSmall,
    /// Large reasoning tier
    #[serde(rename = "REASONING_LARGE")]
    ReasoningLarge,
    /// Plain text completion
    #[serde(rename = "TEXT_COMPLETION")]
    TextCompletion,
    /// Image generation
    #[serde(rename = "IMAGE")]
    Image,
    /// Image description
    #[serde(rename = "IMAGE_DESCRIPTION")]
    ImageDescription,
    /// Audio transcription
    #[serde(rename = "TRANSCRIPTION")]
    Transcription,
    /// Speech synthesis
    #[serde(rename = "TEXT_TO_SPEECH")]
    TextToSpeech,
    /// Audio generation
    #[serde(rename = "AUDIO")]
    Audio,
    /// Video generation
    #[serde(rename = "VIDEO")]
    Video,
    /// Small structured-object generation
    #[serde(rename = "OBJECT_SMALL")]
    ObjectSmall,
    /// Large structured-object generation
    #[serde(rename = "OBJECT_LARGE")]
    ObjectLarge,
}

impl ModelType {
    /// Every model type, in declaration order
    pub const ALL: [ModelType; 16] = [
        ModelType::TextSmall,
        ModelType::TextLarge,
        ModelType::TextEmbedding,
        ModelType::TextTokenizerEncode,
        ModelType::TextTokenizerDecode,
        ModelType::ReasoningSmall,
        ModelType::ReasoningLarge,
        ModelType::TextCompletion,
        ModelType::Image,
        ModelType::ImageDescription,
        ModelType::Transcription,
        ModelType::TextToSpeech,
        ModelType::Audio,
        ModelType::Video,
        ModelType::ObjectSmall,
        ModelType::ObjectLarge,
    ];

    /// Wire name, e.g. `TEXT_LARGE`
    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::TextSmall => "TEXT_SMALL",
            ModelType::TextLarge => "TEXT_LARGE",
            ModelType::TextEmbedding => "TEXT_EMBEDDING",
            ModelType::TextTokenizerEncode => "TEXT_TOKENIZER_ENCODE",
            ModelType::TextTokenizerDecode => "TEXT_TOKENIZER_DECODE",
            ModelType::ReasoningSmall => "REASONING_SMALL",
            ModelType::ReasoningLarge => "REASONING_LARGE",
            ModelType::TextCompletion => "TEXT_COMPLETION",
            ModelType::Image => "IMAGE",
            ModelType::ImageDescription => "IMAGE_DESCRIPTION",
            ModelType::Transcription => "TRANSCRIPTION",
            ModelType::TextToSpeech => "TEXT_TO_SPEECH",
            ModelType::Audio => "AUDIO",
            ModelType::Video => "VIDEO",
            ModelType::ObjectSmall => "OBJECT_SMALL",
            ModelType::ObjectLarge => "OBJECT_LARGE",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        ModelType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| format!("unknown model type: {}", s))
    }
}

/// Parameters for text generation models.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTextParams {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Parameters for the embedding model.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEmbeddingParams {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_wire_names_match_serde() {
        for model_type in ModelType::ALL {
            let json = serde_json::to_string(&model_type).unwrap();
            assert_eq!(json, format!("\"{}\"", model_type.as_str()));
            assert_eq!(model_type.as_str().parse::<ModelType>(), Ok(model_type));
        }
    }

    #[test]
    fn test_model_type_parse_is_case_insensitive() {
        assert_eq!("text_large".parse::<ModelType>(), Ok(ModelType::TextLarge));
        assert!("TEXT_HUGE".parse::<ModelType>().is_err());
    }
}
