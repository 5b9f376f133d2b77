use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const CHUNK_OBJECT: &str = "chat.completion.chunk";
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format; expecting parts with \"text\"";

/// Deserializes a field that is dropped to `None` when it has the wrong
/// shape, so one odd field does not reject the whole body.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingPart {
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub parts: Option<Vec<IncomingPart>>,
}

/// Body accepted on `POST /api/stream`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub new_message: Option<IncomingMessage>,
    #[serde(default, deserialize_with = "lenient")]
    pub new_message_content: Option<IncomingMessage>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub session_id: Option<String>,
}

impl IncomingPayload {
    /// Text parts of the message, `newMessage` taking precedence over
    /// `newMessageContent`. `None` when neither shape carries a parts list.
    pub fn text_parts(&self) -> Option<Vec<TextPart>> {
        let parts = self
            .new_message
            .as_ref()
            .and_then(|m| m.parts.as_ref())
            .or_else(|| {
                self.new_message_content
                    .as_ref()
                    .and_then(|m| m.parts.as_ref())
            })?;
        Some(
            parts
                .iter()
                .map(|p| TextPart {
                    text: p.text.clone(),
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub parts: Vec<TextPart>,
}

/// Body of the upstream `POST /run_sse` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSseRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub new_message: UpstreamMessage,
}

impl RunSseRequest {
    pub fn new(app_name: &str, user_id: &str, session_id: &str, parts: Vec<TextPart>) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            new_message: UpstreamMessage {
                role: "user".to_string(),
                parts,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub delta: Delta,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// OpenAI-style streaming chunk sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            object: CHUNK_OBJECT.to_string(),
            choices: vec![ChunkChoice {
                delta: Delta {
                    content: Some(text.into()),
                },
                index: 0,
                finish_reason: None,
            }],
        }
    }

    pub fn first_content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
