//! OpenAI-compatible chat completion types
//!
//! These types follow the OpenAI Chat Completions API. Every object a
//! provider may extend (completion, choice, message, delta, usage) keeps the
//! fields it does not model in `extra`, so responses and chunks pass through
//! unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// OpenAI API Object Type Constants
// =============================================================================

/// Object type for non-streaming chat completion responses
pub const OBJECT_CHAT_COMPLETION: &str = "chat.completion";
/// Object type for streaming chat completion chunks
pub const OBJECT_CHAT_COMPLETION_CHUNK: &str = "chat.completion.chunk";

// =============================================================================
// Shared Types
// =============================================================================

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    Function,
}

/// Finish reason for a completion choice
///
/// Reasons outside the OpenAI set (`"eos"` and the like from compatible
/// servers) are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    FunctionCall,
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::FunctionCall => "function_call",
            FinishReason::Other(reason) => reason,
        }
    }
}

impl From<String> for FinishReason {
    fn from(reason: String) -> Self {
        match reason.as_str() {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            "tool_calls" => FinishReason::ToolCalls,
            "function_call" => FinishReason::FunctionCall,
            _ => FinishReason::Other(reason),
        }
    }
}

impl From<FinishReason> for String {
    fn from(reason: FinishReason) -> Self {
        match reason {
            FinishReason::Other(reason) => reason,
            known => known.as_str().to_string(),
        }
    }
}

/// Usage statistics for a chat completion response.
///
/// Token breakdowns (`prompt_tokens_details` and friends) land in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Usage {
    /// Create usage stats from token counts.
    ///
    /// Automatically calculates `total_tokens` as `prompt_tokens + completion_tokens`.
    #[inline]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            extra: Map::new(),
        }
    }

    /// Returns the number of tokens in the prompt.
    #[inline]
    pub fn prompt_tokens(&self) -> u32 {
        self.prompt_tokens
    }

    /// Returns the number of tokens in the completion.
    #[inline]
    pub fn completion_tokens(&self) -> u32 {
        self.completion_tokens
    }

    /// Returns the total number of tokens as reported.
    #[inline]
    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }
}

/// Function invocation produced by the model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Tool call produced by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

// =============================================================================
// Chat Completion Response (Non-Streaming)
// =============================================================================

/// Assistant message in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssistantMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::empty()
        }
    }

    /// An assistant message with no content yet
    pub fn empty() -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            function_call: None,
            tool_calls: None,
            extra: Map::new(),
        }
    }
}

/// A single choice in the response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletion {
    /// Content of the first choice, if any
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .iter()
            .find(|c| c.index == 0)
            .and_then(|c| c.message.content.as_deref())
    }
}

// =============================================================================
// Chat Completion Chunk (Streaming)
// =============================================================================

/// Partial function call in a streaming delta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Partial tool call in a streaming delta
///
/// `index` addresses the tool call being assembled. OpenAI always sends it;
/// a delta without one cannot be merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallDelta>,
}

/// Delta content in a streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<DeltaToolCall>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Delta {
    /// True when the delta carries nothing to merge
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.content.is_none()
            && self.function_call.is_none()
            && self.tool_calls.is_none()
            && self.extra.is_empty()
    }
}

/// A single choice in a streaming chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// OpenAI-compatible streaming chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionChunk {
    fn with_choice(id: &str, model: &str, created: i64, choice: ChunkChoice) -> Self {
        Self {
            id: id.to_string(),
            object: OBJECT_CHAT_COMPLETION_CHUNK.to_string(),
            created,
            model: model.to_string(),
            choices: vec![choice],
            usage: None,
            system_fingerprint: None,
            extra: Map::new(),
        }
    }

    /// Create an initial chunk with role announcement
    pub fn initial(id: &str, model: &str, created: i64) -> Self {
        Self::with_choice(
            id,
            model,
            created,
            ChunkChoice {
                delta: Delta {
                    role: Some(MessageRole::Assistant),
                    ..Delta::default()
                },
                ..ChunkChoice::default()
            },
        )
    }

    /// Create a content chunk
    pub fn content(id: &str, model: &str, created: i64, content: &str) -> Self {
        Self::with_choice(
            id,
            model,
            created,
            ChunkChoice {
                delta: Delta {
                    content: Some(content.to_string()),
                    ..Delta::default()
                },
                ..ChunkChoice::default()
            },
        )
    }

    /// Create a final chunk with finish reason
    pub fn finish(id: &str, model: &str, created: i64, reason: FinishReason) -> Self {
        Self::with_choice(
            id,
            model,
            created,
            ChunkChoice {
                finish_reason: Some(reason),
                ..ChunkChoice::default()
            },
        )
    }

    /// Move every choice of this chunk to the given index
    pub fn at_index(mut self, index: u32) -> Self {
        for choice in &mut self.choices {
            choice.index = index;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_deserializes_openai_shape() {
        let raw = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "delta": {"role": "assistant", "content": "Hel"},
                "finish_reason": null
            }]
        });
        let chunk: ChatCompletionChunk = serde_json::from_value(raw).unwrap();
        assert_eq!(chunk.choices[0].delta.role, Some(MessageRole::Assistant));
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn test_chunk_tool_call_delta_deserializes() {
        let raw = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{
                    "index": 0,
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"ci"}
                }]},
                "finish_reason": null
            }]
        });
        let chunk: ChatCompletionChunk = serde_json::from_value(raw).unwrap();
        let calls = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, Some(0));
        assert_eq!(calls[0].kind.as_deref(), Some("function"));
        assert_eq!(
            calls[0].function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"ci")
        );
    }

    #[test]
    fn test_completion_keeps_unknown_fields() {
        let raw = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4",
            "service_tier": "default",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        });
        let completion: ChatCompletion = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(completion.first_content(), Some("hi"));
        assert_eq!(completion.extra.get("service_tier"), Some(&json!("default")));
        assert_eq!(serde_json::to_value(&completion).unwrap(), raw);
    }

    #[test]
    fn test_finish_reason_snake_case() {
        assert_eq!(
            serde_json::to_value(FinishReason::ToolCalls).unwrap(),
            json!("tool_calls")
        );
        assert_eq!(
            serde_json::from_value::<FinishReason>(json!("content_filter")).unwrap(),
            FinishReason::ContentFilter
        );
    }

    #[test]
    fn test_unknown_finish_reason_kept_verbatim() {
        let reason: FinishReason = serde_json::from_value(json!("eos")).unwrap();
        assert_eq!(reason, FinishReason::Other("eos".to_string()));
        assert_eq!(serde_json::to_value(&reason).unwrap(), json!("eos"));
        assert_eq!(reason.as_str(), "eos");
    }

    #[test]
    fn test_nested_unknown_fields_round_trip() {
        let raw = json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "hi",
                    "refusal": null,
                    "annotations": []
                },
                "logprobs": null,
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 3,
                "completion_tokens": 1,
                "total_tokens": 4,
                "prompt_tokens_details": {"cached_tokens": 0, "audio_tokens": 0},
                "completion_tokens_details": {"reasoning_tokens": 0}
            },
            "service_tier": "default",
            "system_fingerprint": "fp_1"
        });
        let completion: ChatCompletion = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(completion.choices[0].extra.get("logprobs"), Some(&Value::Null));
        assert_eq!(
            completion.choices[0].message.extra.get("annotations"),
            Some(&json!([]))
        );
        assert_eq!(serde_json::to_value(&completion).unwrap(), raw);
    }

    #[test]
    fn test_chunk_nested_unknown_fields_round_trip() {
        let raw = json!({
            "id": "chatcmpl-3",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "deepseek-reasoner",
            "choices": [{
                "index": 0,
                "delta": {"reasoning_content": "Let me think"},
                "logprobs": null,
                "finish_reason": "eos"
            }],
            "obfuscation": "xyz"
        });
        let chunk: ChatCompletionChunk = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(
            chunk.choices[0].finish_reason,
            Some(FinishReason::Other("eos".to_string()))
        );
        assert!(!chunk.choices[0].delta.is_empty());
        assert_eq!(serde_json::to_value(&chunk).unwrap(), raw);
    }

    #[test]
    fn test_usage_new_sums_total() {
        let usage = Usage::new(10, 5);
        assert_eq!(usage.total_tokens(), 15);
        assert_eq!(usage.prompt_tokens(), 10);
        assert_eq!(usage.completion_tokens(), 5);
    }

    #[test]
    fn test_delta_is_empty() {
        assert!(Delta::default().is_empty());
        let delta = Delta {
            content: Some(String::new()),
            ..Delta::default()
        };
        assert!(!delta.is_empty());
    }

    #[test]
    fn test_chunk_constructors_share_metadata() {
        let initial = ChatCompletionChunk::initial("id-1", "gpt-4", 7);
        let content = ChatCompletionChunk::content("id-1", "gpt-4", 7, "x");
        let finish = ChatCompletionChunk::finish("id-1", "gpt-4", 7, FinishReason::Stop);
        for chunk in [&initial, &content, &finish] {
            assert_eq!(chunk.object, OBJECT_CHAT_COMPLETION_CHUNK);
            assert_eq!(chunk.id, "id-1");
            assert_eq!(chunk.created, 7);
        }
        assert_eq!(finish.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(content.at_index(2).choices[0].index, 2);
    }
}
