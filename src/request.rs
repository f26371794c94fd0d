//! Completion requests and reporting options
//!
//! A [`CompletionRequest`] is an open JSON object: every parameter the caller
//! sets is forwarded to the delegate as-is, except the reporting block stored
//! under [`REPORTING_OPTIONS_KEY`], which only ever reaches the report sink.

use crate::error::CompletionError;
use crate::types::MessageRole;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Request key holding the reporting options block
pub const REPORTING_OPTIONS_KEY: &str = "openpipe";

/// Caller-supplied reporting metadata
///
/// Stored verbatim; `tags` is the conventional field but any other field is
/// forwarded into the report payload unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportingOptions(Map<String, Value>);

impl ReportingOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string tag under `tags`
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let tags = self
            .0
            .entry("tags")
            .or_insert_with(|| Value::Object(Map::new()));
        if !tags.is_object() {
            *tags = Value::Object(Map::new());
        }
        if let Value::Object(tags) = tags {
            tags.insert(key.into(), Value::String(value.into()));
        }
        self
    }

    /// Set an arbitrary field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Tag value by key, if present and a string
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.0.get("tags")?.get(key)?.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for ReportingOptions {
    type Error = CompletionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(CompletionError::InvalidRequest(format!(
                "'{}' must be an object, got {}",
                REPORTING_OPTIONS_KEY, other
            ))),
        }
    }
}

/// Chat completion request with arbitrary named parameters
///
/// # Examples
///
/// ```
/// use openpipe::request::CompletionRequest;
///
/// let request = CompletionRequest::new("openpipe:my-model")
///     .system_message("You are helpful.")
///     .user_message("Hello!")
///     .param("temperature", 0.2)
///     .tag("prompt_id", "greeting");
///
/// assert_eq!(request.model(), "openpipe:my-model");
/// assert!(!request.is_stream());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionRequest(Map<String, Value>);

impl CompletionRequest {
    /// Create a request for the given model with no messages
    pub fn new(model: impl Into<String>) -> Self {
        let mut params = Map::new();
        params.insert("model".to_string(), Value::String(model.into()));
        params.insert("messages".to_string(), Value::Array(Vec::new()));
        Self(params)
    }

    /// Requested model identifier (empty when absent)
    pub fn model(&self) -> &str {
        self.0.get("model").and_then(Value::as_str).unwrap_or("")
    }

    /// Whether the caller asked for a streamed response
    pub fn is_stream(&self) -> bool {
        self.0.get("stream").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Append a message
    pub fn message(mut self, role: MessageRole, content: impl Into<String>) -> Self {
        let message = json!({ "role": role, "content": content.into() });
        match self.0.get_mut("messages") {
            Some(Value::Array(messages)) => messages.push(message),
            _ => {
                self.0
                    .insert("messages".to_string(), Value::Array(vec![message]));
            }
        }
        self
    }

    /// Append a system message (convenience method)
    pub fn system_message(self, content: impl Into<String>) -> Self {
        self.message(MessageRole::System, content)
    }

    /// Append a user message (convenience method)
    pub fn user_message(self, content: impl Into<String>) -> Self {
        self.message(MessageRole::User, content)
    }

    /// Enable or disable streaming
    pub fn stream(self, stream: bool) -> Self {
        self.param("stream", stream)
    }

    /// Set any request parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Attach reporting options, replacing any existing block
    pub fn reporting_options(mut self, options: ReportingOptions) -> Self {
        self.0
            .insert(REPORTING_OPTIONS_KEY.to_string(), Value::Object(options.0));
        self
    }

    /// Add a reporting tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let options = match self.0.remove(REPORTING_OPTIONS_KEY) {
            Some(Value::Object(map)) => ReportingOptions(map),
            _ => ReportingOptions::default(),
        };
        self.reporting_options(options.with_tag(key, value))
    }

    /// Remove the reporting block, returning the request to forward and the options
    ///
    /// # Errors
    /// Returns [`CompletionError::InvalidRequest`] if the block is present but
    /// is neither an object nor null.
    pub fn split_reporting_options(
        mut self,
    ) -> Result<(CompletionRequest, ReportingOptions), CompletionError> {
        let options = match self.0.remove(REPORTING_OPTIONS_KEY) {
            Some(value) => ReportingOptions::try_from(value)?,
            None => ReportingOptions::default(),
        };
        Ok((self, options))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl TryFrom<Value> for CompletionRequest {
    type Error = CompletionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CompletionError::InvalidRequest(format!(
                "request must be a JSON object, got {}",
                other
            ))),
        }
    }
}

impl From<Map<String, Value>> for CompletionRequest {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_strips_reporting_block() {
        let request = CompletionRequest::try_from(json!({
            "model": "gpt-4",
            "messages": [],
            "openpipe": {"tags": {"prompt_id": "a"}, "cache": true}
        }))
        .unwrap();

        let (forward, options) = request.split_reporting_options().unwrap();
        assert!(forward.get(REPORTING_OPTIONS_KEY).is_none());
        assert_eq!(forward.model(), "gpt-4");
        assert_eq!(options.tag("prompt_id"), Some("a"));
        assert_eq!(options.as_map().get("cache"), Some(&json!(true)));
    }

    #[test]
    fn test_split_without_block_yields_empty_options() {
        let (_, options) = CompletionRequest::new("gpt-4")
            .split_reporting_options()
            .unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn test_split_null_block_is_empty() {
        let request =
            CompletionRequest::try_from(json!({"model": "gpt-4", "openpipe": null})).unwrap();
        let (forward, options) = request.split_reporting_options().unwrap();
        assert!(options.is_empty());
        assert!(forward.get(REPORTING_OPTIONS_KEY).is_none());
    }

    #[test]
    fn test_split_rejects_non_object_block() {
        let request =
            CompletionRequest::try_from(json!({"model": "gpt-4", "openpipe": "tags"})).unwrap();
        let err = request.split_reporting_options().unwrap_err();
        assert!(matches!(err, CompletionError::InvalidRequest(_)));
    }

    #[test]
    fn test_request_must_be_object() {
        assert!(CompletionRequest::try_from(json!(["gpt-4"])).is_err());
    }

    #[test]
    fn test_builder_appends_messages_in_order() {
        let request = CompletionRequest::new("gpt-4")
            .system_message("sys")
            .user_message("hello")
            .stream(true);
        assert!(request.is_stream());
        assert_eq!(
            request.get("messages"),
            Some(&json!([
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "hello"}
            ]))
        );
    }

    #[test]
    fn test_tag_merges_into_existing_options() {
        let request = CompletionRequest::new("gpt-4")
            .reporting_options(ReportingOptions::new().with_field("cache", json!(false)))
            .tag("a", "1")
            .tag("b", "2");
        let (_, options) = request.split_reporting_options().unwrap();
        assert_eq!(options.tag("a"), Some("1"));
        assert_eq!(options.tag("b"), Some("2"));
        assert_eq!(options.as_map().get("cache"), Some(&json!(false)));
    }

    #[test]
    fn test_model_missing_is_empty() {
        let request = CompletionRequest::try_from(json!({"messages": []})).unwrap();
        assert_eq!(request.model(), "");
    }
}
