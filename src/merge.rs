//! Folding streamed chunks into one assembled completion
//!
//! [`merge_chunk`] is a pure fold step: starting from `None`, feeding every
//! chunk of a stream in order yields a [`ChatCompletion`] equivalent to the
//! non-streamed response. Folding is batch-independent, so the assembled value
//! can be inspected (and reported) at any point of the stream.
//!
//! Fields the types do not model are folded too: text in a delta's `extra`
//! is appended like `content`, arrays extend (so `logprobs.content` grows
//! with the stream) and other values are replaced by the latest chunk.

use crate::types::{
    AssistantMessage, ChatCompletion, ChatCompletionChunk, Choice, Delta, FunctionCall,
    OBJECT_CHAT_COMPLETION, ToolCall,
};
use serde_json::{Map, Value};
use thiserror::Error;

/// Highest tool call index a delta may address
///
/// Tool call slots are dense, so the index bounds the allocation a single
/// chunk can cause.
pub const MAX_TOOL_CALL_INDEX: u32 = 1024;

/// A chunk that cannot be folded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("tool call delta in choice {choice} has no index")]
    MissingToolCallIndex { choice: u32 },

    #[error("tool call index {index} in choice {choice} is out of range")]
    ToolCallIndexOutOfRange { choice: u32, index: u32 },

    #[error("malformed chunk: {0}")]
    Malformed(String),
}

/// Fold `chunk` into `existing`, returning the updated assembled completion
///
/// # Errors
/// Returns [`MergeError`] if the chunk has a shape that cannot be merged.
pub fn merge_chunk(
    existing: Option<ChatCompletion>,
    chunk: &ChatCompletionChunk,
) -> Result<ChatCompletion, MergeError> {
    let mut assembled = existing;
    merge_into(&mut assembled, chunk)?;
    // merge_into always leaves Some after a successful merge
    assembled.ok_or_else(|| MergeError::Malformed("chunk produced no completion".to_string()))
}

/// Fold `chunk` into `assembled` in place
///
/// The chunk is validated before anything is written, so on error
/// `assembled` is left exactly as it was.
pub fn merge_into(
    assembled: &mut Option<ChatCompletion>,
    chunk: &ChatCompletionChunk,
) -> Result<(), MergeError> {
    validate(chunk)?;

    let completion = assembled.get_or_insert_with(|| start_completion(chunk));

    for choice_delta in &chunk.choices {
        let choice = choice_slot(&mut completion.choices, choice_delta.index);
        apply_delta(&mut choice.message, &choice_delta.delta);
        if let Some(reason) = &choice_delta.finish_reason {
            choice.finish_reason = Some(reason.clone());
        }
        merge_extra(&mut choice.extra, &choice_delta.extra, false);
    }

    if let Some(usage) = &chunk.usage {
        completion.usage = Some(usage.clone());
    }
    if completion.system_fingerprint.is_none() {
        completion.system_fingerprint = chunk.system_fingerprint.clone();
    }
    merge_extra(&mut completion.extra, &chunk.extra, false);

    Ok(())
}

/// Fold a raw JSON chunk
///
/// # Errors
/// Returns [`MergeError::Malformed`] if `chunk` does not have the shape of a
/// chat completion chunk.
pub fn merge_value(
    existing: Option<ChatCompletion>,
    chunk: &Value,
) -> Result<ChatCompletion, MergeError> {
    let chunk: ChatCompletionChunk = serde_json::from_value(chunk.clone())
        .map_err(|e| MergeError::Malformed(e.to_string()))?;
    merge_chunk(existing, &chunk)
}

/// Fold a whole sequence of chunks, `None` when the sequence is empty
pub fn merge_chunks<'a, I>(chunks: I) -> Result<Option<ChatCompletion>, MergeError>
where
    I: IntoIterator<Item = &'a ChatCompletionChunk>,
{
    let mut assembled = None;
    for chunk in chunks {
        merge_into(&mut assembled, chunk)?;
    }
    Ok(assembled)
}

fn validate(chunk: &ChatCompletionChunk) -> Result<(), MergeError> {
    for choice in &chunk.choices {
        for call in choice.delta.tool_calls.iter().flatten() {
            match call.index {
                None => {
                    return Err(MergeError::MissingToolCallIndex {
                        choice: choice.index,
                    });
                }
                Some(index) if index > MAX_TOOL_CALL_INDEX => {
                    return Err(MergeError::ToolCallIndexOutOfRange {
                        choice: choice.index,
                        index,
                    });
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

fn start_completion(chunk: &ChatCompletionChunk) -> ChatCompletion {
    ChatCompletion {
        id: chunk.id.clone(),
        object: OBJECT_CHAT_COMPLETION.to_string(),
        created: chunk.created,
        model: chunk.model.clone(),
        choices: Vec::new(),
        usage: None,
        system_fingerprint: chunk.system_fingerprint.clone(),
        extra: Map::new(),
    }
}

/// Choice with the given index, inserted in index order when new
fn choice_slot(choices: &mut Vec<Choice>, index: u32) -> &mut Choice {
    let pos = match choices.iter().position(|c| c.index == index) {
        Some(pos) => pos,
        None => {
            let pos = choices.partition_point(|c| c.index < index);
            choices.insert(
                pos,
                Choice {
                    index,
                    message: AssistantMessage::empty(),
                    finish_reason: None,
                    extra: Map::new(),
                },
            );
            pos
        }
    };
    &mut choices[pos]
}

fn apply_delta(message: &mut AssistantMessage, delta: &Delta) {
    if delta.is_empty() {
        return;
    }

    if let Some(role) = delta.role {
        message.role = role;
    }

    if let Some(content) = &delta.content {
        message
            .content
            .get_or_insert_with(String::new)
            .push_str(content);
    }

    if let Some(fragment) = &delta.function_call {
        let call = message
            .function_call
            .get_or_insert_with(FunctionCall::default);
        if let Some(name) = &fragment.name {
            call.name.push_str(name);
        }
        if let Some(arguments) = &fragment.arguments {
            call.arguments.push_str(arguments);
        }
    }

    merge_extra(&mut message.extra, &delta.extra, true);

    for fragment in delta.tool_calls.iter().flatten() {
        // validated: every tool call delta carries an index in range
        let Some(index) = fragment.index else {
            continue;
        };
        let calls = message.tool_calls.get_or_insert_with(Vec::new);
        let slot = index as usize;
        while calls.len() <= slot {
            calls.push(ToolCall {
                id: String::new(),
                kind: "function".to_string(),
                function: FunctionCall::default(),
            });
        }
        let call = &mut calls[slot];

        if let Some(id) = &fragment.id {
            call.id = id.clone();
        }
        if let Some(kind) = &fragment.kind {
            call.kind = kind.clone();
        }
        if let Some(function) = &fragment.function {
            if let Some(name) = &function.name {
                call.function.name.push_str(name);
            }
            if let Some(arguments) = &function.arguments {
                call.function.arguments.push_str(arguments);
            }
        }
    }
}

/// Fold unmodelled fields of a chunk into the assembled object
///
/// Nulls only fill absent keys, objects merge key by key and arrays extend.
/// Strings are appended when `append_text` is set, otherwise they replace
/// like any other value.
fn merge_extra(target: &mut Map<String, Value>, fragment: &Map<String, Value>, append_text: bool) {
    for (key, value) in fragment {
        let Some(existing) = target.get_mut(key) else {
            target.insert(key.clone(), value.clone());
            continue;
        };
        match (existing, value) {
            (_, Value::Null) => {}
            (Value::String(existing), Value::String(text)) if append_text => {
                existing.push_str(text);
            }
            (Value::Array(existing), Value::Array(items)) => {
                existing.extend(items.iter().cloned());
            }
            (Value::Object(existing), Value::Object(fields)) => {
                merge_extra(existing, fields, append_text);
            }
            (existing, value) => *existing = value.clone(),
        }
    }
}
