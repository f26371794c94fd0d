//! Property tests for chunk merging
//!
//! Folding is incremental: the assembled completion does not depend on how
//! the chunk sequence is split into batches, and per-choice content is the
//! concatenation of that choice's deltas.

use openpipe::merge::{merge_chunk, merge_chunks};
use openpipe::types::{
    ChatCompletionChunk, ChunkChoice, Delta, DeltaToolCall, FinishReason, FunctionCallDelta,
    Usage,
};
use proptest::prelude::*;

fn finish_reason() -> impl Strategy<Value = Option<FinishReason>> {
    prop_oneof![
        4 => Just(None),
        1 => Just(Some(FinishReason::Stop)),
        1 => Just(Some(FinishReason::Length)),
        1 => Just(Some(FinishReason::ToolCalls)),
    ]
}

fn tool_call_delta() -> impl Strategy<Value = DeltaToolCall> {
    (
        0u32..3,
        proptest::option::of("call_[a-z0-9]{1,4}"),
        proptest::option::of("[a-z_]{1,6}"),
        proptest::option::of("[a-z0-9{}\":,]{0,6}"),
    )
        .prop_map(|(index, id, name, arguments)| DeltaToolCall {
            index: Some(index),
            kind: id.as_ref().map(|_| "function".to_string()),
            id,
            function: Some(FunctionCallDelta { name, arguments }),
        })
}

fn chunk_choice() -> impl Strategy<Value = ChunkChoice> {
    (
        0u32..3,
        proptest::option::of("[a-zA-Z ]{0,8}"),
        proptest::option::of(proptest::collection::vec(tool_call_delta(), 1..3)),
        finish_reason(),
    )
        .prop_map(|(index, content, tool_calls, finish_reason)| ChunkChoice {
            index,
            delta: Delta {
                content,
                tool_calls,
                ..Delta::default()
            },
            finish_reason,
            ..ChunkChoice::default()
        })
}

fn chunk() -> impl Strategy<Value = ChatCompletionChunk> {
    (
        proptest::collection::vec(chunk_choice(), 0..3),
        proptest::option::of((0u32..100, 0u32..100)),
    )
        .prop_map(|(choices, usage)| ChatCompletionChunk {
            choices,
            usage: usage.map(|(prompt, completion)| Usage::new(prompt, completion)),
            ..ChatCompletionChunk::initial("chatcmpl-prop", "gpt-4", 1700000000)
        })
}

proptest! {
    #[test]
    fn fold_is_batch_independent(
        chunks in proptest::collection::vec(chunk(), 1..12),
        split in 0usize..12,
    ) {
        let split = split.min(chunks.len());
        let whole = merge_chunks(&chunks).unwrap();

        let mut resumed = merge_chunks(&chunks[..split]).unwrap();
        for chunk in &chunks[split..] {
            resumed = Some(merge_chunk(resumed, chunk).unwrap());
        }

        prop_assert_eq!(whole, resumed);
    }

    #[test]
    fn content_is_concatenation_of_deltas(
        chunks in proptest::collection::vec(chunk(), 1..12),
    ) {
        let assembled = merge_chunks(&chunks).unwrap().unwrap();

        for choice in &assembled.choices {
            let expected: Option<String> = chunks
                .iter()
                .flat_map(|chunk| chunk.choices.iter())
                .filter(|delta| delta.index == choice.index)
                .filter_map(|delta| delta.delta.content.clone())
                .reduce(|mut acc, part| {
                    acc.push_str(&part);
                    acc
                });
            prop_assert_eq!(choice.message.content.clone(), expected);
        }
    }

    #[test]
    fn choices_stay_sorted_and_unique(
        chunks in proptest::collection::vec(chunk(), 1..12),
    ) {
        let assembled = merge_chunks(&chunks).unwrap().unwrap();
        let indices: Vec<u32> = assembled.choices.iter().map(|c| c.index).collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        sorted.dedup();
        prop_assert_eq!(indices, sorted);
    }

    #[test]
    fn last_usage_wins(
        chunks in proptest::collection::vec(chunk(), 1..12),
    ) {
        let assembled = merge_chunks(&chunks).unwrap().unwrap();
        let expected = chunks.iter().rev().find_map(|chunk| chunk.usage.clone());
        prop_assert_eq!(assembled.usage, expected);
    }
}
