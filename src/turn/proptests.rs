//! Property-based tests for turn processing
//!
//! Random supervisor event scripts are run through a full turn against an
//! in-memory database, checking the invariants that hold for every script.

use super::marker::{strip_marker, IMAGE_MARKER};
use super::testing::{collect_turn, services_with_images, MemoryImageStore, ScriptedSource};
use super::{LiveRecord, Turn};
use crate::db::{Database, Message, StepEntry};
use crate::supervisor::AgentEvent;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

struct TurnRun {
    records: Vec<LiveRecord>,
    messages: Vec<Message>,
    images_saved: usize,
    invoke_calls: usize,
}

fn run_script(events: Vec<AgentEvent>, fallback: &str) -> TurnRun {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let db = Database::open_in_memory().unwrap();
        db.create_thread("t1", "alice", "New chat").unwrap();
        let images = Arc::new(MemoryImageStore::new());
        let source = Arc::new(ScriptedSource::new(events).with_fallback(fallback));
        let services = services_with_images(source.clone(), Arc::new(db.clone()), images.clone());

        let turn = Turn {
            thread_id: "t1".into(),
            question: "question".into(),
            image: None,
        };
        let records = collect_turn(services, turn).await;

        TurnRun {
            records,
            messages: db.get_messages("t1").unwrap(),
            images_saved: images.saved().len(),
            invoke_calls: source.invoke_calls(),
        }
    })
}

fn announced_steps(records: &[LiveRecord]) -> Vec<StepEntry> {
    records
        .iter()
        .filter_map(|record| match record {
            LiveRecord::Step(text) => Some(StepEntry::step(text.as_str())),
            LiveRecord::Observation(text) => Some(StepEntry::observation(text.as_str())),
            _ => None,
        })
        .collect()
}

fn streamed_tokens(records: &[LiveRecord]) -> String {
    records
        .iter()
        .filter_map(|record| match record {
            LiveRecord::Token(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_origin() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("LangGraph".to_string()),
        Just("supervisor".to_string()),
        Just("reliability_searcher".to_string()),
        Just("websearcher".to_string()),
        Just("coder".to_string()),
        Just("agent".to_string()),
        Just("tools".to_string()),
    ]
}

fn arb_tool() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("RS".to_string()),
        Just("TavilySearch".to_string()),
        Just("PythonREPLTool".to_string()),
        Just("calculator".to_string()),
    ]
}

fn arb_tool_output() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{0,20}",
        Just(format!("{IMAGE_MARKER} aGVsbG8=")),
        Just(format!("{IMAGE_MARKER} ***")),
        Just(IMAGE_MARKER.to_string()),
    ]
}

fn arb_event() -> impl Strategy<Value = AgentEvent> {
    prop_oneof![
        arb_origin().prop_map(|origin| AgentEvent::PhaseStart { origin }),
        arb_tool().prop_map(|tool| AgentEvent::ToolStart { tool }),
        (arb_tool(), arb_tool_output()).prop_map(|(tool, output)| AgentEvent::ToolEnd { tool, output }),
        (arb_origin(), "[a-z ]{0,6}").prop_map(|(origin, text)| AgentEvent::TokenChunk { origin, text }),
    ]
}

fn arb_answer() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{0,30}",
        "[a-zA-Z ]{0,30}".prop_map(|text| format!("{text} {IMAGE_MARKER} aGk=")),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Live announcements and the persisted step log are the same sequence
    #[test]
    fn prop_live_steps_match_persisted_log(
        events in proptest::collection::vec(arb_event(), 0..25),
        fallback in arb_answer(),
    ) {
        let run = run_script(events, &fallback);

        prop_assert_eq!(run.messages.len(), 2);
        prop_assert_eq!(&run.messages[1].steps, &announced_steps(&run.records));
    }

    // At most one image is stored, and it is the one the message carries
    #[test]
    fn prop_at_most_one_image(
        events in proptest::collection::vec(arb_event(), 0..25),
        fallback in arb_answer(),
    ) {
        let run = run_script(events, &fallback);

        prop_assert!(run.images_saved <= 1);
        prop_assert_eq!(run.messages[1].image.is_some(), run.images_saved == 1);
    }

    // Fallback runs exactly when nothing was streamed, and the committed
    // answer is what the client saw
    #[test]
    fn prop_fallback_iff_nothing_streamed(
        events in proptest::collection::vec(arb_event(), 0..25),
        fallback in arb_answer(),
    ) {
        let run = run_script(events, &fallback);
        let streamed = streamed_tokens(&run.records);
        let answer = &run.messages[1].content;

        prop_assert!(run.invoke_calls <= 1);
        prop_assert_eq!(&streamed, answer);
        if run.invoke_calls == 1 {
            prop_assert_eq!(answer.as_str(), strip_marker(&fallback));
        }
        prop_assert!(!answer.contains(IMAGE_MARKER));
    }

    // Done is emitted once, last, and only after the commit
    #[test]
    fn prop_done_is_last(events in proptest::collection::vec(arb_event(), 0..25)) {
        let run = run_script(events, "fallback answer");

        let done_count = run.records.iter().filter(|r| **r == LiveRecord::Done).count();
        prop_assert_eq!(done_count, 1);
        prop_assert_eq!(run.records.last(), Some(&LiveRecord::Done));
    }

    #[test]
    fn prop_strip_marker_idempotent(text in "[a-z ]{0,10}(IMAGE_DATA:[a-zA-Z0-9 ]{0,10}){0,2}") {
        let once = strip_marker(&text);
        prop_assert_eq!(strip_marker(once), once);
    }
}
