//! End-to-end behaviour of the turn coordinator against a scripted provider.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use fr_domain::config::TurnConfig;
use fr_domain::wire::{TurnUpdate, WireEvent};
use fr_gateway::runtime::normalizer::{NO_FINAL_STATUS_MESSAGE, TIMEOUT_MESSAGE};
use fr_gateway::runtime::{TurnError, TurnRequest};
use fr_gateway::store::CitationStore;
use fr_providers::{AnnotationKind, RunEvent, RunStatus, ThreadMessage};

fn request(message: &str) -> TurnRequest {
    TurnRequest {
        thread_id: THREAD.into(),
        user_id: OWNER.into(),
        message: message.into(),
        assistant_id: ASSISTANT.into(),
    }
}

fn updates(events: &[WireEvent]) -> Vec<&TurnUpdate> {
    events
        .iter()
        .filter_map(|e| match e {
            WireEvent::Update(u) => Some(u),
            _ => None,
        })
        .collect()
}

fn marker_count(text: &str) -> usize {
    (1..=50).filter(|n| text.contains(&format!("[{n}]"))).count()
}

async fn wait_for_cancel(provider: &FakeProvider) {
    for _ in 0..200 {
        if provider.cancel_count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run was never cancelled");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Completed turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn cited_answer_streams_steps_then_enriched_final_update() {
    let chunk = "<<4>> Torque the flange bolts to 12 Nm. <<5>>";
    let h = harness(
        FakeProvider::with_events(cited_answer("file_1"))
            .file("file_1", "Service Manual.pdf")
            .steps(vec![search_step("file_1", 0.82, chunk)]),
    );

    let rx = h.coordinator.start(request("torque?")).await.unwrap();
    let events = collect(rx).await;

    assert_eq!(events.last(), Some(&WireEvent::Done));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let ups = updates(&events);
    assert_eq!(ups[0].step, "PROCESSING...");
    let searching = ups.iter().position(|u| u.step == "SEARCHING DOCUMENTS...").unwrap();
    let generating = ups.iter().position(|u| u.step == "GENERATING RESPONSE...").unwrap();
    assert!(searching < generating);

    // Streaming content only grows until the message completes.
    for pair in ups.windows(2) {
        if pair[1].step != "COMPLETE" {
            assert!(pair[1].content.starts_with(&pair[0].content));
        }
    }

    let last = ups.last().unwrap();
    assert_eq!(last.step, "COMPLETE");
    assert_eq!(last.content, "Torque is 12 Nm[1].");
    assert_eq!(last.citation_data.len(), marker_count(&last.content));
    assert_eq!(last.openai_message_id.as_deref(), Some("msg_1"));
    assert_eq!(last.citations, vec![format!("[1] {MARKER}")]);

    let record = &last.citation_data[0];
    assert_eq!(record.citation_number, 1);
    assert_eq!(record.file_name.as_deref(), Some("Service Manual.pdf"));
    assert_eq!(record.full_chunk_content.as_deref(), Some(chunk));
    assert_eq!(record.relevance_score, Some(0.82));

    assert_eq!(last.sources.len(), 1);
    assert_eq!(last.sources[0].document_name, "Service Manual.pdf");
    assert_eq!((last.sources[0].page_start, last.sources[0].page_end), (4, 5));

    assert_eq!(persisted(&h.citations, "msg_1").await, last.citation_data);
    assert_eq!(*h.provider.appended.lock(), vec!["torque?".to_string()]);
    assert_eq!(h.provider.cancel_count(), 0);
}

#[tokio::test]
async fn labels_show_marker_while_records_keep_provider_quote() {
    let mut events = cited_answer("file_1");
    for event in &mut events {
        if let RunEvent::MessageDone { message } = event {
            message.annotations[0].kind = AnnotationKind::FileCitation {
                file_id: "file_1".into(),
                quote: Some("tighten to 12 Nm".into()),
            };
        }
    }
    let h = harness(FakeProvider::with_events(events));

    let events = collect(h.coordinator.start(request("torque?")).await.unwrap()).await;

    let last = *updates(&events).last().unwrap();
    assert_eq!(last.citations, vec![format!("[1] {MARKER}")]);
    assert_eq!(last.citation_data[0].quote, "tighten to 12 Nm");
    assert_eq!(persisted(&h.citations, "msg_1").await[0].quote, "tighten to 12 Nm");
}

#[tokio::test]
async fn failed_file_lookup_keeps_stub_lean() {
    let h = harness(
        FakeProvider::with_events(cited_answer("file_42"))
            .steps(vec![search_step("file_42", 0.5, "<<3>> pricing tiers")]),
    );

    let events = collect(h.coordinator.start(request("pricing?")).await.unwrap()).await;

    assert_eq!(events.last(), Some(&WireEvent::Done));
    let last = *updates(&events).last().unwrap();
    assert_eq!(last.citation_data.len(), 1);
    let record = &last.citation_data[0];
    assert_eq!(record.file_id, "file_42");
    assert!(!record.is_enriched());
    assert!(last.sources.is_empty());

    let stored = persisted(&h.citations, "msg_1").await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].file_name.is_none());
    assert_eq!(*h.provider.file_lookups.lock(), vec!["file_42".to_string()]);
}

#[tokio::test]
async fn answer_without_tool_calls_skips_enrichment() {
    let h = harness(FakeProvider::with_events(plain_answer()));

    let events = collect(h.coordinator.start(request("hi")).await.unwrap()).await;

    assert_eq!(events.last(), Some(&WireEvent::Done));
    let last = *updates(&events).last().unwrap();
    assert_eq!(last.content, "Hello");
    assert!(last.citations.is_empty());
    assert!(last.citation_data.is_empty());
    assert_eq!(h.provider.step_listings.load(Ordering::SeqCst), 0);
    assert!(h.provider.file_lookups.lock().is_empty());
    assert!(h.citations.is_empty());
}

#[tokio::test]
async fn step_listing_is_retried_once() {
    let provider = FakeProvider::with_events(cited_answer("file_1"))
        .file("file_1", "Manual.pdf")
        .steps(vec![search_step("file_1", 0.9, "no page markers here")]);
    provider.step_failures.store(1, Ordering::SeqCst);
    let h = harness(provider);

    let events = collect(h.coordinator.start(request("q")).await.unwrap()).await;

    let last = *updates(&events).last().unwrap();
    assert_eq!(last.citation_data[0].file_name.as_deref(), Some("Manual.pdf"));
    assert_eq!(h.provider.step_listings.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn repeated_turn_overwrites_the_same_citation_record() {
    let h = harness(
        FakeProvider::with_events(cited_answer("file_1"))
            .file("file_1", "Manual.pdf")
            .steps(vec![search_step("file_1", 0.9, "<<1>>")]),
    );

    for _ in 0..2 {
        let events = collect(h.coordinator.start(request("q")).await.unwrap()).await;
        assert_eq!(events.last(), Some(&WireEvent::Done));
        persisted(&h.citations, "msg_1").await;
    }

    let by_message = h.citations.list_for_thread(THREAD).await.unwrap();
    assert_eq!(by_message.len(), 1);
    assert_eq!(by_message["msg_1"].len(), 1);
}

#[tokio::test]
async fn multiple_messages_number_citations_across_the_turn() {
    let mut events = vec![RunEvent::RunCreated { run_id: "run_1".into() }];
    for (id, file) in [("msg_a", "file_1"), ("msg_b", "file_2")] {
        events.push(RunEvent::TextCreated);
        events.push(RunEvent::MessageDone {
            message: fr_providers::CompletedMessage {
                id: id.into(),
                text: format!("See{MARKER}"),
                annotations: vec![citation(MARKER, file)],
            },
        });
    }
    events.push(finished(RunStatus::Completed, None));
    let h = harness(FakeProvider::with_events(events));

    let out = collect(h.coordinator.start(request("q")).await.unwrap()).await;

    let last = *updates(&out).last().unwrap();
    assert_eq!(last.content, "See[1]\n\nSee[2]");
    let numbers: Vec<u32> = last.citation_data.iter().map(|c| c.citation_number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(last.openai_message_id.as_deref(), Some("msg_b"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failed turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn failed_run_ends_with_error_event() {
    let h = harness(FakeProvider::with_events(vec![
        RunEvent::RunCreated { run_id: "run_1".into() },
        RunEvent::StepCreated { step_type: "message_creation".into() },
        finished(RunStatus::Failed, Some("rate_limit_exceeded")),
    ]));

    let events = collect(h.coordinator.start(request("q")).await.unwrap()).await;

    assert_eq!(
        events.last(),
        Some(&WireEvent::error("ASSISTANT RUN FAILED: rate_limit_exceeded"))
    );
    assert!(!events.contains(&WireEvent::Done));
    assert!(h.citations.is_empty());
}

#[tokio::test]
async fn cancelled_and_expired_runs_report_their_status() {
    for (status, text) in [
        (RunStatus::Cancelled, "ASSISTANT RUN WAS CANCELLED"),
        (RunStatus::Expired, "ASSISTANT RUN ENDED WITH STATUS: expired"),
    ] {
        let h = harness(FakeProvider::with_events(vec![
            RunEvent::RunCreated { run_id: "run_1".into() },
            finished(status, None),
        ]));
        let events = collect(h.coordinator.start(request("q")).await.unwrap()).await;
        assert_eq!(events.last(), Some(&WireEvent::error(text)));
    }
}

#[tokio::test]
async fn stream_error_cancels_run_and_reports_failure() {
    let mut provider = FakeProvider::with_events(vec![RunEvent::RunCreated { run_id: "run_1".into() }]);
    provider.events.push(Item::Fail("connection reset".into()));
    let h = harness(provider);

    let events = collect(h.coordinator.start(request("q")).await.unwrap()).await;

    match events.last() {
        Some(WireEvent::Error { error }) => assert!(error.starts_with("ASSISTANT RUN FAILED: ")),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(*h.provider.cancelled.lock(), vec!["run_1".to_string()]);
}

#[tokio::test]
async fn stream_closed_without_status_is_an_error() {
    let h = harness(FakeProvider::with_events(vec![
        RunEvent::RunCreated { run_id: "run_1".into() },
        RunEvent::TextCreated,
        RunEvent::TextDelta { value: "par".into() },
    ]));

    let events = collect(h.coordinator.start(request("q")).await.unwrap()).await;

    assert_eq!(events.last(), Some(&WireEvent::error(NO_FINAL_STATUS_MESSAGE)));
}

#[tokio::test]
async fn stream_closed_after_complete_message_counts_as_completed() {
    let mut events = plain_answer();
    events.pop();
    let h = harness(FakeProvider::with_events(events));

    let out = collect(h.coordinator.start(request("q")).await.unwrap()).await;

    assert_eq!(out.last(), Some(&WireEvent::Done));
}

#[tokio::test(start_paused = true)]
async fn silent_run_times_out_and_is_cancelled() {
    let h = harness(
        FakeProvider::with_events(vec![RunEvent::RunCreated { run_id: "run_1".into() }]).hanging(),
    );

    let events = collect(h.coordinator.start(request("q")).await.unwrap()).await;

    assert_eq!(events.last(), Some(&WireEvent::error(TIMEOUT_MESSAGE)));
    assert_eq!(*h.provider.cancelled.lock(), vec!["run_1".to_string()]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guards
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn foreign_thread_is_rejected_before_any_provider_call() {
    let h = harness(FakeProvider::with_events(plain_answer()));
    let mut req = request("q");
    req.user_id = "rep_b".into();

    let err = h.coordinator.start(req).await.unwrap_err();

    assert!(matches!(err, TurnError::ThreadNotFound));
    assert!(h.provider.appended.lock().is_empty());
    assert_eq!(h.provider.streams_opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blank_message_is_a_validation_error() {
    let h = harness(FakeProvider::with_events(plain_answer()));

    let err = h.coordinator.start(request("   ")).await.unwrap_err();

    assert!(matches!(err, TurnError::Validation(ref m) if m == "message is required"));
    assert!(h.provider.appended.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_turn_on_same_thread_is_busy() {
    let config = TurnConfig {
        lock_wait_secs: 1,
        ..TurnConfig::default()
    };
    let h = harness_with(
        FakeProvider::with_events(vec![RunEvent::RunCreated { run_id: "run_1".into() }]).hanging(),
        config,
    );

    let first = h.coordinator.start(request("one")).await.unwrap();
    let err = h.coordinator.start(request("two")).await.unwrap_err();

    assert!(matches!(err, TurnError::Busy(_)));
    assert_eq!(h.provider.appended.lock().len(), 1);
    drop(first);
}

#[tokio::test]
async fn dropped_receiver_cancels_run_and_releases_thread() {
    let h = harness(
        FakeProvider::with_events(vec![
            RunEvent::RunCreated { run_id: "run_1".into() },
            RunEvent::TextCreated,
            RunEvent::TextDelta { value: "partial".into() },
        ])
        .hanging(),
    );

    let mut rx = h.coordinator.start(request("q")).await.unwrap();
    loop {
        match rx.recv().await {
            Some(WireEvent::Update(u)) if u.content == "partial" => break,
            Some(_) => continue,
            None => panic!("turn ended early"),
        }
    }
    drop(rx);

    wait_for_cancel(&h.provider).await;
    assert_eq!(*h.provider.cancelled.lock(), vec!["run_1".to_string()]);

    // The lock is free again.
    let next = h.coordinator.start(request("again")).await.unwrap();
    drop(next);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blocking turns and history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn listing() -> Vec<ThreadMessage> {
    vec![
        ThreadMessage {
            id: "msg_2".into(),
            role: "assistant".into(),
            created_at: 20,
            text: format!("Use 12 Nm{MARKER}."),
            annotations: vec![citation(MARKER, "file_1")],
        },
        ThreadMessage {
            id: "msg_1".into(),
            role: "user".into(),
            created_at: 10,
            text: "torque?".into(),
            annotations: vec![],
        },
    ]
}

#[tokio::test(start_paused = true)]
async fn blocking_turn_polls_then_returns_rewritten_messages() {
    let mut provider = FakeProvider::default();
    provider.messages = listing();
    provider
        .poll_statuses
        .lock()
        .extend([RunStatus::InProgress, RunStatus::Completed]);
    let h = harness(provider);

    let messages = h.coordinator.run_blocking(request("torque?")).await.unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "Use 12 Nm[1].");
    assert_eq!(messages[1].role, "user");
    assert_eq!(h.provider.runs_created.load(Ordering::SeqCst), 1);
    assert_eq!(h.provider.streams_opened.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn blocking_turn_reports_failed_run() {
    let provider = FakeProvider::default();
    provider.poll_statuses.lock().push_back(RunStatus::Failed);
    let h = harness(provider);

    let err = h.coordinator.run_blocking(request("q")).await.unwrap_err();

    assert!(matches!(err, TurnError::Run(ref m) if m == "ASSISTANT RUN FAILED: rate_limit_exceeded"));
}

#[tokio::test(start_paused = true)]
async fn blocking_turn_times_out_and_cancels() {
    let provider = FakeProvider::default();
    provider.poll_statuses.lock().push_back(RunStatus::InProgress);
    let h = harness(provider);

    let err = h.coordinator.run_blocking(request("q")).await.unwrap_err();

    assert!(matches!(err, TurnError::Run(ref m) if m == TIMEOUT_MESSAGE));
    assert_eq!(*h.provider.cancelled.lock(), vec!["run_1".to_string()]);
}

#[tokio::test]
async fn history_is_owner_only() {
    let mut provider = FakeProvider::default();
    provider.messages = listing();
    let h = harness(provider);

    let messages = h.coordinator.history(THREAD, OWNER).await.unwrap();
    assert_eq!(messages[0].content, "Use 12 Nm[1].");

    let err = h.coordinator.history(THREAD, "rep_b").await.unwrap_err();
    assert!(matches!(err, TurnError::ThreadNotFound));
}
