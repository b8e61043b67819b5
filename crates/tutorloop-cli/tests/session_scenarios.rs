//! Whole-session scenarios: item bank, validation pipeline and session
//! controller wired together, graded by a scripted mock judge.

use std::sync::Arc;
use std::time::Duration;

use tutorloop_core::bank::ItemBank;
use tutorloop_core::error::{Command, SessionError};
use tutorloop_core::model::{
    Confidence, DifficultyTier, EndReason, ErrorKind, Expected, Item, ItemType, SessionMode,
    SessionStatus,
};
use tutorloop_core::{
    DiscardReason, NextStep, PipelineConfig, SessionConfig, SessionHandle, StartRequest,
    SubmitOutcome, SubmitReply, ValidationPipeline,
};
use tutorloop_judges::mock::{MockJudge, MockReply};

fn item(id: String, tier: DifficultyTier) -> Item {
    Item {
        id,
        prompt: "What is 6 * 7?".into(),
        item_type: ItemType::FreeForm,
        tier,
        topic: "arithmetic".into(),
        expected: Expected::Answer("42".into()),
        options: vec![],
        marks: 1,
    }
}

/// Ten items at every tier.
fn bank() -> ItemBank {
    let tiers = [
        DifficultyTier::Easy,
        DifficultyTier::Medium,
        DifficultyTier::Advanced,
    ];
    ItemBank::new(
        tiers
            .iter()
            .flat_map(|&tier| (0..10).map(move |n| item(format!("{tier}-{n}"), tier)))
            .collect(),
    )
}

fn session(judge: MockJudge) -> SessionHandle {
    let pipeline = ValidationPipeline::new(
        Arc::new(judge),
        PipelineConfig {
            model: "mock-model".into(),
            ..Default::default()
        },
    );
    SessionHandle::spawn(pipeline, Arc::new(bank()), SessionConfig::default())
}

fn request(item_count: Option<u32>, time_budget: Option<Duration>) -> StartRequest {
    StartRequest {
        mode: SessionMode::Practice,
        topic: "arithmetic".into(),
        item_count,
        time_budget,
        initial_tier: DifficultyTier::Easy,
        item_type: None,
    }
}

async fn judged(session: &SessionHandle, answer: &str) -> SubmitOutcome {
    match session.submit(answer).await.unwrap() {
        SubmitReply::Judged(outcome) => outcome,
        other => panic!("expected a verdict, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn one_slip_in_ten_escalates_and_scores_ninety_percent() {
    let replies = (1..=10)
        .map(|n| {
            if n == 3 {
                MockReply::verdict(false, ErrorKind::Calculation)
            } else {
                MockReply::verdict(true, ErrorKind::None)
            }
        })
        .collect();
    let session = session(MockJudge::scripted(replies));

    let first = session.start(request(Some(10), None)).await.unwrap();
    let mut tiers = vec![first.tier];
    let mut last = None;
    for _ in 0..10 {
        let outcome = judged(&session, "42").await;
        assert!(outcome.remediation.is_none());
        match &outcome.next {
            NextStep::Item(next) => tiers.push(next.tier),
            NextStep::Completed(reason) => assert_eq!(*reason, EndReason::ItemCountReached),
        }
        last = Some(outcome);
    }

    use DifficultyTier::*;
    assert_eq!(
        tiers,
        [Easy, Medium, Advanced, Advanced, Advanced, Advanced, Advanced, Advanced, Advanced, Advanced]
    );

    let summary = last.unwrap().summary;
    assert_eq!(summary.items_answered, 10);
    assert_eq!(summary.marks_obtained, 9);
    assert!((summary.accuracy - 0.9).abs() < 1e-9);

    let report = session.report().await.unwrap().unwrap();
    assert!(report.remediation_events.is_empty());
    assert_eq!(report.end_reason, Some(EndReason::ItemCountReached));
    assert_eq!(report.entries[2].verdict.error_kind, ErrorKind::Calculation);
}

#[tokio::test(start_paused = true)]
async fn two_conceptual_verdicts_trigger_remediation_once() {
    let session = session(MockJudge::scripted(vec![
        MockReply::verdict(false, ErrorKind::Conceptual),
        MockReply::verdict(false, ErrorKind::Conceptual),
    ]));
    session.start(request(None, None)).await.unwrap();

    let first = judged(&session, "41").await;
    assert!(first.remediation.is_none());

    let second = judged(&session, "40").await;
    let event = second.remediation.expect("remediation after the second conceptual error");
    assert_eq!(event.topic, "arithmetic");
    assert_eq!(event.streak, 2);
    assert_eq!(event.log_index, 1);
}

#[tokio::test(start_paused = true)]
async fn long_conceptual_streak_fires_only_at_threshold() {
    let session = session(MockJudge::scripted(vec![
        MockReply::verdict(false, ErrorKind::Conceptual);
        4
    ]));
    session.start(request(None, None)).await.unwrap();

    let mut fired = Vec::new();
    for n in 0..4 {
        if judged(&session, "41").await.remediation.is_some() {
            fired.push(n);
        }
    }
    assert_eq!(fired, [1]);
    assert_eq!(
        session.report().await.unwrap().unwrap().remediation_events.len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn heuristic_conceptual_verdicts_do_not_count_toward_remediation() {
    // An item with worked steps so the heuristic can classify the miss as conceptual.
    let steps_item = Item {
        expected: Expected::Steps(vec!["6 * 7".into(), "42".into()]),
        ..item("steps".into(), DifficultyTier::Easy)
    };
    let pipeline = ValidationPipeline::new(
        Arc::new(MockJudge::scripted(vec![MockReply::Unreachable; 2])),
        PipelineConfig::default(),
    );
    let bank = ItemBank::new(vec![
        steps_item.clone(),
        Item {
            id: "steps-2".into(),
            ..steps_item
        },
    ]);
    let session = SessionHandle::spawn(pipeline, Arc::new(bank), SessionConfig::default());
    session.start(request(None, None)).await.unwrap();

    for _ in 0..2 {
        let outcome = judged(&session, "no idea").await;
        assert_eq!(outcome.verdict.confidence, Confidence::Heuristic);
        assert_eq!(outcome.verdict.error_kind, ErrorKind::Conceptual);
        assert!(outcome.remediation.is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn unanswered_session_expires_with_zero_accuracy() {
    let judge = MockJudge::scripted(vec![]);
    let session = session(judge);
    session
        .start(request(None, Some(Duration::from_secs(30))))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.end_reason, Some(EndReason::TimeExpired));
    assert_eq!(snapshot.time_remaining_ms, Some(0));
    assert_eq!(snapshot.summary.items_answered, 0);
    assert_eq!(snapshot.summary.marks_obtained, 0);
    assert_eq!(snapshot.summary.accuracy, 0.0);
    assert!(!snapshot.summary.accuracy.is_nan());
}

#[tokio::test(start_paused = true)]
async fn late_verdict_after_pause_and_end_is_dropped() {
    let session = session(MockJudge::scripted(vec![MockReply::Delayed(
        r#"{"correct": true, "error_kind": "none", "feedback": "ok"}"#.into(),
        Duration::from_secs(5),
    )]));
    session.start(request(None, None)).await.unwrap();

    let submit = {
        let session = session.clone();
        tokio::spawn(async move { session.submit("42").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    session.pause().await.unwrap();
    let summary = session.end().await.unwrap();
    assert_eq!(summary.items_answered, 0);

    assert_eq!(
        submit.await.unwrap().unwrap(),
        SubmitReply::Discarded {
            reason: DiscardReason::Paused
        }
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(session.log().await.unwrap().is_empty());
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.end_reason, Some(EndReason::EndedByCaller));
}

#[tokio::test(start_paused = true)]
async fn every_attempt_gets_exactly_one_verdict() {
    let session = session(MockJudge::scripted(vec![
        MockReply::verdict(true, ErrorKind::None),
        MockReply::Unreachable,
        MockReply::RateLimited,
        MockReply::Text("definitely maybe".into()),
        MockReply::Text(r#"{"correct": true, "error_kind": "sloppy"}"#.into()),
        MockReply::Text(String::new()),
        MockReply::Hang,
    ]));
    session.start(request(None, None)).await.unwrap();

    for n in 1..=7 {
        judged(&session, "the answer is 42").await;
        assert_eq!(session.log().await.unwrap().len(), n);
    }

    let log = session.log().await.unwrap();
    assert_eq!(log[0].verdict.confidence, Confidence::Oracle);
    assert!(log[1..]
        .iter()
        .all(|entry| entry.verdict.confidence == Confidence::Heuristic));

    // Unreachable, rate limited, empty and hung replies fall back to the local check.
    for index in [1, 2, 5, 6] {
        assert!(log[index].verdict.correct, "entry {index} should be graded locally");
    }
    // Free text that neither affirms nor negates is not credited.
    assert!(!log[3].verdict.correct);
    assert_eq!(log[3].verdict.error_kind, ErrorKind::Unknown);
}

#[tokio::test(start_paused = true)]
async fn submit_after_completion_is_always_rejected() {
    let session = session(MockJudge::scripted(vec![MockReply::verdict(
        true,
        ErrorKind::None,
    )]));
    session.start(request(Some(1), None)).await.unwrap();
    let outcome = judged(&session, "42").await;
    assert_eq!(outcome.next, NextStep::Completed(EndReason::ItemCountReached));

    for answer in ["42", "41", "", "   ", "C"] {
        let err = session.submit(answer).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidStateTransition {
                command: Command::Submit,
                status: SessionStatus::Completed,
            }
        );
    }
    assert_eq!(session.log().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn time_remaining_never_increases_and_freezes_while_paused() {
    let session = session(MockJudge::scripted(vec![]));
    session
        .start(request(None, Some(Duration::from_secs(60))))
        .await
        .unwrap();

    let remaining = |s: tutorloop_core::SessionSnapshot| s.time_remaining_ms.unwrap();

    let mut previous = remaining(session.snapshot().await.unwrap());
    assert_eq!(previous, 60_000);
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let now = remaining(session.snapshot().await.unwrap());
        assert!(now <= previous);
        previous = now;
    }
    assert_eq!(previous, 40_000);

    session.pause().await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(remaining(session.snapshot().await.unwrap()), previous);

    session.resume().await.unwrap();
    tokio::time::sleep(Duration::from_secs(41)).await;
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.end_reason, Some(EndReason::TimeExpired));
    assert_eq!(remaining(snapshot), 0);
}
