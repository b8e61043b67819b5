use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tutorloop_core::difficulty::{next_tier, Thresholds};
use tutorloop_core::model::{
    AnswerAttempt, Confidence, DifficultyTier, ErrorKind, Expected, Item, ItemType, LogEntry,
    Verdict,
};
use tutorloop_core::statistics::ScoreAggregator;

fn make_log(len: usize) -> Vec<LogEntry> {
    (0..len)
        .map(|i| {
            let correct = i % 3 != 0;
            LogEntry {
                item: Item {
                    id: format!("q{i}"),
                    prompt: String::new(),
                    item_type: ItemType::FreeForm,
                    tier: DifficultyTier::ALL[i % 3],
                    topic: format!("topic-{}", i % 5),
                    expected: Expected::Answer("1".into()),
                    options: vec![],
                    marks: (i % 4 + 1) as u32,
                },
                attempt: AnswerAttempt::new(format!("q{i}"), "1", Duration::from_millis(500 + i as u64)),
                verdict: Verdict {
                    correct,
                    error_kind: if correct { ErrorKind::None } else { ErrorKind::Calculation },
                    feedback: String::new(),
                    confidence: Confidence::Oracle,
                },
            }
        })
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_aggregate");

    for len in [10, 100, 1000] {
        let log = make_log(len);
        group.bench_function(format!("from_log/{len}"), |b| {
            b.iter(|| ScoreAggregator::from_log(black_box(&log)).summary())
        });
    }

    group.finish();
}

fn bench_next_tier(c: &mut Criterion) {
    let thresholds = Thresholds::default();
    c.bench_function("next_tier", |b| {
        b.iter(|| {
            for accuracy in [0.1, 0.59, 0.6, 0.7, 0.8, 0.81, 1.0] {
                for tier in DifficultyTier::ALL {
                    black_box(next_tier(tier, black_box(accuracy), thresholds));
                }
            }
        })
    });
}

criterion_group!(benches, bench_aggregate, bench_next_tier);
criterion_main!(benches);
