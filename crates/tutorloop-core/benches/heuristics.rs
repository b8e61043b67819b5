use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tutorloop_core::heuristic::HeuristicValidator;
use tutorloop_core::judgment::interpret_response;
use tutorloop_core::model::{AnswerAttempt, DifficultyTier, Expected, Item, ItemType};

fn item(expected: Expected, item_type: ItemType, options: &[&str]) -> Item {
    Item {
        id: "bench".into(),
        prompt: "bench".into(),
        item_type,
        tier: DifficultyTier::Medium,
        topic: "bench".into(),
        expected,
        options: options.iter().map(|o| o.to_string()).collect(),
        marks: 1,
    }
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("heuristic_validate");
    let validator = HeuristicValidator::new();

    let choice = item(
        Expected::Answer("B".into()),
        ItemType::MultipleChoice,
        &["1/3", "1/2", "2/3", "3/4"],
    );
    let attempt = AnswerAttempt::new("bench", "b", Duration::from_secs(1));
    group.bench_function("multiple_choice", |b| {
        b.iter(|| validator.validate(black_box(&choice), black_box(&attempt)))
    });

    let numeric = item(Expected::Answer("7/12".into()), ItemType::FreeForm, &[]);
    let attempt = AnswerAttempt::new(
        "bench",
        "1/3 + 1/4 = 4/12 + 3/12 = 0.5833333333",
        Duration::from_secs(1),
    );
    group.bench_function("free_form_numeric", |b| {
        b.iter(|| validator.validate(black_box(&numeric), black_box(&attempt)))
    });

    let steps = item(
        Expected::Steps(vec!["2x = 10".into(), "x = 5".into()]),
        ItemType::FreeForm,
        &[],
    );
    let attempt = AnswerAttempt::new(
        "bench",
        "2x + 3 = 13, so 2x = 10 and then x = 6",
        Duration::from_secs(1),
    );
    group.bench_function("free_form_steps", |b| {
        b.iter(|| validator.validate(black_box(&steps), black_box(&attempt)))
    });

    group.finish();
}

fn bench_interpret(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpret_response");

    let fenced = "Here is my assessment:\n\n```json\n{\"correct\": false, \"error_kind\": \"conceptual\", \"feedback\": \"Add numerators only after finding a common denominator.\"}\n```\n";
    let bare = "{\"correct\": true, \"error_kind\": \"none\", \"feedback\": \"Well done.\"}";
    let prose = "Not quite. The student added the denominators, which is incorrect; the right answer is 7/12.";

    group.bench_function("fenced", |b| b.iter(|| interpret_response(black_box(fenced))));
    group.bench_function("bare", |b| b.iter(|| interpret_response(black_box(bare))));
    group.bench_function("prose", |b| b.iter(|| interpret_response(black_box(prose))));

    group.finish();
}

criterion_group!(benches, bench_validate, bench_interpret);
criterion_main!(benches);
