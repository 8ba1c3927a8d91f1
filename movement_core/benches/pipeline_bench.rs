use criterion::{black_box, criterion_group, criterion_main, Criterion};
use movement_core::pipeline::{Classifier, ClassifierConfig};
use movement_core::types::{EntityId, FrameInput, KinematicsSnapshot};

/// Stand, jog, sprint and jump in a loop, `n` frames at 30 fps.
fn make_frames(n: usize) -> Vec<FrameInput> {
    (0..n)
        .map(|i| {
            let phase = i % 120;
            let speed = match phase {
                0..=29 => 0.2,
                30..=59 => 1.8,
                _ => 6.0,
            };
            let height = if (100..112).contains(&phase) { 1.45 } else { 1.8 };
            FrameInput::new(
                i as u64,
                i as f64 / 30.0,
                KinematicsSnapshot::complete(speed, speed, 0.0),
                Some(height),
            )
        })
        .collect()
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");

    let frames = make_frames(900);
    group.bench_function("single_entity_900_frames", |b| {
        b.iter(|| {
            let classifier = Classifier::new(ClassifierConfig::default()).unwrap();
            black_box(classifier.classify_batch(EntityId(0), &frames));
        });
    });

    for n in [10, 50, 200] {
        let batches: Vec<_> = (0..n).map(|i| (EntityId(i), make_frames(300))).collect();
        group.bench_function(format!("{n}_entities_parallel"), |b| {
            b.iter(|| {
                let classifier = Classifier::new(ClassifierConfig::default()).unwrap();
                black_box(classifier.classify_entities(&batches));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
