use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stillwatch::analysis::{BackgroundModel, ForegroundDetector, Preprocessor, Sample};
use stillwatch::capture::Frame;

const W: u32 = 160;
const H: u32 = 120;

fn background(n: usize) -> BackgroundModel {
    let mut model = BackgroundModel::new(n);
    for i in 0..n {
        let data = (0..(W * H * 3) as usize)
            .map(|p| ((p * 7 + i * 13) % 11) as f32 + 100.0)
            .collect();
        model.push(Sample::from_values(W, H, 3, data));
    }
    model
}

fn bench_stats(c: &mut Criterion) {
    let model = background(60);
    c.bench_function("background_stats_60x160x120x3", |b| {
        b.iter(|| black_box(model.stats()))
    });
}

fn bench_score(c: &mut Criterion) {
    let model = background(60);
    let stats = model.stats();
    let sample = Sample::filled(W, H, 3, 104.0);
    c.bench_function("foreground_score_160x120x3", |b| {
        b.iter(|| black_box(ForegroundDetector::score(&stats, &sample, 4.0)))
    });
}

fn bench_preprocess(c: &mut Criterion) {
    let frame = Frame::filled(2592, 1944, 3, 120, 1);
    let preprocessor = Preprocessor::default();
    c.bench_function("preprocess_2592x1944_to_160x120", |b| {
        b.iter(|| black_box(preprocessor.process(&frame)))
    });
}

criterion_group!(benches, bench_stats, bench_score, bench_preprocess);
criterion_main!(benches);
