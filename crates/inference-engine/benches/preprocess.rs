use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, ImageBuffer, Rgb};
use inference_engine::{argmax, prepare};

fn bench_prepare(c: &mut Criterion) {
    let photo = DynamicImage::ImageRgb8(ImageBuffer::from_fn(1280, 960, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    }));

    c.bench_function("prepare_1280x960", |b| b.iter(|| prepare(black_box(&photo))));
}

fn bench_argmax(c: &mut Criterion) {
    let scores = [0.12f32, 0.61, 0.2, 0.07];
    c.bench_function("argmax_4", |b| b.iter(|| argmax(black_box(&scores))));
}

criterion_group!(benches, bench_prepare, bench_argmax);
criterion_main!(benches);
