//! Benchmarks for the image pipeline.
//!
//! Measures:
//!   1. Raw noise field synthesis per algorithm at several resolutions
//!   2. Individual pixel operations (blur, sobel, threshold, blend)
//!   3. Whole-graph evaluation: cold pass vs incremental re-evaluation
//!      after a single parameter edit
//!
//! Run with:
//!   cargo bench --bench eval_bench
//!
//! Results are written to `target/criterion/` with HTML reports.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rastergraph::buffer::ImageBuffer;
use rastergraph::nodes::{ConvolveParams, LoadImageParams, NoiseParams};
use rastergraph::noise::{NoiseAlgorithm, NoiseSynth};
use rastergraph::ops::{self, ThresholdKind};
use rastergraph::{NodeKind, PipelineGraph};

// ── Fixtures ───────────────────────────────────────────────────────

fn test_image(width: u32, height: u32) -> ImageBuffer {
    let mut buf = ImageBuffer::new(width, height, 3);
    for y in 0..height {
        for x in 0..width {
            let v = ((x ^ y) & 0xff) as u8;
            buf.pixel_mut(x, y).copy_from_slice(&[v, v.wrapping_mul(3), 255 - v]);
        }
    }
    buf
}

// ── Noise synthesis ────────────────────────────────────────────────

fn bench_noise_fields(c: &mut Criterion) {
    let mut group = c.benchmark_group("noise_field");
    for size in [128u32, 512] {
        group.throughput(Throughput::Elements(size as u64 * size as u64));
        for algorithm in [
            NoiseAlgorithm::Perlin,
            NoiseAlgorithm::Simplex,
            NoiseAlgorithm::Worley,
        ] {
            let synth = NoiseSynth {
                algorithm,
                ..NoiseSynth::default()
            };
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", algorithm), size),
                &size,
                |b, &size| b.iter(|| black_box(synth.render(size, size))),
            );
        }
    }
    group.finish();
}

// ── Pixel operations ───────────────────────────────────────────────

fn bench_pixel_ops(c: &mut Criterion) {
    let img = test_image(256, 256);
    let gray = ops::to_grayscale(&img);
    let kernel = ops::gaussian_kernel(3);

    let mut group = c.benchmark_group("pixel_ops");
    group.throughput(Throughput::Elements(256 * 256));
    group.bench_function("gaussian_blur_r3", |b| {
        b.iter(|| black_box(ops::convolve(&img, &kernel, 1.0, 0.0)))
    });
    group.bench_function("sobel_k3", |b| {
        b.iter(|| black_box(ops::sobel(&gray, true, true, 3, 1.0, 0.0)))
    });
    group.bench_function("otsu_threshold", |b| {
        b.iter(|| {
            let level = ops::otsu_level(&gray);
            black_box(ops::threshold_fixed(&gray, level, 255, ThresholdKind::Binary))
        })
    });
    group.bench_function("blend_overlay", |b| {
        b.iter(|| black_box(ops::blend(&img, &img, ops::BlendMode::Overlay)))
    });
    group.finish();
}

// ── Graph evaluation ───────────────────────────────────────────────

fn build_chain(image: ImageBuffer) -> (PipelineGraph, rastergraph::NodeId) {
    let mut graph = PipelineGraph::new();
    let src = graph.register(
        "source",
        NodeKind::LoadImage(LoadImageParams::with_image(image)),
    );
    let tone = graph.register(
        "tone",
        NodeKind::BrightnessContrast {
            brightness: 10.0,
            contrast: 1.1,
        },
    );
    let noise = graph.register("grain", NodeKind::NoiseGenerate(NoiseParams::default()));
    let sharpen = graph.register("sharpen", NodeKind::Convolve(ConvolveParams::sharpen()));
    graph.connect(tone, 0, Some(src)).unwrap();
    graph.connect(noise, 0, Some(tone)).unwrap();
    graph.connect(sharpen, 0, Some(noise)).unwrap();
    (graph, tone)
}

fn bench_graph_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_eval");

    group.bench_function("cold_chain_256", |b| {
        b.iter_batched(
            || build_chain(test_image(256, 256)).0,
            |mut graph| graph.evaluate_all(),
            criterion::BatchSize::LargeInput,
        )
    });

    group.bench_function("incremental_edit_256", |b| {
        let (mut graph, tone) = build_chain(test_image(256, 256));
        graph.evaluate_all();
        let mut brightness = 0.0f32;
        b.iter(|| {
            brightness += 1.0;
            graph
                .set_kind(
                    tone,
                    NodeKind::BrightnessContrast {
                        brightness,
                        contrast: 1.1,
                    },
                )
                .unwrap();
            graph.evaluate_all();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_noise_fields, bench_pixel_ops, bench_graph_eval);
criterion_main!(benches);
