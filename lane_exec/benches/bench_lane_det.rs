//! # Lane Detection Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};

use lane_lib::lane_det::{EdgeParams, EdgePipeline, LaneDetector, WindowParams, WindowPipeline};

/// Two lane boundaries converging towards the top of a 640x480 frame.
fn lane_frame(colour: Rgb<u8>) -> RgbImage {
    let mut img = RgbImage::new(640, 480);
    for y in 240..480u32 {
        let run = (480 - y) as f64 / 1.2;
        for &cx in [100.0 + run, 540.0 - run].iter() {
            for x in (cx - 3.0).round() as u32..=(cx + 3.0).round() as u32 {
                img.put_pixel(x, y, colour);
            }
        }
    }
    img
}

fn lane_det_benchmark(c: &mut Criterion) {
    // White tape for the edge pipeline, blue tape for the colour threshold of the window pipeline
    let white_frame = lane_frame(Rgb([255, 255, 255]));
    let blue_frame = lane_frame(Rgb([0, 0, 255]));

    let mut edge = EdgePipeline::new(EdgeParams::default(), false);
    c.bench_function("EdgePipeline::estimate", |b| {
        b.iter(|| edge.estimate(black_box(&white_frame)))
    });

    let mut window = WindowPipeline::new(WindowParams::default(), false);
    c.bench_function("WindowPipeline::estimate", |b| {
        b.iter(|| window.estimate(black_box(&blue_frame)))
    });

    let mut edge_overlay = EdgePipeline::new(EdgeParams::default(), true);
    c.bench_function("EdgePipeline::estimate::overlay", |b| {
        b.iter(|| edge_overlay.estimate(black_box(&white_frame)))
    });
}

criterion_group!(benches, lane_det_benchmark);
criterion_main!(benches);
