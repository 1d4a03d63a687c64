use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use squeeze_dir::codec::{encode_jpeg, encode_webp, optimize_png};
use squeeze_dir::processing::{CompressionParams, ImageTask, OutputMode};
use squeeze_dir::router::Router;
use squeeze_dir::staging::StagedWriter;
use std::io::Cursor;
use tempfile::TempDir;

fn create_test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    }))
}

fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}

fn bench_router_selection(c: &mut Criterion) {
    let router = Router::new(CompressionParams::default(), true);

    c.bench_function("router_select", |b| {
        b.iter(|| {
            for ext in ["jpg", "PNG", "webp", "bmp", "tiff", "gif", "txt"] {
                let _ = router.select(black_box(ext));
            }
        })
    });
}

fn bench_lossy_encoders(c: &mut Criterion) {
    let mut group = c.benchmark_group("lossy_encode");

    for size in [Small, Medium, Large].iter() {
        let (width, height) = match size {
            Small => (320, 240),
            Medium => (800, 600),
            Large => (1920, 1080),
        };
        let img = create_test_image(width, height);
        let label = format!("{}x{}", width, height);

        group.bench_with_input(BenchmarkId::new("jpeg", &label), &img, |b, img| {
            b.iter(|| encode_jpeg(black_box(img), 80))
        });
        group.bench_with_input(BenchmarkId::new("webp", &label), &img, |b, img| {
            b.iter(|| encode_webp(black_box(img), 80))
        });
    }

    group.finish();
}

fn bench_png_optimization(c: &mut Criterion) {
    let bytes = png_bytes(&create_test_image(256, 256));

    let mut group = c.benchmark_group("png");
    group.sample_size(10);
    group.bench_function("optimize_png", |b| b.iter(|| optimize_png(black_box(&bytes))));
    group.finish();
}

fn bench_staged_commit(c: &mut Criterion) {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let source = work.path().join("image.png");
    std::fs::write(&source, vec![0u8; 64 * 1024]).unwrap();

    let writer = StagedWriter::new(scratch.path());
    let task = ImageTask::new(source, OutputMode::Replace);
    let payload = vec![1u8; 64 * 1024];

    c.bench_function("staged_commit_64k", |b| {
        b.iter(|| writer.run(black_box(&task), |_| Ok((payload.clone(), "bench"))))
    });
}

enum ImageSize {
    Small,
    Medium,
    Large,
}

use ImageSize::*;

criterion_group!(
    benches,
    bench_router_selection,
    bench_lossy_encoders,
    bench_png_optimization,
    bench_staged_commit
);
criterion_main!(benches);
