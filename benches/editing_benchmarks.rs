use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dimo_imaging::{
    editing::{contour, halftone, inpaint, magic_wand},
    ClipSeed, EngineConfig, HalftoneOptions, ImageCodec, ImagingEngine, Mask, ObjectSelection,
    RasterImage, UpscaleOptions, WandSeed,
};
use image::{Rgb, RgbImage};
use tokio::runtime::Runtime;

const SIZES: [u32; 3] = [128, 256, 512];

/// Garment-like scene: smooth backdrop with a centred darker print
fn scene(side: u32) -> RasterImage {
    let lo = side / 3;
    let hi = side - lo;
    let image = RgbImage::from_fn(side, side, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Rgb([40 + (x % 16) as u8, 50, 160 + (y % 32) as u8])
        } else {
            Rgb([220 - (y * 40 / side) as u8, 215, 205 + (x * 30 / side) as u8])
        }
    });
    RasterImage::from_rgb(image)
}

fn centre_mask(side: u32) -> Mask {
    let lo = side / 3;
    let hi = side - lo;
    let mut mask = Mask::empty(side, side);
    for y in lo..hi {
        for x in lo..hi {
            mask.set(x, y, 255);
        }
    }
    mask
}

fn benchmark_halftone(c: &mut Criterion) {
    let mut group = c.benchmark_group("halftone");
    let options = HalftoneOptions::default();

    for side in SIZES {
        let image = scene(side);
        group.bench_with_input(BenchmarkId::new("rasterize", side), &image, |b, image| {
            b.iter(|| black_box(halftone::rasterize(image, &options).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_inpainting(c: &mut Criterion) {
    let mut group = c.benchmark_group("inpainting");
    group.sample_size(10);

    for side in SIZES {
        let image = scene(side);
        let mask = centre_mask(side);
        group.bench_with_input(
            BenchmarkId::new("remove_objects", side),
            &(image, mask),
            |b, (image, mask)| {
                b.iter(|| black_box(inpaint::remove_objects(image, mask, 7).unwrap()));
            },
        );
    }

    group.finish();
}

fn benchmark_segmentation(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmentation");
    group.sample_size(10);

    for side in [128, 256] {
        let image = scene(side);
        let seed = ClipSeed::Manual(centre_mask(side));
        group.bench_with_input(BenchmarkId::new("manual_clip", side), &image, |b, image| {
            b.iter(|| black_box(contour::clip(image, &seed, false).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("border_cutout", side), &image, |b, image| {
            b.iter(|| {
                black_box(contour::border_cutout(image, contour::CUTOUT_WORKING_SIDE).unwrap())
            });
        });
    }

    group.finish();
}

fn benchmark_magic_wand(c: &mut Criterion) {
    let image = scene(512);
    c.bench_function("magic_wand_512", |b| {
        b.iter(|| {
            black_box(magic_wand::create_mask_from_point(&image, WandSeed::new(5, 5, 30)).unwrap())
        });
    });
}

fn benchmark_engine_end_to_end(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = ImagingEngine::new(EngineConfig::default()).unwrap();
    let bytes = ImageCodec::encode_png(scene(256)).unwrap();

    let mut group = c.benchmark_group("engine");
    group.sample_size(10);

    group.bench_function("remove_objects_point_256", |b| {
        b.iter(|| {
            rt.block_on(async {
                let selection = ObjectSelection::Point {
                    x: 128,
                    y: 128,
                    tolerance: 30,
                };
                black_box(engine.remove_objects(&bytes, selection).await.unwrap())
            })
        });
    });

    group.bench_function("local_upscale_256", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(engine.upscale(&bytes, UpscaleOptions::default()).await.unwrap())
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_halftone,
    benchmark_inpainting,
    benchmark_segmentation,
    benchmark_magic_wand,
    benchmark_engine_end_to_end
);
criterion_main!(benches);
