use std::hint::black_box;

use colorsearch::descriptor::{ColorSpace, DescriptorConfig, DescriptorPipeline, Quantization};
use colorsearch::pixels::PixelBuffer;
use colorsearch::region::RegionPartitioner;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::prelude::*;

fn random_pixels(width: u32, height: u32) -> Vec<u8> {
    let mut data = vec![0u8; (width * height * 3) as usize];
    rand::rng().fill_bytes(&mut data);
    data
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("区域划分");
    group.bench_function("partition_640x480_uncached", |b| {
        b.iter(|| {
            let partitioner = RegionPartitioner::new(0.75).unwrap().with_cache_capacity(0);
            partitioner.partition(black_box(640), black_box(480)).unwrap()
        });
    });
    let partitioner = RegionPartitioner::new(0.75).unwrap();
    group.bench_function("partition_640x480_cached", |b| {
        b.iter(|| partitioner.partition(black_box(640), black_box(480)).unwrap());
    });
    group.finish();
}

fn bench_describe(c: &mut Criterion) {
    let (width, height) = (640, 480);
    let data = random_pixels(width, height);
    let pixels = PixelBuffer::new(width, height, &data).unwrap();

    let mut group = c.benchmark_group("颜色直方图");
    group.throughput(Throughput::Elements((width * height) as u64));
    for (name, color_space, bins) in [
        ("hsv_8x12x3", ColorSpace::Hsv, [8, 12, 3]),
        ("rgb_8x8x8", ColorSpace::Rgb, [8, 8, 8]),
        ("lab_8x8x8", ColorSpace::Lab, [8, 8, 8]),
    ] {
        let config = DescriptorConfig::new(Quantization::new(color_space, bins), 0.75);
        let pipeline = DescriptorPipeline::new(config).unwrap();
        group.bench_function(name, |b| b.iter(|| pipeline.describe(black_box(&pixels)).unwrap()));
    }
    group.finish();
}

criterion_group!(benches, bench_partition, bench_describe);
criterion_main!(benches);
