use cifar_input::{
    augment_and_mix,
    catalog::Split,
    config::AugmentationConfig,
    dataloader::{init_worker_rng, load_dataset, LoaderConfig},
    Example, InMemoryCatalog, InMemoryDataset, Precision, RandAugment,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tch::{Device, Kind, Tensor};

/// Benchmarks for the per-example and per-batch preprocessing cost.
///
/// This measures:
/// 1. AugMix on a single 32x32 image across chain widths
/// 2. Batches per second from `load_dataset` with and without workers
///
/// To run these, use:
/// ```bash
/// cargo bench --bench preprocess_bench
/// ```

const BATCH_SIZE: usize = 128;
const BATCHES: usize = 8;

fn image(value: i64) -> Tensor {
    Tensor::full([32, 32, 3], value, (Kind::Uint8, Device::Cpu))
        + Tensor::randint(32, [32, 32, 3], (Kind::Uint8, Device::Cpu))
}

fn make_catalog() -> InMemoryCatalog {
    let split = |n: usize| {
        let examples = (0..n)
            .map(|i| Example::raw(image((i % 200) as i64), (i % 10) as i64).unwrap())
            .collect();
        InMemoryDataset::new(examples)
    };
    let mut catalog = InMemoryCatalog::new();
    catalog.insert("bench", 10, split(2_048), split(512)).unwrap();
    catalog
}

/// Measure AugMix on one image
fn bench_augmix(c: &mut Criterion) {
    let mut group = c.benchmark_group("AugMix");
    let augmenter = RandAugment::default();
    let img = image(100);
    init_worker_rng(0, 0, 42);

    for width in [1usize, 3, 5] {
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, &width| {
            b.iter(|| {
                let mixed =
                    augment_and_mix(&img, -1, width, 0.5, &augmenter, Precision::Float32).unwrap();
                black_box(mixed)
            })
        });
    }
    group.finish();
}

/// Measure end-to-end training batches with increasing worker counts
fn bench_training_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("Training Stream");
    group.throughput(Throughput::Elements((BATCH_SIZE * BATCHES) as u64));
    group.sample_size(10);
    let catalog = make_catalog();

    let configs = [
        ("plain", AugmentationConfig::default()),
        (
            "random_augment+mixup",
            AugmentationConfig::builder()
                .random_augment(true)
                .mixup_alpha(0.2)
                .build()
                .unwrap(),
        ),
    ];

    for (name, augmentation) in configs {
        for workers in [0usize, 2, 4] {
            let id = BenchmarkId::new(name, format!("{}_workers", workers));
            group.bench_with_input(id, &workers, |b, &workers| {
                b.iter(|| {
                    let config = LoaderConfig::builder(Split::Train, BATCH_SIZE, "bench")
                        .augmentation(augmentation.clone())
                        .num_workers(workers)
                        .seed(0)
                        .build();
                    let stream = load_dataset(&catalog, config).unwrap();
                    for batch in stream.take(BATCHES) {
                        black_box(batch.unwrap());
                    }
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_augmix, bench_training_stream);
criterion_main!(benches);
