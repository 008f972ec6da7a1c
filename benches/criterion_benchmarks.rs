use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use svndelta::DeltaChain;
use svndelta::combine::{Combiner, RangeIndex};
use svndelta::generator::{self, GeneratorOptions};
use svndelta::svndiff::{self, DiffWindow, Version, WindowReader, WriterOptions, encode_stream};

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

fn mutate(base: &[u8], stride: usize) -> Vec<u8> {
    let mut out = base.to_vec();
    for i in (0..out.len()).step_by(stride.max(1)) {
        out[i] = out[i].wrapping_add(1);
    }
    out
}

/// `depth` revisions of `size` bytes, each a sparse mutation of the last.
/// Returns the base and the encoded deltas, oldest first.
fn build_chain(size: usize, depth: usize, stride: usize) -> (Vec<u8>, Vec<Vec<u8>>) {
    let base = gen_data(size, size as u64);
    let mut prev = base.clone();
    let mut deltas = Vec::with_capacity(depth);
    for n in 0..depth {
        let next = mutate(&prev, stride + n);
        let windows = generator::generate(&prev, &next, GeneratorOptions::default()).unwrap();
        deltas.push(encode_stream(&windows, WriterOptions::default()).unwrap());
        prev = next;
    }
    (base, deltas)
}

fn chain_readers(deltas: &[Vec<u8>]) -> Vec<WindowReader<Cursor<&[u8]>>> {
    deltas
        .iter()
        .rev()
        .map(|d| WindowReader::from_stream(Cursor::new(d.as_slice())).unwrap())
        .collect()
}

fn first_windows(deltas: &[Vec<u8>]) -> Vec<DiffWindow> {
    deltas
        .iter()
        .map(|d| svndiff::decode_stream(d).unwrap().remove(0))
        .collect()
}

fn write_size_snapshot() {
    let mut csv = String::from("depth,input_delta_bytes,combined_delta_bytes\n");
    for depth in [2usize, 8, 32] {
        let (base, deltas) = build_chain(512 * 1024, depth, 2048);
        let mut writer =
            svndiff::WindowWriter::with_header(Vec::new(), WriterOptions::default()).unwrap();
        DeltaChain::new(chain_readers(&deltas), &base)
            .combine_to(&mut writer)
            .unwrap();
        let input: usize = deltas.iter().map(Vec::len).sum();
        csv.push_str(&format!("{depth},{input},{}\n", writer.bytes_written()));
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("combined_size_snapshot.csv"), csv);
}

fn bench_generate_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("generate_speed_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let source = gen_data(size, 1);
        let target = mutate(&source, 1024);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let windows = generator::generate(
                    black_box(&source),
                    black_box(&target),
                    GeneratorOptions::default(),
                )
                .unwrap();
                black_box(windows);
            });
        });
    }
    g.finish();
}

fn bench_decode_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("decode_speed_vs_version");
    let source = gen_data(1024 * 1024, 2);
    let target = mutate(&source, 512);
    let windows = generator::generate(&source, &target, GeneratorOptions::default()).unwrap();
    for version in [Version::V0, Version::V1] {
        let bytes = encode_stream(
            &windows,
            WriterOptions {
                version,
                ..Default::default()
            },
        )
        .unwrap();
        g.throughput(Throughput::Bytes(bytes.len() as u64));
        g.bench_with_input(
            BenchmarkId::from_parameter(version.as_byte()),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    let decoded = svndiff::decode_stream(black_box(bytes)).unwrap();
                    black_box(decoded);
                });
            },
        );
    }
    g.finish();
}

fn bench_combine_pair(c: &mut Criterion) {
    let mut g = c.benchmark_group("combine_window_pair");
    for stride in [64usize, 512, 4096] {
        let (_, deltas) = build_chain(100 * 1024, 2, stride);
        let windows = first_windows(&deltas);
        let mut combiner = Combiner::new();
        g.bench_with_input(BenchmarkId::from_parameter(stride), &stride, |b, _| {
            b.iter(|| {
                let combined = combiner
                    .combine(black_box(&windows[0]), black_box(&windows[1]))
                    .unwrap();
                black_box(combined);
            });
        });
    }
    g.finish();
}

fn bench_chain_depth(c: &mut Criterion) {
    write_size_snapshot();
    let mut g = c.benchmark_group("reconstruct_vs_chain_depth");
    let size = 512 * 1024usize;
    for depth in [1usize, 4, 16, 64] {
        let (base, deltas) = build_chain(size, depth, 2048);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::new("combined", depth), &depth, |b, _| {
            b.iter(|| {
                let mut out = Vec::with_capacity(size);
                DeltaChain::new(chain_readers(&deltas), &base)
                    .read_to_end(&mut out)
                    .unwrap();
                black_box(out);
            });
        });
        g.bench_with_input(BenchmarkId::new("sequential", depth), &depth, |b, _| {
            b.iter(|| {
                let mut text = base.clone();
                for d in &deltas {
                    let mut next = Vec::with_capacity(text.len());
                    for w in svndiff::decode_stream(d).unwrap() {
                        next.extend(w.apply(&text).unwrap());
                    }
                    text = next;
                }
                black_box(text);
            });
        });
    }
    g.finish();
}

fn bench_range_index(c: &mut Criterion) {
    let mut g = c.benchmark_group("range_index_insert_query");
    for ranges in [1usize << 8, 1 << 12, 1 << 14] {
        g.bench_with_input(BenchmarkId::from_parameter(ranges), &ranges, |b, ranges| {
            let mut index = RangeIndex::new();
            b.iter(|| {
                index.dispose();
                for i in 0..*ranges as u32 {
                    let offset = i.wrapping_mul(2654435761) % (1 << 20);
                    index.insert(offset, offset + 64, i * 64);
                }
                let list = index.query(0, 1 << 20);
                black_box(list.len());
                index.release(list);
            });
        });
    }
    g.finish();
}

criterion_group!(
    benches,
    bench_generate_speed,
    bench_decode_speed,
    bench_combine_pair,
    bench_chain_depth,
    bench_range_index
);
criterion_main!(benches);
