//! Бенчмарки архивов: кодек полей, запись/чтение файлов со сжатием и без,
//! разбор потока «ключ/значение».

use std::{hint::black_box, io::Cursor};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use posdata::{
    engine::archive::{
        decode::read_field, encode::write_field, Carrier, FieldValue, Width, LONG_STRING_LIMIT,
    },
    sidecar::RecordSplitter,
    RecordReader, RecordWriter, SidecarOptions, TimeStamp,
};
use tempfile::tempdir;

// ============================================================================
// Данные
// ============================================================================

fn sample_fields(n: usize) -> Vec<FieldValue> {
    (0..n)
        .map(|i| match i % 4 {
            0 => FieldValue::Int(Carrier::from_unsigned(i as u64, Width::W32)),
            1 => FieldValue::Float(i as f64 * 0.25),
            2 => FieldValue::Str(format!("Menu item #{i}")),
            _ => FieldValue::Time(TimeStamp::from_epoch(1_700_000_000 + i as i64)),
        })
        .collect()
}

fn sidecar_stream(records: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..records {
        out.extend_from_slice(format!("Item:Dish {i}\0Qty:{}\0EndItem:\0", i % 5 + 1).as_bytes());
    }
    out
}

// ============================================================================
// Бенчмарки
// ============================================================================

fn bench_field_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_codec");
    let fields = sample_fields(1024);

    let mut encoded = Vec::new();
    for f in &fields {
        write_field(&mut encoded, f, LONG_STRING_LIMIT).unwrap();
    }
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("encode", |b| {
        let mut buf = Vec::with_capacity(encoded.len());
        b.iter(|| {
            buf.clear();
            for f in &fields {
                write_field(&mut buf, black_box(f), LONG_STRING_LIMIT).unwrap();
            }
        });
    });

    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(&encoded));
            for _ in 0..fields.len() {
                black_box(read_field(&mut cursor, LONG_STRING_LIMIT).unwrap());
            }
        });
    });
    group.finish();
}

fn bench_archive_files(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_files");
    let dir = tempdir().unwrap();
    let fields = sample_fields(4096);

    for compress in [false, true] {
        let label = if compress { "zstd" } else { "plain" };
        let path = dir.path().join(format!("bench_{label}.dat"));

        group.bench_with_input(BenchmarkId::new("write", label), &compress, |b, &compress| {
            b.iter(|| {
                let mut w = RecordWriter::create(&path, 1, compress).unwrap();
                for f in &fields {
                    w.write_field(f).unwrap();
                }
                w.close().unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("read", label), &path, |b, path| {
            b.iter(|| {
                let mut r = RecordReader::open(path).unwrap();
                while let Some(entry) = r.next_entry().unwrap() {
                    black_box(entry);
                }
            });
        });
    }
    group.finish();
}

fn bench_sidecar_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("sidecar_split");
    for records in [16usize, 256, 4096] {
        let data = sidecar_stream(records);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(records), &data, |b, data| {
            b.iter(|| {
                let mut splitter = RecordSplitter::new(SidecarOptions::socket());
                let mut count = 0usize;
                for chunk in data.chunks(512) {
                    splitter.push(chunk);
                    while let Some(kv) = splitter.next_record() {
                        black_box(kv);
                        count += 1;
                    }
                }
                count
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_field_codec,
    bench_archive_files,
    bench_sidecar_split
);
criterion_main!(benches);
