//! Performance benchmarks for the call path.
//!
//! - Frame encoding: building argument buffers of mixed widths
//! - Native calls: a full ptrcall round trip through the mock engine
//! - Method lookup: hashing a (class, method) pair into the table
//! - Handles: constructing and dropping owned objects

use classbind::prelude::*;
use classbind::method_table::MethodHash;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::ptr;

fn frame_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame/encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("scalars", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            frame.arg(black_box(true)).unwrap();
            frame.arg(black_box(42i64)).unwrap();
            frame.arg(black_box(1.5f64)).unwrap();
            black_box(frame.arg_count())
        });
    });

    group.bench_function("structs", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            frame.arg(black_box(Rect2::new(0.0, 0.0, 64.0, 64.0))).unwrap();
            frame.arg(black_box(Color::WHITE)).unwrap();
            frame.arg(black_box(Transform2D::IDENTITY)).unwrap();
            black_box(frame.arg_count())
        });
    });

    group.finish();
}

fn call_benchmarks(c: &mut Criterion) {
    let rt = classbind_testkit::runtime();
    let mut group = c.benchmark_group("frame/ptrcall");
    group.throughput(Throughput::Elements(1));

    let echo_int = rt.bind("Probe", "echo_int").unwrap();
    group.bench_function("echo_int", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            frame.arg(black_box(7i64)).unwrap();
            let ret = frame.ret::<i64>().unwrap();
            echo_int.ptrcall(ptr::null_mut(), &mut frame).unwrap();
            black_box(frame.get(ret).unwrap())
        });
    });

    let echo_transform = rt.bind("Probe", "echo_transform2d").unwrap();
    group.bench_function("echo_transform2d", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            frame.arg(black_box(Transform2D::IDENTITY)).unwrap();
            let ret = frame.ret::<Transform2D>().unwrap();
            echo_transform.ptrcall(ptr::null_mut(), &mut frame).unwrap();
            black_box(frame.get(ret).unwrap())
        });
    });

    let image = Image::create(rt, 16, 16, false, ImageFormat::Rgba8)
        .unwrap()
        .unwrap();
    group.bench_function("image_get_pixel", |b| {
        b.iter(|| black_box(image.get_pixel(black_box(3), black_box(5)).unwrap()));
    });

    group.finish();
}

fn lookup_benchmarks(c: &mut Criterion) {
    let rt = classbind_testkit::runtime();
    let mut group = c.benchmark_group("method_table");

    group.bench_function("hash", |b| {
        b.iter(|| black_box(MethodHash::of(black_box("Image"), black_box("get_pixel"))));
    });

    group.bench_function("get", |b| {
        b.iter(|| black_box(rt.bind(black_box("Timer"), black_box("start")).unwrap().raw()));
    });

    group.finish();
}

fn handle_benchmarks(c: &mut Criterion) {
    classbind_testkit::runtime();
    let mut group = c.benchmark_group("handle");

    group.bench_function("construct_drop_ref_counted", |b| {
        b.iter(|| black_box(RefCounted::new().unwrap()));
    });

    group.bench_function("construct_drop_node", |b| {
        b.iter(|| black_box(Node::new().unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    frame_benchmarks,
    call_benchmarks,
    lookup_benchmarks,
    handle_benchmarks
);
criterion_main!(benches);
