#![allow(unused)]
extern crate shadowloader;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use shadowloader::{
    assembly::opcodes::{IADD, ILOAD, IRETURN, RETURN},
    classfile::{ClassBuilder, FieldAccessFlags, MethodAccessFlags, CONSTRUCTOR_NAME},
    disassembler::disassemble_bytes,
    ClassFile, Transformer,
};
use std::hint::black_box;

/// A unit with a field, a constructor and `methods` static adders.
fn sample(methods: usize) -> Vec<u8> {
    let mut builder = ClassBuilder::new("bench/Sample")
        .field(FieldAccessFlags::PRIVATE, "value", "I")
        .method(MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "(I)V", |gen| {
            gen.load_this()?;
            gen.invoke_special("java/lang/Object", CONSTRUCTOR_NAME, "()V")?;
            gen.load_this()?;
            gen.encoder().emit_local(ILOAD, 1)?;
            gen.put_field("bench/Sample", "value", "I")?;
            gen.emit(RETURN)
        });
    for index in 0..methods {
        builder = builder.method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            &format!("add{index}"),
            "(II)I",
            |gen| {
                gen.encoder().emit_local(ILOAD, 0)?;
                gen.encoder().emit_local(ILOAD, 1)?;
                gen.emit(IADD)?;
                gen.emit(IRETURN)
            },
        );
    }
    builder.to_bytes().unwrap()
}

fn bench_transform(c: &mut Criterion) {
    let transformer = Transformer::default();

    let mut group = c.benchmark_group("transform");
    for methods in [1, 16, 128] {
        let data = sample(methods);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_function(format!("{methods}_methods"), |b| {
            b.iter(|| {
                let instrumented = transformer.transform(black_box(&data)).unwrap();
                black_box(instrumented)
            });
        });
    }
    group.finish();
}

fn bench_parse_and_listing(c: &mut Criterion) {
    let data = Transformer::default().transform(&sample(16)).unwrap();

    let mut group = c.benchmark_group("classfile");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("parse", |b| {
        b.iter(|| black_box(ClassFile::parse(black_box(&data)).unwrap()));
    });
    group.bench_function("disassemble", |b| {
        b.iter(|| black_box(disassemble_bytes(black_box(&data)).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_transform, bench_parse_and_listing);
criterion_main!(benches);
