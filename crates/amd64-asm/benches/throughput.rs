use amd64_asm::{Assembler, Reg64};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// A loop-heavy kernel: per iteration one bound label, a handful of
/// label-referencing instructions, and some straight-line filler.
fn assemble_loop_kernel(iterations: usize) -> Vec<u8> {
    let mut asm = Assembler::with_base_address(0x40_0000);
    let exit = asm.create_label();
    for _ in 0..iterations {
        let top = asm.create_label();
        asm.bind(top).unwrap();
        asm.emit_bytes(&[0x48, 0xFF, 0xC0]); // inc rax
        asm.jz(exit);
        asm.lea(Reg64::Rsi, top);
        asm.jmp_short(top);
    }
    asm.bind(exit).unwrap();
    asm.ret();
    asm.finish().unwrap().into_bytes()
}

/// Forward-reference-heavy: every jump targets a label bound much later, so
/// the resolution pass touches the whole fixup list.
fn assemble_forward_jumps(count: usize) -> Vec<u8> {
    let mut asm = Assembler::new();
    let end = asm.create_label();
    for _ in 0..count {
        asm.jne(end);
        asm.call(end);
    }
    asm.bind(end).unwrap();
    asm.ret();
    asm.finish().unwrap().into_bytes()
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");

    let sample = assemble_loop_kernel(1024);
    group.throughput(Throughput::Bytes(sample.len() as u64));
    group.bench_function("loop_kernel_1k", |b| {
        b.iter(|| assemble_loop_kernel(black_box(1024)));
    });

    let sample = assemble_forward_jumps(4096);
    group.throughput(Throughput::Bytes(sample.len() as u64));
    group.bench_function("forward_jumps_4k", |b| {
        b.iter(|| assemble_forward_jumps(black_box(4096)));
    });

    group.finish();
}

criterion_group!(benches, bench_assembly);
criterion_main!(benches);
