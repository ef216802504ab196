#![no_main]
use amd64_asm::{Assembler, Cond, OffsetWidth, Reg64};
use libfuzzer_sys::fuzz_target;

const COND: [Cond; 16] = [
    Cond::O,
    Cond::No,
    Cond::B,
    Cond::Ae,
    Cond::E,
    Cond::Ne,
    Cond::Be,
    Cond::A,
    Cond::S,
    Cond::Ns,
    Cond::P,
    Cond::Np,
    Cond::L,
    Cond::Ge,
    Cond::Le,
    Cond::G,
];

const REG: [Reg64; 16] = [
    Reg64::Rax,
    Reg64::Rcx,
    Reg64::Rdx,
    Reg64::Rbx,
    Reg64::Rsp,
    Reg64::Rbp,
    Reg64::Rsi,
    Reg64::Rdi,
    Reg64::R8,
    Reg64::R9,
    Reg64::R10,
    Reg64::R11,
    Reg64::R12,
    Reg64::R13,
    Reg64::R14,
    Reg64::R15,
];

const WIDTH: [OffsetWidth; 4] = [
    OffsetWidth::W8,
    OffsetWidth::W16,
    OffsetWidth::W32,
    OffsetWidth::W64,
];

// Interpret the input as an emission script: each pair of bytes selects an
// operation and an operand.  The whole pipeline must never panic — any
// unresolvable layout has to surface as an Err from finish().
fuzz_target!(|data: &[u8]| {
    let mut asm = Assembler::with_base_address(0x40_0000);
    let mut labels = vec![asm.create_label()];

    let mut bytes = data.iter().copied();
    while let (Some(op), Some(arg)) = (bytes.next(), bytes.next()) {
        let label = labels[arg as usize % labels.len()];
        match op % 20 {
            0 => labels.push(asm.create_label()),
            1 => {
                let _ = asm.bind(label);
            }
            2 => {
                let _ = asm.fix_label(label, 0x40_0000 + u64::from(arg) * 0x100);
            }
            3 => asm.jcc(COND[arg as usize % 16], label),
            4 => asm.jcc_short(COND[arg as usize % 16], label),
            5 => asm.jmp(label),
            6 => asm.jmp_short(label),
            7 => asm.call(label),
            8 => asm.loop_(label),
            9 => asm.jrcxz(label),
            10 => asm.lea(REG[arg as usize % 16], label),
            11 => asm.mov_load(REG[arg as usize % 16], label),
            12 => asm.mov_store(label, REG[arg as usize % 16]),
            13 => asm.mov_rax_moffs(label),
            14 => asm.mov_moffs_rax(label),
            15 => asm.align(u32::from(arg) % 64),
            16 => asm.inline_address(label),
            17 => {
                let base = labels[0];
                asm.inline_offset(label, base, WIDTH[arg as usize % 4]);
            }
            18 => asm.emit_bytes(&[0x90; 3][..arg as usize % 4]),
            _ => asm.inline_u32(u32::from(arg)),
        }
    }

    let _ = asm.finish();
});
