//! Property-based checks over randomized layouts.

use amd64_asm::{Assembler, Reg64};
use proptest::prelude::*;

proptest! {
    /// Decoding the patched rel32 always recovers `target - referent_end`,
    /// regardless of where the jump and its target land.
    #[test]
    fn near_jump_displacement_round_trips(
        prefix in 0usize..512,
        gap in 0usize..512,
    ) {
        let mut asm = Assembler::new();
        asm.emit_bytes(&vec![0x90; prefix]);
        let target = asm.create_label();
        let jmp_start = asm.current_position();
        asm.jmp(target);
        asm.emit_bytes(&vec![0x90; gap]);
        asm.bind(target).unwrap();
        let code = asm.finish().unwrap();

        let field = (jmp_start + 1) as usize;
        let disp = i32::from_le_bytes(code.bytes()[field..field + 4].try_into().unwrap());
        let end = jmp_start as i64 + 5;
        let bound = prefix as i64 + 5 + gap as i64;
        prop_assert_eq!(i64::from(disp), bound - end);
    }

    /// Short backward jumps within range always resolve; the displacement is
    /// the negated distance including the instruction itself.
    #[test]
    fn short_backward_jump_in_range(gap in 0usize..126) {
        let mut asm = Assembler::new();
        let top = asm.create_label();
        asm.bind(top).unwrap();
        asm.emit_bytes(&vec![0x90; gap]);
        asm.jmp_short(top);
        let code = asm.finish().unwrap();
        let disp = code.bytes()[gap + 1] as i8;
        prop_assert_eq!(i64::from(disp), -(gap as i64 + 2));
    }

    /// Resolution patches in place: output length equals pre-resolution
    /// length for any mix of referents.
    #[test]
    fn resolution_preserves_length(
        jumps in 1usize..24,
        padding in 0usize..64,
        base in 0u64..0x8000_0000,
    ) {
        let mut asm = Assembler::with_base_address(base);
        let target = asm.create_label();
        for i in 0..jumps {
            match i % 4 {
                0 => asm.jz(target),
                1 => asm.call(target),
                2 => asm.lea(Reg64::Rax, target),
                _ => asm.jmp(target),
            }
        }
        asm.emit_bytes(&vec![0x90; padding]);
        asm.bind(target).unwrap();
        let before = asm.current_position() as usize;
        let code = asm.finish().unwrap();
        prop_assert_eq!(code.len(), before);
        prop_assert_eq!(code.applied_fixups().len(), jumps);
    }

    /// The same emission sequence always assembles to the same bytes.
    #[test]
    fn assembly_is_deterministic(
        prefix in 0usize..128,
        base in 0u64..0x10_0000,
    ) {
        let build = || {
            let mut asm = Assembler::with_base_address(base);
            let target = asm.create_label();
            asm.emit_bytes(&vec![0x90; prefix]);
            asm.jne(target);
            asm.mov_rax_moffs(target);
            asm.bind(target).unwrap();
            asm.ret();
            asm.finish().unwrap().into_bytes()
        };
        prop_assert_eq!(build(), build());
    }

    /// `align` always lands the next position on the requested boundary,
    /// emitting at most `alignment - 1` bytes.
    #[test]
    fn align_reaches_boundary(
        prefix in 0usize..64,
        exp in 1u32..7,
        base in prop::sample::select(vec![0u64, 0x1000, 0x40_0003]),
    ) {
        let alignment = 1u32 << exp;
        let mut asm = Assembler::with_base_address(base);
        asm.emit_bytes(&vec![0x90; prefix]);
        let before = asm.current_position();
        asm.align(alignment);
        let after = asm.current_position();
        prop_assert!(after - before < alignment);
        prop_assert_eq!(
            (base + u64::from(after)) % u64::from(alignment),
            0
        );
    }
}
