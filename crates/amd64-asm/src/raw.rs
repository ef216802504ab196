//! Raw x86-64 instruction encoders.
//!
//! Every function here takes concrete operand values (including a concrete
//! displacement or address — never a label) and deterministically appends a
//! fixed-length encoding to the buffer.  The fixup engine calls each encoder
//! twice per label-referencing instruction: once with a zero placeholder to
//! reserve bytes, and once with the resolved value to patch the same range.
//!
//! Encodings follow the Intel SDM: opcode, optional REX prefix, ModR/M,
//! little-endian displacement/address.

use crate::buffer::CodeBuffer;

// ─── Operand enums ─────────────────────────────────────────

/// x86 condition code, as encoded in the low nibble of the `Jcc` opcodes
/// (`7x` short form, `0F 8x` near form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Cond {
    /// Overflow (OF=1).
    O = 0x0,
    /// Not overflow.
    No = 0x1,
    /// Below / carry (CF=1) — aliases `jb`, `jc`, `jnae`.
    B = 0x2,
    /// Above or equal / not carry — aliases `jae`, `jnb`, `jnc`.
    Ae = 0x3,
    /// Equal / zero (ZF=1) — aliases `je`, `jz`.
    E = 0x4,
    /// Not equal / not zero — aliases `jne`, `jnz`.
    Ne = 0x5,
    /// Below or equal — aliases `jbe`, `jna`.
    Be = 0x6,
    /// Above — aliases `ja`, `jnbe`.
    A = 0x7,
    /// Sign (SF=1).
    S = 0x8,
    /// Not sign.
    Ns = 0x9,
    /// Parity even — aliases `jp`, `jpe`.
    P = 0xA,
    /// Parity odd — aliases `jnp`, `jpo`.
    Np = 0xB,
    /// Less (signed) — aliases `jl`, `jnge`.
    L = 0xC,
    /// Greater or equal (signed) — aliases `jge`, `jnl`.
    Ge = 0xD,
    /// Less or equal (signed) — aliases `jle`, `jng`.
    Le = 0xE,
    /// Greater (signed) — aliases `jg`, `jnle`.
    G = 0xF,
}

impl Cond {
    /// The condition nibble added to the opcode base.
    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// 64-bit general-purpose register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Reg64 {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg64 {
    /// The low three bits for the ModR/M reg field.
    #[inline]
    #[must_use]
    pub fn low3(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Whether this register needs the REX.R extension bit.
    #[inline]
    #[must_use]
    pub fn is_extended(self) -> bool {
        (self as u8) >= 8
    }
}

/// The rel8-only loop/counter-jump family (`E0`–`E3`).  These encodings have
/// no 32-bit displacement form at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoopOp {
    /// `LOOPNE` / `LOOPNZ` — decrement RCX, jump if RCX != 0 and ZF=0.
    Loopne = 0xE0,
    /// `LOOPE` / `LOOPZ` — decrement RCX, jump if RCX != 0 and ZF=1.
    Loope = 0xE1,
    /// `LOOP` — decrement RCX, jump if RCX != 0.
    Loop = 0xE2,
    /// `JRCXZ` — jump if RCX == 0.
    Jrcxz = 0xE3,
}

impl LoopOp {
    /// The single-byte opcode.
    #[inline]
    #[must_use]
    pub fn opcode(self) -> u8 {
        self as u8
    }
}

// ─── Relative branches ─────────────────────────────────────

/// `Jcc rel8` — `7x ib` (2 bytes).
pub fn jcc_rel8(buf: &mut CodeBuffer, cc: Cond, rel: i8) {
    buf.emit_u8(0x70 + cc.code());
    buf.emit_u8(rel as u8);
}

/// `Jcc rel32` — `0F 8x id` (6 bytes).
pub fn jcc_rel32(buf: &mut CodeBuffer, cc: Cond, rel: i32) {
    buf.emit_u8(0x0F);
    buf.emit_u8(0x80 + cc.code());
    buf.emit_u32(rel as u32);
}

/// `JMP rel8` — `EB ib` (2 bytes).
pub fn jmp_rel8(buf: &mut CodeBuffer, rel: i8) {
    buf.emit_u8(0xEB);
    buf.emit_u8(rel as u8);
}

/// `JMP rel32` — `E9 id` (5 bytes).
pub fn jmp_rel32(buf: &mut CodeBuffer, rel: i32) {
    buf.emit_u8(0xE9);
    buf.emit_u32(rel as u32);
}

/// `CALL rel32` — `E8 id` (5 bytes).  Near call; there is no rel8 form.
pub fn call_rel32(buf: &mut CodeBuffer, rel: i32) {
    buf.emit_u8(0xE8);
    buf.emit_u32(rel as u32);
}

/// `LOOP`/`LOOPE`/`LOOPNE`/`JRCXZ rel8` — `E0..E3 ib` (2 bytes).
pub fn loop_rel8(buf: &mut CodeBuffer, op: LoopOp, rel: i8) {
    buf.emit_u8(op.opcode());
    buf.emit_u8(rel as u8);
}

// ─── RIP-relative memory operands ──────────────────────────

/// ModR/M byte with mod=00 rm=101: `[RIP + disp32]`.
#[inline]
fn modrm_rip(reg: Reg64) -> u8 {
    (reg.low3() << 3) | 0b101
}

/// REX prefix with W set, plus R when `reg` is extended.
#[inline]
fn rex_w(reg: Reg64) -> u8 {
    0x48 | if reg.is_extended() { 0x04 } else { 0 }
}

/// `LEA r64, [RIP + disp32]` — `REX.W 8D /r` (7 bytes).
pub fn lea_rip(buf: &mut CodeBuffer, dst: Reg64, disp: i32) {
    buf.emit_u8(rex_w(dst));
    buf.emit_u8(0x8D);
    buf.emit_u8(modrm_rip(dst));
    buf.emit_u32(disp as u32);
}

/// `MOV r64, [RIP + disp32]` — `REX.W 8B /r` (7 bytes).
pub fn mov_load_rip(buf: &mut CodeBuffer, dst: Reg64, disp: i32) {
    buf.emit_u8(rex_w(dst));
    buf.emit_u8(0x8B);
    buf.emit_u8(modrm_rip(dst));
    buf.emit_u32(disp as u32);
}

/// `MOV [RIP + disp32], r64` — `REX.W 89 /r` (7 bytes).
pub fn mov_store_rip(buf: &mut CodeBuffer, src: Reg64, disp: i32) {
    buf.emit_u8(rex_w(src));
    buf.emit_u8(0x89);
    buf.emit_u8(modrm_rip(src));
    buf.emit_u32(disp as u32);
}

// ─── Absolute-address (moffs) forms ────────────────────────

/// `MOV RAX, moffs64` — `REX.W A1 io` (10 bytes).
pub fn mov_rax_moffs64(buf: &mut CodeBuffer, addr: u64) {
    buf.emit_u8(0x48);
    buf.emit_u8(0xA1);
    buf.emit_u64(addr);
}

/// `MOV moffs64, RAX` — `REX.W A3 io` (10 bytes).
pub fn mov_moffs64_rax(buf: &mut CodeBuffer, addr: u64) {
    buf.emit_u8(0x48);
    buf.emit_u8(0xA3);
    buf.emit_u64(addr);
}

// ─── Padding ───────────────────────────────────────────────

/// Intel-recommended multi-byte NOP sequences, indexed by length.
const NOP_SEQUENCES: [&[u8]; 10] = [
    &[],                                                      // 0 bytes (unused)
    &[0x90],                                                  // NOP
    &[0x66, 0x90],                                            // 66 NOP
    &[0x0F, 0x1F, 0x00],                                      // NOP DWORD ptr [EAX]
    &[0x0F, 0x1F, 0x40, 0x00],                                // NOP DWORD ptr [EAX + 00H]
    &[0x0F, 0x1F, 0x44, 0x00, 0x00],                          // NOP DWORD ptr [EAX + EAX*1 + 00H]
    &[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00],                    // 66 NOP DWORD ptr [EAX + EAX*1 + 00H]
    &[0x0F, 0x1F, 0x80, 0x00, 0x00, 0x00, 0x00],              // NOP DWORD ptr [EAX + 00000000H]
    &[0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],        // NOP DWORD ptr [EAX + EAX*1 + 00000000H]
    &[0x66, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],  // 66 NOP DWORD ptr [EAX + EAX*1 + 00000000H]
];

/// Emit exactly `n` bytes of multi-byte NOP padding, largest sequences first.
pub fn nop_padding(buf: &mut CodeBuffer, mut n: usize) {
    while n > 0 {
        let chunk = core::cmp::min(n, 9);
        buf.emit_bytes(NOP_SEQUENCES[chunk]);
        n -= chunk;
    }
}
