//! The label assembler façade and the fixup driver.
//!
//! [`Assembler`] owns the code buffer, the label table, and the fixup list.
//! Every label-taking emission method follows the same fixed algorithm:
//! record the start position, call the raw encoder with a zero placeholder at
//! the reserved width, record the end position, and append one [`Fixup`].
//! [`Assembler::finish`] is the fixup driver: once every referenced label is
//! bound it replays each record in place and returns the final bytes.
//!
//! Reserved-width policy: dual-width families (`jcc`, `jmp`) reserve the
//! 32-bit near form by default; the `*_short` methods opt into the 8-bit
//! form, whose range is then enforced at resolution time.  Families with a
//! single legal width (`call`, the `loop` family, RIP-relative operands,
//! `moffs`) reserve exactly that width.

use alloc::vec::Vec;

use crate::buffer::CodeBuffer;
use crate::error::AsmError;
use crate::fixup::{AppliedFixup, Fixup, FixupKind, OffsetWidth};
use crate::label::{Label, LabelTable};
use crate::raw::{self, Cond, LoopOp, Reg64};

// ─── AssemblyResult ────────────────────────────────────────

/// The result of a successful assembly: final bytes plus the resolution
/// record.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct AssemblyResult {
    bytes: Vec<u8>,
    applied: Vec<AppliedFixup>,
    labels: Vec<(Label, u64)>,
    base_address: u64,
}

impl AssemblyResult {
    /// The assembled machine code.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Byte count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the output is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Every fixup the driver patched, in emission order.
    #[must_use]
    pub fn applied_fixups(&self) -> &[AppliedFixup] {
        &self.applied
    }

    /// Bound labels and their absolute addresses (`base_address + position`).
    #[must_use]
    pub fn labels(&self) -> &[(Label, u64)] {
        &self.labels
    }

    /// Look up the absolute address of a bound label.
    #[must_use]
    pub fn label_address(&self, label: Label) -> Option<u64> {
        self.labels
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, addr)| *addr)
    }

    /// The base address the code was assembled for.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.base_address
    }
}

// ─── The jcc façade surface ────────────────────────────────

/// Generates the per-mnemonic conditional-jump wrapper pairs from a compact
/// condition table — the near-form and short-form method for every mnemonic
/// and alias share one four-line emission pattern, so they are never written
/// by hand.
macro_rules! jcc_methods {
    ($($name:ident / $short:ident => $cc:ident),* $(,)?) => {
        $(
            #[doc = concat!(
                "Conditional jump `", stringify!($name),
                "` to `label`, reserving the 32-bit near form (`0F 8x id`)."
            )]
            pub fn $name(&mut self, label: Label) {
                self.jcc(Cond::$cc, label);
            }

            #[doc = concat!(
                "Conditional jump `", stringify!($name),
                "` to `label`, reserving the 8-bit short form (`7x ib`).\n\n",
                "Resolution fails with [`AsmError::DisplacementOverflow`] if the \
                 target lands outside the ±127 byte range."
            )]
            pub fn $short(&mut self, label: Label) {
                self.jcc_short(Cond::$cc, label);
            }
        )*
    };
}

// ─── Assembler ─────────────────────────────────────────────

/// A single-threaded x86-64 assembly session: placeholder emission, label
/// binding, and final fixup resolution over one linear code buffer.
///
/// # Examples
///
/// ```
/// use amd64_asm::Assembler;
///
/// let mut asm = Assembler::new();
/// let top = asm.create_label();
/// asm.bind(top)?;
/// asm.jmp_short(top); // backward jump to its own start
/// let result = asm.finish()?;
/// assert_eq!(result.bytes(), &[0xEB, 0xFE]);
/// # Ok::<(), amd64_asm::AsmError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    code: CodeBuffer,
    labels: LabelTable,
    fixups: Vec<Fixup>,
}

impl Assembler {
    /// Create an assembler with base address 0.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_address(0)
    }

    /// Create an assembler whose output will be loaded at `base_address`.
    ///
    /// The base address enters every absolute-address computation
    /// (`moffs` forms, [`Assembler::inline_address`]) and the displacement
    /// calculation against [fixed](Assembler::fix_label) labels.
    #[must_use]
    pub fn with_base_address(base_address: u64) -> Self {
        Self {
            code: CodeBuffer::with_base_address(base_address),
            labels: LabelTable::new(),
            fixups: Vec::new(),
        }
    }

    /// The configured base address.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.code.base_address()
    }

    /// The buffer position at which the next instruction will start.
    #[must_use]
    pub fn current_position(&self) -> u32 {
        self.code.current_position()
    }

    // ── labels ─────────────────────────────────────────────

    /// Create a new unbound label.
    pub fn create_label(&mut self) -> Label {
        self.labels.create()
    }

    /// Bind `label` to the current buffer position.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::DoubleBind`] if the label was already assigned.
    pub fn bind(&mut self, label: Label) -> Result<(), AsmError> {
        let position = self.code.current_position();
        self.labels.bind(label, position)
    }

    /// Fix `label` to an absolute address outside the buffer (an external
    /// routine or data object).
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::DoubleBind`] if the label was already assigned.
    pub fn fix_label(&mut self, label: Label, address: u64) -> Result<(), AsmError> {
        self.labels.fix(label, address)
    }

    /// Whether `label` has been bound or fixed.
    #[must_use]
    pub fn is_bound(&self, label: Label) -> bool {
        self.labels.is_bound(label)
    }

    /// The fixups recorded so far, in emission order.
    #[must_use]
    pub fn pending_fixups(&self) -> &[Fixup] {
        &self.fixups
    }

    // ── emission core ──────────────────────────────────────

    /// Record the fixup for an instruction whose placeholder bytes were just
    /// emitted starting at `start`.
    fn finish_fixup(&mut self, start: u32, label: Label, kind: FixupKind) {
        let end = self.code.current_position();
        self.fixups.push(Fixup::new(start, end, label, kind));
    }

    /// Conditional jump to `label`, reserving the 32-bit near form.
    pub fn jcc(&mut self, cc: Cond, label: Label) {
        let start = self.code.current_position();
        raw::jcc_rel32(&mut self.code, cc, 0);
        self.finish_fixup(start, label, FixupKind::Jcc { cc });
    }

    /// Conditional jump to `label`, reserving the 8-bit short form.
    pub fn jcc_short(&mut self, cc: Cond, label: Label) {
        let start = self.code.current_position();
        raw::jcc_rel8(&mut self.code, cc, 0);
        self.finish_fixup(start, label, FixupKind::Jcc { cc });
    }

    jcc_methods! {
        jo / jo_short => O,
        jno / jno_short => No,
        jb / jb_short => B,
        jc / jc_short => B,
        jnae / jnae_short => B,
        jae / jae_short => Ae,
        jnb / jnb_short => Ae,
        jnc / jnc_short => Ae,
        je / je_short => E,
        jz / jz_short => E,
        jne / jne_short => Ne,
        jnz / jnz_short => Ne,
        jbe / jbe_short => Be,
        jna / jna_short => Be,
        ja / ja_short => A,
        jnbe / jnbe_short => A,
        js / js_short => S,
        jns / jns_short => Ns,
        jp / jp_short => P,
        jpe / jpe_short => P,
        jnp / jnp_short => Np,
        jpo / jpo_short => Np,
        jl / jl_short => L,
        jnge / jnge_short => L,
        jge / jge_short => Ge,
        jnl / jnl_short => Ge,
        jle / jle_short => Le,
        jng / jng_short => Le,
        jg / jg_short => G,
        jnle / jnle_short => G,
    }

    /// Unconditional jump to `label`, reserving the 32-bit near form
    /// (`E9 id`).
    pub fn jmp(&mut self, label: Label) {
        let start = self.code.current_position();
        raw::jmp_rel32(&mut self.code, 0);
        self.finish_fixup(start, label, FixupKind::Jmp);
    }

    /// Unconditional jump to `label`, reserving the 8-bit short form
    /// (`EB ib`).
    pub fn jmp_short(&mut self, label: Label) {
        let start = self.code.current_position();
        raw::jmp_rel8(&mut self.code, 0);
        self.finish_fixup(start, label, FixupKind::Jmp);
    }

    /// Near call to `label` (`E8 id`, rel32 only).
    pub fn call(&mut self, label: Label) {
        let start = self.code.current_position();
        raw::call_rel32(&mut self.code, 0);
        self.finish_fixup(start, label, FixupKind::Call);
    }

    fn loop_family(&mut self, op: LoopOp, label: Label) {
        let start = self.code.current_position();
        raw::loop_rel8(&mut self.code, op, 0);
        self.finish_fixup(start, label, FixupKind::Loop { op });
    }

    /// `LOOP label` — rel8 only; the target must stay within ±127 bytes.
    pub fn loop_(&mut self, label: Label) {
        self.loop_family(LoopOp::Loop, label);
    }

    /// `LOOPE label` — rel8 only.
    pub fn loope(&mut self, label: Label) {
        self.loop_family(LoopOp::Loope, label);
    }

    /// `LOOPNE label` — rel8 only.
    pub fn loopne(&mut self, label: Label) {
        self.loop_family(LoopOp::Loopne, label);
    }

    /// `JRCXZ label` — rel8 only.
    pub fn jrcxz(&mut self, label: Label) {
        self.loop_family(LoopOp::Jrcxz, label);
    }

    /// `LEA dst, [RIP + label]` — address of `label` computed RIP-relative.
    pub fn lea(&mut self, dst: Reg64, label: Label) {
        let start = self.code.current_position();
        raw::lea_rip(&mut self.code, dst, 0);
        self.finish_fixup(start, label, FixupKind::Lea { dst });
    }

    /// `MOV dst, [RIP + label]` — 64-bit load through a RIP-relative operand.
    pub fn mov_load(&mut self, dst: Reg64, label: Label) {
        let start = self.code.current_position();
        raw::mov_load_rip(&mut self.code, dst, 0);
        self.finish_fixup(start, label, FixupKind::Load { dst });
    }

    /// `MOV [RIP + label], src` — 64-bit store through a RIP-relative
    /// operand.
    pub fn mov_store(&mut self, label: Label, src: Reg64) {
        let start = self.code.current_position();
        raw::mov_store_rip(&mut self.code, src, 0);
        self.finish_fixup(start, label, FixupKind::Store { src });
    }

    /// `MOV RAX, moffs64` — load from the absolute address of `label`
    /// (`base_address + position`).  No relative form exists.
    pub fn mov_rax_moffs(&mut self, label: Label) {
        let start = self.code.current_position();
        raw::mov_rax_moffs64(&mut self.code, 0);
        self.finish_fixup(start, label, FixupKind::MoffsLoad);
    }

    /// `MOV moffs64, RAX` — store to the absolute address of `label`.
    pub fn mov_moffs_rax(&mut self, label: Label) {
        let start = self.code.current_position();
        raw::mov_moffs64_rax(&mut self.code, 0);
        self.finish_fixup(start, label, FixupKind::MoffsStore);
    }

    // ── directives ─────────────────────────────────────────

    /// Emit a single-byte `NOP`.
    pub fn nop(&mut self) {
        self.code.emit_u8(0x90);
    }

    /// Emit `RET`.
    pub fn ret(&mut self) {
        self.code.emit_u8(0xC3);
    }

    /// Emit raw bytes (data or pre-encoded instructions).
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.code.emit_bytes(bytes);
    }

    /// Inline one data byte.
    pub fn inline_u8(&mut self, value: u8) {
        self.code.emit_u8(value);
    }

    /// Inline a little-endian 16-bit data value.
    pub fn inline_u16(&mut self, value: u16) {
        self.code.emit_u16(value);
    }

    /// Inline a little-endian 32-bit data value.
    pub fn inline_u32(&mut self, value: u32) {
        self.code.emit_u32(value);
    }

    /// Inline a little-endian 64-bit data value.
    pub fn inline_u64(&mut self, value: u64) {
        self.code.emit_u64(value);
    }

    /// Pad with multi-byte NOP sequences so the next emitted byte starts at
    /// an address divisible by `alignment`.  Values of 0 or 1 emit nothing.
    pub fn align(&mut self, alignment: u32) {
        if alignment <= 1 {
            return;
        }
        let address = self
            .code
            .base_address()
            .wrapping_add(u64::from(self.code.current_position()));
        let misalignment = (address % u64::from(alignment)) as u32;
        if misalignment > 0 {
            raw::nop_padding(&mut self.code, (alignment - misalignment) as usize);
        }
    }

    /// Inline the absolute 64-bit address of `label` as 8 data bytes.
    pub fn inline_address(&mut self, label: Label) {
        let start = self.code.current_position();
        self.code.emit_u64(0);
        self.finish_fixup(start, label, FixupKind::AddressLiteral);
    }

    /// Inline the distance `target - base` between two labels as a
    /// little-endian literal of the given width.
    ///
    /// Resolution fails with [`AsmError::DisplacementOverflow`] if the
    /// distance does not fit the chosen width.
    pub fn inline_offset(&mut self, target: Label, base: Label, width: OffsetWidth) {
        let start = self.code.current_position();
        match width {
            OffsetWidth::W8 => self.code.emit_u8(0),
            OffsetWidth::W16 => self.code.emit_u16(0),
            OffsetWidth::W32 => self.code.emit_u32(0),
            OffsetWidth::W64 => self.code.emit_u64(0),
        }
        self.finish_fixup(start, target, FixupKind::OffsetLiteral { base, width });
    }

    // ── fixup driver ───────────────────────────────────────

    /// Resolve every fixup and return the final machine code.
    ///
    /// Fixup records are independent — each patches a disjoint byte range —
    /// so they are replayed in emission order.  Any failure aborts the whole
    /// pass: a partially patched buffer is never returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`AsmError`] encountered: an unbound label, a
    /// displacement outside the reserved width, or an internal encoding
    /// inconsistency.
    ///
    /// # Examples
    ///
    /// ```
    /// use amd64_asm::Assembler;
    ///
    /// let mut asm = Assembler::new();
    /// let end = asm.create_label();
    /// asm.jz(end);       // forward reference
    /// asm.nop();
    /// asm.bind(end)?;
    /// asm.ret();
    /// let result = asm.finish()?;
    /// // jz (6 bytes) skips the nop: disp = 7 - 6 = 1
    /// assert_eq!(result.bytes(), &[0x0F, 0x84, 0x01, 0x00, 0x00, 0x00, 0x90, 0xC3]);
    /// # Ok::<(), amd64_asm::AsmError>(())
    /// ```
    pub fn finish(mut self) -> Result<AssemblyResult, AsmError> {
        let mut applied = Vec::with_capacity(self.fixups.len());
        for fixup in &self.fixups {
            applied.push(fixup.patch(&self.labels, &mut self.code)?);
        }

        let base_address = self.code.base_address();
        let labels: Vec<(Label, u64)> = self
            .labels
            .bound()
            .map(|(label, position)| (label, base_address.wrapping_add(u64::from(position))))
            .collect();

        Ok(AssemblyResult {
            bytes: self.code.into_bytes(),
            applied,
            labels,
            base_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jcc_reserves_near_form_by_default() {
        let mut asm = Assembler::new();
        let label = asm.create_label();
        asm.jz(label);
        assert_eq!(asm.current_position(), 6);
        let fixup = &asm.pending_fixups()[0];
        assert_eq!((fixup.start(), fixup.end()), (0, 6));
    }

    #[test]
    fn jcc_short_reserves_two_bytes() {
        let mut asm = Assembler::new();
        let label = asm.create_label();
        asm.jz_short(label);
        assert_eq!(asm.current_position(), 2);
    }

    #[test]
    fn fixup_ranges_are_disjoint_and_ordered() {
        let mut asm = Assembler::new();
        let label = asm.create_label();
        asm.jz(label);
        asm.jmp(label);
        asm.call(label);
        asm.bind(label).unwrap();
        let fixups = asm.pending_fixups();
        for pair in fixups.windows(2) {
            assert!(pair[0].end() <= pair[1].start());
        }
    }

    #[test]
    fn unresolved_fixup_aborts_finish() {
        let mut asm = Assembler::new();
        let label = asm.create_label();
        asm.jmp(label);
        let err = asm.finish().unwrap_err();
        assert!(matches!(err, AsmError::UnboundLabel { .. }));
    }

    #[test]
    fn align_pads_with_nops() {
        let mut asm = Assembler::new();
        asm.ret();
        asm.align(4);
        assert_eq!(asm.current_position(), 4);
        asm.align(4); // already aligned, no padding
        assert_eq!(asm.current_position(), 4);
    }

    #[test]
    fn align_accounts_for_base_address() {
        let mut asm = Assembler::with_base_address(0x1002);
        asm.align(4);
        assert_eq!(asm.current_position(), 2);
    }

    #[test]
    fn inline_literals_are_little_endian() {
        let mut asm = Assembler::new();
        asm.inline_u16(0x1122);
        asm.inline_u32(0x3344_5566);
        let result = asm.finish().unwrap();
        assert_eq!(result.bytes(), &[0x22, 0x11, 0x66, 0x55, 0x44, 0x33]);
    }

    #[test]
    fn inline_address_resolves_against_base() {
        let mut asm = Assembler::with_base_address(0x40_0000);
        let label = asm.create_label();
        asm.inline_address(label);
        asm.bind(label).unwrap();
        asm.ret();
        let result = asm.finish().unwrap();
        assert_eq!(&result.bytes()[..8], &0x40_0008u64.to_le_bytes());
    }

    #[test]
    fn result_reports_label_addresses() {
        let mut asm = Assembler::with_base_address(0x1000);
        let label = asm.create_label();
        asm.nop();
        asm.bind(label).unwrap();
        asm.ret();
        let result = asm.finish().unwrap();
        assert_eq!(result.label_address(label), Some(0x1001));
    }

    #[test]
    fn applied_fixups_record_patched_fields() {
        let mut asm = Assembler::new();
        let label = asm.create_label();
        asm.call(label);
        asm.bind(label).unwrap();
        let result = asm.finish().unwrap();
        let applied = &result.applied_fixups()[0];
        assert_eq!((applied.offset, applied.size), (1, 4));
        assert_eq!(applied.label, label);
    }
}
