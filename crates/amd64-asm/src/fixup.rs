//! Fixup records: deferred patching of label-referencing instructions.
//!
//! Each label-referencing instruction leaves behind one [`Fixup`]: the byte
//! range its placeholder encoding occupies, the referenced label, and a
//! [`FixupKind`] carrying exactly the sibling operands needed to re-invoke
//! the raw encoder.  Once every label is bound, the fixup driver replays each
//! record, re-encodes the instruction with the resolved displacement or
//! address, and overwrites the reserved range in place.
//!
//! The set of legal field widths per instruction family is declared as data
//! ([`WidthSet`]); the reserved width is recovered from the record's span
//! length, so the placeholder pass and the resolution pass always agree.
//! There is no re-layout: a target that does not fit the reserved width is a
//! fatal [`AsmError::DisplacementOverflow`].

use core::fmt;

use crate::buffer::CodeBuffer;
use crate::error::AsmError;
use crate::label::{Label, LabelTable};
use crate::raw::{self, Cond, LoopOp, Reg64};

// ─── Widths ────────────────────────────────────────────────

/// Field width of a label-derived operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Width {
    /// 8-bit signed relative displacement (short jumps).
    B8,
    /// 16-bit field — only used by inlined offset literals; no instruction
    /// family negotiates this width.
    B16,
    /// 32-bit signed relative displacement (near jumps/calls, RIP-relative).
    B32,
    /// 64-bit absolute address (`moffs` forms and inlined address literals).
    Addr64,
}

impl Width {
    /// Number of bytes the field occupies — also its [`WidthSet`] bit.
    #[inline]
    #[must_use]
    pub fn bytes(self) -> u32 {
        match self {
            Width::B8 => 1,
            Width::B16 => 2,
            Width::B32 => 4,
            Width::Addr64 => 8,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::B8 => write!(f, "8-bit"),
            Width::B16 => write!(f, "16-bit"),
            Width::B32 => write!(f, "32-bit"),
            Width::Addr64 => write!(f, "64-bit address"),
        }
    }
}

/// A bit-set of legal operand widths for one instruction family.
///
/// The bit for each width is its byte count: `1` for rel8, `4` for rel32,
/// `8` for the 64-bit absolute-address mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WidthSet(u8);

impl WidthSet {
    /// Only the 8-bit relative form (`loop`, `jrcxz`).
    pub const REL8: WidthSet = WidthSet(1);
    /// Only the 32-bit relative form (`call`, RIP-relative operands).
    pub const REL32: WidthSet = WidthSet(4);
    /// Either relative form (`jcc`, `jmp`).
    pub const REL8_OR_REL32: WidthSet = WidthSet(1 | 4);
    /// Only the 64-bit absolute-address mode (`moffs`, address literals).
    pub const ADDR64: WidthSet = WidthSet(8);

    /// Whether `width` is a member.
    #[inline]
    #[must_use]
    pub fn contains(self, width: Width) -> bool {
        self.0 & (width.bytes() as u8) != 0
    }

    /// Iterate the member widths, narrowest first.
    pub fn iter(self) -> impl Iterator<Item = Width> {
        [Width::B8, Width::B16, Width::B32, Width::Addr64]
            .into_iter()
            .filter(move |w| self.contains(*w))
    }
}

/// Width of an inlined label-offset literal (`inline_offset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OffsetWidth {
    /// 1 byte, signed.
    W8,
    /// 2 bytes, signed, little-endian.
    W16,
    /// 4 bytes, signed, little-endian.
    W32,
    /// 8 bytes, little-endian.
    W64,
}

impl OffsetWidth {
    /// Number of bytes the literal occupies.
    #[inline]
    #[must_use]
    pub fn bytes(self) -> u32 {
        match self {
            OffsetWidth::W8 => 1,
            OffsetWidth::W16 => 2,
            OffsetWidth::W32 => 4,
            OffsetWidth::W64 => 8,
        }
    }
}

// ─── Fixup kinds ───────────────────────────────────────────

/// One variant per instruction family that can reference a label, carrying
/// exactly the captured sibling operands needed to re-encode it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FixupKind {
    /// Conditional jump (`7x ib` / `0F 8x id`).
    Jcc {
        /// The condition code.
        cc: Cond,
    },
    /// Unconditional jump (`EB ib` / `E9 id`).
    Jmp,
    /// Near call (`E8 id`).
    Call,
    /// The rel8-only loop/counter-jump family (`E0..E3 ib`).
    Loop {
        /// Which member of the family.
        op: LoopOp,
    },
    /// `LEA r64, [RIP + disp32]`.
    Lea {
        /// Destination register.
        dst: Reg64,
    },
    /// `MOV r64, [RIP + disp32]`.
    Load {
        /// Destination register.
        dst: Reg64,
    },
    /// `MOV [RIP + disp32], r64`.
    Store {
        /// Source register.
        src: Reg64,
    },
    /// `MOV RAX, moffs64` — absolute 64-bit address, no relative form.
    MoffsLoad,
    /// `MOV moffs64, RAX`.
    MoffsStore,
    /// The label's absolute address inlined as 8 data bytes.
    AddressLiteral,
    /// The distance between two labels inlined as data.
    OffsetLiteral {
        /// The label the offset is measured from.
        base: Label,
        /// Storage width of the literal.
        width: OffsetWidth,
    },
}

impl FixupKind {
    /// The legal operand widths for this family, as data.
    ///
    /// `OffsetLiteral` is not width-negotiated — its size is fixed by the
    /// caller — so it reports the set matching its storage width.
    #[must_use]
    pub fn legal_widths(&self) -> WidthSet {
        match self {
            FixupKind::Jcc { .. } | FixupKind::Jmp => WidthSet::REL8_OR_REL32,
            FixupKind::Call
            | FixupKind::Lea { .. }
            | FixupKind::Load { .. }
            | FixupKind::Store { .. } => WidthSet::REL32,
            FixupKind::Loop { .. } => WidthSet::REL8,
            FixupKind::MoffsLoad | FixupKind::MoffsStore | FixupKind::AddressLiteral => {
                WidthSet::ADDR64
            }
            FixupKind::OffsetLiteral { width, .. } => WidthSet(width.bytes() as u8),
        }
    }

    /// Total encoded instruction length for a given operand width, or `None`
    /// if the family has no encoding at that width.
    #[must_use]
    pub fn encoded_len(&self, width: Width) -> Option<u32> {
        match (self, width) {
            (FixupKind::Jcc { .. }, Width::B8) => Some(2),
            (FixupKind::Jcc { .. }, Width::B32) => Some(6),
            (FixupKind::Jmp, Width::B8) => Some(2),
            (FixupKind::Jmp, Width::B32) => Some(5),
            (FixupKind::Call, Width::B32) => Some(5),
            (FixupKind::Loop { .. }, Width::B8) => Some(2),
            (
                FixupKind::Lea { .. } | FixupKind::Load { .. } | FixupKind::Store { .. },
                Width::B32,
            ) => Some(7),
            (FixupKind::MoffsLoad | FixupKind::MoffsStore, Width::Addr64) => Some(10),
            (FixupKind::AddressLiteral, Width::Addr64) => Some(8),
            _ => None,
        }
    }
}

// ─── Fixup record ──────────────────────────────────────────

/// A record of where a label-patched value landed in the final output.
///
/// Returned by the fixup driver after resolution — useful for tooling,
/// debugging, and re-linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppliedFixup {
    /// Offset in the output where the patched value begins.
    pub offset: u32,
    /// Size of the patched value in bytes (1, 4, or 8).
    pub size: u8,
    /// The resolved label.
    pub label: Label,
    /// The instruction family that was patched.
    pub kind: FixupKind,
}

/// One deferred-patch work item: the byte range a placeholder encoding
/// occupies, the label it depends on, and how to re-encode it.
///
/// Created immediately after the placeholder pass, consumed exactly once by
/// the fixup driver.
#[derive(Debug, Clone, Copy)]
pub struct Fixup {
    start: u32,
    end: u32,
    label: Label,
    kind: FixupKind,
}

impl Fixup {
    pub(crate) fn new(start: u32, end: u32, label: Label, kind: FixupKind) -> Self {
        Self {
            start,
            end,
            label,
            kind,
        }
    }

    /// Buffer position where the instruction's bytes begin.
    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Buffer position one past the instruction's last byte.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of bytes the placeholder pass reserved.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.end - self.start
    }

    /// The referenced label.
    #[must_use]
    pub fn label(&self) -> Label {
        self.label
    }

    /// The instruction family and captured operands.
    #[must_use]
    pub fn kind(&self) -> &FixupKind {
        &self.kind
    }

    /// Recover the operand width the placeholder pass reserved, by matching
    /// the record's span length against the family's known encoding lengths.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::InconsistentFixup`] when no legal width of the
    /// family occupies exactly this many bytes (a corrupted record).
    pub fn label_size(&self) -> Result<Width, AsmError> {
        self.kind
            .legal_widths()
            .iter()
            .find(|w| self.kind.encoded_len(*w) == Some(self.size()))
            .ok_or(AsmError::InconsistentFixup {
                position: self.start,
                size: self.size(),
            })
    }

    /// The relative displacement to `target`, measured from the end of the
    /// encoded instruction (x86 PC-relative semantics: next instruction
    /// address + displacement = target).
    fn displacement(&self, target: u64, base: u64) -> i64 {
        let next = base.wrapping_add(u64::from(self.end));
        (target as i64).wrapping_sub(next as i64)
    }

    fn checked_rel8(&self, disp: i64) -> Result<i8, AsmError> {
        i8::try_from(disp).map_err(|_| AsmError::DisplacementOverflow {
            position: self.start,
            disp,
            width: Width::B8,
        })
    }

    fn checked_rel32(&self, disp: i64) -> Result<i32, AsmError> {
        i32::try_from(disp).map_err(|_| AsmError::DisplacementOverflow {
            position: self.start,
            disp,
            width: Width::B32,
        })
    }

    fn resolve_target(&self, labels: &LabelTable, base: u64) -> Result<u64, AsmError> {
        labels
            .target_address(self.label, base)
            .map_err(|_| AsmError::UnboundLabel {
                label: self.label,
                position: Some(self.start),
            })
    }

    /// Re-encode this instruction with the resolved label value and overwrite
    /// the reserved range in `code`.
    ///
    /// # Errors
    ///
    /// - [`AsmError::UnboundLabel`] when the label is still unassigned.
    /// - [`AsmError::DisplacementOverflow`] when the target does not fit the
    ///   reserved width.
    /// - [`AsmError::InconsistentFixup`] / [`AsmError::FixupSizeChanged`] on
    ///   internal encoding inconsistencies.
    pub(crate) fn patch(
        &self,
        labels: &LabelTable,
        code: &mut CodeBuffer,
    ) -> Result<AppliedFixup, AsmError> {
        let base = code.base_address();
        let target = self.resolve_target(labels, base)?;

        // Resolution pass: re-encode into a scratch buffer, then splice over
        // the reserved range.  The byte count must not change.
        let mut scratch = CodeBuffer::new();
        let value_size: u8 = match self.kind {
            FixupKind::Jcc { cc } => {
                let disp = self.displacement(target, base);
                match self.label_size()? {
                    Width::B8 => {
                        raw::jcc_rel8(&mut scratch, cc, self.checked_rel8(disp)?);
                        1
                    }
                    _ => {
                        raw::jcc_rel32(&mut scratch, cc, self.checked_rel32(disp)?);
                        4
                    }
                }
            }
            FixupKind::Jmp => {
                let disp = self.displacement(target, base);
                match self.label_size()? {
                    Width::B8 => {
                        raw::jmp_rel8(&mut scratch, self.checked_rel8(disp)?);
                        1
                    }
                    _ => {
                        raw::jmp_rel32(&mut scratch, self.checked_rel32(disp)?);
                        4
                    }
                }
            }
            FixupKind::Call => {
                let disp = self.displacement(target, base);
                raw::call_rel32(&mut scratch, self.checked_rel32(disp)?);
                4
            }
            FixupKind::Loop { op } => {
                let disp = self.displacement(target, base);
                raw::loop_rel8(&mut scratch, op, self.checked_rel8(disp)?);
                1
            }
            FixupKind::Lea { dst } => {
                let disp = self.displacement(target, base);
                raw::lea_rip(&mut scratch, dst, self.checked_rel32(disp)?);
                4
            }
            FixupKind::Load { dst } => {
                let disp = self.displacement(target, base);
                raw::mov_load_rip(&mut scratch, dst, self.checked_rel32(disp)?);
                4
            }
            FixupKind::Store { src } => {
                let disp = self.displacement(target, base);
                raw::mov_store_rip(&mut scratch, src, self.checked_rel32(disp)?);
                4
            }
            FixupKind::MoffsLoad => {
                raw::mov_rax_moffs64(&mut scratch, target);
                8
            }
            FixupKind::MoffsStore => {
                raw::mov_moffs64_rax(&mut scratch, target);
                8
            }
            FixupKind::AddressLiteral => {
                scratch.emit_u64(target);
                8
            }
            FixupKind::OffsetLiteral { base: from, width } => {
                let from_addr =
                    labels
                        .target_address(from, base)
                        .map_err(|_| AsmError::UnboundLabel {
                            label: from,
                            position: Some(self.start),
                        })?;
                let offset = (target as i64).wrapping_sub(from_addr as i64);
                self.emit_offset_literal(&mut scratch, offset, width)?;
                width.bytes() as u8
            }
        };

        if scratch.len() as u32 != self.size() {
            return Err(AsmError::FixupSizeChanged {
                position: self.start,
                reserved: self.size(),
                emitted: scratch.len() as u32,
            });
        }
        code.patch(self.start, scratch.bytes());

        Ok(AppliedFixup {
            offset: self.end - u32::from(value_size),
            size: value_size,
            label: self.label,
            kind: self.kind,
        })
    }

    fn emit_offset_literal(
        &self,
        scratch: &mut CodeBuffer,
        offset: i64,
        width: OffsetWidth,
    ) -> Result<(), AsmError> {
        let overflow = |w: Width| AsmError::DisplacementOverflow {
            position: self.start,
            disp: offset,
            width: w,
        };
        match width {
            OffsetWidth::W8 => {
                let v = i8::try_from(offset).map_err(|_| overflow(Width::B8))?;
                scratch.emit_u8(v as u8);
            }
            OffsetWidth::W16 => {
                let v = i16::try_from(offset).map_err(|_| overflow(Width::B16))?;
                scratch.emit_u16(v as u16);
            }
            OffsetWidth::W32 => {
                let v = i32::try_from(offset).map_err(|_| overflow(Width::B32))?;
                scratch.emit_u32(v as u32);
            }
            OffsetWidth::W64 => {
                scratch.emit_u64(offset as u64);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_bound(position: u32) -> (LabelTable, Label) {
        let mut labels = LabelTable::new();
        let label = labels.create();
        labels.bind(label, position).unwrap();
        (labels, label)
    }

    #[test]
    fn width_set_membership() {
        assert!(WidthSet::REL8_OR_REL32.contains(Width::B8));
        assert!(WidthSet::REL8_OR_REL32.contains(Width::B32));
        assert!(!WidthSet::REL8_OR_REL32.contains(Width::Addr64));
        assert!(WidthSet::ADDR64.contains(Width::Addr64));
    }

    #[test]
    fn label_size_recovers_reserved_width() {
        let label = LabelTable::new().create();
        let short = Fixup::new(0, 2, label, FixupKind::Jcc { cc: Cond::E });
        assert_eq!(short.label_size().unwrap(), Width::B8);
        let near = Fixup::new(0, 6, label, FixupKind::Jcc { cc: Cond::E });
        assert_eq!(near.label_size().unwrap(), Width::B32);
    }

    #[test]
    fn label_size_rejects_impossible_span() {
        let label = LabelTable::new().create();
        let bad = Fixup::new(4, 7, label, FixupKind::Jcc { cc: Cond::E });
        assert_eq!(
            bad.label_size(),
            Err(AsmError::InconsistentFixup {
                position: 4,
                size: 3
            })
        );
    }

    #[test]
    fn patch_unbound_label_is_fatal() {
        let mut labels = LabelTable::new();
        let label = labels.create();
        let mut code = CodeBuffer::new();
        raw::jmp_rel32(&mut code, 0);
        let fixup = Fixup::new(0, 5, label, FixupKind::Jmp);
        assert_eq!(
            fixup.patch(&labels, &mut code),
            Err(AsmError::UnboundLabel {
                label,
                position: Some(0)
            })
        );
    }

    #[test]
    fn patch_short_jump_to_self() {
        let (labels, label) = table_with_bound(0);
        let mut code = CodeBuffer::new();
        raw::jmp_rel8(&mut code, 0);
        let fixup = Fixup::new(0, 2, label, FixupKind::Jmp);
        fixup.patch(&labels, &mut code).unwrap();
        assert_eq!(code.bytes(), &[0xEB, 0xFE]);
    }

    #[test]
    fn patch_rejects_out_of_range_rel8() {
        let (labels, label) = table_with_bound(1000);
        let mut code = CodeBuffer::new();
        raw::jmp_rel8(&mut code, 0);
        let fixup = Fixup::new(0, 2, label, FixupKind::Jmp);
        assert_eq!(
            fixup.patch(&labels, &mut code),
            Err(AsmError::DisplacementOverflow {
                position: 0,
                disp: 998,
                width: Width::B8
            })
        );
    }

    #[test]
    fn patch_moffs_uses_base_address() {
        let (labels, label) = table_with_bound(0x10);
        let mut code = CodeBuffer::with_base_address(0x40_0000);
        raw::mov_rax_moffs64(&mut code, 0);
        let fixup = Fixup::new(0, 10, label, FixupKind::MoffsLoad);
        let applied = fixup.patch(&labels, &mut code).unwrap();
        assert_eq!(applied.offset, 2);
        assert_eq!(applied.size, 8);
        assert_eq!(&code.bytes()[2..10], &0x40_0010u64.to_le_bytes());
    }

    #[test]
    fn patch_offset_literal_between_labels() {
        let mut labels = LabelTable::new();
        let a = labels.create();
        let b = labels.create();
        labels.bind(a, 8).unwrap();
        labels.bind(b, 40).unwrap();
        let mut code = CodeBuffer::new();
        code.emit_u16(0);
        let fixup = Fixup::new(
            0,
            2,
            b,
            FixupKind::OffsetLiteral {
                base: a,
                width: OffsetWidth::W16,
            },
        );
        fixup.patch(&labels, &mut code).unwrap();
        assert_eq!(code.bytes(), &32i16.to_le_bytes());
    }

    #[test]
    fn patched_value_offset_points_at_displacement_field() {
        let (labels, label) = table_with_bound(100);
        let mut code = CodeBuffer::new();
        raw::jcc_rel32(&mut code, Cond::Ne, 0);
        let fixup = Fixup::new(0, 6, label, FixupKind::Jcc { cc: Cond::Ne });
        let applied = fixup.patch(&labels, &mut code).unwrap();
        assert_eq!(applied.offset, 2);
        assert_eq!(applied.size, 4);
        // disp = 100 - 6
        assert_eq!(&code.bytes()[2..6], &94i32.to_le_bytes());
    }
}
