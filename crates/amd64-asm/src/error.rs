//! Error types for label binding and fixup resolution.

use core::fmt;

use crate::fixup::Width;
use crate::label::Label;

/// Assembly error with enough context (position, label, displacement) to
/// locate the offending emission call.
///
/// Every variant is fatal: a fixup that cannot be patched invalidates the
/// whole output buffer, so there is no per-record recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsmError {
    /// Resolution was attempted before the referenced label was bound.
    UnboundLabel {
        /// The unbound label.
        label: Label,
        /// Buffer position of the referencing instruction, when the failure
        /// occurred during fixup resolution.
        position: Option<u32>,
    },

    /// A label was bound or fixed more than once — labels are
    /// single-assignment.
    DoubleBind {
        /// The label that was already bound.
        label: Label,
    },

    /// The resolved displacement does not fit in the field width reserved at
    /// placeholder time.  This design performs no re-layout, so the only fix
    /// is to emit the wider form up front.
    DisplacementOverflow {
        /// Buffer position of the referencing instruction.
        position: u32,
        /// The displacement that was computed.
        disp: i64,
        /// The width that was reserved.
        width: Width,
    },

    /// A fixup record's byte span matches no legal encoding width of its
    /// instruction family — the record is corrupted.
    InconsistentFixup {
        /// Buffer position of the referencing instruction.
        position: u32,
        /// The span length that could not be matched to a width.
        size: u32,
    },

    /// The resolution pass produced a different number of bytes than the
    /// placeholder pass reserved.  Instruction growth and shrinkage are not
    /// supported.
    FixupSizeChanged {
        /// Buffer position of the referencing instruction.
        position: u32,
        /// Bytes reserved by the placeholder pass.
        reserved: u32,
        /// Bytes produced by the resolution pass.
        emitted: u32,
    },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::UnboundLabel {
                label,
                position: Some(pos),
            } => {
                write!(f, "fixup at position {}: label {} is unbound", pos, label)
            }
            AsmError::UnboundLabel {
                label,
                position: None,
            } => {
                write!(f, "label {} is unbound", label)
            }
            AsmError::DoubleBind { label } => {
                write!(f, "label {} is already bound", label)
            }
            AsmError::DisplacementOverflow {
                position,
                disp,
                width,
            } => {
                write!(
                    f,
                    "fixup at position {}: displacement {} does not fit in the reserved {} field",
                    position, disp, width
                )
            }
            AsmError::InconsistentFixup { position, size } => {
                write!(
                    f,
                    "fixup at position {}: no legal encoding of this instruction family occupies {} bytes",
                    position, size
                )
            }
            AsmError::FixupSizeChanged {
                position,
                reserved,
                emitted,
            } => {
                write!(
                    f,
                    "fixup at position {}: resolution pass emitted {} bytes into a {}-byte reservation",
                    position, emitted, reserved
                )
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AsmError {}
