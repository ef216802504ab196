//! Labels: symbolic placeholders for positions in the output buffer.
//!
//! A [`Label`] is an opaque `Copy` handle into a [`LabelTable`] owned by the
//! assembler session.  It is created unbound, may be referenced by any number
//! of instructions while unbound, and is assigned exactly once — either
//! *bound* to a byte position inside the buffer, or *fixed* to an absolute
//! address outside it (an external routine or data object at a known
//! address).  Rebinding is an error in both cases.

use alloc::vec::Vec;
use core::fmt;

use crate::error::AsmError;

/// An opaque handle to a label.
///
/// Handles are cheap to copy and only meaningful to the [`LabelTable`] (and
/// the assembler owning it) that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(u32);

impl Label {
    /// The index of this label within its table.
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Assignment state of one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelState {
    /// Created but not yet assigned.
    Unbound,
    /// Bound to a byte position within the output buffer.
    Bound(u32),
    /// Fixed to an absolute 64-bit address outside the buffer.
    Fixed(u64),
}

/// The set of labels belonging to one assembler session.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    states: Vec<LabelState>,
}

impl LabelTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { states: Vec::new() }
    }

    /// Create a new unbound label.
    pub fn create(&mut self) -> Label {
        let label = Label(self.states.len() as u32);
        self.states.push(LabelState::Unbound);
        label
    }

    /// Bind a label to an absolute byte position within the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::DoubleBind`] if the label was already bound or
    /// fixed — labels are single-assignment.
    pub fn bind(&mut self, label: Label, position: u32) -> Result<(), AsmError> {
        let state = &mut self.states[label.index()];
        if *state != LabelState::Unbound {
            return Err(AsmError::DoubleBind { label });
        }
        *state = LabelState::Bound(position);
        Ok(())
    }

    /// Fix a label to an absolute 64-bit address outside the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::DoubleBind`] if the label was already bound or
    /// fixed.
    pub fn fix(&mut self, label: Label, address: u64) -> Result<(), AsmError> {
        let state = &mut self.states[label.index()];
        if *state != LabelState::Unbound {
            return Err(AsmError::DoubleBind { label });
        }
        *state = LabelState::Fixed(address);
        Ok(())
    }

    /// Whether the label has been bound or fixed.
    #[must_use]
    pub fn is_bound(&self, label: Label) -> bool {
        self.states[label.index()] != LabelState::Unbound
    }

    /// The bound buffer position of a label.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::UnboundLabel`] if the label is unbound or was
    /// fixed to an address (a fixed label has no buffer position).
    pub fn position(&self, label: Label) -> Result<u32, AsmError> {
        match self.states[label.index()] {
            LabelState::Bound(position) => Ok(position),
            _ => Err(AsmError::UnboundLabel {
                label,
                position: None,
            }),
        }
    }

    /// The absolute target address of a label: `base + position` for a bound
    /// label, the fixed address for a fixed label.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::UnboundLabel`] if the label is unbound.
    pub fn target_address(&self, label: Label, base: u64) -> Result<u64, AsmError> {
        match self.states[label.index()] {
            LabelState::Bound(position) => Ok(base.wrapping_add(u64::from(position))),
            LabelState::Fixed(address) => Ok(address),
            LabelState::Unbound => Err(AsmError::UnboundLabel {
                label,
                position: None,
            }),
        }
    }

    /// Number of labels created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no labels have been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterate over all bound labels as `(label, position)` pairs.
    ///
    /// Fixed and unbound labels are skipped — only labels with a position
    /// inside the buffer appear.
    pub fn bound(&self) -> impl Iterator<Item = (Label, u32)> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter_map(|(i, state)| match state {
                LabelState::Bound(position) => Some((Label(i as u32), *position)),
                _ => None,
            })
    }
}
