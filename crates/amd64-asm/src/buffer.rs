//! The linear output buffer and its position cursor.
//!
//! All position bookkeeping flows through [`CodeBuffer`] — the fixup engine
//! never reads ambient assembler state.  The buffer is append-only during
//! emission; the resolution pass overwrites previously reserved ranges via
//! [`CodeBuffer::patch`], never changing the total length.

use alloc::vec::Vec;

/// A growable little-endian byte buffer with a configured base (load)
/// address.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
    base_address: u64,
}

impl CodeBuffer {
    /// Create an empty buffer with base address 0.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_address(0)
    }

    /// Create an empty buffer that will be loaded at `base_address`.
    #[must_use]
    pub fn with_base_address(base_address: u64) -> Self {
        Self {
            bytes: Vec::new(),
            base_address,
        }
    }

    /// The configured load address of the first byte.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// The number of bytes emitted so far — the position at which the next
    /// instruction will start.
    #[must_use]
    pub fn current_position(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Append a single byte.
    #[inline]
    pub fn emit_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    /// Append a 16-bit value, little-endian.
    #[inline]
    pub fn emit_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a 32-bit value, little-endian.
    #[inline]
    pub fn emit_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a 64-bit value, little-endian.
    #[inline]
    pub fn emit_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Append raw bytes.
    #[inline]
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Overwrite the range starting at `start` with `replacement`, in place.
    ///
    /// Used only by the fixup driver; the replacement always re-encodes a
    /// previously reserved instruction, so the range is in bounds by
    /// construction.
    ///
    /// # Panics
    ///
    /// Panics if `start + replacement.len()` exceeds the buffer length.
    pub fn patch(&mut self, start: u32, replacement: &[u8]) {
        let start = start as usize;
        let end = start + replacement.len();
        assert!(
            end <= self.bytes.len(),
            "patch range {}..{} out of bounds (buffer len {})",
            start,
            end,
            self.bytes.len()
        );
        self.bytes[start..end].copy_from_slice(replacement);
    }

    /// The bytes emitted so far.
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

    /// Whether nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_helpers_are_little_endian() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0xAA);
        buf.emit_u16(0x1122);
        buf.emit_u32(0x3344_5566);
        buf.emit_u64(0x7788_99AA_BBCC_DDEE);
        assert_eq!(
            buf.bytes(),
            &[
                0xAA, 0x22, 0x11, 0x66, 0x55, 0x44, 0x33, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x99,
                0x88, 0x77
            ]
        );
    }

    #[test]
    fn current_position_tracks_length() {
        let mut buf = CodeBuffer::new();
        assert_eq!(buf.current_position(), 0);
        buf.emit_u32(0);
        assert_eq!(buf.current_position(), 4);
    }

    #[test]
    fn patch_overwrites_in_place() {
        let mut buf = CodeBuffer::new();
        buf.emit_bytes(&[0x90, 0x00, 0x00, 0x90]);
        buf.patch(1, &[0xAB, 0xCD]);
        assert_eq!(buf.bytes(), &[0x90, 0xAB, 0xCD, 0x90]);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    #[should_panic(expected = "patch range")]
    fn patch_out_of_bounds_panics() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0x90);
        buf.patch(0, &[0, 0]);
    }

    #[test]
    fn base_address_is_stored() {
        let buf = CodeBuffer::with_base_address(0x40_0000);
        assert_eq!(buf.base_address(), 0x40_0000);
    }
}
