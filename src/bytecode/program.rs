use crate::bytecode::Op;
use serde::{Deserialize, Serialize};

/// A compiled bytecode program: a flat byte buffer, executed from offset 0.
///
/// No header, no versioning, no length prefix. Offsets into the buffer are
/// the addresses used as jump and call targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    bytes: Vec<u8>,
}

impl Program {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    // =========================================================================
    // Emission (compiler side)
    // =========================================================================

    pub fn emit(&mut self, op: Op) {
        self.bytes.push(op as u8);
    }

    /// Emit an operand-carrying instruction (4-byte little-endian operand).
    pub fn emit_with_operand(&mut self, op: Op, v: u32) {
        self.bytes.push(op as u8);
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Emit `PUSH_LIT 0` and return the byte offset of the blank operand,
    /// to be patched once the true value is known.
    pub fn emit_blank_push(&mut self) -> usize {
        self.emit_with_operand(Op::PushLit, 0);
        self.bytes.len() - 4
    }

    /// Overwrite a previously emitted 4-byte operand.
    pub fn patch_u32(&mut self, offset: usize, v: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    // =========================================================================
    // Fetching (VM side)
    // =========================================================================

    pub fn fetch_byte(&self, pc: usize) -> Option<u8> {
        self.bytes.get(pc).copied()
    }

    pub fn fetch_u32(&self, offset: usize) -> Option<u32> {
        let slice = self.bytes.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn to_postcard(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_postcard(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_fetch() {
        let mut prog = Program::new();
        prog.emit_with_operand(Op::PushLit, 0xdead_beef);
        prog.emit(Op::Add);

        assert_eq!(prog.len(), 6);
        assert_eq!(prog.fetch_byte(0), Some(Op::PushLit as u8));
        assert_eq!(prog.fetch_u32(1), Some(0xdead_beef));
        assert_eq!(prog.fetch_byte(5), Some(Op::Add as u8));
        assert_eq!(prog.fetch_byte(6), None);
    }

    #[test]
    fn test_blank_push_patching() {
        let mut prog = Program::new();
        let slot = prog.emit_blank_push();
        prog.emit(Op::Jump);

        assert_eq!(prog.fetch_u32(slot), Some(0));
        prog.patch_u32(slot, 77);
        assert_eq!(prog.fetch_u32(slot), Some(77));
    }

    #[test]
    fn test_truncated_operand_fetch() {
        let mut prog = Program::new();
        prog.emit(Op::PushLit);
        assert_eq!(prog.fetch_u32(1), None);
    }

    #[test]
    fn test_postcard_round_trip() {
        let mut prog = Program::new();
        prog.emit_with_operand(Op::PushLit, 42);
        prog.emit(Op::Halt);

        let data = prog.to_postcard().unwrap();
        let loaded = Program::from_postcard(&data).unwrap();
        assert_eq!(loaded.as_bytes(), prog.as_bytes());
    }
}
