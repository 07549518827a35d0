use crate::runtime::runtime_error::RuntimeError;

// =============================================================================
// ECALL - host trap protocol
// =============================================================================
//
// A trap suspends the machine and hands its linear memory to the host. The
// guest fills in three well-known cells before trapping:
//
//   memory[4]  call type
//   memory[5]  destination address
//   memory[6]  exclusive address bound
//
// The handler mutates memory in place and the machine resumes at the
// instruction after the trap.

pub const ECALL_TYPE_ADDR: usize = 4;
pub const ECALL_DEST_ADDR: usize = 5;
pub const ECALL_BOUND_ADDR: usize = 6;

/// Call type: copy host input into guest memory.
pub const ECALL_READ_INPUT: u32 = 8;

pub trait EcallHandler {
    fn handle(&mut self, memory: &mut [u32]) -> Result<(), RuntimeError>;
}

/// Serves `ECALL_READ_INPUT` from a fixed byte buffer. Bytes are widened to
/// one u32 cell each, with a newline and a NUL terminator appended. The copy
/// stops at the guest's address bound; every other call type is ignored.
#[derive(Debug, Default)]
pub struct InputEcall {
    input: Vec<u8>,
}

impl InputEcall {
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: input.into(),
        }
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(Self {
            input: std::fs::read(path)?,
        })
    }
}

impl EcallHandler for InputEcall {
    fn handle(&mut self, memory: &mut [u32]) -> Result<(), RuntimeError> {
        if memory.len() <= ECALL_BOUND_ADDR {
            return Err(RuntimeError::Host(
                "memory too small for the trap cells".to_string(),
            ));
        }

        if memory[ECALL_TYPE_ADDR] != ECALL_READ_INPUT {
            return Ok(());
        }

        let mut addr = memory[ECALL_DEST_ADDR] as usize;
        let bound = (memory[ECALL_BOUND_ADDR] as usize).min(memory.len());

        for b in self.input.iter().copied().chain([0x0a, 0x00]) {
            if addr >= bound {
                break;
            }
            memory[addr] = b as u32;
            addr += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trap_memory(call_type: u32, dest: u32, bound: u32) -> Vec<u32> {
        let mut memory = vec![0u32; 64];
        memory[ECALL_TYPE_ADDR] = call_type;
        memory[ECALL_DEST_ADDR] = dest;
        memory[ECALL_BOUND_ADDR] = bound;
        memory
    }

    #[test]
    fn test_input_copied_with_terminators() {
        let mut memory = trap_memory(ECALL_READ_INPUT, 10, 64);
        let mut handler = InputEcall::new(*b"hi");
        handler.handle(&mut memory).unwrap();

        assert_eq!(memory[10], 'h' as u32);
        assert_eq!(memory[11], 'i' as u32);
        assert_eq!(memory[12], 0x0a);
        assert_eq!(memory[13], 0);
    }

    #[test]
    fn test_copy_stops_at_bound() {
        let mut memory = trap_memory(ECALL_READ_INPUT, 10, 12);
        let mut handler = InputEcall::new(*b"hello");
        handler.handle(&mut memory).unwrap();

        assert_eq!(memory[10], 'h' as u32);
        assert_eq!(memory[11], 'e' as u32);
        // Cell at the bound untouched.
        assert_eq!(memory[12], 0);
    }

    #[test]
    fn test_unknown_call_type_leaves_memory_alone() {
        let mut memory = trap_memory(3, 10, 64);
        let mut handler = InputEcall::new(*b"data");
        handler.handle(&mut memory).unwrap();
        assert!(memory[7..].iter().all(|&cell| cell == 0));
    }

    #[test]
    fn test_empty_input_still_terminates() {
        let mut memory = trap_memory(ECALL_READ_INPUT, 20, 64);
        let mut handler = InputEcall::default();
        handler.handle(&mut memory).unwrap();
        assert_eq!(memory[20], 0x0a);
        assert_eq!(memory[21], 0);
    }

    #[test]
    fn test_tiny_memory_is_a_host_error() {
        let mut memory = vec![0u32; 4];
        let mut handler = InputEcall::new(*b"x");
        assert!(matches!(
            handler.handle(&mut memory),
            Err(RuntimeError::Host(_))
        ));
    }
}
