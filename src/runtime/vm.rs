use crate::bytecode::{Op, Program};
use crate::runtime::ecall::EcallHandler;
use crate::runtime::runtime_error::RuntimeError;

// =============================================================================
// VM - stack machine over flat bytecode
// =============================================================================
//
// One value stack holds operands and frame slots alike. A frame pointer marks
// the base of the current call's slots; locals and parameters are addressed
// as fp + slot. Globals and linear memory are separate zero-initialized
// arrays. All arithmetic wraps at 32 bits.

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub stack_size: usize,
    pub call_depth: usize,
    pub global_count: usize,
    pub memory_size: usize,
    /// `None` runs without a step budget.
    pub max_steps: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_size: 4096,
            call_depth: 256,
            global_count: 256,
            memory_size: 65536,
            max_steps: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    Ready,
    Running,
    Halted,
    Error,
}

/// Why `run` returned control to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Suspended at a host trap; service memory and call `run` again.
    Trap,
    /// The program stopped; the payload is its final value.
    Finished(u32),
}

#[derive(Debug)]
struct Frame {
    return_pc: usize,
    saved_fp: usize,
    /// Stack index of the callee's first argument; the stack is truncated
    /// back to here on return.
    base: usize,
}

#[derive(Debug)]
pub struct Vm {
    program: Program,
    config: VmConfig,
    pc: usize,
    stack: Vec<u32>,
    fp: usize,
    frames: Vec<Frame>,
    globals: Vec<u32>,
    memory: Vec<u32>,
    return_value: u32,
    status: VmStatus,
    steps: u64,
}

impl Vm {
    pub fn new(program: Program) -> Self {
        Self::with_config(program, VmConfig::default())
    }

    pub fn with_config(program: Program, config: VmConfig) -> Self {
        let globals = vec![0; config.global_count];
        let memory = vec![0; config.memory_size];
        Self {
            program,
            config,
            pc: 0,
            stack: Vec::new(),
            fp: 0,
            frames: Vec::new(),
            globals,
            memory,
            return_value: 0,
            status: VmStatus::Ready,
            steps: 0,
        }
    }

    pub fn status(&self) -> VmStatus {
        self.status
    }

    /// The value most recently produced by a `RETURN`.
    pub fn return_value(&self) -> u32 {
        self.return_value
    }

    pub fn memory(&self) -> &[u32] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u32] {
        &mut self.memory
    }

    /// Execute until the program finishes or suspends at a trap. Call again
    /// after servicing the trap to resume.
    pub fn run(&mut self) -> Result<Exit, RuntimeError> {
        self.status = VmStatus::Running;
        loop {
            match self.step() {
                Ok(Some(exit)) => return Ok(exit),
                Ok(None) => {}
                Err(e) => {
                    self.status = VmStatus::Error;
                    return Err(e);
                }
            }
        }
    }

    /// Drive the trap loop with `handler` until the program finishes.
    pub fn run_to_completion(
        &mut self,
        handler: &mut dyn EcallHandler,
    ) -> Result<u32, RuntimeError> {
        loop {
            match self.run()? {
                Exit::Finished(v) => return Ok(v),
                Exit::Trap => {
                    if let Err(e) = handler.handle(&mut self.memory) {
                        self.status = VmStatus::Error;
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Execute one instruction. `Some(exit)` means control goes back to the
    /// caller; `None` means keep stepping.
    fn step(&mut self) -> Result<Option<Exit>, RuntimeError> {
        if let Some(budget) = self.config.max_steps {
            if self.steps >= budget {
                return Err(RuntimeError::StepLimitExceeded);
            }
        }
        self.steps += 1;

        let at = self.pc;
        let byte = self
            .program
            .fetch_byte(at)
            .ok_or(RuntimeError::PcOutOfBounds { pc: at })?;
        let op = Op::from_byte(byte).ok_or(RuntimeError::IllegalOpcode { byte, pc: at })?;

        let operand = if op.has_operand() {
            Some(
                self.program
                    .fetch_u32(at + 1)
                    .ok_or(RuntimeError::TruncatedOperand { pc: at })?,
            )
        } else {
            None
        };

        // Transfer instructions overwrite this below.
        self.pc = at + op.size();

        match op {
            Op::Nop => {}
            Op::Ecall => return Ok(Some(Exit::Trap)),
            Op::Halt => {
                let v = self.pop()?;
                self.status = VmStatus::Halted;
                return Ok(Some(Exit::Finished(v)));
            }

            Op::Add | Op::Sub | Op::Mul | Op::Quo | Op::Rem | Op::And | Op::Or | Op::Xor
            | Op::Shl | Op::Shr | Op::LAnd | Op::LOr | Op::Eql | Op::Lss | Op::Gtr | Op::Neq
            | Op::Leq | Op::Geq => {
                let b = self.pop()?;
                let a = self.pop()?;
                let v = match op {
                    Op::Add => a.wrapping_add(b),
                    Op::Sub => a.wrapping_sub(b),
                    Op::Mul => a.wrapping_mul(b),
                    Op::Quo => {
                        if b == 0 {
                            return Err(RuntimeError::DivisionByZero { pc: at });
                        }
                        a / b
                    }
                    Op::Rem => {
                        if b == 0 {
                            return Err(RuntimeError::DivisionByZero { pc: at });
                        }
                        a % b
                    }
                    Op::And => a & b,
                    Op::Or => a | b,
                    Op::Xor => a ^ b,
                    // Shift counts of 32 or more produce zero.
                    Op::Shl => a.checked_shl(b).unwrap_or(0),
                    Op::Shr => a.checked_shr(b).unwrap_or(0),
                    Op::LAnd => (a != 0 && b != 0) as u32,
                    Op::LOr => (a != 0 || b != 0) as u32,
                    Op::Eql => (a == b) as u32,
                    Op::Lss => (a < b) as u32,
                    Op::Gtr => (a > b) as u32,
                    Op::Neq => (a != b) as u32,
                    Op::Leq => (a <= b) as u32,
                    Op::Geq => (a >= b) as u32,
                    _ => unreachable!(),
                };
                self.push(v)?;
            }

            Op::PushLit => {
                let v = operand.unwrap_or(0);
                self.push(v)?;
            }
            Op::PopLit => {
                self.pop()?;
            }

            Op::LoadGlobal => {
                let addr = self.pop()?;
                let v = *self
                    .globals
                    .get(addr as usize)
                    .ok_or(RuntimeError::GlobalOutOfBounds { addr })?;
                self.push(v)?;
            }
            Op::StoreGlobal => {
                let addr = self.pop()?;
                let v = self.pop()?;
                let slot = self
                    .globals
                    .get_mut(addr as usize)
                    .ok_or(RuntimeError::GlobalOutOfBounds { addr })?;
                *slot = v;
            }
            Op::LoadLocal => {
                let addr = self.pop()?;
                let v = *self
                    .stack
                    .get(self.fp + addr as usize)
                    .ok_or(RuntimeError::StackSlotOutOfBounds { addr })?;
                self.push(v)?;
            }
            Op::StoreLocal => {
                let addr = self.pop()?;
                let v = self.pop()?;
                let fp = self.fp;
                let slot = self
                    .stack
                    .get_mut(fp + addr as usize)
                    .ok_or(RuntimeError::StackSlotOutOfBounds { addr })?;
                *slot = v;
            }

            Op::StoreMem => {
                let v = self.pop()?;
                let addr = self.pop()?;
                let cell = self
                    .memory
                    .get_mut(addr as usize)
                    .ok_or(RuntimeError::MemoryOutOfBounds { addr })?;
                *cell = v;
            }
            Op::LoadMem => {
                let addr = self.pop()?;
                let v = *self
                    .memory
                    .get(addr as usize)
                    .ok_or(RuntimeError::MemoryOutOfBounds { addr })?;
                self.push(v)?;
            }
            Op::StoreMemStr => {
                // First character on top, destination beneath the run. The
                // operand comes from untrusted bytecode; bound it against the
                // live stack before reserving anything.
                let count = operand.unwrap_or(0) as usize;
                if count > self.stack.len() {
                    return Err(RuntimeError::StackUnderflow);
                }
                let mut chars = Vec::with_capacity(count);
                for _ in 0..count {
                    chars.push(self.pop()?);
                }
                let addr = self.pop()?;
                for (i, c) in chars.into_iter().enumerate() {
                    let cell_addr = addr.wrapping_add(i as u32);
                    let cell = self
                        .memory
                        .get_mut(cell_addr as usize)
                        .ok_or(RuntimeError::MemoryOutOfBounds { addr: cell_addr })?;
                    *cell = c;
                }
            }

            Op::Jump => {
                let target = self.pop()?;
                self.pc = target as usize;
            }
            Op::Branch => {
                let cond = self.pop()?;
                let target = self.pop()?;
                if cond == 0 {
                    self.pc = target as usize;
                }
            }
            Op::Call => {
                let callee = self.pop()?;
                let arg_count = self.pop()? as usize;
                if self.frames.len() >= self.config.call_depth {
                    return Err(RuntimeError::CallStackOverflow);
                }
                if arg_count > self.stack.len() {
                    return Err(RuntimeError::StackUnderflow);
                }
                // Arguments stay in place and become the callee's first slots.
                let base = self.stack.len() - arg_count;
                self.frames.push(Frame {
                    return_pc: self.pc,
                    saved_fp: self.fp,
                    base,
                });
                self.fp = base;
                self.pc = callee as usize;
            }
            Op::Return => {
                let v = self.pop()?;
                let frame = self.frames.pop().ok_or(RuntimeError::ReturnWithoutCall)?;
                self.stack.truncate(frame.base);
                self.pc = frame.return_pc;
                self.fp = frame.saved_fp;
                self.push(v)?;
                self.return_value = v;
            }
        }

        Ok(None)
    }

    fn push(&mut self, v: u32) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.stack_size {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<u32, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Compiler;
    use crate::frontend::lexer::Lexer;
    use crate::runtime::ecall::{
        ECALL_BOUND_ADDR, ECALL_DEST_ADDR, ECALL_TYPE_ADDR, InputEcall,
    };

    fn build(src: &str) -> Program {
        let toks = Lexer::new(src).tokenize().unwrap();
        Compiler::new(&toks).compile().unwrap()
    }

    fn run(src: &str) -> u32 {
        let mut vm = Vm::new(build(src));
        match vm.run().unwrap() {
            Exit::Finished(v) => v,
            Exit::Trap => panic!("unexpected trap"),
        }
    }

    fn run_err(src: &str) -> RuntimeError {
        let mut vm = Vm::new(build(src));
        vm.run().unwrap_err()
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_chain_evaluates_left_to_right() {
        // No precedence: (2 + 3) * 4.
        assert_eq!(run("func main()\nreturn 2 + 3 * 4\nend\n"), 20);
    }

    #[test]
    fn test_parens_override_chain_order() {
        assert_eq!(run("func main()\nreturn 2 + (3 * 4)\nend\n"), 14);
    }

    #[test]
    fn test_arithmetic_wraps() {
        assert_eq!(run("func main()\nreturn 0 - 1\nend\n"), u32::MAX);
        assert_eq!(
            run("func main()\nreturn 4294967295 + 2\nend\n"),
            1
        );
    }

    #[test]
    fn test_shift_count_past_width_is_zero() {
        assert_eq!(run("func main()\nreturn 1 << 32\nend\n"), 0);
        assert_eq!(run("func main()\nreturn 255 >> 40\nend\n"), 0);
        assert_eq!(run("func main()\nreturn 1 << 4\nend\n"), 16);
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(run("func main()\nreturn 3 < 5\nend\n"), 1);
        assert_eq!(run("func main()\nreturn 3 >= 5\nend\n"), 0);
        assert_eq!(run("func main()\nreturn 2 && 3\nend\n"), 1);
        assert_eq!(run("func main()\nreturn 0 || 0\nend\n"), 0);
    }

    #[test]
    fn test_signed_literal_in_group() {
        assert_eq!(run("func main()\nreturn (-1) + 1\nend\n"), 0);
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            run_err("func main()\nreturn 1 / 0\nend\n"),
            RuntimeError::DivisionByZero { .. }
        ));
        assert!(matches!(
            run_err("func main()\nreturn 1 % 0\nend\n"),
            RuntimeError::DivisionByZero { .. }
        ));
    }

    // =========================================================================
    // Variables and scope
    // =========================================================================

    #[test]
    fn test_local_variables() {
        assert_eq!(
            run("func main()\nvar a = 4\nvar b = a * 10\nreturn b + a\nend\n"),
            44
        );
    }

    #[test]
    fn test_global_variables() {
        assert_eq!(
            run("var g\nfunc main()\ng = 9\nreturn g + 1\nend\n"),
            10
        );
    }

    #[test]
    fn test_globals_shared_across_calls() {
        let src = "var counter\n\
                   func bump()\n\
                   counter = counter + 1\n\
                   return counter\n\
                   end\n\
                   func main()\n\
                   bump()\n\
                   bump()\n\
                   return bump()\n\
                   end\n";
        assert_eq!(run(src), 3);
    }

    #[test]
    fn test_block_shadowing() {
        // The inner x lives only inside the if; the outer x survives it.
        let src = "func main()\n\
                   var x = 1\n\
                   if 1\n\
                   var x = 100\n\
                   x = x + 1\n\
                   end\n\
                   return x\n\
                   end\n";
        assert_eq!(run(src), 1);
    }

    #[test]
    fn test_freed_slot_reused() {
        let src = "func main()\n\
                   if 1\n\
                   var a = 50\n\
                   end\n\
                   var b = 7\n\
                   return b\n\
                   end\n";
        assert_eq!(run(src), 7);
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    #[test]
    fn test_if_taken_and_skipped() {
        let src = "func main()\n\
                   var r = 0\n\
                   if 2 > 1\n\
                   r = 10\n\
                   end\n\
                   if 1 > 2\n\
                   r = r + 90\n\
                   end\n\
                   return r\n\
                   end\n";
        assert_eq!(run(src), 10);
    }

    #[test]
    fn test_while_loop() {
        let src = "func main()\n\
                   var i = 0\n\
                   while i < 3\n\
                   i = i + 1\n\
                   end\n\
                   return i\n\
                   end\n";
        assert_eq!(run(src), 3);
    }

    #[test]
    fn test_while_body_never_entered() {
        let src = "func main()\n\
                   var i = 5\n\
                   while i < 3\n\
                   i = i + 1\n\
                   end\n\
                   return i\n\
                   end\n";
        assert_eq!(run(src), 5);
    }

    #[test]
    fn test_loop_local_discarded_each_iteration() {
        let src = "func main()\n\
                   var i = 0\n\
                   var acc = 0\n\
                   while i < 4\n\
                   var sq = i * i\n\
                   acc = acc + sq\n\
                   i = i + 1\n\
                   end\n\
                   return acc\n\
                   end\n";
        // 0 + 1 + 4 + 9
        assert_eq!(run(src), 14);
    }

    // =========================================================================
    // Calls
    // =========================================================================

    #[test]
    fn test_arguments_become_locals() {
        let src = "func sub(a, b)\n\
                   return a - b\n\
                   end\n\
                   func main()\n\
                   return sub(10, 4)\n\
                   end\n";
        assert_eq!(run(src), 6);
    }

    #[test]
    fn test_call_leaves_only_its_value() {
        // Calls nested inside a chain: anything leaked by a frame would
        // corrupt the surrounding operands.
        let src = "func sub(a, b)\n\
                   return a - b\n\
                   end\n\
                   func main()\n\
                   return 100 + sub(sub(9, 2), 3) + 1\n\
                   end\n";
        assert_eq!(run(src), 105);
    }

    #[test]
    fn test_forward_call() {
        let src = "func main()\n\
                   return twice(21)\n\
                   end\n\
                   func twice(x)\n\
                   return x * 2\n\
                   end\n";
        assert_eq!(run(src), 42);
    }

    #[test]
    fn test_recursion() {
        let src = "func fact(n)\n\
                   if n <= 1\n\
                   return 1\n\
                   end\n\
                   return n * fact(n - 1)\n\
                   end\n\
                   func main()\n\
                   return fact(5)\n\
                   end\n";
        assert_eq!(run(src), 120);
    }

    #[test]
    fn test_fall_through_returns_zero() {
        let src = "func quiet()\n\
                   var x = 5\n\
                   end\n\
                   func main()\n\
                   return quiet() + 1\n\
                   end\n";
        assert_eq!(run(src), 1);
    }

    #[test]
    fn test_unbounded_recursion_overflows_call_stack() {
        let src = "func spin()\n\
                   return spin()\n\
                   end\n\
                   func main()\n\
                   return spin()\n\
                   end\n";
        let mut vm = Vm::with_config(
            build(src),
            VmConfig {
                call_depth: 16,
                ..VmConfig::default()
            },
        );
        assert!(matches!(
            vm.run().unwrap_err(),
            RuntimeError::CallStackOverflow
        ));
        assert_eq!(vm.status(), VmStatus::Error);
    }

    // =========================================================================
    // Memory
    // =========================================================================

    #[test]
    fn test_pointer_store_round_trip() {
        let src = "func main()\n\
                   *(100) = 7\n\
                   return (*(100))\n\
                   end\n";
        assert_eq!(run(src), 7);
    }

    #[test]
    fn test_double_indirection() {
        let src = "func main()\n\
                   *(100) = 200\n\
                   **(100) = 9\n\
                   return (*(200))\n\
                   end\n";
        assert_eq!(run(src), 9);
    }

    #[test]
    fn test_string_lands_first_character_first() {
        let src = "func main()\n\
                   *(50) = 'abc'\n\
                   return (*(50)) * 1000 + (*(51)) * 1000 + (*(52))\n\
                   end\n";
        // ((97 * 1000 + 98) * 1000) + 99, chain order.
        let expected = (('a' as u32) * 1000 + ('b' as u32)) * 1000 + ('c' as u32);
        assert_eq!(run(src), expected);
    }

    #[test]
    fn test_memory_out_of_bounds() {
        let mut vm = Vm::with_config(
            build("func main()\n*(100) = 1\nreturn 0\nend\n"),
            VmConfig {
                memory_size: 64,
                ..VmConfig::default()
            },
        );
        assert!(matches!(
            vm.run().unwrap_err(),
            RuntimeError::MemoryOutOfBounds { addr: 100 }
        ));
    }

    // =========================================================================
    // Traps
    // =========================================================================

    #[test]
    fn test_trap_suspends_and_resumes() {
        let src = "func main()\n\
                   ecall()\n\
                   return 1\n\
                   end\n";
        let mut vm = Vm::new(build(src));
        assert_eq!(vm.run().unwrap(), Exit::Trap);
        assert_eq!(vm.run().unwrap(), Exit::Finished(1));
        assert_eq!(vm.status(), VmStatus::Halted);
        assert_eq!(vm.return_value(), 1);
    }

    #[test]
    fn test_input_trap_end_to_end() {
        // Request host input into cells 30.., then return the first byte.
        let src = format!(
            "func main()\n\
             *({type_addr}) = 8\n\
             *({dest}) = 30\n\
             *({bound}) = 40\n\
             ecall()\n\
             return (*(30))\n\
             end\n",
            type_addr = ECALL_TYPE_ADDR,
            dest = ECALL_DEST_ADDR,
            bound = ECALL_BOUND_ADDR,
        );
        let mut vm = Vm::new(build(&src));
        let mut handler = InputEcall::new(*b"Q");
        assert_eq!(vm.run_to_completion(&mut handler).unwrap(), 'Q' as u32);
        // Newline and terminator follow the payload.
        assert_eq!(vm.memory()[31], 0x0a);
        assert_eq!(vm.memory()[32], 0);
    }

    // =========================================================================
    // Limits and malformed programs
    // =========================================================================

    #[test]
    fn test_step_limit() {
        let src = "func main()\n\
                   while 1\n\
                   end\n\
                   return 0\n\
                   end\n";
        let mut vm = Vm::with_config(
            build(src),
            VmConfig {
                max_steps: Some(1000),
                ..VmConfig::default()
            },
        );
        assert!(matches!(
            vm.run().unwrap_err(),
            RuntimeError::StepLimitExceeded
        ));
    }

    #[test]
    fn test_illegal_opcode() {
        let prog = Program::from_postcard(
            &postcard::to_allocvec(&RawProgram { bytes: vec![0xee] }).unwrap(),
        )
        .unwrap();
        let mut vm = Vm::new(prog);
        assert!(matches!(
            vm.run().unwrap_err(),
            RuntimeError::IllegalOpcode { byte: 0xee, pc: 0 }
        ));
    }

    #[test]
    fn test_running_off_the_end() {
        let mut prog = Program::new();
        prog.emit(Op::Nop);
        let mut vm = Vm::new(prog);
        assert!(matches!(
            vm.run().unwrap_err(),
            RuntimeError::PcOutOfBounds { pc: 1 }
        ));
    }

    #[test]
    fn test_string_store_count_exceeding_stack() {
        // The run length is an untrusted operand; a huge value must fail
        // like any other underflow instead of reserving memory for it.
        let mut prog = Program::new();
        prog.emit_with_operand(Op::PushLit, 0);
        prog.emit_with_operand(Op::StoreMemStr, u32::MAX);
        let mut vm = Vm::new(prog);
        assert!(matches!(
            vm.run().unwrap_err(),
            RuntimeError::StackUnderflow
        ));
        assert_eq!(vm.status(), VmStatus::Error);
    }

    #[test]
    fn test_truncated_operand() {
        let mut prog = Program::new();
        prog.emit(Op::PushLit);
        let mut vm = Vm::new(prog);
        assert!(matches!(
            vm.run().unwrap_err(),
            RuntimeError::TruncatedOperand { pc: 0 }
        ));
    }

    /// Mirror of the on-disk program layout, for crafting malformed input.
    #[derive(serde::Serialize)]
    struct RawProgram {
        bytes: Vec<u8>,
    }
}
