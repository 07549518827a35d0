use serde::{Deserialize, Serialize};

// =============================================================================
// OP - Bytecode instructions
// =============================================================================
//
// One opcode byte per instruction; literal-bearing opcodes are followed by a
// 4-byte little-endian unsigned operand.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Op {
    Nop = 1,
    /// Suspend for host trap service.
    Ecall = 2,
    /// Stop execution; the run completes with the last return value.
    Halt = 3,

    // arithmetic / bitwise (pop two, push one; wrapping u32)
    Add = 4,
    Sub = 5,
    Mul = 6,
    Quo = 7,
    Rem = 8,
    And = 9,
    Or = 10,
    Xor = 11,
    Shl = 12,
    Shr = 13,

    // logic / comparison (pop two, push 1 or 0)
    LAnd = 14,
    LOr = 15,
    Eql = 16,
    Lss = 17,
    Gtr = 18,
    Neq = 19,
    Leq = 20,
    Geq = 21,

    /// Push the 4-byte operand.
    PushLit = 32,
    /// Discard the top of stack.
    PopLit = 33,

    // load pops an address and pushes the slot value;
    // store pops the address, then the value
    LoadGlobal = 34,
    StoreGlobal = 35,
    LoadLocal = 36,
    StoreLocal = 37,

    /// Pop value, then address; write to linear memory.
    StoreMem = 38,
    /// Pop address; push the memory cell.
    LoadMem = 39,

    /// Pop target, jump unconditionally.
    Jump = 40,
    /// Pop condition, then target; jump when the condition is zero.
    Branch = 41,
    /// Pop callee address, then argument count; push a call frame.
    Call = 42,
    /// Pop return value, unwind to the caller's frame, push it back.
    Return = 43,

    /// Operand = character count; cells on top (first character topmost),
    /// destination address beneath them.
    StoreMemStr = 44,
}

impl Op {
    /// Decode a raw opcode byte. Unknown bytes are a fatal VM error.
    pub fn from_byte(byte: u8) -> Option<Op> {
        let op = match byte {
            1 => Op::Nop,
            2 => Op::Ecall,
            3 => Op::Halt,
            4 => Op::Add,
            5 => Op::Sub,
            6 => Op::Mul,
            7 => Op::Quo,
            8 => Op::Rem,
            9 => Op::And,
            10 => Op::Or,
            11 => Op::Xor,
            12 => Op::Shl,
            13 => Op::Shr,
            14 => Op::LAnd,
            15 => Op::LOr,
            16 => Op::Eql,
            17 => Op::Lss,
            18 => Op::Gtr,
            19 => Op::Neq,
            20 => Op::Leq,
            21 => Op::Geq,
            32 => Op::PushLit,
            33 => Op::PopLit,
            34 => Op::LoadGlobal,
            35 => Op::StoreGlobal,
            36 => Op::LoadLocal,
            37 => Op::StoreLocal,
            38 => Op::StoreMem,
            39 => Op::LoadMem,
            40 => Op::Jump,
            41 => Op::Branch,
            42 => Op::Call,
            43 => Op::Return,
            44 => Op::StoreMemStr,
            _ => return None,
        };
        Some(op)
    }

    /// True for opcodes followed by a 4-byte operand.
    pub fn has_operand(self) -> bool {
        matches!(self, Op::PushLit | Op::StoreMemStr)
    }

    /// Encoded size in bytes, operand included.
    pub fn size(self) -> usize {
        if self.has_operand() { 5 } else { 1 }
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::Nop => "NOP",
            Op::Ecall => "ECALL",
            Op::Halt => "HALT",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Quo => "QUO",
            Op::Rem => "REM",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Xor => "XOR",
            Op::Shl => "SHL",
            Op::Shr => "SHR",
            Op::LAnd => "LAND",
            Op::LOr => "LOR",
            Op::Eql => "EQL",
            Op::Lss => "LSS",
            Op::Gtr => "GTR",
            Op::Neq => "NEQ",
            Op::Leq => "LEQ",
            Op::Geq => "GEQ",
            Op::PushLit => "PUSH_LIT",
            Op::PopLit => "POP_LIT",
            Op::LoadGlobal => "LOAD_GLOBAL",
            Op::StoreGlobal => "STORE_GLOBAL",
            Op::LoadLocal => "LOAD_LOCAL",
            Op::StoreLocal => "STORE_LOCAL",
            Op::StoreMem => "STORE_MEM",
            Op::LoadMem => "LOAD_MEM",
            Op::Jump => "JUMP",
            Op::Branch => "BRANCH",
            Op::Call => "CALL",
            Op::Return => "RETURN",
            Op::StoreMemStr => "STORE_MEM_STR",
        }
    }
}
