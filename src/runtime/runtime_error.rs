/// Execution failures. Every one is fatal: the machine enters the error
/// state and will not step again.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// The program counter left the program.
    PcOutOfBounds { pc: usize },
    /// A byte that decodes to no instruction.
    IllegalOpcode { byte: u8, pc: usize },
    /// An operand-carrying instruction cut off by the end of the program.
    TruncatedOperand { pc: usize },
    StackOverflow,
    StackUnderflow,
    CallStackOverflow,
    /// `RETURN` with no frame to unwind to.
    ReturnWithoutCall,
    DivisionByZero { pc: usize },
    GlobalOutOfBounds { addr: u32 },
    StackSlotOutOfBounds { addr: u32 },
    MemoryOutOfBounds { addr: u32 },
    /// The configured step budget ran out.
    StepLimitExceeded,
    /// A trap handler failed.
    Host(String),
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: ")?;
        match self {
            RuntimeError::PcOutOfBounds { pc } => {
                write!(f, "program counter {} outside the program", pc)
            }
            RuntimeError::IllegalOpcode { byte, pc } => {
                write!(f, "illegal opcode 0x{:02x} at {}", byte, pc)
            }
            RuntimeError::TruncatedOperand { pc } => {
                write!(f, "truncated operand at {}", pc)
            }
            RuntimeError::StackOverflow => write!(f, "value stack overflow"),
            RuntimeError::StackUnderflow => write!(f, "value stack underflow"),
            RuntimeError::CallStackOverflow => write!(f, "call stack overflow"),
            RuntimeError::ReturnWithoutCall => {
                write!(f, "return with no active call frame")
            }
            RuntimeError::DivisionByZero { pc } => {
                write!(f, "division by zero at {}", pc)
            }
            RuntimeError::GlobalOutOfBounds { addr } => {
                write!(f, "global slot {} out of bounds", addr)
            }
            RuntimeError::StackSlotOutOfBounds { addr } => {
                write!(f, "frame slot {} out of bounds", addr)
            }
            RuntimeError::MemoryOutOfBounds { addr } => {
                write!(f, "memory address {} out of bounds", addr)
            }
            RuntimeError::StepLimitExceeded => write!(f, "step limit exceeded"),
            RuntimeError::Host(msg) => write!(f, "trap handler: {}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}
