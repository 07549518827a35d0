pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod op;
pub mod program;
pub mod symbol;

pub use compile::Compiler;
pub use compile_error::CompileError;
pub use op::Op;
pub use program::Program;
