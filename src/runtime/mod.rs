pub mod ecall;
pub mod runtime_error;
pub mod vm;

pub use ecall::{EcallHandler, InputEcall};
pub use runtime_error::RuntimeError;
pub use vm::{Exit, Vm, VmConfig, VmStatus};
