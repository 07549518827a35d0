use crate::frontend::token::Token;

/// Compile-time failures are unconditionally fatal: no recovery, no partial
/// program, no multi-error reporting.
#[derive(Debug, Clone)]
pub enum CompileError {
    UnexpectedToken {
        expected: String,
        found: String,
    },
    /// A keyword the scanner knows but the language does not implement.
    UnsupportedConstruct {
        keyword: String,
    },
    UnknownSymbol {
        name: String,
    },
    ArityMismatch {
        name: String,
        expected: u32,
        found: u32,
    },
    /// Globals live in a zero-initialized array; they cannot be initialized
    /// at declaration.
    GlobalInitializer {
        name: String,
    },
    NestedFunction {
        name: String,
    },
    DuplicateFunction {
        name: String,
    },
    ReturnOutsideFunction,
    UnmatchedEnd,
    /// EOF with a `func`/`if`/`while` block still open.
    UnclosedBlock,
    MissingMain,
    MainTakesArguments {
        count: u32,
    },
    /// Compiler invariant violation (should not happen in normal use).
    Internal(String),
}

impl CompileError {
    pub fn unexpected(expected: impl Into<String>, found: &Token) -> Self {
        CompileError::UnexpectedToken {
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "compile error: ")?;
        match self {
            CompileError::UnexpectedToken { expected, found } => {
                write!(f, "expected {}, found '{}'", expected, found)
            }
            CompileError::UnsupportedConstruct { keyword } => {
                write!(f, "'{}' is not supported", keyword)
            }
            CompileError::UnknownSymbol { name } => {
                write!(f, "unknown identifier '{}'", name)
            }
            CompileError::ArityMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "function '{}' takes {} argument(s), got {}",
                name, expected, found
            ),
            CompileError::GlobalInitializer { name } => write!(
                f,
                "global variable '{}' cannot have an initializer",
                name
            ),
            CompileError::NestedFunction { name } => {
                write!(f, "function '{}' defined inside another function", name)
            }
            CompileError::DuplicateFunction { name } => {
                write!(f, "function '{}' defined more than once", name)
            }
            CompileError::ReturnOutsideFunction => {
                write!(f, "'return' outside of a function body")
            }
            CompileError::UnmatchedEnd => write!(f, "'end' without a matching block"),
            CompileError::UnclosedBlock => {
                write!(f, "unexpected end of input with an unclosed block")
            }
            CompileError::MissingMain => write!(f, "no 'main' function defined"),
            CompileError::MainTakesArguments { count } => {
                write!(f, "'main' must take no arguments, has {}", count)
            }
            CompileError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {}
