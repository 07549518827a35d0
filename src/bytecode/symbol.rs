/// Scope depth of global declarations. Every `func`/`if`/`while` block
/// increments the depth on entry; the matching `end` decrements it.
pub const GLOBAL_SCOPE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Func,
    Var,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    /// Variable: slot index within its address class (global vs. frame).
    /// Function: byte offset of the body, once defined.
    pub addr: u32,
    pub scope: u32,
    pub arg_count: u32,
    /// Pre-registered host builtin (`ecall`), compiled to a trap instead of
    /// a call.
    pub builtin: bool,
    /// Functions are pre-registered before their body is emitted; the address
    /// is meaningless until this is set.
    pub defined: bool,
}

/// Declaration-ordered symbol table, queried during compilation only.
///
/// Two independent address counters exist: one for global variables, one
/// shared across all live non-global scopes. A function's parameters and the
/// locals of any nested block therefore land in one contiguous frame-relative
/// range, which is what makes a single frame pointer sufficient.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable at `scope`, assigning the next free slot within its
    /// address class.
    pub fn declare_variable(&mut self, name: &str, scope: u32) -> u32 {
        let global = scope == GLOBAL_SCOPE;
        let addr = self
            .symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Var && (s.scope == GLOBAL_SCOPE) == global)
            .count() as u32;

        self.symbols.push(Symbol {
            kind: SymbolKind::Var,
            name: name.to_string(),
            addr,
            scope,
            arg_count: 0,
            builtin: false,
            defined: true,
        });
        addr
    }

    /// Pre-register a function (address unknown until its body is emitted).
    pub fn declare_function(&mut self, name: &str, arg_count: u32) {
        self.symbols.push(Symbol {
            kind: SymbolKind::Func,
            name: name.to_string(),
            addr: 0,
            scope: GLOBAL_SCOPE,
            arg_count,
            builtin: false,
            defined: false,
        });
    }

    pub fn declare_builtin(&mut self, name: &str, arg_count: u32) {
        self.symbols.push(Symbol {
            kind: SymbolKind::Func,
            name: name.to_string(),
            addr: 0,
            scope: GLOBAL_SCOPE,
            arg_count,
            builtin: true,
            defined: true,
        });
    }

    /// Fix a pre-registered function's entry address.
    pub fn define_function(&mut self, name: &str, addr: u32) {
        if let Some(sym) = self
            .symbols
            .iter_mut()
            .find(|s| s.kind == SymbolKind::Func && s.name == name)
        {
            sym.addr = addr;
            sym.defined = true;
        }
    }

    /// Deepest-scope wins; ties go to the most recent declaration.
    pub fn find(&self, name: &str) -> Option<&Symbol> {
        let mut found: Option<&Symbol> = None;
        for sym in &self.symbols {
            if sym.name == name && found.is_none_or(|best| sym.scope >= best.scope) {
                found = Some(sym);
            }
        }
        found
    }

    /// Remove every symbol declared deeper than `scope`; returns how many
    /// were removed (the compiler emits one discard per removed variable).
    pub fn close_scope(&mut self, scope: u32) -> usize {
        let before = self.symbols.len();
        self.symbols.retain(|s| s.scope <= scope);
        before - self.symbols.len()
    }
}
