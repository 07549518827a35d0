use std::collections::HashMap;

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::symbol::{GLOBAL_SCOPE, SymbolKind, SymbolTable};
use crate::bytecode::{Op, Program};
use crate::frontend::token::Token;

static EOF: Token = Token::Eof;

/// Which construct an open block belongs to, so the matching `end` knows
/// what to emit.
#[derive(Debug)]
enum Block {
    Func,
    If,
    /// `start` is the byte offset of the loop's re-test sequence.
    While { start: u32 },
}

#[derive(Debug, PartialEq, Eq)]
enum PatchKind {
    IfExit,
    WhileExit,
}

/// An open forward-jump fix-up: the byte offset of a blank 4-byte operand.
/// Held on a LIFO stack because blocks nest; the most recently opened
/// placeholder is always the next to be resolved.
#[derive(Debug)]
struct Patch {
    offset: usize,
    kind: PatchKind,
}

// =============================================================================
// COMPILER - single forward pass over the token stream
// =============================================================================
//
// Expressions are a right-recursive binary chain: every operator at one
// nesting level parses as operand, operator, rest-of-chain, so evaluation is
// strictly left to right and there is no precedence (`2 + 3 * 4` is 20).
//
// Forward calls are legal: a pre-registration pass records every function
// name and arity before code generation, and call sites to functions whose
// body has not been emitted yet leave a blank address literal that is patched
// at the definition.

pub struct Compiler<'t> {
    toks: &'t [Token],
    pos: usize,
    program: Program,
    symbols: SymbolTable,
    scope: u32,
    blocks: Vec<Block>,
    patches: Vec<Patch>,
    /// Call sites awaiting a not-yet-defined function, by name.
    fixups: HashMap<String, Vec<usize>>,
}

impl<'t> Compiler<'t> {
    pub fn new(toks: &'t [Token]) -> Self {
        Self {
            toks,
            pos: 0,
            program: Program::new(),
            symbols: SymbolTable::new(),
            scope: GLOBAL_SCOPE,
            blocks: Vec::new(),
            patches: Vec::new(),
            fixups: HashMap::new(),
        }
    }

    pub fn compile(mut self) -> Result<Program, CompileError> {
        self.symbols.declare_builtin("ecall", 0);
        self.predeclare_functions()?;

        match self.symbols.find("main") {
            Some(sym) if sym.kind == SymbolKind::Func => {
                if sym.arg_count != 0 {
                    return Err(CompileError::MainTakesArguments {
                        count: sym.arg_count,
                    });
                }
            }
            _ => return Err(CompileError::MissingMain),
        }

        // Program framing: offset 0 calls main(), the trailing instruction
        // stops the machine once main returns.
        self.emit_push(0);
        let entry = self.program.emit_blank_push();
        self.fixups.entry("main".to_string()).or_default().push(entry);
        self.program.emit(Op::Call);
        self.program.emit(Op::Halt);

        while *self.peek() != Token::Eof {
            self.compile_stmt()?;
        }

        if !self.blocks.is_empty() {
            return Err(CompileError::UnclosedBlock);
        }
        if !self.patches.is_empty() {
            return Err(CompileError::internal("unresolved backpatch slots"));
        }
        if let Some(name) = self.fixups.keys().next() {
            return Err(CompileError::internal(format!(
                "unresolved call fix-ups for '{}'",
                name
            )));
        }

        Ok(self.program)
    }

    // =========================================================================
    // Token stream access
    // =========================================================================

    fn peek(&self) -> &'t Token {
        self.toks.get(self.pos).unwrap_or(&EOF)
    }

    fn advance(&mut self) -> &'t Token {
        let tok = self.peek();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, want: Token) -> Result<(), CompileError> {
        if *self.peek() == want {
            self.pos += 1;
            Ok(())
        } else {
            Err(CompileError::unexpected(format!("'{}'", want), self.peek()))
        }
    }

    fn consume_ident(&mut self) -> Result<String, CompileError> {
        match self.peek() {
            Token::Ident(name) => {
                self.pos += 1;
                Ok(name.clone())
            }
            other => Err(CompileError::unexpected("an identifier", other)),
        }
    }

    fn consume_int(&mut self) -> Result<u32, CompileError> {
        match self.peek() {
            Token::Int(v) => {
                self.pos += 1;
                Ok(*v)
            }
            other => Err(CompileError::unexpected("an integer literal", other)),
        }
    }

    fn emit_push(&mut self, v: u32) {
        self.program.emit_with_operand(Op::PushLit, v);
    }

    // =========================================================================
    // Pre-registration pass: function names and arities
    // =========================================================================

    fn predeclare_functions(&mut self) -> Result<(), CompileError> {
        let mut i = 0;
        while i < self.toks.len() {
            if self.toks[i] != Token::Func {
                i += 1;
                continue;
            }

            let name = match self.toks.get(i + 1) {
                Some(Token::Ident(name)) => name.clone(),
                other => {
                    return Err(CompileError::unexpected(
                        "a function name",
                        other.unwrap_or(&EOF),
                    ));
                }
            };
            if matches!(self.toks.get(i + 2), Some(tok) if *tok != Token::LParen) {
                return Err(CompileError::unexpected("'('", &self.toks[i + 2]));
            }

            let mut arg_count = 0;
            let mut j = i + 3;
            while let Some(tok) = self.toks.get(j) {
                match tok {
                    Token::RParen | Token::Newline | Token::Eof => break,
                    Token::Ident(_) => arg_count += 1,
                    Token::Comma => {}
                    other => {
                        return Err(CompileError::unexpected("a parameter name", other));
                    }
                }
                j += 1;
            }

            if matches!(self.symbols.find(&name), Some(s) if s.kind == SymbolKind::Func) {
                return Err(CompileError::DuplicateFunction { name });
            }
            self.symbols.declare_function(&name, arg_count);
            i = j;
        }
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_stmt(&mut self) -> Result<(), CompileError> {
        match self.peek() {
            Token::Newline => {
                self.pos += 1;
                Ok(())
            }
            Token::Var => self.compile_var(),
            Token::Func => self.compile_func(),
            Token::Ident(_) => self.compile_assign_or_call(),
            Token::Mul => self.compile_pointer_store(),
            Token::If => self.compile_if(),
            Token::While => self.compile_while(),
            Token::Return => self.compile_return(),
            Token::End => self.compile_end(),
            tok @ (Token::Break | Token::Continue | Token::Else) => {
                Err(CompileError::UnsupportedConstruct {
                    keyword: tok.to_string(),
                })
            }
            other => Err(CompileError::unexpected("a statement", other)),
        }
    }

    fn compile_var(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Var)?;
        let name = self.consume_ident()?;

        if self.scope == GLOBAL_SCOPE {
            // Globals live in a zero-initialized array; nothing executes at
            // global scope, so an initializer is rejected.
            if *self.peek() == Token::Assign {
                return Err(CompileError::GlobalInitializer { name });
            }
            self.symbols.declare_variable(&name, self.scope);
        } else {
            // Reserve the frame slot.
            self.emit_push(0);
            if *self.peek() == Token::Assign {
                self.pos += 1;
                self.compile_expr()?;
                // Declared only now: the variable is invisible to its own
                // initializer.
                let addr = self.symbols.declare_variable(&name, self.scope);
                self.emit_push(addr);
                self.program.emit(Op::StoreLocal);
            } else {
                self.symbols.declare_variable(&name, self.scope);
            }
        }
        self.expect(Token::Newline)
    }

    fn compile_func(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Func)?;
        let name = self.consume_ident()?;
        if self.scope != GLOBAL_SCOPE {
            return Err(CompileError::NestedFunction { name });
        }

        // The entry address is known now; resolve pending forward calls.
        let addr = self.program.len() as u32;
        self.symbols.define_function(&name, addr);
        for slot in self.fixups.remove(&name).unwrap_or_default() {
            self.program.patch_u32(slot, addr);
        }

        self.scope += 1;
        self.blocks.push(Block::Func);

        self.expect(Token::LParen)?;
        let mut params = 0;
        while *self.peek() != Token::RParen {
            let param = self.consume_ident()?;
            self.symbols.declare_variable(&param, self.scope);
            params += 1;
            if *self.peek() == Token::Comma {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.expect(Token::RParen)?;
        self.expect(Token::Newline)?;

        // One placeholder per parameter keeps the stack pointer past every
        // frame slot the body can address.
        for _ in 0..params {
            self.emit_push(0);
        }
        Ok(())
    }

    fn compile_assign_or_call(&mut self) -> Result<(), CompileError> {
        let name = self.consume_ident()?;
        let sym = self
            .symbols
            .find(&name)
            .cloned()
            .ok_or(CompileError::UnknownSymbol { name })?;

        match sym.kind {
            SymbolKind::Var => {
                self.expect(Token::Assign)?;
                self.compile_expr()?;
                self.emit_push(sym.addr);
                self.program.emit(if sym.scope == GLOBAL_SCOPE {
                    Op::StoreGlobal
                } else {
                    Op::StoreLocal
                });
            }
            SymbolKind::Func => {
                self.compile_call(&sym)?;
                // Expression statement: the call's result is discarded.
                self.program.emit(Op::PopLit);
            }
        }
        self.expect(Token::Newline)
    }

    /// `*[*...](expr) = expr | 'string'`
    fn compile_pointer_store(&mut self) -> Result<(), CompileError> {
        let mut stars = 0;
        while *self.peek() == Token::Mul {
            self.pos += 1;
            stars += 1;
        }

        // The group computes the address; extra stars dereference through it.
        self.compile_grouping()?;
        for _ in 1..stars {
            self.program.emit(Op::LoadMem);
        }

        self.expect(Token::Assign)?;
        match self.peek() {
            Token::Str(s) => {
                let s = s.clone();
                self.pos += 1;
                // Pushed in reverse so the first character ends up on top and
                // the run lands first-character-first in memory.
                for b in s.bytes().rev() {
                    self.emit_push(b as u32);
                }
                self.program
                    .emit_with_operand(Op::StoreMemStr, s.len() as u32);
            }
            _ => {
                self.compile_expr()?;
                self.program.emit(Op::StoreMem);
            }
        }
        self.expect(Token::Newline)
    }

    fn compile_if(&mut self) -> Result<(), CompileError> {
        self.expect(Token::If)?;
        self.scope += 1;
        self.blocks.push(Block::If);

        let offset = self.program.emit_blank_push();
        self.patches.push(Patch {
            offset,
            kind: PatchKind::IfExit,
        });
        self.compile_expr()?;
        self.program.emit(Op::Branch);
        self.expect(Token::Newline)
    }

    fn compile_while(&mut self) -> Result<(), CompileError> {
        self.expect(Token::While)?;
        self.scope += 1;
        // Re-test target: the condition is re-evaluated from here on every
        // iteration.
        let start = self.program.len() as u32;
        self.blocks.push(Block::While { start });

        let offset = self.program.emit_blank_push();
        self.patches.push(Patch {
            offset,
            kind: PatchKind::WhileExit,
        });
        self.compile_expr()?;
        self.program.emit(Op::Branch);
        self.expect(Token::Newline)
    }

    fn compile_return(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Return)?;
        if !self.blocks.iter().any(|b| matches!(b, Block::Func)) {
            return Err(CompileError::ReturnOutsideFunction);
        }
        self.compile_expr()?;
        self.program.emit(Op::Return);
        self.expect(Token::Newline)
    }

    fn compile_end(&mut self) -> Result<(), CompileError> {
        self.expect(Token::End)?;
        let block = self.blocks.pop().ok_or(CompileError::UnmatchedEnd)?;
        self.scope -= 1;

        // Keep the runtime stack's notion of frame size consistent with the
        // symbol table's: one discard per removed variable.
        let removed = self.symbols.close_scope(self.scope);
        for _ in 0..removed {
            self.program.emit(Op::PopLit);
        }

        match block {
            Block::Func => {
                // Fall-through guard, reachable when the body has no
                // explicit return.
                self.emit_push(0);
                self.program.emit(Op::Return);
                if self.scope != GLOBAL_SCOPE {
                    return Err(CompileError::internal("function scope not back to global"));
                }
            }
            Block::If => {
                let patch = self.pop_patch(PatchKind::IfExit)?;
                let here = self.program.len() as u32;
                self.program.patch_u32(patch.offset, here);
            }
            Block::While { start } => {
                self.emit_push(start);
                self.program.emit(Op::Jump);
                // The exit lands past the back-jump, so a false condition
                // skips the body, its discards, and the jump itself.
                let patch = self.pop_patch(PatchKind::WhileExit)?;
                let here = self.program.len() as u32;
                self.program.patch_u32(patch.offset, here);
            }
        }

        if *self.peek() == Token::Newline {
            self.pos += 1;
        }
        Ok(())
    }

    fn pop_patch(&mut self, kind: PatchKind) -> Result<Patch, CompileError> {
        match self.patches.pop() {
            Some(patch) if patch.kind == kind => Ok(patch),
            _ => Err(CompileError::internal("backpatch stack out of order")),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expr(&mut self) -> Result<(), CompileError> {
        self.compile_unary(false)
    }

    fn compile_unary(&mut self, is_right_of_binary: bool) -> Result<(), CompileError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.pos += 1;
                let sym = self
                    .symbols
                    .find(&name)
                    .cloned()
                    .ok_or(CompileError::UnknownSymbol { name })?;
                match sym.kind {
                    SymbolKind::Var => {
                        self.emit_push(sym.addr);
                        self.program.emit(if sym.scope == GLOBAL_SCOPE {
                            Op::LoadGlobal
                        } else {
                            Op::LoadLocal
                        });
                    }
                    SymbolKind::Func => self.compile_call(&sym)?,
                }
            }
            Token::Int(v) => {
                let v = *v;
                self.pos += 1;
                self.emit_push(v);
            }
            _ => self.compile_grouping()?,
        }

        if !is_right_of_binary && self.peek().is_binary_op() {
            self.compile_binary()?;
        }
        Ok(())
    }

    fn compile_binary(&mut self) -> Result<(), CompileError> {
        let op_tok = self.advance();
        self.compile_unary(true)?;
        self.program.emit(binary_opcode(op_tok)?);
        if self.peek().is_binary_op() {
            self.compile_binary()?;
        }
        Ok(())
    }

    fn compile_grouping(&mut self) -> Result<(), CompileError> {
        self.expect(Token::LParen)?;
        match self.peek() {
            Token::Mul => {
                // Leading run of '*': pointer dereference.
                let mut stars = 0;
                while *self.peek() == Token::Mul {
                    self.pos += 1;
                    stars += 1;
                }
                self.compile_grouping()?;
                for _ in 0..stars {
                    self.program.emit(Op::LoadMem);
                }
            }
            Token::Add | Token::Sub => {
                // Signed literal: sign baked into the pushed value.
                let negative = *self.peek() == Token::Sub;
                self.pos += 1;
                let v = self.consume_int()?;
                self.emit_push(if negative { v.wrapping_neg() } else { v });
                if self.peek().is_binary_op() {
                    self.compile_binary()?;
                }
            }
            _ => self.compile_unary(false)?,
        }
        self.expect(Token::RParen)
    }

    /// Compile a call to `sym`; the identifier has already been consumed.
    /// Arguments first, then the count, then the callee address.
    fn compile_call(&mut self, sym: &crate::bytecode::symbol::Symbol) -> Result<(), CompileError> {
        self.expect(Token::LParen)?;
        let mut arg_count = 0;
        if *self.peek() != Token::RParen {
            loop {
                self.compile_expr()?;
                arg_count += 1;
                if *self.peek() == Token::Comma {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        if arg_count != sym.arg_count {
            return Err(CompileError::ArityMismatch {
                name: sym.name.clone(),
                expected: sym.arg_count,
                found: arg_count,
            });
        }

        if sym.builtin {
            // Host trap; push a zero afterwards so the call yields a value
            // like any other.
            self.program.emit(Op::Ecall);
            self.emit_push(0);
        } else {
            self.emit_push(arg_count);
            if sym.defined {
                self.emit_push(sym.addr);
            } else {
                let slot = self.program.emit_blank_push();
                self.fixups
                    .entry(sym.name.clone())
                    .or_default()
                    .push(slot);
            }
            self.program.emit(Op::Call);
        }
        Ok(())
    }
}

fn binary_opcode(tok: &Token) -> Result<Op, CompileError> {
    let op = match tok {
        Token::Add => Op::Add,
        Token::Sub => Op::Sub,
        Token::Mul => Op::Mul,
        Token::Quo => Op::Quo,
        Token::Rem => Op::Rem,
        Token::And => Op::And,
        Token::Or => Op::Or,
        Token::Xor => Op::Xor,
        Token::Shl => Op::Shl,
        Token::Shr => Op::Shr,
        Token::LAnd => Op::LAnd,
        Token::LOr => Op::LOr,
        Token::Eql => Op::Eql,
        Token::Lss => Op::Lss,
        Token::Gtr => Op::Gtr,
        Token::Neq => Op::Neq,
        Token::Leq => Op::Leq,
        Token::Geq => Op::Geq,
        other => {
            return Err(CompileError::internal(format!(
                "'{}' is not a binary operator",
                other
            )));
        }
    };
    Ok(op)
}
