//! Single-pass Pratt-parsing bytecode compiler (spec §4.4).
//!
//! There is no AST: every grammar production emits bytecode directly into
//! the function currently under construction. Lexical scope, locals,
//! upvalues and control-flow targets are tracked in [`FunctionState`],
//! pushed/popped as nested function literals are entered/left.

use vesper_core::error::{AtToken, CompileError};
use vesper_core::limits::{LOCALS_MAX, PARAMS_MAX, UPVALUES_MAX};
use vesper_core::object::UpvalueCapture;
use vesper_core::value::Value;
use vesper_core::{Globals, Heap, ObjRef};

use crate::scanner::{last_error_message, Scanner, Token, TokenKind};

pub(crate) struct LocalVar {
    pub name: String,
    pub depth: i32,
    pub immutable: bool,
    pub is_captured: bool,
}

#[derive(Clone, Copy)]
pub(crate) enum ControlFlowKind {
    Loop,
    Switch,
}

pub(crate) struct ControlFlow {
    pub kind: ControlFlowKind,
    pub loop_start: usize,
    pub scope_depth: i32,
    pub break_jumps: Vec<usize>,
}

pub(crate) enum FunctionKind {
    Script,
    Function,
}

pub(crate) struct FunctionState {
    pub function: ObjRef,
    pub kind: FunctionKind,
    pub locals: Vec<LocalVar>,
    pub upvalues: Vec<UpvalueCapture>,
    pub scope_depth: i32,
    pub control_flow: Vec<ControlFlow>,
}

impl FunctionState {
    fn new(function: ObjRef, kind: FunctionKind) -> Self {
        // Slot 0 is reserved for the callee itself (spec §3.4); it is
        // never addressable by name, so an empty name can't collide with
        // any real declaration.
        let locals = vec![LocalVar { name: String::new(), depth: 0, immutable: true, is_captured: false }];
        FunctionState { function, kind, locals, upvalues: Vec::new(), scope_depth: 0, control_flow: Vec::new() }
    }
}

pub struct Compiler<'s> {
    pub(crate) scanner: Scanner<'s>,
    pub(crate) heap: &'s mut Heap,
    pub(crate) globals: &'s mut Globals,
    pub(crate) previous: Token,
    pub(crate) current: Token,
    pub(crate) had_error: bool,
    pub(crate) panic_mode: bool,
    pub(crate) errors: Vec<CompileError>,
    pub(crate) states: Vec<FunctionState>,
    /// Name of the global that the interpolation desugaring resolves to
    /// (spec §9: "must resolve the helper by name at emit time", not a
    /// hard-coded global index). Registered as a native by the VM under
    /// this name (spec §4.11).
    pub(crate) join_helper_name: &'static str,
    pub(crate) anonymous_counter: u32,
}

impl<'s> Compiler<'s> {
    pub fn new(source: &'s str, heap: &'s mut Heap, globals: &'s mut Globals) -> Self {
        let script = heap.alloc_function(None);
        let scanner = Scanner::new(source);
        let bogus = Token { kind: TokenKind::Eof, start: 0, length: 0, line: 0 };
        let mut compiler = Compiler {
            scanner,
            heap,
            globals,
            previous: bogus,
            current: bogus,
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            states: vec![FunctionState::new(script, FunctionKind::Script)],
            join_helper_name: "__join_str",
            anonymous_counter: 0,
        };
        compiler.advance();
        compiler
    }

    // ---- token stream -----------------------------------------------

    pub(crate) fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(last_error_message());
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    pub(crate) fn lexeme(&self, token: Token) -> String {
        token.lexeme(self.scanner.source()).to_string()
    }

    // ---- error reporting (spec §4.4 "Error behavior") -----------------

    pub(crate) fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    pub(crate) fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let at = if token.kind == TokenKind::Eof {
            AtToken::End
        } else {
            AtToken::Lexeme(self.lexeme(token))
        };
        self.errors.push(CompileError { file: None, line: token.line, at, message: message.to_string() });
    }

    /// Skips tokens until a statement boundary, so one error doesn't
    /// cascade into a flood of spurious follow-on errors.
    pub(crate) fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Fun
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- bytecode emission helpers ------------------------------------

    pub(crate) fn state(&self) -> &FunctionState {
        self.states.last().expect("at least the script function is always present")
    }

    pub(crate) fn state_mut(&mut self) -> &mut FunctionState {
        self.states.last_mut().expect("at least the script function is always present")
    }

    fn current_function(&self) -> ObjRef {
        self.state().function
    }

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        let function = self.current_function();
        function.as_function().chunk.borrow_mut().write_byte(byte, line);
    }

    pub(crate) fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    pub(crate) fn emit_index(&mut self, opcode: u8, index: usize) {
        let line = self.previous.line;
        let function = self.current_function();
        let result = function.as_function().chunk.borrow_mut().write_index(opcode, index, line);
        if result.is_err() {
            self.error("Too many constants/locals/globals in one chunk.");
        }
    }

    pub(crate) fn emit_jump(&mut self, opcode: u8) -> usize {
        let line = self.previous.line;
        let function = self.current_function();
        let offset = function.as_function().chunk.borrow_mut().emit_jump_placeholder(opcode, line);
        offset
    }

    pub(crate) fn patch_jump(&mut self, offset: usize) {
        let function = self.current_function();
        if function.as_function().chunk.borrow_mut().patch_jump(offset).is_err() {
            self.error("Too much code to jump over.");
        }
    }

    pub(crate) fn emit_loop(&mut self, opcode: u8, loop_start: usize) {
        let line = self.previous.line;
        let function = self.current_function();
        if function.as_function().chunk.borrow_mut().emit_loop(opcode, loop_start, line).is_err() {
            self.error("Loop body too large.");
        }
    }

    pub(crate) fn current_offset(&self) -> usize {
        self.current_function().as_function().chunk.borrow().code.len()
    }

    pub(crate) fn make_constant(&mut self, value: Value) -> usize {
        let function = self.current_function();
        let index = function.as_function().chunk.borrow_mut().add_constant(value);
        index
    }

    pub(crate) fn emit_constant(&mut self, value: Value) {
        if let Value::Number(n) = value {
            if n == 0.0 {
                return self.emit_byte(vesper_core::op::CONSTANT_0);
            } else if n == 1.0 {
                return self.emit_byte(vesper_core::op::CONSTANT_1);
            } else if n == 2.0 {
                return self.emit_byte(vesper_core::op::CONSTANT_2);
            }
        }
        let index = self.make_constant(value);
        self.emit_index(vesper_core::op::CONSTANT, index);
    }

    pub(crate) fn identifier_constant(&mut self, name: &str) -> ObjRef {
        self.heap.intern_str(name)
    }

    // ---- scope management (spec §4.4 "Scope exit") --------------------

    pub(crate) fn begin_scope(&mut self) {
        self.state_mut().scope_depth += 1;
    }

    pub(crate) fn end_scope(&mut self) {
        self.state_mut().scope_depth -= 1;
        let depth = self.state().scope_depth;

        let mut run_length = 0u32;
        while let Some(local) = self.state().locals.last() {
            if local.depth <= depth {
                break;
            }
            if local.is_captured {
                self.flush_popn(run_length);
                run_length = 0;
                self.emit_byte(vesper_core::op::CLOSE_UPVALUE);
            } else {
                run_length += 1;
            }
            self.state_mut().locals.pop();
        }
        self.flush_popn(run_length);
    }

    fn flush_popn(&mut self, count: u32) {
        match count {
            0 => {}
            1 => self.emit_byte(vesper_core::op::POP),
            n => self.emit_bytes(vesper_core::op::POPN, n.min(255) as u8),
        }
    }

    // ---- local/upvalue/global resolution (spec §4.4 "Scope & binding resolution") --

    pub(crate) fn add_local(&mut self, name: String, immutable: bool) {
        if self.state().locals.len() >= LOCALS_MAX {
            self.error("Too many local variables in function.");
            return;
        }
        self.state_mut().locals.push(LocalVar { name, depth: -1, immutable, is_captured: false });
    }

    pub(crate) fn mark_initialized(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let depth = self.state().scope_depth;
        if let Some(local) = self.state_mut().locals.last_mut() {
            local.depth = depth;
        }
    }

    pub(crate) fn resolve_local(&mut self, frame: usize, name: &str) -> Option<(usize, bool)> {
        let found = {
            let state = &self.states[frame];
            state.locals.iter().enumerate().rev().find_map(|(i, local)| {
                if local.name == name {
                    Some((i, local.immutable, local.depth == -1))
                } else {
                    None
                }
            })
        };
        if let Some((i, immutable, uninitialized)) = found {
            if uninitialized {
                self.error("Can't read local variable in its own initializer.");
            }
            return Some((i, immutable));
        }
        None
    }

    pub(crate) fn resolve_upvalue(&mut self, frame: usize, name: &str) -> Option<usize> {
        if frame == 0 {
            return None;
        }
        let enclosing = frame - 1;
        if let Some((local_index, _)) = self.resolve_local(enclosing, name) {
            self.states[enclosing].locals[local_index].is_captured = true;
            return Some(self.add_upvalue(frame, local_index as u8, true));
        }
        if let Some(upvalue_index) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(frame, upvalue_index as u8, false));
        }
        None
    }

    fn add_upvalue(&mut self, frame: usize, index: u8, is_local: bool) -> usize {
        let state = &mut self.states[frame];
        for (i, up) in state.upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return i;
            }
        }
        if state.upvalues.len() >= UPVALUES_MAX {
            self.error("Too many closure variables in function.");
            return 0;
        }
        state.upvalues.push(UpvalueCapture { is_local, index });
        state.upvalues.len() - 1
    }

    pub(crate) fn resolve_global(&mut self, name: &str) -> usize {
        let interned = self.identifier_constant(name);
        self.globals.declare(interned)
    }

    // ---- top-level driver ----------------------------------------------

    pub fn compile(source: &'s str, heap: &'s mut Heap, globals: &'s mut Globals) -> Result<ObjRef, Vec<CompileError>> {
        let mut compiler = Compiler::new(source, heap, globals);
        while !compiler.matches(TokenKind::Eof) {
            compiler.declaration();
        }
        let function = compiler.end_compiler();
        if compiler.had_error {
            Err(compiler.errors)
        } else {
            Ok(function)
        }
    }

    fn end_compiler(&mut self) -> ObjRef {
        self.emit_byte(vesper_core::op::NIL);
        self.emit_byte(vesper_core::op::RETURN);
        self.current_function()
    }

    // ---- declarations ----------------------------------------------------

    pub(crate) fn declaration(&mut self) {
        if self.matches(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.matches(TokenKind::Var) {
            self.var_declaration(false);
        } else if self.matches(TokenKind::Const) {
            self.var_declaration(true);
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect function name.");
        let name = self.lexeme(self.previous);
        let global_slot = if self.state().scope_depth == 0 { Some(self.resolve_global(&name)) } else { None };
        if global_slot.is_none() {
            self.add_local(name.clone(), true);
            self.mark_initialized();
        }
        self.function(&name, FunctionKind::Function);
        if let Some(slot) = global_slot {
            self.emit_index(vesper_core::op::DEFINE_GLOBAL, slot);
        }
    }

    pub(crate) fn next_anonymous_id(&mut self) -> u32 {
        self.anonymous_counter += 1;
        self.anonymous_counter
    }

    pub(crate) fn function(&mut self, name: &str, kind: FunctionKind) {
        let interned_name = self.heap.intern_str(name);
        let function = self.heap.alloc_function(Some(interned_name));
        self.states.push(FunctionState::new(function, kind));

        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        let mut arity: u8 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                if arity as usize >= PARAMS_MAX {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                arity = arity.saturating_add(1);
                self.consume(TokenKind::Identifier, "Expect parameter name.");
                let param = self.lexeme(self.previous);
                self.add_local(param, false);
                self.mark_initialized();
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        self.emit_byte(vesper_core::op::NIL);
        self.emit_byte(vesper_core::op::RETURN);

        let finished = self.states.pop().expect("function() always pushed a state");
        {
            let f = finished.function.as_function();
            f.set_arity(arity);
            f.set_upvalue_count(finished.upvalues.len());
        }

        let const_index = self.make_constant(Value::Obj(finished.function));
        self.emit_index(vesper_core::op::CLOSURE, const_index);
        for up in &finished.upvalues {
            self.emit_byte(up.is_local as u8);
            self.emit_byte(up.index);
        }
    }

    fn var_declaration(&mut self, immutable: bool) {
        self.consume(TokenKind::Identifier, "Expect variable name.");
        let name = self.lexeme(self.previous);
        let is_global = self.state().scope_depth == 0;
        let global_slot = if is_global { Some(self.resolve_global(&name)) } else { None };
        if !is_global {
            let scope_depth = self.state().scope_depth;
            let duplicate = self.state().locals.iter().any(|local| local.depth == scope_depth && local.name == name);
            if duplicate {
                self.error("Already a variable with this name in this scope.");
            }
            self.add_local(name, immutable);
        }

        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_byte(vesper_core::op::NIL);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");

        if let Some(slot) = global_slot {
            if immutable {
                self.globals.mark_immutable(slot);
            }
            self.emit_index(vesper_core::op::DEFINE_GLOBAL, slot);
        } else {
            self.mark_initialized();
        }
    }

    // ---- statements --------------------------------------------------

    pub(crate) fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::Do) {
            self.do_while_statement();
        } else if self.matches(TokenKind::For) {
            self.for_statement();
        } else if self.matches(TokenKind::Repeat) {
            self.repeat_statement();
        } else if self.matches(TokenKind::Switch) {
            self.switch_statement();
        } else if self.matches(TokenKind::Break) {
            self.break_statement();
        } else if self.matches(TokenKind::Continue) {
            self.continue_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_byte(vesper_core::op::PRINT);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_byte(vesper_core::op::POP);
    }

    fn return_statement(&mut self) {
        if matches!(self.state().kind, FunctionKind::Script) {
            self.error("Can't return from top-level code.");
        }
        if self.matches(TokenKind::Semicolon) {
            self.emit_byte(vesper_core::op::NIL);
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
        }
        self.emit_byte(vesper_core::op::RETURN);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(vesper_core::op::JUMP_IF_FALSE);
        self.emit_byte(vesper_core::op::POP);
        self.statement();
        let else_jump = self.emit_jump(vesper_core::op::JUMP);

        self.patch_jump(then_jump);
        self.emit_byte(vesper_core::op::POP);
        if self.matches(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_offset();
        self.push_loop_context(loop_start);

        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(vesper_core::op::JUMP_IF_FALSE);
        self.emit_byte(vesper_core::op::POP);
        self.statement();
        self.emit_loop(vesper_core::op::LOOP, loop_start);

        self.patch_jump(exit_jump);
        self.emit_byte(vesper_core::op::POP);
        self.pop_loop_context();
    }

    fn do_while_statement(&mut self) {
        let body_start = self.current_offset();
        self.push_loop_context(body_start);

        self.consume(TokenKind::LeftBrace, "Expect '{' after 'do'.");
        self.begin_scope();
        self.block();
        self.end_scope();
        self.consume(TokenKind::While, "Expect 'while' after do-block.");
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");
        self.consume(TokenKind::Semicolon, "Expect ';' after 'do-while' statement.");

        self.emit_loop(vesper_core::op::LOOP_IF_FALSE, body_start);
        self.pop_loop_context();
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.matches(TokenKind::Semicolon) {
            // no initializer
        } else if self.matches(TokenKind::Var) {
            self.var_declaration(false);
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_offset();
        self.push_loop_context(loop_start);

        let mut exit_jump = None;
        if !self.matches(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(vesper_core::op::JUMP_IF_FALSE));
            self.emit_byte(vesper_core::op::POP);
        }

        if !self.matches(TokenKind::RightParen) {
            let body_jump = self.emit_jump(vesper_core::op::JUMP);
            let increment_start = self.current_offset();
            self.expression();
            self.emit_byte(vesper_core::op::POP);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(vesper_core::op::LOOP, loop_start);
            loop_start = increment_start;
            self.state_mut().control_flow.last_mut().expect("loop context pushed above").loop_start = loop_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(vesper_core::op::LOOP, loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_byte(vesper_core::op::POP);
        }
        self.pop_loop_context();
        self.end_scope();
    }

    /// `repeat (n) body`: `n` is pushed as a genuine local counter (spec §9
    /// flags the source's `locals[localCount]` read as a likely bug; this
    /// implementation always uses a real slot).
    fn repeat_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'repeat'.");
        self.begin_scope();
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after repeat count.");
        self.add_local("@repeat".to_string(), false);
        self.mark_initialized();
        let counter_slot = self.state().locals.len() - 1;

        let loop_start = self.current_offset();
        self.push_loop_context(loop_start);

        self.emit_bytes(vesper_core::op::DEC_LOCAL, counter_slot as u8);
        self.emit_byte(1);
        self.emit_byte(vesper_core::op::CONSTANT_0);
        self.emit_byte(vesper_core::op::LESS);
        self.emit_byte(vesper_core::op::NOT);
        let exit_jump = self.emit_jump(vesper_core::op::JUMP_IF_FALSE);
        self.emit_byte(vesper_core::op::POP);

        self.statement();
        self.emit_loop(vesper_core::op::LOOP, loop_start);

        self.patch_jump(exit_jump);
        self.emit_byte(vesper_core::op::POP);
        self.pop_loop_context();
        self.end_scope();
    }

    fn switch_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'switch'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after switch value.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before switch body.");

        let scope_depth = self.state().scope_depth;
        self.state_mut().control_flow.push(ControlFlow {
            kind: ControlFlowKind::Switch,
            loop_start: 0,
            scope_depth,
            break_jumps: Vec::new(),
        });

        let mut previous_case_jump: Option<usize> = None;
        let mut has_seen_default = false;
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            if self.matches(TokenKind::Case) {
                if let Some(jump) = previous_case_jump.take() {
                    self.patch_jump(jump);
                    self.emit_byte(vesper_core::op::POP);
                }
                self.emit_byte(vesper_core::op::DUP);
                self.expression();
                self.consume(TokenKind::Colon, "Expect ':' after case value.");
                self.emit_byte(vesper_core::op::EQUAL);
                previous_case_jump = Some(self.emit_jump(vesper_core::op::JUMP_IF_NOT_EQUAL));
                self.emit_byte(vesper_core::op::POP);
                while !self.check(TokenKind::Case)
                    && !self.check(TokenKind::Default)
                    && !self.check(TokenKind::RightBrace)
                {
                    self.statement();
                }
            } else if self.matches(TokenKind::Default) {
                has_seen_default = true;
                if let Some(jump) = previous_case_jump.take() {
                    self.patch_jump(jump);
                    self.emit_byte(vesper_core::op::POP);
                }
                self.consume(TokenKind::Colon, "Expect ':' after 'default'.");
                while !self.check(TokenKind::Case)
                    && !self.check(TokenKind::Default)
                    && !self.check(TokenKind::RightBrace)
                {
                    self.statement();
                }
            } else {
                self.error_at_current("Expect 'case' or 'default' inside switch body.");
                self.advance();
            }
        }
        let _ = has_seen_default;
        if let Some(jump) = previous_case_jump.take() {
            self.patch_jump(jump);
            self.emit_byte(vesper_core::op::POP);
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after switch body.");
        self.emit_byte(vesper_core::op::POP); // discard the switch subject

        let context = self.state_mut().control_flow.pop().expect("switch context pushed above");
        for jump in context.break_jumps {
            self.patch_jump(jump);
        }
    }

    fn push_loop_context(&mut self, loop_start: usize) {
        let scope_depth = self.state().scope_depth;
        self.state_mut().control_flow.push(ControlFlow {
            kind: ControlFlowKind::Loop,
            loop_start,
            scope_depth,
            break_jumps: Vec::new(),
        });
    }

    fn pop_loop_context(&mut self) {
        let context = self.state_mut().control_flow.pop().expect("loop context pushed above");
        for jump in context.break_jumps {
            self.patch_jump(jump);
        }
    }

    fn break_statement(&mut self) {
        self.consume(TokenKind::Semicolon, "Expect ';' after 'break'.");
        match self.state().control_flow.last() {
            None => self.error("Can't use 'break' outside a loop or switch."),
            Some(context) => {
                self.pop_locals_to(context.scope_depth);
                let jump = self.emit_jump(vesper_core::op::JUMP);
                self.state_mut().control_flow.last_mut().expect("checked above").break_jumps.push(jump);
            }
        }
    }

    fn continue_statement(&mut self) {
        self.consume(TokenKind::Semicolon, "Expect ';' after 'continue'.");
        let loop_context = self
            .state()
            .control_flow
            .iter()
            .rev()
            .find(|c| matches!(c.kind, ControlFlowKind::Loop))
            .map(|c| (c.loop_start, c.scope_depth));
        match loop_context {
            None => self.error("Can't use 'continue' outside a loop."),
            Some((loop_start, scope_depth)) => {
                self.pop_locals_to(scope_depth);
                self.emit_loop(vesper_core::op::LOOP, loop_start);
            }
        }
    }

    fn pop_locals_to(&mut self, target_depth: i32) {
        let count = self.state().locals.iter().rev().take_while(|l| l.depth > target_depth).count();
        self.flush_popn(count as u32);
    }

    // ---- expressions ----------------------------------------------------

    pub(crate) fn expression(&mut self) {
        crate::rules::parse_precedence(self, crate::rules::Precedence::Assignment);
    }
}

#[cfg(test)]
mod tests {
    use vesper_core::disasm::disassemble_chunk;
    use vesper_core::{Globals, Heap};

    use super::Compiler;

    fn disasm(source: &str) -> String {
        let mut heap = Heap::new();
        let mut globals = Globals::new();
        let script = Compiler::compile(source, &mut heap, &mut globals).expect("compiles");
        let output = disassemble_chunk(&script.as_function().chunk.borrow(), "script");
        output
    }

    fn compile_errors(source: &str) -> Vec<String> {
        let mut heap = Heap::new();
        let mut globals = Globals::new();
        match Compiler::compile(source, &mut heap, &mut globals) {
            Ok(_) => Vec::new(),
            Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn if_else_emits_two_non_popping_jumps() {
        let out = disasm("if (true) { print 1; } else { print 2; }");
        assert!(out.contains("JUMP_IF_FALSE"));
        assert!(out.contains("JUMP "));
    }

    #[test]
    fn while_loop_emits_a_backward_loop_instruction() {
        let out = disasm("var i = 0; while (i < 3) { i = i + 1; }");
        assert!(out.contains("LOOP "));
    }

    #[test]
    fn do_while_emits_popping_loop_if_false() {
        let out = disasm("var i = 0; do { i = i + 1; } while (i < 3);");
        assert!(out.contains("LOOP_IF_FALSE"));
    }

    #[test]
    fn repeat_uses_a_real_local_counter_not_a_phantom_slot() {
        // Slot 0 is always the reserved callee slot, so a real pushed
        // counter local lives at slot 1 — visible as `DEC_LOCAL 1`, not an
        // unaddressable `locals[localCount]` write.
        let out = disasm("repeat (3) { var x = 1; print x; }");
        assert!(out.contains("DEC_LOCAL 1"));
    }

    #[test]
    fn for_loop_desugars_to_while_shaped_bytecode() {
        let out = disasm("for (var i = 0; i < 3; i = i + 1) { print i; }");
        assert!(out.contains("JUMP_IF_FALSE"));
        assert!(out.contains("LOOP "));
    }

    #[test]
    fn switch_lowers_to_equal_and_jump_if_not_equal_cascade() {
        let out = disasm("switch (1) { case 1: print \"one\"; case 2: print \"two\"; }");
        assert!(out.contains("EQUAL"));
        assert!(out.contains("JUMP_IF_NOT_EQUAL"));
    }

    #[test]
    fn break_outside_loop_or_switch_is_a_compile_error() {
        let errors = compile_errors("break;");
        assert!(!errors.is_empty());
        assert!(errors[0].contains("break"));
    }

    #[test]
    fn continue_outside_loop_is_a_compile_error() {
        let errors = compile_errors("continue;");
        assert!(!errors.is_empty());
        assert!(errors[0].contains("continue"));
    }

    #[test]
    fn function_declaration_emits_a_closure_instruction() {
        let out = disasm("fun greet(name) { print name; }");
        assert!(out.contains("CLOSURE"));
    }

    #[test]
    fn nested_function_captures_enclosing_local_as_an_upvalue() {
        let out = disasm("fun make() { var i = 0; fun inner() { return i; } return inner; }");
        assert!(out.contains("CLOSURE"));
    }

    #[test]
    fn compound_assignment_reads_then_writes_the_target() {
        let out = disasm("var x = 1; x += 2;");
        assert!(out.contains("GET_GLOBAL"));
        assert!(out.contains("SET_GLOBAL"));
        assert!(out.contains("ADD"));
    }

    #[test]
    fn postfix_increment_uses_the_dedicated_inc_local_opcode() {
        let out = disasm("fun f() { var x = 1; x++; return x; }");
        assert!(out.contains("INC_LOCAL"));
    }

    #[test]
    fn postfix_decrement_uses_the_dedicated_dec_local_opcode() {
        let out = disasm("fun f() { var x = 1; x--; return x; }");
        assert!(out.contains("DEC_LOCAL"));
    }

    #[test]
    fn anonymous_function_expression_compiles_like_a_named_one() {
        let out = disasm("var f = fun(a) { return a; };");
        assert!(out.contains("CLOSURE"));
    }

    #[test]
    fn const_redeclaration_in_the_same_scope_is_a_compile_error() {
        let errors = compile_errors("{ const x = 1; var x = 2; }");
        assert!(!errors.is_empty());
    }
}
