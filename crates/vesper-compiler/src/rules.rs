//! Pratt parsing: the precedence ladder and the prefix/infix rule table
//! (spec §4.4 "Parsing").

use vesper_core::value::Value;

use crate::compiler::Compiler;
use crate::scanner::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

type ParseFn = fn(&mut Compiler<'_>, bool);

struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

fn rule(kind: TokenKind) -> ParseRule {
    use TokenKind::*;
    use Precedence as P;
    match kind {
        LeftParen => ParseRule { prefix: Some(grouping), infix: Some(call), precedence: P::Call },
        Minus => ParseRule { prefix: Some(unary), infix: Some(binary), precedence: P::Term },
        Plus => ParseRule { prefix: None, infix: Some(binary), precedence: P::Term },
        Slash => ParseRule { prefix: None, infix: Some(binary), precedence: P::Factor },
        Star => ParseRule { prefix: None, infix: Some(binary), precedence: P::Factor },
        Percent => ParseRule { prefix: None, infix: Some(binary), precedence: P::Factor },
        Bang => ParseRule { prefix: Some(unary), infix: None, precedence: P::None },
        BangEqual => ParseRule { prefix: None, infix: Some(binary), precedence: P::Equality },
        EqualEqual => ParseRule { prefix: None, infix: Some(binary), precedence: P::Equality },
        Greater => ParseRule { prefix: None, infix: Some(binary), precedence: P::Comparison },
        GreaterEqual => ParseRule { prefix: None, infix: Some(binary), precedence: P::Comparison },
        Less => ParseRule { prefix: None, infix: Some(binary), precedence: P::Comparison },
        LessEqual => ParseRule { prefix: None, infix: Some(binary), precedence: P::Comparison },
        Identifier => ParseRule { prefix: Some(variable), infix: None, precedence: P::None },
        Str => ParseRule { prefix: Some(string), infix: None, precedence: P::None },
        Interpolation => ParseRule { prefix: Some(interpolation), infix: None, precedence: P::None },
        Number => ParseRule { prefix: Some(number), infix: None, precedence: P::None },
        And => ParseRule { prefix: None, infix: Some(and), precedence: P::And },
        Or => ParseRule { prefix: None, infix: Some(or), precedence: P::Or },
        False => ParseRule { prefix: Some(literal), infix: None, precedence: P::None },
        True => ParseRule { prefix: Some(literal), infix: None, precedence: P::None },
        Nil => ParseRule { prefix: Some(literal), infix: None, precedence: P::None },
        Fun => ParseRule { prefix: Some(function_literal), infix: None, precedence: P::None },
        _ => ParseRule { prefix: None, infix: None, precedence: P::None },
    }
}

pub(crate) fn parse_precedence(c: &mut Compiler<'_>, precedence: Precedence) {
    c.advance();
    let prefix = rule(c.previous.kind).prefix;
    let Some(prefix) = prefix else {
        c.error("Expect expression.");
        return;
    };
    let can_assign = precedence <= Precedence::Assignment;
    prefix(c, can_assign);

    while precedence <= rule(c.current.kind).precedence {
        c.advance();
        let infix = rule(c.previous.kind).infix.expect("precedence table guarantees an infix rule here");
        infix(c, can_assign);
    }

    if can_assign && c.matches(TokenKind::Equal) {
        c.error("Invalid assignment target.");
    }
}

fn number(c: &mut Compiler<'_>, _can_assign: bool) {
    let text = c.lexeme(c.previous);
    let value: f64 = text.parse().expect("scanner only produces well-formed numeric lexemes");
    c.emit_constant(Value::Number(value));
}

fn string(c: &mut Compiler<'_>, _can_assign: bool) {
    let lexeme = c.lexeme(c.previous);
    let text = &lexeme[1..lexeme.len() - 1];
    let interned = c.heap.intern_str(text);
    c.emit_constant(Value::Obj(interned));
}

/// `"a${expr}b"` lowers to a call against the join helper (spec §4.4):
/// `GET_GLOBAL(joinStr), <literal "a">, <expr>, <literal "b">, CALL argCount`.
fn interpolation(c: &mut Compiler<'_>, _can_assign: bool) {
    let helper_name = c.join_helper_name;
    let helper_slot = c.resolve_global(helper_name);
    c.emit_index(vesper_core::op::GET_GLOBAL, helper_slot);

    let mut arg_count: u8 = 0;
    loop {
        let prefix_lexeme = c.lexeme(c.previous);
        // Strip the leading quote on the very first segment and the
        // trailing `${` marker common to every `Interpolation` token.
        let trimmed = prefix_lexeme.trim_start_matches('"');
        let interned = c.heap.intern_str(trimmed.trim_end_matches("${"));
        c.emit_constant(Value::Obj(interned));
        arg_count += 1;

        c.expression();
        arg_count += 1;

        if c.check(TokenKind::Interpolation) {
            c.advance();
            continue;
        }
        break;
    }

    c.consume(TokenKind::Str, "Expect end of interpolated string.");
    let tail_lexeme = c.lexeme(c.previous);
    let tail = tail_lexeme.trim_end_matches('"');
    let interned = c.heap.intern_str(tail);
    c.emit_constant(Value::Obj(interned));
    arg_count += 1;

    c.emit_bytes(vesper_core::op::CALL, arg_count);
}

fn literal(c: &mut Compiler<'_>, _can_assign: bool) {
    match c.previous.kind {
        TokenKind::False => c.emit_byte(vesper_core::op::FALSE),
        TokenKind::True => c.emit_byte(vesper_core::op::TRUE),
        TokenKind::Nil => c.emit_byte(vesper_core::op::NIL),
        _ => unreachable!("literal() only dispatched for false/true/nil"),
    }
}

fn grouping(c: &mut Compiler<'_>, _can_assign: bool) {
    c.expression();
    c.consume(TokenKind::RightParen, "Expect ')' after expression.");
}

fn unary(c: &mut Compiler<'_>, _can_assign: bool) {
    let operator = c.previous.kind;

    // Compact `-1` constant-fold (spec §4.4 "Numeric literal"): only this
    // exact case gets its own opcode, everything else takes the general
    // NEGATE path below.
    if operator == TokenKind::Minus && c.check(TokenKind::Number) && c.lexeme(c.current) == "1" {
        c.advance();
        c.emit_byte(vesper_core::op::CONSTANT_M1);
        return;
    }

    parse_precedence(c, Precedence::Unary);

    match operator {
        TokenKind::Minus => c.emit_byte(vesper_core::op::NEGATE),
        TokenKind::Bang => c.emit_byte(vesper_core::op::NOT),
        _ => unreachable!("unary() only dispatched for -/!"),
    }
}

fn binary(c: &mut Compiler<'_>, _can_assign: bool) {
    let operator = c.previous.kind;
    let rule = rule(operator);
    parse_precedence(c, rule.precedence.next());

    match operator {
        TokenKind::Plus => c.emit_byte(vesper_core::op::ADD),
        TokenKind::Minus => c.emit_byte(vesper_core::op::SUBTRACT),
        TokenKind::Star => c.emit_byte(vesper_core::op::MULTIPLY),
        TokenKind::Slash => c.emit_byte(vesper_core::op::DIVIDE),
        TokenKind::Percent => c.emit_byte(vesper_core::op::MOD),
        TokenKind::EqualEqual => c.emit_byte(vesper_core::op::EQUAL),
        TokenKind::BangEqual => { c.emit_byte(vesper_core::op::EQUAL); c.emit_byte(vesper_core::op::NOT); }
        TokenKind::Greater => c.emit_byte(vesper_core::op::GREATER),
        TokenKind::GreaterEqual => { c.emit_byte(vesper_core::op::LESS); c.emit_byte(vesper_core::op::NOT); }
        TokenKind::Less => c.emit_byte(vesper_core::op::LESS),
        TokenKind::LessEqual => { c.emit_byte(vesper_core::op::GREATER); c.emit_byte(vesper_core::op::NOT); }
        _ => unreachable!("binary() only dispatched for arithmetic/comparison operators"),
    }
}

/// `a and b`: `JUMP_IF_FALSE end; POP; <rhs>; end:` (spec §4.4).
fn and(c: &mut Compiler<'_>, _can_assign: bool) {
    let end_jump = c.emit_jump(vesper_core::op::JUMP_IF_FALSE);
    c.emit_byte(vesper_core::op::POP);
    parse_precedence(c, Precedence::And);
    c.patch_jump(end_jump);
}

/// `a or b`: symmetric with `and`, via `JUMP_IF_TRUE` (spec §4.4).
fn or(c: &mut Compiler<'_>, _can_assign: bool) {
    let end_jump = c.emit_jump(vesper_core::op::JUMP_IF_TRUE);
    c.emit_byte(vesper_core::op::POP);
    parse_precedence(c, Precedence::Or);
    c.patch_jump(end_jump);
}

fn call(c: &mut Compiler<'_>, _can_assign: bool) {
    let arg_count = argument_list(c);
    c.emit_bytes(vesper_core::op::CALL, arg_count);
}

fn argument_list(c: &mut Compiler<'_>) -> u8 {
    let mut count: u8 = 0;
    if !c.check(TokenKind::RightParen) {
        loop {
            c.expression();
            if count == 255 {
                c.error("Can't have more than 255 arguments.");
            }
            count = count.saturating_add(1);
            if !c.matches(TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(TokenKind::RightParen, "Expect ')' after arguments.");
    count
}

fn function_literal(c: &mut Compiler<'_>, _can_assign: bool) {
    let line = c.previous.line;
    let name = format!("anonymous#{}@{line}", c.next_anonymous_id());
    c.function(&name, crate::compiler::FunctionKind::Function);
}

enum Resolved {
    Local(usize, bool),
    Upvalue(usize, bool),
    Global(usize, bool),
}

fn resolve_name(c: &mut Compiler<'_>, name: &str) -> Resolved {
    let frame = c.states.len() - 1;
    if let Some((slot, immutable)) = c.resolve_local(frame, name) {
        return Resolved::Local(slot, immutable);
    }
    if let Some(slot) = c.resolve_upvalue(frame, name) {
        return Resolved::Upvalue(slot, false);
    }
    let slot = c.resolve_global(name);
    let immutable = c.globals.is_immutable(slot);
    Resolved::Global(slot, immutable)
}

fn variable(c: &mut Compiler<'_>, can_assign: bool) {
    let name = c.lexeme(c.previous);
    let resolved = resolve_name(c, &name);

    // Postfix `++`/`--` only applies directly to a bare variable reference
    // (spec §4.4); locals get a dedicated opcode, globals desugar.
    if matches!(c.current.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
        let is_increment = c.current.kind == TokenKind::PlusPlus;
        match resolved {
            Resolved::Local(slot, immutable) => {
                if immutable {
                    c.error("Can't assign to an immutable variable.");
                }
                c.advance();
                let op = if is_increment { vesper_core::op::INC_LOCAL } else { vesper_core::op::DEC_LOCAL };
                c.emit_bytes(op, slot as u8);
                c.emit_byte(1);
                return;
            }
            Resolved::Global(slot, immutable) => {
                if immutable {
                    c.error("Can't assign to an immutable variable.");
                }
                c.advance();
                c.emit_index(vesper_core::op::GET_GLOBAL, slot);
                c.emit_byte(vesper_core::op::DUP);
                c.emit_byte(vesper_core::op::CONSTANT_1);
                c.emit_byte(if is_increment { vesper_core::op::ADD } else { vesper_core::op::SUBTRACT });
                c.emit_index(vesper_core::op::SET_GLOBAL, slot);
                c.emit_byte(vesper_core::op::POP);
                return;
            }
            Resolved::Upvalue(..) => {
                c.error("Can't apply '++'/'--' to a captured variable.");
                c.advance();
                return;
            }
        }
    }

    let (get_op, set_op, slot, immutable): (fn(&mut Compiler<'_>, usize), fn(&mut Compiler<'_>, usize), usize, bool) =
        match resolved {
            Resolved::Local(slot, immutable) => (emit_get_local, emit_set_local, slot, immutable),
            Resolved::Upvalue(slot, immutable) => (emit_get_upvalue, emit_set_upvalue, slot, immutable),
            Resolved::Global(slot, immutable) => (emit_get_global, emit_set_global, slot, immutable),
        };

    if can_assign && matches_compound_or_plain_assign(c) {
        compile_assignment(c, set_op, get_op, slot, immutable);
    } else {
        get_op(c, slot);
    }
}

fn matches_compound_or_plain_assign(c: &Compiler<'_>) -> bool {
    matches!(
        c.current.kind,
        TokenKind::Equal | TokenKind::PlusEqual | TokenKind::MinusEqual | TokenKind::StarEqual | TokenKind::SlashEqual
    )
}

fn compile_assignment(
    c: &mut Compiler<'_>,
    set_op: fn(&mut Compiler<'_>, usize),
    get_op: fn(&mut Compiler<'_>, usize),
    slot: usize,
    immutable: bool,
) {
    let compound_op = match c.current.kind {
        TokenKind::PlusEqual => Some(vesper_core::op::ADD),
        TokenKind::MinusEqual => Some(vesper_core::op::SUBTRACT),
        TokenKind::StarEqual => Some(vesper_core::op::MULTIPLY),
        TokenKind::SlashEqual => Some(vesper_core::op::DIVIDE),
        TokenKind::Equal => None,
        _ => unreachable!("caller only enters on one of these four tokens"),
    };
    c.advance();

    if immutable {
        c.error("Can't assign to an immutable variable.");
    }

    if let Some(op) = compound_op {
        get_op(c, slot);
        c.expression();
        c.emit_byte(op);
    } else {
        c.expression();
    }
    set_op(c, slot);
}

fn emit_get_local(c: &mut Compiler<'_>, slot: usize) {
    c.emit_index(vesper_core::op::GET_LOCAL, slot);
}
fn emit_set_local(c: &mut Compiler<'_>, slot: usize) {
    c.emit_index(vesper_core::op::SET_LOCAL, slot);
}
fn emit_get_upvalue(c: &mut Compiler<'_>, slot: usize) {
    c.emit_index(vesper_core::op::GET_UPVALUE, slot);
}
fn emit_set_upvalue(c: &mut Compiler<'_>, slot: usize) {
    c.emit_index(vesper_core::op::SET_UPVALUE, slot);
}
fn emit_get_global(c: &mut Compiler<'_>, slot: usize) {
    c.emit_index(vesper_core::op::GET_GLOBAL, slot);
}
fn emit_set_global(c: &mut Compiler<'_>, slot: usize) {
    c.emit_index(vesper_core::op::SET_GLOBAL, slot);
}
