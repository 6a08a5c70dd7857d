//! Instruction set (spec §4.5).
//!
//! Opcodes are plain `u8` constants rather than a payload-carrying enum:
//! the spec requires a byte-addressable `code: Vec<u8>` with an `OP_WIDE`
//! prefix that reinterprets the *next* instruction's operand width, which a
//! Rust enum-with-payload can't express directly (the payload width isn't a
//! property of the opcode alone, it depends on whether `WIDE` preceded it).
//! Disassembly and dispatch both decode the byte stream explicitly.

/// Next opcode's index operand is 24-bit instead of 8-bit.
pub const WIDE: u8 = 0;
pub const CONSTANT: u8 = 1;
pub const CONSTANT_M1: u8 = 2;
pub const CONSTANT_0: u8 = 3;
pub const CONSTANT_1: u8 = 4;
pub const CONSTANT_2: u8 = 5;
pub const NIL: u8 = 6;
pub const TRUE: u8 = 7;
pub const FALSE: u8 = 8;
pub const POP: u8 = 9;
pub const POPN: u8 = 10;
pub const DUP: u8 = 11;
pub const GET_LOCAL: u8 = 12;
pub const SET_LOCAL: u8 = 13;
pub const INC_LOCAL: u8 = 14;
pub const DEC_LOCAL: u8 = 15;
pub const GET_GLOBAL: u8 = 16;
pub const SET_GLOBAL: u8 = 17;
pub const DEFINE_GLOBAL: u8 = 18;
pub const GET_UPVALUE: u8 = 19;
pub const SET_UPVALUE: u8 = 20;
pub const EQUAL: u8 = 21;
pub const GREATER: u8 = 22;
pub const LESS: u8 = 23;
pub const ADD: u8 = 24;
pub const SUBTRACT: u8 = 25;
pub const MULTIPLY: u8 = 26;
pub const DIVIDE: u8 = 27;
pub const MOD: u8 = 28;
pub const NOT: u8 = 29;
pub const NEGATE: u8 = 30;
pub const PRINT: u8 = 31;
pub const JUMP: u8 = 32;
pub const JUMP_IF_TRUE: u8 = 33;
pub const JUMP_IF_FALSE: u8 = 34;
pub const JUMP_IF_NOT_EQUAL: u8 = 35;
pub const LOOP: u8 = 36;
pub const LOOP_IF_FALSE: u8 = 37;
pub const CALL: u8 = 38;
pub const CLOSURE: u8 = 39;
pub const CLOSE_UPVALUE: u8 = 40;
pub const RETURN: u8 = 41;

/// How many operand bytes follow an opcode, given whether it was preceded
/// by `WIDE`. `Index` operands are 1 byte narrow / 3 bytes wide; everything
/// else has a fixed width regardless of the `WIDE` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandWidth {
    None,
    /// A single immediate byte (e.g. `POPN`'s count, `CALL`'s argc).
    Byte,
    /// Two immediate bytes (e.g. `INC_LOCAL slot, imm8` — slot is an Index,
    /// the imm8 is a plain byte already accounted for separately).
    TwoBytes,
    /// A pool/local/global/upvalue index: 1 byte narrow, 3 bytes wide.
    Index,
    /// A 16-bit big-endian jump offset.
    Jump16,
    /// `CLOSURE`: one index operand followed by `2 * upvalue_count` bytes
    /// of capture metadata, which only the compiler/VM (which know the
    /// target function's upvalue count) can size — the disassembler reads
    /// the count out of the constant it just resolved.
    Closure,
}

pub fn mnemonic(op: u8) -> &'static str {
    match op {
        WIDE => "WIDE",
        CONSTANT => "CONSTANT",
        CONSTANT_M1 => "CONSTANT_M1",
        CONSTANT_0 => "CONSTANT_0",
        CONSTANT_1 => "CONSTANT_1",
        CONSTANT_2 => "CONSTANT_2",
        NIL => "NIL",
        TRUE => "TRUE",
        FALSE => "FALSE",
        POP => "POP",
        POPN => "POPN",
        DUP => "DUP",
        GET_LOCAL => "GET_LOCAL",
        SET_LOCAL => "SET_LOCAL",
        INC_LOCAL => "INC_LOCAL",
        DEC_LOCAL => "DEC_LOCAL",
        GET_GLOBAL => "GET_GLOBAL",
        SET_GLOBAL => "SET_GLOBAL",
        DEFINE_GLOBAL => "DEFINE_GLOBAL",
        GET_UPVALUE => "GET_UPVALUE",
        SET_UPVALUE => "SET_UPVALUE",
        EQUAL => "EQUAL",
        GREATER => "GREATER",
        LESS => "LESS",
        ADD => "ADD",
        SUBTRACT => "SUBTRACT",
        MULTIPLY => "MULTIPLY",
        DIVIDE => "DIVIDE",
        MOD => "MOD",
        NOT => "NOT",
        NEGATE => "NEGATE",
        PRINT => "PRINT",
        JUMP => "JUMP",
        JUMP_IF_TRUE => "JUMP_IF_TRUE",
        JUMP_IF_FALSE => "JUMP_IF_FALSE",
        JUMP_IF_NOT_EQUAL => "JUMP_IF_NOT_EQUAL",
        LOOP => "LOOP",
        LOOP_IF_FALSE => "LOOP_IF_FALSE",
        CALL => "CALL",
        CLOSURE => "CLOSURE",
        CLOSE_UPVALUE => "CLOSE_UPVALUE",
        RETURN => "RETURN",
        _ => "UNKNOWN",
    }
}

pub fn operand_width(op: u8) -> OperandWidth {
    match op {
        WIDE | NIL | TRUE | FALSE | POP | DUP | EQUAL | GREATER | LESS | ADD | SUBTRACT
        | MULTIPLY | DIVIDE | MOD | NOT | NEGATE | PRINT | CLOSE_UPVALUE | RETURN
        | CONSTANT_M1 | CONSTANT_0 | CONSTANT_1 | CONSTANT_2 => OperandWidth::None,
        POPN | CALL => OperandWidth::Byte,
        INC_LOCAL | DEC_LOCAL => OperandWidth::TwoBytes,
        CONSTANT | GET_LOCAL | SET_LOCAL | GET_GLOBAL | SET_GLOBAL | DEFINE_GLOBAL
        | GET_UPVALUE | SET_UPVALUE => OperandWidth::Index,
        JUMP | JUMP_IF_TRUE | JUMP_IF_FALSE | JUMP_IF_NOT_EQUAL | LOOP | LOOP_IF_FALSE => {
            OperandWidth::Jump16
        }
        CLOSURE => OperandWidth::Closure,
        _ => OperandWidth::None,
    }
}

pub fn is_jump(op: u8) -> bool {
    matches!(
        op,
        JUMP | JUMP_IF_TRUE | JUMP_IF_FALSE | JUMP_IF_NOT_EQUAL | LOOP | LOOP_IF_FALSE
    )
}

/// `true` for the two backward-branching ops (`LOOP`, `LOOP_IF_FALSE`).
pub fn is_backward_jump(op: u8) -> bool {
    matches!(op, LOOP | LOOP_IF_FALSE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_has_a_mnemonic() {
        for op in WIDE..=RETURN {
            assert_ne!(mnemonic(op), "UNKNOWN", "opcode {op} missing a mnemonic");
        }
    }
}
