//! Pure-function disassembler (spec §4.3): depends only on a [`Chunk`],
//! never on any runtime state (stack, frames, globals).

use std::fmt::Write as _;

use crate::chunk::Chunk;
use crate::op::{self, OperandWidth};

/// Disassembles every instruction in `chunk` under a `name` header,
/// returning one line per instruction.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {name} ==");
    let mut offset = 0;
    while offset < chunk.code.len() {
        let (line, next) = disassemble_instruction(chunk, offset);
        out.push_str(&line);
        out.push('\n');
        offset = next;
    }
    out
}

/// Disassembles the single instruction at `offset`, returning its rendered
/// text and the offset of the next instruction. Consumes exactly as many
/// bytes as the encoding specifies (spec §8 invariant 6).
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let line = chunk.line_for(offset);
    let line_col = if offset > 0 && chunk.line_for(offset - 1) == line {
        "   |".to_string()
    } else {
        format!("{line:4}")
    };

    let mut opcode = chunk.code[offset];
    let mut cursor = offset + 1;
    let mut wide = false;
    if opcode == op::WIDE {
        wide = true;
        opcode = chunk.code[cursor];
        cursor += 1;
    }
    let mnemonic = op::mnemonic(opcode);
    let tag = if wide { format!("{mnemonic}.W") } else { mnemonic.to_string() };

    let (operands, next) = match op::operand_width(opcode) {
        OperandWidth::None => (String::new(), cursor),
        OperandWidth::Byte => {
            let v = chunk.code[cursor];
            (format!(" {v}"), cursor + 1)
        }
        OperandWidth::TwoBytes => {
            let index = read_index(chunk, cursor, wide);
            let (index_val, after_index) = index;
            let imm = chunk.code[after_index];
            (format!(" {index_val} {imm}"), after_index + 1)
        }
        OperandWidth::Index => {
            let (index, after) = read_index(chunk, cursor, wide);
            let preview = constant_preview(chunk, opcode, index);
            (format!(" {index}{preview}"), after)
        }
        OperandWidth::Jump16 => {
            let hi = chunk.code[cursor] as u16;
            let lo = chunk.code[cursor + 1] as u16;
            let raw = (hi << 8) | lo;
            let target = if op::is_backward_jump(opcode) {
                offset.saturating_sub(raw as usize) + 2
            } else {
                cursor + 2 + raw as usize
            };
            (format!(" {raw} -> L{target:04}"), cursor + 2)
        }
        OperandWidth::Closure => {
            let (index, after) = read_index(chunk, cursor, wide);
            let upvalue_count = match chunk.constants.get(index) {
                Some(v) => match v.as_obj() {
                    Some(o) if o.is_closure() => o.as_closure().upvalues.len(),
                    Some(o) => o.as_function().upvalue_count(),
                    None => 0,
                },
                None => 0,
            };
            let meta_bytes = upvalue_count * 2;
            let preview = constant_preview(chunk, opcode, index);
            (format!(" {index}{preview} (+{meta_bytes}B captures)"), after + meta_bytes)
        }
    };

    (format!("{offset:04} {line_col} {tag}{operands}"), next)
}

fn read_index(chunk: &Chunk, cursor: usize, wide: bool) -> (usize, usize) {
    if wide {
        let b0 = chunk.code[cursor] as usize;
        let b1 = chunk.code[cursor + 1] as usize;
        let b2 = chunk.code[cursor + 2] as usize;
        ((b0 << 16) | (b1 << 8) | b2, cursor + 3)
    } else {
        (chunk.code[cursor] as usize, cursor + 1)
    }
}

fn constant_preview(chunk: &Chunk, opcode: u8, index: usize) -> String {
    let pools_a_constant = matches!(
        opcode,
        op::CONSTANT | op::GET_GLOBAL | op::SET_GLOBAL | op::DEFINE_GLOBAL | op::CLOSURE
    );
    if !pools_a_constant {
        return String::new();
    }
    match chunk.constants.get(index) {
        Some(v) => format!(" '{v}'"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::value::Value;
    use proptest::prelude::*;

    #[test]
    fn disassembly_consumes_exactly_the_code_length() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::Number(42.0));
        chunk.write_index(op::CONSTANT, idx, 1).unwrap();
        chunk.write_byte(op::PRINT, 1);
        chunk.write_byte(op::RETURN, 2);

        let mut offset = 0;
        while offset < chunk.code.len() {
            let (_, next) = disassemble_instruction(&chunk, offset);
            assert!(next > offset);
            offset = next;
        }
        assert_eq!(offset, chunk.code.len());
    }

    #[test]
    fn wide_prefixed_instruction_is_labeled() {
        let mut chunk = Chunk::new();
        for i in 0..300 {
            chunk.add_constant(Value::Number(i as f64));
        }
        chunk.write_index(op::CONSTANT, 299, 1).unwrap();
        let (line, _) = disassemble_instruction(&chunk, 0);
        assert!(line.contains("CONSTANT.W"));
    }

    proptest! {
        /// Generalizes `disassembly_consumes_exactly_the_code_length` (spec
        /// §8 invariant 6) over any sequence of no-operand instructions:
        /// the disassembler must walk every byte exactly once, never over-
        /// or under-reading the encoding.
        #[test]
        fn disassembly_always_consumes_exactly_the_code_length(
            opcodes in prop::collection::vec(
                prop_oneof![
                    Just(op::NIL),
                    Just(op::TRUE),
                    Just(op::FALSE),
                    Just(op::POP),
                    Just(op::ADD),
                    Just(op::PRINT),
                    Just(op::RETURN),
                ],
                1..40,
            )
        ) {
            let mut chunk = Chunk::new();
            for opcode in opcodes {
                chunk.write_byte(opcode, 1);
            }

            let mut offset = 0;
            while offset < chunk.code.len() {
                let (_, next) = disassemble_instruction(&chunk, offset);
                prop_assert!(next > offset);
                offset = next;
            }
            prop_assert_eq!(offset, chunk.code.len());
        }
    }
}
