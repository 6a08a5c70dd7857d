//! Byte-addressable code body, constant pool and line table (spec §3.3/§4.3).

use crate::limits::WIDE_INDEX_MAX;
use crate::op;
use crate::value::Value;

/// Run-length-encoded `(first_offset, line)` pairs. A new entry is appended
/// only when the line number changes, so a chunk with `N` source lines but
/// `M` instructions per line on average costs `O(N)` entries, not `O(N*M)`.
#[derive(Default)]
pub struct LineTable {
    runs: Vec<(usize, u32)>,
}

impl LineTable {
    pub fn push(&mut self, offset: usize, line: u32) {
        match self.runs.last() {
            Some(&(_, last_line)) if last_line == line => {}
            _ => self.runs.push((offset, line)),
        }
    }

    /// Line of the last run whose `first_offset <= offset` (spec §3.3).
    pub fn line_for(&self, offset: usize) -> u32 {
        match self.runs.binary_search_by_key(&offset, |&(o, _)| o) {
            Ok(i) => self.runs[i].1,
            Err(0) => 0,
            Err(i) => self.runs[i - 1].1,
        }
    }
}

/// Returned when a constant/name/local/upvalue index would not fit even the
/// wide 24-bit encoding; the compiler turns this into a proper diagnostic.
#[derive(Debug, Clone, Copy)]
pub struct IndexTooLarge;

/// A compiled function body: its bytecode, constant pool, and line table.
#[derive(Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    lines: LineTable,
}

impl Chunk {
    pub fn new() -> Self {
        Chunk::default()
    }

    pub fn write_byte(&mut self, byte: u8, line: u32) {
        self.lines.push(self.code.len(), line);
        self.code.push(byte);
    }

    /// Appends `value` to the constant pool, returning its index. Unlike
    /// clox's compact-numeric fast path this performs no deduplication: two
    /// `addConstant` calls for equal values yield two slots (interning
    /// already collapses string identity upstream, in [`crate::gc::Heap`]).
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn line_for(&self, offset: usize) -> u32 {
        self.lines.line_for(offset)
    }

    /// Emits `opcode` followed by `index`, picking the 8-bit or 24-bit
    /// encoding (spec §4.3): indices under 256 get `opcode, index`; larger
    /// ones get `OP_WIDE, opcode, hi, mid, lo`. Indices at or beyond 2^24
    /// are rejected.
    pub fn write_index(&mut self, opcode: u8, index: usize, line: u32) -> Result<(), IndexTooLarge> {
        if index >= WIDE_INDEX_MAX {
            return Err(IndexTooLarge);
        }
        if index < 256 {
            self.write_byte(opcode, line);
            self.write_byte(index as u8, line);
        } else {
            self.write_byte(op::WIDE, line);
            self.write_byte(opcode, line);
            self.write_byte((index >> 16) as u8, line);
            self.write_byte((index >> 8) as u8, line);
            self.write_byte(index as u8, line);
        }
        Ok(())
    }

    /// Emits a 16-bit placeholder jump offset and returns the offset of its
    /// first byte, for later patching by [`Chunk::patch_jump`].
    pub fn emit_jump_placeholder(&mut self, opcode: u8, line: u32) -> usize {
        self.write_byte(opcode, line);
        self.write_byte(0xff, line);
        self.write_byte(0xff, line);
        self.code.len() - 2
    }

    /// Backpatches a placeholder written by [`Chunk::emit_jump_placeholder`]
    /// with the forward distance from just after the operand to the current
    /// end of code.
    pub fn patch_jump(&mut self, operand_offset: usize) -> Result<(), IndexTooLarge> {
        let distance = self.code.len() - (operand_offset + 2);
        if distance > crate::limits::JUMP_MAX {
            return Err(IndexTooLarge);
        }
        let bytes = (distance as u16).to_be_bytes();
        self.code[operand_offset] = bytes[0];
        self.code[operand_offset + 1] = bytes[1];
        Ok(())
    }

    /// Emits a backward `LOOP`/`LOOP_IF_FALSE` jump to `loop_start`.
    pub fn emit_loop(&mut self, opcode: u8, loop_start: usize, line: u32) -> Result<(), IndexTooLarge> {
        self.write_byte(opcode, line);
        let distance = self.code.len() - loop_start + 2;
        if distance > crate::limits::JUMP_MAX {
            return Err(IndexTooLarge);
        }
        let bytes = (distance as u16).to_be_bytes();
        self.write_byte(bytes[0], line);
        self.write_byte(bytes[1], line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn line_table_is_monotonic_and_correct() {
        let mut chunk = Chunk::new();
        chunk.write_byte(op::NIL, 1);
        chunk.write_byte(op::NIL, 1);
        chunk.write_byte(op::POP, 2);
        chunk.write_byte(op::RETURN, 5);
        assert_eq!(chunk.line_for(0), 1);
        assert_eq!(chunk.line_for(1), 1);
        assert_eq!(chunk.line_for(2), 2);
        assert_eq!(chunk.line_for(3), 5);
    }

    #[test]
    fn write_index_picks_wide_encoding_past_256() {
        let mut chunk = Chunk::new();
        chunk.write_index(op::GET_GLOBAL, 5, 1).unwrap();
        assert_eq!(chunk.code, vec![op::GET_GLOBAL, 5]);

        let mut wide = Chunk::new();
        wide.write_index(op::GET_GLOBAL, 300, 1).unwrap();
        assert_eq!(wide.code[0], op::WIDE);
        assert_eq!(wide.code[1], op::GET_GLOBAL);
        assert_eq!(wide.code.len(), 5);
    }

    #[test]
    fn jump_patch_round_trips_through_big_endian_u16() {
        let mut chunk = Chunk::new();
        let placeholder = chunk.emit_jump_placeholder(op::JUMP_IF_FALSE, 1);
        chunk.write_byte(op::POP, 1);
        chunk.write_byte(op::POP, 1);
        chunk.patch_jump(placeholder).unwrap();
        let offset = u16::from_be_bytes([chunk.code[placeholder], chunk.code[placeholder + 1]]);
        assert_eq!(offset as usize, 2);
    }

    proptest! {
        /// Generalizes `line_table_is_monotonic_and_correct`: a single-pass
        /// compiler only ever emits bytecode at non-decreasing source lines,
        /// so `line_for` must be non-decreasing in offset for any such trace.
        #[test]
        fn line_table_stays_monotonic_for_any_non_decreasing_line_sequence(
            deltas in prop::collection::vec(0u32..5, 1..50)
        ) {
            let mut chunk = Chunk::new();
            let mut line = 1u32;
            for delta in &deltas {
                line += delta;
                chunk.write_byte(op::NIL, line);
            }
            for offset in 0..chunk.code.len().saturating_sub(1) {
                prop_assert!(chunk.line_for(offset) <= chunk.line_for(offset + 1));
            }
        }
    }
}
