//! Decoded-instruction matching strategy.
//!
//! Instead of raw bytes, a signature lists instruction shapes (mnemonic plus
//! operand kinds) that must decode consecutively from the start of the window.
//! The last shape has to carry a 32-bit relative field at the tail of its
//! encoding; the reported match length is the offset of that field, so callers
//! decode the target exactly as they do for byte signatures.

use iced_x86::{Decoder, DecoderOptions, Instruction, OpKind};

use crate::signature::InstructionShape;

/// Longest legal x86 instruction encoding
const MAX_INSTRUCTION_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionSignature {
    name: String,
    shapes: Vec<InstructionShape>,
}

impl InstructionSignature {
    pub fn new(name: impl Into<String>, shapes: Vec<InstructionShape>) -> Self {
        Self {
            name: name.into(),
            shapes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shapes(&self) -> &[InstructionShape] {
        &self.shapes
    }

    /// Bytes of window needed to decode every shape
    pub fn window_len(&self) -> usize {
        self.shapes.len() * MAX_INSTRUCTION_LEN
    }

    pub fn match_window(&self, window: &[u8]) -> Option<usize> {
        let last = self.shapes.len().checked_sub(1)?;
        let mut decoder = Decoder::with_ip(64, window, 0, DecoderOptions::NONE);
        let mut instruction = Instruction::default();
        let mut start = 0usize;

        for (i, shape) in self.shapes.iter().enumerate() {
            if !decoder.can_decode() {
                return None;
            }
            decoder.decode_out(&mut instruction);
            if instruction.is_invalid() || !shape_matches(shape, &instruction) {
                return None;
            }

            if i == last {
                return relative_field_offset(window, start, &instruction);
            }
            start += instruction.len();
        }

        None
    }
}

fn shape_matches(shape: &InstructionShape, instruction: &Instruction) -> bool {
    let mnemonic = format!("{:?}", instruction.mnemonic());
    if !mnemonic.eq_ignore_ascii_case(&shape.mnemonic) {
        return false;
    }

    // No operand list means any operands
    if shape.operands.is_empty() {
        return true;
    }
    if shape.operands.len() != instruction.op_count() as usize {
        return false;
    }

    shape
        .operands
        .iter()
        .enumerate()
        .all(|(i, expected)| operand_matches(expected, instruction, i as u32))
}

fn operand_matches(expected: &str, instruction: &Instruction, operand: u32) -> bool {
    let kind = instruction.op_kind(operand);
    match expected.to_ascii_lowercase().as_str() {
        "*" => true,
        "mem" => kind == OpKind::Memory,
        "rel" => matches!(
            kind,
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64
        ),
        "imm" => format!("{:?}", kind).starts_with("Immediate"),
        register => {
            kind == OpKind::Register
                && format!("{:?}", instruction.op_register(operand)).eq_ignore_ascii_case(register)
        }
    }
}

/// Offset within the window of the instruction's trailing rel32 field, if the
/// instruction's target really is computed from it
fn relative_field_offset(window: &[u8], start: usize, instruction: &Instruction) -> Option<usize> {
    let len = instruction.len();
    if len < 4 {
        return None;
    }

    let target = if instruction.is_ip_rel_memory_operand() {
        instruction.ip_rel_memory_address()
    } else if matches!(instruction.op0_kind(), OpKind::NearBranch64) {
        instruction.near_branch_target()
    } else {
        return None;
    };

    let field = start + len - 4;
    let raw: [u8; 4] = window.get(field..field + 4)?.try_into().ok()?;
    let displacement = i32::from_le_bytes(raw) as i64;

    // Rejects encodings where an immediate follows the displacement
    (instruction.next_ip().wrapping_add_signed(displacement) == target).then_some(field)
}
