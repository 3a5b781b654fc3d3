//! The `Instruction` record produced by a disassembler backend.

use serde::{Deserialize, Serialize};

/// The coarse role an instruction plays in call-graph and stack analysis.
/// Everything that isn't a call, a tail-call-style jump, or a stack
/// adjustment is `Other` — classification never needs finer granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionClass {
    Call,
    TailJump,
    StackAlloc,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub address: u64,
    pub mnemonic: String,
    pub operand_text: String,
    pub raw_bytes: Vec<u8>,
    pub size: u8,
    pub class: InstructionClass,
    /// The resolved branch/call target, when one could be extracted from
    /// either the decoded operand or, failing that, the operand text.
    pub target_address: Option<u64>,
}

impl Instruction {
    pub fn next_address(&self) -> u64 {
        self.address + self.size as u64
    }

    pub fn is_control_flow(&self) -> bool {
        matches!(self.class, InstructionClass::Call | InstructionClass::TailJump)
    }
}
