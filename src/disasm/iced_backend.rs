//! x86 / x86_64 decoding via `iced-x86`.

use iced_x86::{Decoder, DecoderOptions, Formatter, IntelFormatter};

use crate::core::{Architecture, Instruction, InstructionClass};

use super::{classify_mnemonic, extract_target_from_text, Disassembler};

pub struct IcedDisassembler {
    bits: u32,
    arch: Architecture,
}

impl IcedDisassembler {
    pub fn new(arch: Architecture) -> Self {
        let bits = match arch {
            Architecture::X86 => 32,
            _ => 64,
        };
        Self { bits, arch }
    }
}

impl Disassembler for IcedDisassembler {
    fn decode_one(&self, bytes: &[u8], address: u64) -> Option<Instruction> {
        let mut decoder = Decoder::new(self.bits, bytes, DecoderOptions::NONE);
        decoder.set_ip(address);
        let instr = decoder.decode();
        if instr.is_invalid() {
            return None;
        }
        let size = instr.len();

        let mut formatter = IntelFormatter::new();
        let mut text = String::new();
        formatter.format(&instr, &mut text);
        let (mnemonic, operand_text) = match text.split_once(' ') {
            Some((m, rest)) => (m.to_string(), rest.trim().to_string()),
            None => (text.clone(), String::new()),
        };

        let class = classify_mnemonic(self.arch, &mnemonic);
        let target_address = if class == InstructionClass::Call || class == InstructionClass::TailJump {
            structured_target(&instr).or_else(|| extract_target_from_text(&operand_text))
        } else {
            None
        };

        Some(Instruction {
            address,
            mnemonic,
            operand_text,
            raw_bytes: bytes[..size.min(bytes.len())].to_vec(),
            size: size as u8,
            class,
            target_address,
        })
    }
}

/// Prefers the decoded near-branch target over any text fallback.
fn structured_target(instr: &iced_x86::Instruction) -> Option<u64> {
    use iced_x86::OpKind;
    match instr.op0_kind() {
        OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
            Some(instr.near_branch_target())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_relative_call_and_extracts_target() {
        // call rel32 to address+5+0x10: E8 10 00 00 00
        let bytes = [0xe8, 0x10, 0x00, 0x00, 0x00];
        let backend = IcedDisassembler::new(Architecture::X86_64);
        let insn = backend.decode_one(&bytes, 0x1000).unwrap();
        assert_eq!(insn.mnemonic, "call");
        assert_eq!(insn.class, InstructionClass::Call);
        assert_eq!(insn.target_address, Some(0x1015));
    }

    #[test]
    fn decodes_ret_with_no_target() {
        let bytes = [0xc3];
        let backend = IcedDisassembler::new(Architecture::X86_64);
        let insn = backend.decode_one(&bytes, 0x2000).unwrap();
        assert_eq!(insn.mnemonic, "ret");
        assert_eq!(insn.target_address, None);
    }

    #[test]
    fn empty_bytes_decode_to_none() {
        let backend = IcedDisassembler::new(Architecture::X86_64);
        assert!(backend.decode_one(&[], 0x3000).is_none());
    }
}
