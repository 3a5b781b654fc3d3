//! ARM / AArch64 / MIPS / PowerPC / RISC-V decoding via `capstone`.
//!
//! `iced-x86` only covers x86/x86_64, so every other supported architecture
//! tag is dispatched here instead. The component only needs mnemonic,
//! operand text, and (for call/tail-jump instructions) a target address.
//! Targets are read off Capstone's structured instruction detail where this
//! backend knows how to decode it (ARM / AArch64 immediate branch operands)
//! and fall back to the text-scanning target extractor for everything else,
//! the same two-step the x86 backend uses.

use capstone::arch::arm::ArmOperandType;
use capstone::arch::arm64::Arm64OperandType;
use capstone::prelude::*;
use capstone::{Arch, Capstone, Endian, Mode, NO_EXTRA_MODE};

use crate::core::{Architecture, Instruction, InstructionClass};

use super::{classify_mnemonic, extract_target_from_text, Disassembler};

pub struct CapstoneDisassembler {
    cs: Capstone,
    arch: Architecture,
}

/// Capstone defaults to little-endian decoding for every architecture this
/// backend handles; the disassembler's input contract (§4.2) carries no
/// endianness parameter, so this is the one reasonable default rather than
/// a per-file override.
fn cs_arch_mode(arch: Architecture) -> Option<(Arch, Mode, Option<Endian>)> {
    match arch {
        Architecture::Arm => Some((Arch::ARM, Mode::Arm, Some(Endian::Little))),
        Architecture::Aarch64 => Some((Arch::ARM64, Mode::Arm, Some(Endian::Little))),
        Architecture::Mips => Some((Arch::MIPS, Mode::Mips32, Some(Endian::Little))),
        Architecture::Mips64 => Some((Arch::MIPS, Mode::Mips64, Some(Endian::Little))),
        Architecture::Ppc => Some((Arch::PPC, Mode::Mode32, Some(Endian::Big))),
        Architecture::Ppc64 => Some((Arch::PPC, Mode::Mode64, Some(Endian::Big))),
        Architecture::Riscv => Some((Arch::RISCV, Mode::RiscV32, None)),
        Architecture::Riscv64 => Some((Arch::RISCV, Mode::RiscV64, None)),
        Architecture::X86 | Architecture::X86_64 | Architecture::Unknown => None,
    }
}

impl CapstoneDisassembler {
    pub fn new(arch: Architecture) -> Option<Self> {
        let (a, m, endian) = cs_arch_mode(arch)?;
        let mut cs = Capstone::new_raw(a, m, NO_EXTRA_MODE, endian).ok()?;
        let _ = cs.set_detail(true);
        Some(Self { cs, arch })
    }

    /// Reads the decoded immediate operand off Capstone's structured detail
    /// when the backend exposes one for this architecture, per the ARM /
    /// AArch64 branch-immediate case -- the common case for `bl`/`b`. Falls
    /// back to `None` (letting the caller try text extraction) for anything
    /// encoded as a register or memory operand, which this component has no
    /// use for since it never resolves indirect targets.
    fn structured_target(&self, insn: &capstone::Insn) -> Option<u64> {
        let detail = self.cs.insn_detail(insn).ok()?;
        match self.arch {
            Architecture::Aarch64 => {
                let arch_detail = detail.arch_detail();
                let arm64 = arch_detail.arm64()?;
                arm64.operands().find_map(|op| match op.op_type {
                    Arm64OperandType::Imm(i) => Some(i as u64),
                    _ => None,
                })
            }
            Architecture::Arm => {
                let arch_detail = detail.arch_detail();
                let arm = arch_detail.arm()?;
                arm.operands().find_map(|op| match op.op_type {
                    ArmOperandType::Imm(i) => Some(i as u64),
                    _ => None,
                })
            }
            _ => None,
        }
    }
}

impl Disassembler for CapstoneDisassembler {
    fn decode_one(&self, bytes: &[u8], address: u64) -> Option<Instruction> {
        if bytes.is_empty() {
            return None;
        }
        let insns = self.cs.disasm_count(bytes, address, 1).ok()?;
        let insn = insns.iter().next()?;
        let size = insn.bytes().len();
        if size == 0 {
            return None;
        }

        let mnemonic = insn.mnemonic().unwrap_or("").to_string();
        let operand_text = insn.op_str().unwrap_or("").to_string();

        let class = classify_mnemonic(self.arch, &mnemonic);
        let target_address = if class == InstructionClass::Call || class == InstructionClass::TailJump {
            self.structured_target(insn)
                .or_else(|| extract_target_from_text(&operand_text))
        } else {
            None
        };

        Some(Instruction {
            address,
            mnemonic,
            operand_text,
            raw_bytes: insn.bytes().to_vec(),
            size: size as u8,
            class,
            target_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_aarch64_bl_and_extracts_target() {
        // bl #0x1000 relative to the decode address -- bytes taken from a
        // known-good `bl` encoding (offset +4 instructions).
        let bytes = [0x01, 0x00, 0x00, 0x94];
        let backend = CapstoneDisassembler::new(Architecture::Aarch64).unwrap();
        let insn = backend.decode_one(&bytes, 0x1000).unwrap();
        assert_eq!(insn.mnemonic, "bl");
        assert_eq!(insn.class, InstructionClass::Call);
    }

    #[test]
    fn unsupported_endianness_free_arch_still_constructs() {
        assert!(CapstoneDisassembler::new(Architecture::Riscv).is_some());
    }

    #[test]
    fn x86_is_not_handled_by_this_backend() {
        assert!(CapstoneDisassembler::new(Architecture::X86_64).is_none());
    }

    #[test]
    fn empty_bytes_decode_to_none() {
        let backend = CapstoneDisassembler::new(Architecture::Arm).unwrap();
        assert!(backend.decode_one(&[], 0x2000).is_none());
    }
}
