//! Multi-architecture disassembly, dispatched behind one enum wrapper so
//! callers never pay for a dynamic dispatch they don't need.

pub mod capstone_backend;
pub mod iced_backend;
pub mod registry;

use crate::core::{Architecture, Instruction};
use crate::error::Result;

/// Common surface every backend implements. Not exposed as a trait object:
/// `registry::for_arch` returns a `Backend` enum instead, so the call site
/// pays for exactly one branch, not a vtable indirection, per decode.
pub trait Disassembler {
    /// Decodes one instruction at `bytes[0..]`, assumed to be loaded at
    /// `address`. Returns `None` when `bytes` is too short to contain a
    /// full instruction or the bytes don't decode (a corrupt tail of a
    /// section, for instance) -- this is never treated as fatal, since a
    /// single bad instruction shouldn't abort analysis of the rest of a
    /// function.
    fn decode_one(&self, bytes: &[u8], address: u64) -> Option<Instruction>;
}

pub use registry::{for_arch, Backend};

/// Classifies mnemonics into the coarse roles call-graph and stack
/// analysis care about. Grounded on the per-architecture mnemonic tables
/// the call-graph builder needs.
pub fn classify_mnemonic(
    architecture: Architecture,
    mnemonic: &str,
) -> crate::core::InstructionClass {
    use crate::core::InstructionClass::*;
    let m = mnemonic.to_ascii_lowercase();
    let (call_set, tail_set): (&[&str], &[&str]) = match architecture {
        Architecture::X86_64 => (&["call", "callq"], &["jmp", "jmpq"]),
        Architecture::X86 => (&["call"], &["jmp"]),
        Architecture::Arm => (&["bl", "blx"], &["b", "bx"]),
        Architecture::Aarch64 => (&["bl", "blr"], &["b", "br"]),
        Architecture::Mips | Architecture::Mips64 => (&["jal", "jalr"], &["j", "jr"]),
        Architecture::Ppc | Architecture::Ppc64 => (&["bl", "bla"], &["b", "ba"]),
        Architecture::Riscv | Architecture::Riscv64 => (&["jal", "jalr"], &["j", "jr"]),
        Architecture::Unknown => (&["call"], &["jmp"]),
    };
    if call_set.contains(&m.as_str()) {
        Call
    } else if tail_set.contains(&m.as_str()) {
        TailJump
    } else {
        Other
    }
}

/// Extracts a branch/call target address following the fallback chain:
/// a structured operand (handled by the backend before this is called),
/// then the first hex literal in the operand text, then the first decimal
/// integer within the plausible userspace code range.
pub fn extract_target_from_text(operand_text: &str) -> Option<u64> {
    if let Some(hex_pos) = operand_text.find("0x") {
        let rest = &operand_text[hex_pos + 2..];
        let hex_digits: String = rest.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
        if !hex_digits.is_empty() {
            if let Ok(addr) = u64::from_str_radix(&hex_digits, 16) {
                return Some(addr);
            }
        }
    }

    let mut digits = String::new();
    for ch in operand_text.chars().chain(std::iter::once(' ')) {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else {
            if digits.len() >= 4 {
                if let Ok(value) = digits.parse::<u64>() {
                    if (0x400000..=0x7fff_ffff_ffff).contains(&value) {
                        return Some(value);
                    }
                }
            }
            digits.clear();
        }
    }
    None
}

/// Decodes a contiguous run of bytes, starting at `base_address`, through
/// an already-resolved backend. Stops at the first undecodable byte run
/// rather than erroring the whole function -- truncated tails happen at
/// section boundaries -- and is never fatal to the caller's loop over
/// other functions.
pub fn decode_with(backend: &Backend, bytes: &[u8], base_address: u64) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        let address = base_address + offset as u64;
        match backend.decode_one(&bytes[offset..], address) {
            Some(insn) => {
                let size = insn.size.max(1) as usize;
                offset += size;
                out.push(insn);
            }
            None => break,
        }
    }
    out
}

/// Resolves a backend for `architecture` and decodes `bytes` in one call.
/// A thin convenience over [`decode_with`] for call sites that don't
/// already hold a backend; resolving per-call is wasteful in a tight loop,
/// which is why the call-graph builder and stack analyzer resolve once and
/// call [`decode_with`] directly instead.
pub fn decode_function_bytes(
    architecture: Architecture,
    bytes: &[u8],
    base_address: u64,
) -> Result<Vec<Instruction>> {
    let backend = for_arch(architecture)?;
    Ok(decode_with(&backend, bytes, base_address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_x86_64_call_and_tail_jump() {
        assert_eq!(
            classify_mnemonic(Architecture::X86_64, "call"),
            crate::core::InstructionClass::Call
        );
        assert_eq!(
            classify_mnemonic(Architecture::X86_64, "jmp"),
            crate::core::InstructionClass::TailJump
        );
        assert_eq!(
            classify_mnemonic(Architecture::X86_64, "mov"),
            crate::core::InstructionClass::Other
        );
    }

    #[test]
    fn classify_riscv_supplemented_mnemonics() {
        assert_eq!(
            classify_mnemonic(Architecture::Riscv, "jal"),
            crate::core::InstructionClass::Call
        );
        assert_eq!(
            classify_mnemonic(Architecture::Riscv, "jr"),
            crate::core::InstructionClass::TailJump
        );
    }

    #[test]
    fn extract_target_prefers_hex_literal() {
        assert_eq!(extract_target_from_text("0x401020"), Some(0x401020));
    }

    #[test]
    fn extract_target_falls_back_to_decimal_in_range() {
        assert_eq!(extract_target_from_text("4199040"), Some(4199040));
    }

    #[test]
    fn extract_target_rejects_out_of_range_decimal() {
        assert_eq!(extract_target_from_text("12"), None);
    }

    #[test]
    fn extract_target_absent_returns_none() {
        assert_eq!(extract_target_from_text("rax, rbx"), None);
    }
}
