//! Backend dispatch: one enum wrapper over the two decoder families, so a
//! call site pays for exactly one branch per decode rather than a vtable
//! indirection through a trait object.

use crate::core::{Architecture, Instruction};
use crate::error::{AnalyzerError, Result};

use super::capstone_backend::CapstoneDisassembler;
use super::iced_backend::IcedDisassembler;
use super::Disassembler;

pub enum Backend {
    Iced(IcedDisassembler),
    Capstone(CapstoneDisassembler),
}

impl Disassembler for Backend {
    fn decode_one(&self, bytes: &[u8], address: u64) -> Option<Instruction> {
        match self {
            Backend::Iced(d) => d.decode_one(bytes, address),
            Backend::Capstone(d) => d.decode_one(bytes, address),
        }
    }
}

/// Selects a disassembler backend for `arch`. `iced-x86` handles x86/x86_64;
/// every other supported tag goes through `capstone`. `Unknown` fails here,
/// not later at decode time -- per §4.2, an unsupported tag fails at
/// construction with a dedicated error.
pub fn for_arch(arch: Architecture) -> Result<Backend> {
    match arch {
        Architecture::X86 | Architecture::X86_64 => Ok(Backend::Iced(IcedDisassembler::new(arch))),
        Architecture::Arm
        | Architecture::Aarch64
        | Architecture::Mips
        | Architecture::Mips64
        | Architecture::Ppc
        | Architecture::Ppc64
        | Architecture::Riscv
        | Architecture::Riscv64 => CapstoneDisassembler::new(arch)
            .map(Backend::Capstone)
            .ok_or_else(|| AnalyzerError::UnsupportedArchitecture(arch.tag().to_string())),
        Architecture::Unknown => {
            Err(AnalyzerError::UnsupportedArchitecture(arch.tag().to_string()))
        }
    }
}
