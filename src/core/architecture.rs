//! The normalized machine-architecture tag.
//!
//! Grounded on the disassembler-facing `Architecture` enum this codebase
//! already carries, collapsed to the exact tag set the image model must
//! report: `{x86, x86_64, arm, aarch64, mips, ppc, ppc64, riscv, unknown}`.
//! Bit-width that does not survive into the public tag (mips64 vs mips32,
//! riscv64 vs riscv32) is tracked separately via `address_bits()`, since
//! the disassembler backends still need it to pick a decoder mode even
//! though the reported architecture tag does not distinguish them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    X86,
    X86_64,
    Arm,
    Aarch64,
    Mips,
    Mips64,
    Ppc,
    Ppc64,
    Riscv,
    Riscv64,
    Unknown,
}

impl Architecture {
    /// The normalized tag reported by the image model (§4.1). Mips64 and
    /// Riscv64 report the same tag as their 32-bit counterparts; bit width
    /// is not part of the public tag set.
    pub fn tag(self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X86_64 => "x86_64",
            Architecture::Arm => "arm",
            Architecture::Aarch64 => "aarch64",
            Architecture::Mips | Architecture::Mips64 => "mips",
            Architecture::Ppc => "ppc",
            Architecture::Ppc64 => "ppc64",
            Architecture::Riscv | Architecture::Riscv64 => "riscv",
            Architecture::Unknown => "unknown",
        }
    }

    pub fn address_bits(self) -> u8 {
        match self {
            Architecture::X86
            | Architecture::Arm
            | Architecture::Mips
            | Architecture::Ppc
            | Architecture::Riscv => 32,
            Architecture::X86_64
            | Architecture::Aarch64
            | Architecture::Mips64
            | Architecture::Ppc64
            | Architecture::Riscv64 => 64,
            Architecture::Unknown => 64,
        }
    }

    /// Maps from `object::Architecture`, the crate used by the image model
    /// (component A) to detect the machine type from the ELF header.
    pub fn from_object(arch: object::Architecture, is_64: bool) -> Self {
        use object::Architecture as O;
        match arch {
            O::I386 => Architecture::X86,
            O::X86_64 => Architecture::X86_64,
            O::Arm => Architecture::Arm,
            O::Aarch64 => Architecture::Aarch64,
            O::Mips => {
                if is_64 {
                    Architecture::Mips64
                } else {
                    Architecture::Mips
                }
            }
            O::PowerPc => Architecture::Ppc,
            O::PowerPc64 => Architecture::Ppc64,
            O::Riscv32 => Architecture::Riscv,
            O::Riscv64 => Architecture::Riscv64,
            _ => Architecture::Unknown,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_set_matches_normalized_list() {
        let tags: Vec<&str> = [
            Architecture::X86,
            Architecture::X86_64,
            Architecture::Arm,
            Architecture::Aarch64,
            Architecture::Mips,
            Architecture::Ppc,
            Architecture::Ppc64,
            Architecture::Riscv,
            Architecture::Unknown,
        ]
        .iter()
        .map(|a| a.tag())
        .collect();
        assert_eq!(
            tags,
            vec![
                "x86", "x86_64", "arm", "aarch64", "mips", "ppc", "ppc64", "riscv", "unknown"
            ]
        );
    }

    #[test]
    fn mips64_collapses_to_mips_tag() {
        assert_eq!(Architecture::Mips64.tag(), "mips");
        assert_eq!(Architecture::Mips64.address_bits(), 64);
    }

    #[test]
    fn from_object_maps_x86_64() {
        assert_eq!(
            Architecture::from_object(object::Architecture::X86_64, true),
            Architecture::X86_64
        );
    }
}
