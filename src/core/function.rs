//! The `Function` record: one named or synthesized symbol-table entry.

use serde::{Deserialize, Serialize};

/// Whether a symbol-table entry denotes executable code or something else
/// (data, section, file, etc). Only `Function` entries are scanned for
/// calls; others are kept around for name/address lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolType {
    Function,
    Other,
}

/// ELF symbol binding (`STB_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Binding {
    Local,
    Global,
    Weak,
    Other,
}

/// ELF symbol visibility (`STV_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Default,
    Hidden,
    Protected,
    Internal,
}

/// A function known to the image, from the symbol table or a PLT stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub symbol_type: SymbolType,
    pub binding: Binding,
    pub visibility: Visibility,
    pub section_index: Option<usize>,
}

impl Function {
    pub fn end_address(&self) -> u64 {
        self.address.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        if self.size == 0 {
            return address == self.address;
        }
        address >= self.address && address < self.end_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(address: u64, size: u64) -> Function {
        Function {
            name: "f".into(),
            address,
            size,
            symbol_type: SymbolType::Function,
            binding: Binding::Global,
            visibility: Visibility::Default,
            section_index: Some(0),
        }
    }

    #[test]
    fn contains_checks_half_open_range() {
        let func = f(0x1000, 0x10);
        assert!(func.contains(0x1000));
        assert!(func.contains(0x100f));
        assert!(!func.contains(0x1010));
    }

    #[test]
    fn zero_size_matches_exact_address_only() {
        let func = f(0x2000, 0);
        assert!(func.contains(0x2000));
        assert!(!func.contains(0x2001));
    }
}
