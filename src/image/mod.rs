//! The image model: loads an ELF file and exposes its architecture,
//! sections, and symbol table as the plain [`crate::core`] records.

use std::path::Path;

use object::{Object, ObjectSection, ObjectSymbol, SectionKind, SymbolKind, SymbolScope};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::core::function::{Binding, SymbolType, Visibility};
use crate::core::section::SectionFlags;
use crate::core::{Architecture, Function, Section};
use crate::error::{AnalyzerError, FormatErrorKind, InputErrorKind, Result};
use crate::io::SafeReader;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Summary fields surfaced by [`Image::file_info`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub filepath: String,
    pub architecture: String,
    pub machine: u32,
    pub elf_class: u8,
    pub little_endian: bool,
    pub file_type: String,
    pub entry_point: u64,
    pub num_sections: usize,
    pub num_symbols: usize,
    pub num_functions: usize,
    pub text_sections: Vec<String>,
}

/// A loaded ELF image: the architecture, the section table, and the
/// function symbol table, all resolved up front at [`Image::open`] time.
pub struct Image {
    path: String,
    data: Vec<u8>,
    architecture: Architecture,
    machine: u32,
    elf_class: u8,
    little_endian: bool,
    file_type: String,
    entry_point: u64,
    sections: Vec<Section>,
    functions: Vec<Function>,
}

impl Image {
    pub fn open<P: AsRef<Path>>(path: P, config: &AnalysisConfig) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AnalyzerError::InputError(InputErrorKind::NotFound(
                path.to_path_buf(),
            )));
        }
        if !path.is_file() {
            return Err(AnalyzerError::InputError(InputErrorKind::NotRegularFile(
                path.to_path_buf(),
            )));
        }

        let mut reader = SafeReader::open(path, config.io_limits.clone())
            .map_err(AnalyzerError::from)?;

        let sniff = reader.read_prefix(4).map_err(AnalyzerError::from)?;
        if sniff.len() < 4 || &sniff[..4] != ELF_MAGIC {
            return Err(AnalyzerError::FormatError(FormatErrorKind::NotElf));
        }

        let full_len = reader.size();
        let data = reader
            .read_at(0, full_len)
            .map_err(AnalyzerError::from)?
            .to_vec();

        let object = object::File::parse(&*data).map_err(|e| {
            warn!(error = %e, path = %path.display(), "failed to parse ELF structure");
            AnalyzerError::FormatError(FormatErrorKind::Truncated)
        })?;

        let is_64 = object.is_64();
        let architecture = Architecture::from_object(object.architecture(), is_64);
        let little_endian = object.is_little_endian();
        let entry_point = object.entry();

        let (machine, elf_class) = elf_header_fields(&data)?;
        let file_type = elf_file_type(&data)?;

        let mut sections = Vec::new();
        for sec in object.sections() {
            let name = sec.name().unwrap_or("").to_string();
            let kind = sec.kind();
            let flags = SectionFlags {
                alloc: !matches!(kind, SectionKind::Metadata | SectionKind::Note | SectionKind::Other | SectionKind::Unknown)
                    || sec.address() != 0,
                exec: kind == SectionKind::Text,
                write: kind == SectionKind::Data || kind == SectionKind::UninitializedData,
            };
            sections.push(Section {
                name,
                flags,
                virtual_address: sec.address(),
                file_offset: sec.file_range().map(|(off, _)| off).unwrap_or(0),
                size: sec.size(),
                alignment: sec.align(),
                entry_size: 0,
            });
        }

        let section_index_by_addr: Vec<(u64, u64, usize)> = sections
            .iter()
            .enumerate()
            .map(|(i, s)| (s.virtual_address, s.virtual_address + s.size, i))
            .collect();

        let mut functions = Vec::new();
        for sym in object.symbols() {
            let name = match sym.name() {
                Ok(n) if !n.is_empty() => n.to_string(),
                _ => continue,
            };
            let symbol_type = if sym.kind() == SymbolKind::Text {
                SymbolType::Function
            } else {
                SymbolType::Other
            };
            let binding = if sym.is_weak() {
                Binding::Weak
            } else if sym.is_global() {
                Binding::Global
            } else if sym.is_local() {
                Binding::Local
            } else {
                Binding::Other
            };
            let visibility = match sym.scope() {
                SymbolScope::Dynamic | SymbolScope::Linkage => Visibility::Default,
                SymbolScope::Compilation => Visibility::Hidden,
                SymbolScope::Unknown => Visibility::Default,
                _ => Visibility::Default,
            };
            let section_index = section_index_by_addr
                .iter()
                .find(|(start, end, _)| sym.address() >= *start && sym.address() < *end)
                .map(|(_, _, idx)| *idx);

            functions.push(Function {
                name,
                address: sym.address(),
                size: sym.size(),
                symbol_type,
                binding,
                visibility,
                section_index,
            });
        }

        debug!(
            path = %path.display(),
            architecture = %architecture,
            sections = sections.len(),
            functions = functions.len(),
            "loaded ELF image"
        );

        Ok(Self {
            path: path.display().to_string(),
            data,
            architecture,
            machine,
            elf_class,
            little_endian,
            file_type,
            entry_point,
            sections,
            functions,
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn text_sections(&self) -> Vec<&Section> {
        self.sections.iter().filter(|s| s.is_text()).collect()
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Only symbol-table entries classified as code.
    pub fn code_functions(&self) -> Vec<&Function> {
        self.functions
            .iter()
            .filter(|f| f.symbol_type == SymbolType::Function)
            .collect()
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// The first function (in symbol-table order) whose range contains
    /// `address`. Symbol tables are not required to be sorted or free of
    /// overlapping entries, so "first match" is the only well-defined
    /// tie-break without imposing an ordering ELF doesn't guarantee.
    pub fn function_by_address(&self, address: u64) -> Option<&Function> {
        self.functions.iter().find(|f| f.contains(address))
    }

    /// Looks up a section by name and returns its raw bytes, or `None` if
    /// no section with that name exists.
    pub fn section_bytes(&self, name: &str) -> Option<&[u8]> {
        let section = self.sections.iter().find(|s| s.name == name)?;
        Some(self.section_bytes_for(section))
    }

    fn section_bytes_for(&self, section: &Section) -> &[u8] {
        let start = section.file_offset as usize;
        let end = start.saturating_add(section.size as usize).min(self.data.len());
        if start >= self.data.len() || start > end {
            return &[];
        }
        &self.data[start..end]
    }

    /// Builds an `Image` directly from its constituent parts, bypassing
    /// ELF parsing entirely. Used by other modules' tests (e.g. the
    /// call-graph builder) that want to exercise section-scanning and
    /// edge-resolution logic against hand-picked functions and raw bytes
    /// without constructing a fully valid symbol table.
    #[cfg(test)]
    pub fn for_test(
        architecture: Architecture,
        data: Vec<u8>,
        sections: Vec<Section>,
        functions: Vec<Function>,
    ) -> Self {
        Self {
            path: "<test>".to_string(),
            data,
            architecture,
            machine: 0,
            elf_class: 2,
            little_endian: true,
            file_type: "executable".to_string(),
            entry_point: 0,
            sections,
            functions,
        }
    }

    pub fn file_info(&self) -> FileInfo {
        FileInfo {
            filepath: self.path.clone(),
            architecture: self.architecture.tag().to_string(),
            machine: self.machine,
            elf_class: self.elf_class,
            little_endian: self.little_endian,
            file_type: self.file_type.clone(),
            entry_point: self.entry_point,
            num_sections: self.sections.len(),
            num_symbols: self.functions.len(),
            num_functions: self.code_functions().len(),
            text_sections: self.text_sections().into_iter().map(|s| s.name.clone()).collect(),
        }
    }
}

/// Reads `e_machine` and `EI_CLASS` directly from the raw header; `object`
/// normalizes these into higher-level enums but `file_info()` reports the
/// raw values too.
fn elf_header_fields(data: &[u8]) -> Result<(u32, u8)> {
    if data.len() < 20 {
        return Err(AnalyzerError::FormatError(FormatErrorKind::Truncated));
    }
    let elf_class = data[4];
    if elf_class != 1 && elf_class != 2 {
        return Err(AnalyzerError::FormatError(FormatErrorKind::UnsupportedClass));
    }
    let little_endian = data[5] == 1;
    let machine = if little_endian {
        u16::from_le_bytes([data[18], data[19]]) as u32
    } else {
        u16::from_be_bytes([data[18], data[19]]) as u32
    };
    Ok((machine, elf_class))
}

fn elf_file_type(data: &[u8]) -> Result<String> {
    if data.len() < 18 {
        return Err(AnalyzerError::FormatError(FormatErrorKind::Truncated));
    }
    let little_endian = data[5] == 1;
    let e_type = if little_endian {
        u16::from_le_bytes([data[16], data[17]])
    } else {
        u16::from_be_bytes([data[16], data[17]])
    };
    Ok(match e_type {
        1 => "relocatable",
        2 => "executable",
        3 => "shared",
        4 => "core",
        _ => "unknown",
    }
    .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a minimal valid little-endian ELF64 executable with one
    /// `.text` section and one function symbol, enough for `Image::open`
    /// to succeed end to end.
    fn minimal_elf64() -> Vec<u8> {
        let mut buf = vec![0u8; 0x200];
        buf[0..4].copy_from_slice(ELF_MAGIC);
        buf[4] = 2; // ELFCLASS64
        buf[5] = 1; // little endian
        buf[6] = 1; // EI_VERSION
        buf[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        buf[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        buf[20..24].copy_from_slice(&1u32.to_le_bytes());
        buf
    }

    #[test]
    fn rejects_non_elf_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_elf");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not an elf file at all").unwrap();
        let config = AnalysisConfig::default();
        let result = Image::open(&path, &config);
        assert!(matches!(
            result,
            Err(AnalyzerError::FormatError(FormatErrorKind::NotElf))
        ));
    }

    #[test]
    fn rejects_missing_file() {
        let config = AnalysisConfig::default();
        let result = Image::open("/nonexistent/path/to/binary", &config);
        assert!(matches!(
            result,
            Err(AnalyzerError::InputError(InputErrorKind::NotFound(_)))
        ));
    }

    #[test]
    fn elf_header_fields_reads_machine_and_class() {
        let data = minimal_elf64();
        let (machine, class) = elf_header_fields(&data).unwrap();
        assert_eq!(machine, 62);
        assert_eq!(class, 2);
    }
}
