//! A static analyzer for ELF object and executable files.
//!
//! Reconstructs the inter-procedural call graph of a binary and derives two
//! classes of facts from it: reachability paths between functions, and a
//! conservative upper bound on per-function worst-case stack consumption.
//!
//! The crate is organized leaves-first: [`image`] parses the ELF and exposes
//! its sections/symbols, [`disasm`] decodes instructions from a byte range,
//! [`analysis::callgraph`] builds the call graph from both, and
//! [`analysis::paths`] / [`analysis::stack`] are read-only clients of the
//! built graph.

/// Tunable knobs for the analysis pipeline (recursion multiplier, scan
/// windows, I/O limits).
pub mod config;

/// Crate-wide error taxonomy and `Result` alias.
pub mod error;

/// Bounded, memory-mapped file access.
pub mod io;

/// Logging and tracing infrastructure.
pub mod logging;

/// Plain data records shared by every component: architecture, function,
/// section, instruction, and call-graph types.
pub mod core;

/// The image model (Component A): parses an ELF file into sections and
/// function symbols.
pub mod image;

/// The multi-architecture disassembler (Component B).
pub mod disasm;

/// The call-graph builder, path engine, and stack analyzer (Components
/// C, D, E).
pub mod analysis;

pub use crate::analysis::callgraph::CallGraphBuilder;
pub use crate::analysis::paths::PathEngine;
pub use crate::analysis::stack::StackAnalyzer;
pub use crate::config::AnalysisConfig;
pub use crate::core::{Architecture, CallGraph, Function, Section};
pub use crate::error::{AnalyzerError, Result};
pub use crate::image::Image;

/// Opens an ELF file and returns its parsed image, the entry point for the
/// rest of the pipeline. Mirrors the crate's exactly-one fatal-or-ready
/// lifecycle: a returned `Image` is immutable and ready for
/// [`CallGraphBuilder::build`].
pub fn open<P: AsRef<std::path::Path>>(path: P, config: &AnalysisConfig) -> Result<Image> {
    Image::open(path, config)
}
