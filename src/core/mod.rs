//! Core data records shared by every component.
//!
//! These are plain, `serde`-serializable value types with no behavior tied
//! to any particular binary-format backend. The image model, disassembler,
//! and analysis modules all build their results out of these.

pub mod architecture;
pub mod call_graph;
pub mod function;
pub mod instruction;
pub mod section;

pub use architecture::Architecture;
pub use call_graph::{CallGraph, CallGraphEdge, CallType, GraphStatistics};
pub use function::{Binding, Function, SymbolType, Visibility};
pub use instruction::{Instruction, InstructionClass};
pub use section::{Section, SectionFlags};
