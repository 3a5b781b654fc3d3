//! Component C: builds the canonical [`CallGraph`] by disassembling every
//! function body in every text section and resolving each call / tail-jump
//! target to a known function or an `external:<hex>` placeholder.

use tracing::{debug, warn};

use crate::core::call_graph::{CallGraphEdge, CallType};
use crate::core::{CallGraph, Function, InstructionClass};
use crate::disasm::{self, decode_with};
use crate::error::Result;
use crate::image::Image;

pub struct CallGraphBuilder<'a> {
    image: &'a Image,
}

impl<'a> CallGraphBuilder<'a> {
    pub fn new(image: &'a Image) -> Self {
        Self { image }
    }

    /// Builds the call graph. Deterministic: the same image always
    /// produces the same node/edge sequence, since both the function list
    /// and the per-function instruction stream come from one immutable
    /// byte buffer scanned in a fixed order (symbol-table order, then
    /// instruction-stream order within each function).
    pub fn build(&self) -> Result<CallGraph> {
        let mut graph = CallGraph::new();

        // Every named function is a node up front, before any edge scan,
        // per §4.3's node-creation rule.
        for func in self.image.code_functions() {
            if !func.name.is_empty() {
                graph.add_node(&func.name);
            }
        }

        // Unsupported architectures fail the whole analysis here, once, at
        // backend construction -- not per function (§4.2, §7).
        let backend = disasm::for_arch(self.image.architecture())?;

        for section in self.image.text_sections() {
            let bytes = self.image.section_bytes(&section.name).unwrap_or(&[]);
            for func in self.image.code_functions() {
                if func.name.is_empty() || func.size == 0 {
                    continue;
                }
                if !section.contains_address(func.address) {
                    continue;
                }

                let offset = func.address - section.virtual_address;
                if offset as usize >= bytes.len() {
                    continue;
                }
                let available = bytes.len() - offset as usize;
                let take = (func.size as usize).min(available);
                let body = &bytes[offset as usize..offset as usize + take];

                let instructions = decode_with(&backend, body, func.address);
                if instructions.is_empty() && !body.is_empty() {
                    warn!(function = %func.name, "failed to decode any instruction in function body");
                }

                for insn in &instructions {
                    if !matches!(insn.class, InstructionClass::Call | InstructionClass::TailJump) {
                        continue;
                    }
                    let Some(target) = insn.target_address else {
                        continue;
                    };

                    let edge_kind = if insn.class == InstructionClass::Call {
                        CallType::Call
                    } else {
                        CallType::TailJump
                    };
                    let instruction_text = format!("{} {}", insn.mnemonic, insn.operand_text).trim().to_string();

                    let (to, external) = match self.image.function_by_address(target) {
                        Some(target_func) if !target_func.name.is_empty() => {
                            (target_func.name.clone(), false)
                        }
                        _ => (format!("external:{:#x}", target), true),
                    };

                    graph.add_edge(CallGraphEdge {
                        from: func.name.clone(),
                        to,
                        from_address: insn.address,
                        to_address: Some(target),
                        instruction_text,
                        edge_kind,
                        external,
                    });
                }
            }
        }

        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "built call graph"
        );

        Ok(graph)
    }

    /// The function record this graph's builder resolved `name` from, when
    /// `name` is not an external placeholder.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.image.function_by_name(name)
    }
}
