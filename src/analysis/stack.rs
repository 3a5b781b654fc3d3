//! Component E: per-function local-frame recovery and the memoized
//! cumulative-stack DFS over the call graph -- the analysis this crate is
//! built around.

use std::collections::{HashMap, HashSet};
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AnalysisConfig;
use crate::core::{Architecture, CallGraph, Instruction};
use crate::disasm::{self, decode_with};
use crate::error::Result;
use crate::image::Image;

/// One link in a stack-consumption witness path. Carried as a typed value
/// rather than a formatted string so reporting never has to re-parse what
/// it just produced -- the same preference the disassembler's target
/// extraction applies to structured operands over text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathElement {
    Plain(String),
    Recursive { function: String, multiplier: u64 },
    Cycle { members: Vec<String>, multiplier: u64 },
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Plain(name) => write!(f, "{name}"),
            PathElement::Recursive { function, multiplier } => {
                write!(f, "{function} (recursive x{multiplier})")
            }
            PathElement::Cycle { members, multiplier } => {
                write!(f, "[cycle: {}] (x{multiplier})", members.join(" -> "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Total,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalleeStackInfo {
    pub function: String,
    pub stack_frame: u64,
    pub external: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStepDetail {
    pub function: String,
    pub local_stack: u64,
    pub cumulative_stack: u64,
    pub is_external: bool,
    pub is_recursive: bool,
    pub is_cycle: bool,
    pub cycle_functions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionStackInfo {
    pub function: String,
    pub local_frame: u64,
    pub max_total: u64,
    pub consumed_by_calls: u64,
    pub witness_path: Vec<String>,
    pub path_details: Vec<PathStepDetail>,
    pub callees: Vec<CalleeStackInfo>,
    pub architecture: String,
    pub found: bool,
}

impl FunctionStackInfo {
    fn not_found(function: &str) -> Self {
        Self {
            function: function.to_string(),
            local_frame: 0,
            max_total: 0,
            consumed_by_calls: 0,
            witness_path: Vec::new(),
            path_details: Vec::new(),
            callees: Vec::new(),
            architecture: String::new(),
            found: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackHistogram {
    pub under_64: usize,
    pub from_64_to_255: usize,
    pub from_256_to_1023: usize,
    pub at_least_1024: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSummary {
    pub architecture: String,
    pub total_functions_analyzed: usize,
    pub functions_with_stack: usize,
    pub max_local_stack_frame: u64,
    pub max_total_stack_consumption: u64,
    pub function_with_max_local_stack: Option<String>,
    pub function_with_max_total_stack: Option<String>,
    pub max_total_stack_call_path: Vec<String>,
    pub stack_distribution: StackHistogram,
    pub stack_pointer_register: String,
    pub stack_alignment: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeavyFunction {
    pub function: String,
    pub local_stack_frame: u64,
    pub max_total_stack: u64,
    pub max_stack_call_path: Vec<String>,
    pub stack_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchTag {
    X8664,
    X86,
    Aarch64,
    Arm,
}

impl fmt::Display for ArchTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArchTag::X8664 => "x86_64",
            ArchTag::X86 => "x86",
            ArchTag::Aarch64 => "aarch64",
            ArchTag::Arm => "arm",
        };
        write!(f, "{s}")
    }
}

struct ArchStackProfile {
    tag: ArchTag,
    stack_pointer: &'static str,
    word_size: u64,
    alignment: u64,
}

impl ArchStackProfile {
    /// Unrecognized architectures default to the x86_64 table (the image's
    /// own fallback for riscv, mips, ppc -- none of which the distilled
    /// pattern table covers), logged once per analyzer construction.
    fn for_architecture(architecture: Architecture) -> Self {
        match architecture {
            Architecture::X86_64 => Self {
                tag: ArchTag::X8664,
                stack_pointer: "rsp",
                word_size: 8,
                alignment: 16,
            },
            Architecture::X86 => Self {
                tag: ArchTag::X86,
                stack_pointer: "esp",
                word_size: 4,
                alignment: 4,
            },
            Architecture::Aarch64 => Self {
                tag: ArchTag::Aarch64,
                stack_pointer: "sp",
                word_size: 8,
                alignment: 16,
            },
            Architecture::Arm => Self {
                tag: ArchTag::Arm,
                stack_pointer: "sp",
                word_size: 4,
                alignment: 8,
            },
            other => {
                warn!(
                    architecture = %other,
                    "limited stack-analysis support for this architecture, falling back to the x86_64 pattern table"
                );
                Self {
                    tag: ArchTag::X8664,
                    stack_pointer: "rsp",
                    word_size: 8,
                    alignment: 16,
                }
            }
        }
    }
}

/// §6's minimum external-function stack-cost table. Unknown externals
/// default to 32 bytes.
static EXTERNAL_STACK_ESTIMATES: Lazy<HashMap<&'static str, u64>> = Lazy::new(|| {
    HashMap::from([
        ("printf", 64), ("fprintf", 64), ("sprintf", 48), ("snprintf", 48),
        ("scanf", 32), ("fscanf", 32), ("sscanf", 32),
        ("malloc", 32), ("free", 16), ("realloc", 32), ("calloc", 32),
        ("memcpy", 16), ("memset", 16), ("memcmp", 16), ("memmove", 16),
        ("strcpy", 24), ("strncpy", 24), ("strcmp", 24), ("strncmp", 24),
        ("strlen", 16), ("strcat", 24), ("strncat", 24),
        ("fopen", 64), ("fclose", 32), ("fread", 48), ("fwrite", 48),
        ("fseek", 32), ("ftell", 16), ("rewind", 16),
        ("exit", 32), ("abort", 32), ("atexit", 24),
        ("sin", 32), ("cos", 32), ("tan", 32), ("sqrt", 32), ("pow", 48), ("exp", 32), ("log", 32),
        ("open", 32), ("close", 16), ("read", 32), ("write", 32), ("lseek", 32),
        ("getpid", 16), ("fork", 48), ("exec", 64), ("wait", 32),
        ("pthread_create", 128), ("pthread_join", 64), ("pthread_mutex_lock", 32),
        ("pthread_mutex_unlock", 16), ("pthread_cond_wait", 64),
    ])
});

const DEFAULT_EXTERNAL_ESTIMATE: u64 = 32;

fn external_stack_estimate(name: &str) -> u64 {
    EXTERNAL_STACK_ESTIMATES
        .get(name)
        .copied()
        .unwrap_or(DEFAULT_EXTERNAL_ESTIMATE)
}

fn parse_immediate(text: &str) -> Option<u64> {
    let text = text.trim().trim_start_matches('-');
    if let Some(hex) = text.strip_prefix("0x") {
        let digits: String = hex.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
        if digits.is_empty() {
            None
        } else {
            u64::from_str_radix(&digits, 16).ok()
        }
    } else {
        let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            digits.parse().ok()
        }
    }
}

/// Extracts the immediate from a stack-decrement instruction matching the
/// architecture's pattern table (§4.5). Mirrors the original's regex table
/// with direct text scanning instead of a regex engine, in keeping with
/// the disassembler's own structured-operand-over-regex preference.
fn decrement_amount(profile: &ArchStackProfile, mnemonic: &str, operand_text: &str) -> Option<u64> {
    let mnemonic = mnemonic.to_ascii_lowercase();
    let operand = operand_text.to_ascii_lowercase();
    let sp = profile.stack_pointer;

    match profile.tag {
        ArchTag::X8664 | ArchTag::X86 => {
            if mnemonic == "sub" {
                let prefix = format!("{sp},");
                let rest = operand.strip_prefix(&prefix)?;
                parse_immediate(rest)
            } else if mnemonic == "lea" {
                if !operand.contains(sp) {
                    return None;
                }
                let pos = operand.rfind('-')?;
                let rest = operand[pos + 1..].trim_end_matches([']', ')']).trim();
                parse_immediate(rest)
            } else {
                None
            }
        }
        ArchTag::Aarch64 => {
            if mnemonic == "sub" && operand.contains("sp, sp, #") {
                let pos = operand.rfind('#')?;
                parse_immediate(&operand[pos + 1..])
            } else if mnemonic == "add" && operand.contains("sp, sp, #-") {
                let pos = operand.rfind('#')?;
                parse_immediate(&operand[pos + 1..])
            } else {
                None
            }
        }
        ArchTag::Arm => {
            if mnemonic == "sub" && (operand.contains("sp,") || operand.contains("r13,")) {
                let pos = operand.rfind('#')?;
                parse_immediate(&operand[pos + 1..])
            } else {
                None
            }
        }
    }
}

fn lea_loop_target(profile: &ArchStackProfile, mnemonic: &str, operand_text: &str) -> Option<u64> {
    if !mnemonic.eq_ignore_ascii_case("lea") {
        return None;
    }
    let operand = operand_text.to_ascii_lowercase();
    if !operand.contains(profile.stack_pointer) {
        return None;
    }
    let pos = operand.rfind('-')?;
    let rest = operand[pos + 1..].trim_end_matches([']', ')']).trim();
    parse_immediate(rest)
}

/// §4.5.2: recognizes the unrolled stack-probing loop idiom. Returns the
/// total bytes the loop plus any trailing fixed allocation accounts for.
fn detect_loop_allocation(
    profile: &ArchStackProfile,
    instructions: &[Instruction],
    config: &AnalysisConfig,
) -> Option<u64> {
    for i in 0..instructions.len() {
        let lea = &instructions[i];
        let Some(target_offset) = lea_loop_target(profile, &lea.mnemonic, &lea.operand_text) else {
            continue;
        };
        if target_offset == 0 {
            continue;
        }

        let step_end = (i + 1 + config.loop_lea_lookahead).min(instructions.len());
        for j in (i + 1)..step_end {
            let step = &instructions[j];
            let Some(loop_step) = decrement_amount(profile, &step.mnemonic, &step.operand_text) else {
                continue;
            };
            if loop_step == 0 {
                continue;
            }

            let branch_end = (j + 1 + config.loop_sub_lookahead).min(instructions.len());
            for k in (j + 1)..branch_end {
                let branch = &instructions[k];
                let mnemonic = branch.mnemonic.to_ascii_lowercase();
                if !matches!(mnemonic.as_str(), "jne" | "jnz" | "jz" | "je" | "jmp") {
                    continue;
                }
                let target = branch.target_address.unwrap_or(step.address);
                if target.abs_diff(step.address) >= config.loop_branch_tolerance_bytes {
                    continue;
                }

                let loop_count = target_offset / loop_step;
                let total_loop = loop_count * loop_step;

                let mut extra = 0u64;
                let trailing_end = (k + 1 + config.loop_trailing_lookahead).min(instructions.len());
                for extra_insn in &instructions[(k + 1)..trailing_end] {
                    if let Some(amount) =
                        decrement_amount(profile, &extra_insn.mnemonic, &extra_insn.operand_text)
                    {
                        extra = amount;
                        break;
                    }
                }

                return Some(total_loop + extra);
            }
        }
    }
    None
}

fn round_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 || value % alignment == 0 {
        value
    } else {
        (value / alignment + 1) * alignment
    }
}

/// §5.1: local frame recovery for one function body. The loop idiom takes
/// precedence over the short-scan method; `push` counting only applies
/// when the loop idiom was not detected, matching the original (its
/// push-counting loop lives inside the scan's `else` branch).
fn analyze_local_frame(
    profile: &ArchStackProfile,
    instructions: &[Instruction],
    config: &AnalysisConfig,
) -> u64 {
    if instructions.is_empty() {
        return 0;
    }

    let (stack_size, push_count) = if let Some(loop_alloc) = detect_loop_allocation(profile, instructions, config) {
        (loop_alloc, 0u64)
    } else {
        let limit = instructions.len().min(config.frame_scan_window);
        let mut stack_size = 0u64;
        let mut push_count = 0u64;
        for insn in &instructions[..limit] {
            if let Some(amount) = decrement_amount(profile, &insn.mnemonic, &insn.operand_text) {
                stack_size = stack_size.max(amount);
            }
            if insn.mnemonic.eq_ignore_ascii_case("push") {
                push_count += 1;
            }
        }
        (stack_size, push_count)
    };

    round_up(stack_size + push_count * profile.word_size, profile.alignment)
}

fn path_touches_current(path: &[PathElement], current_path: &[String]) -> bool {
    path.iter().any(|element| match element {
        PathElement::Plain(name) => current_path.iter().any(|p| p == name),
        PathElement::Recursive { function, .. } => current_path.iter().any(|p| p == function),
        PathElement::Cycle { members, .. } => {
            members.iter().any(|m| current_path.iter().any(|p| p == m))
        }
    })
}

type MaxStackResult = (u64, Vec<PathElement>);

/// Component E. Holds every function's recovered local frame and the
/// memoized cumulative-stack DFS result, computed once at construction.
pub struct StackAnalyzer<'a> {
    graph: &'a CallGraph,
    profile: ArchStackProfile,
    local_frames: HashMap<String, u64>,
    max_stack: HashMap<String, u64>,
    max_witness: HashMap<String, Vec<PathElement>>,
}

impl<'a> StackAnalyzer<'a> {
    pub fn new(image: &Image, graph: &'a CallGraph, config: &AnalysisConfig) -> Result<Self> {
        let profile = ArchStackProfile::for_architecture(image.architecture());
        let backend = disasm::for_arch(image.architecture())?;

        let mut local_frames: HashMap<String, u64> = HashMap::new();
        for func in image.code_functions() {
            if func.name.is_empty() || local_frames.contains_key(&func.name) {
                continue;
            }
            if func.size == 0 {
                local_frames.insert(func.name.clone(), 0);
                continue;
            }

            let mut frame = 0u64;
            for section in image.text_sections() {
                if !section.contains_address(func.address) {
                    continue;
                }
                let bytes = image.section_bytes(&section.name).unwrap_or(&[]);
                let offset = func.address - section.virtual_address;
                if offset as usize >= bytes.len() {
                    break;
                }
                let available = bytes.len() - offset as usize;
                let take = (func.size as usize).min(available);
                let body = &bytes[offset as usize..offset as usize + take];
                let instructions = decode_with(&backend, body, func.address);
                frame = analyze_local_frame(&profile, &instructions, config);
                break;
            }
            local_frames.insert(func.name.clone(), frame);
        }

        let mut analyzer = Self {
            graph,
            profile,
            local_frames,
            max_stack: HashMap::new(),
            max_witness: HashMap::new(),
        };
        analyzer.compute_all(config);
        Ok(analyzer)
    }

    fn local_or_estimate(&self, name: &str) -> u64 {
        match self.local_frames.get(name) {
            Some(&frame) => frame,
            None => external_stack_estimate(name),
        }
    }

    fn compute_all(&mut self, config: &AnalysisConfig) {
        let nodes: Vec<String> = self.graph.nodes.clone();
        let mut visited: HashSet<String> = HashSet::new();
        let mut calculating: HashSet<String> = HashSet::new();
        let mut cache: HashMap<String, MaxStackResult> = HashMap::new();

        for node in &nodes {
            if visited.contains(node) {
                continue;
            }
            let mut current_path = Vec::new();
            self.calculate(node, &mut current_path, &mut calculating, &mut visited, &mut cache, config);
        }

        self.max_stack = cache.iter().map(|(k, (total, _))| (k.clone(), *total)).collect();
        self.max_witness = cache.into_iter().map(|(k, (_, path))| (k, path)).collect();
    }

    /// §5.4's memoized DFS, checked in the bullet order §5.4 lists: direct
    /// self-recursion first, then indirect cycles, then the memoized/fresh
    /// split. A direct self-call -- `func` is its own immediate predecessor
    /// on `current_path`, or `func` is still on the live Rust call stack
    /// (`calculating`) after `current_path` was reset while escaping some
    /// other cycle's tail -- short-circuits to `local(func) × K` with a
    /// single `Recursive` marker and does not descend further, matching §8
    /// Scenario 1 exactly. Only a repeat at current_path's *interior* (not
    /// its tail) is a genuine indirect cycle of length ≥ 2.
    fn calculate(
        &self,
        func: &str,
        current_path: &mut Vec<String>,
        calculating: &mut HashSet<String>,
        visited: &mut HashSet<String>,
        cache: &mut HashMap<String, MaxStackResult>,
        config: &AnalysisConfig,
    ) -> MaxStackResult {
        let in_current_path = current_path.iter().any(|f| f == func);
        let self_edge = current_path.last().map(|f| f == func).unwrap_or(false);
        if self_edge || (calculating.contains(func) && !in_current_path) {
            let base = self.local_or_estimate(func);
            let k = config.recursion_multiplier;
            return (
                base * k,
                vec![PathElement::Recursive { function: func.to_string(), multiplier: k }],
            );
        }

        if let Some(idx) = current_path.iter().position(|f| f == func) {
            let members: Vec<String> = current_path[idx..].to_vec();
            let k = config.recursion_multiplier;
            let cycle_local: u64 = members.iter().map(|f| self.local_or_estimate(f)).sum();
            let cycle_stack = cycle_local * k;

            // The escape from a cycle can leave through any member, not
            // just `func` -- the member where this particular reentry was
            // detected -- so the tail search spans every member's callees,
            // skipping targets that are themselves part of the cycle.
            let mut best_tail = 0u64;
            let mut best_tail_path: Vec<PathElement> = Vec::new();
            for member in &members {
                for callee in self.graph.callees(member) {
                    if members.contains(&callee) {
                        continue;
                    }
                    let (callee_stack, callee_path) = match cache.get(&callee) {
                        Some(cached) => cached.clone(),
                        None => self.calculate(&callee, &mut Vec::new(), calculating, visited, cache, config),
                    };
                    if callee_stack > best_tail {
                        best_tail = callee_stack;
                        best_tail_path = callee_path;
                    }
                }
            }

            let total = cycle_stack + best_tail;
            let mut path = vec![PathElement::Cycle { members, multiplier: k }];
            path.extend(best_tail_path);

            cache.insert(func.to_string(), (total, path.clone()));
            visited.insert(func.to_string());
            return (total, path);
        }

        if let Some(cached) = cache.get(func).cloned() {
            if path_touches_current(&cached.1, current_path) {
                cache.remove(func);
                let recomputed = self.calculate(func, &mut Vec::new(), calculating, visited, cache, config);
                cache.insert(func.to_string(), recomputed.clone());
                return recomputed;
            }
            return cached;
        }

        calculating.insert(func.to_string());
        let local = self.local_or_estimate(func);

        current_path.push(func.to_string());
        let mut best = 0u64;
        let mut best_path: Vec<PathElement> = Vec::new();
        for callee in self.graph.callees(func) {
            let (callee_stack, callee_path) =
                self.calculate(&callee, current_path, calculating, visited, cache, config);
            if callee_stack > best {
                best = callee_stack;
                best_path = callee_path;
            }
        }
        current_path.pop();
        calculating.remove(func);

        // When the best callee's witness already closes a cycle or
        // recursion back through `func` itself, that result is already the
        // complete total from `func` onward -- adding `local` again would
        // double-count the frame the cycle/recursion marker already folded
        // in.
        let closes_self = match best_path.first() {
            Some(PathElement::Recursive { function, .. }) => function == func,
            Some(PathElement::Cycle { members, .. }) => members.iter().any(|m| m == func),
            _ => false,
        };
        let (total, path) = if closes_self {
            (best, best_path)
        } else {
            let mut p = vec![PathElement::Plain(func.to_string())];
            p.extend(best_path);
            (local + best, p)
        };

        visited.insert(func.to_string());
        cache.insert(func.to_string(), (total, path.clone()));
        (total, path)
    }

    fn witness_strings(&self, func: &str) -> Vec<String> {
        self.max_witness
            .get(func)
            .map(|path| path.iter().map(|e| e.to_string()).collect())
            .unwrap_or_default()
    }

    fn path_details(&self, witness: &[PathElement]) -> Vec<PathStepDetail> {
        let mut details = Vec::new();
        let mut cumulative = 0u64;
        for element in witness {
            match element {
                PathElement::Plain(name) => {
                    let local = self.local_or_estimate(name);
                    cumulative += local;
                    details.push(PathStepDetail {
                        function: name.clone(),
                        local_stack: local,
                        cumulative_stack: cumulative,
                        is_external: !self.local_frames.contains_key(name),
                        is_recursive: false,
                        is_cycle: false,
                        cycle_functions: None,
                    });
                }
                PathElement::Recursive { function, multiplier } => {
                    let amount = self.local_or_estimate(function) * multiplier;
                    cumulative += amount;
                    details.push(PathStepDetail {
                        function: element.to_string(),
                        local_stack: amount,
                        cumulative_stack: cumulative,
                        is_external: false,
                        is_recursive: true,
                        is_cycle: false,
                        cycle_functions: None,
                    });
                }
                PathElement::Cycle { members, multiplier } => {
                    let sum: u64 = members.iter().map(|m| self.local_or_estimate(m)).sum();
                    let amount = sum * multiplier;
                    cumulative += amount;
                    details.push(PathStepDetail {
                        function: element.to_string(),
                        local_stack: amount,
                        cumulative_stack: cumulative,
                        is_external: false,
                        is_recursive: true,
                        is_cycle: true,
                        cycle_functions: Some(members.clone()),
                    });
                }
            }
        }
        details
    }

    pub fn function_stack_info(&self, function: &str) -> FunctionStackInfo {
        if !self.graph.has_node(function) {
            return FunctionStackInfo::not_found(function);
        }

        let local = self.local_or_estimate(function);
        let total = *self.max_stack.get(function).unwrap_or(&local);
        let witness = self
            .max_witness
            .get(function)
            .cloned()
            .unwrap_or_else(|| vec![PathElement::Plain(function.to_string())]);

        let callees = self
            .graph
            .callees(function)
            .into_iter()
            .map(|callee| {
                let stack_frame = self.local_or_estimate(&callee);
                let external = !self.local_frames.contains_key(&callee);
                CalleeStackInfo { function: callee, stack_frame, external }
            })
            .collect();

        FunctionStackInfo {
            function: function.to_string(),
            local_frame: local,
            max_total: total,
            consumed_by_calls: total.saturating_sub(local),
            witness_path: witness.iter().map(|e| e.to_string()).collect(),
            path_details: self.path_details(&witness),
            callees,
            architecture: self.profile.tag.to_string(),
            found: true,
        }
    }

    pub fn stack_summary(&self) -> StackSummary {
        let total_functions = self.local_frames.len();
        let functions_with_stack = self.local_frames.values().filter(|&&v| v > 0).count();

        let max_local = self.local_frames.values().copied().max().unwrap_or(0);
        let max_local_func = self
            .local_frames
            .iter()
            .find(|(_, &v)| v == max_local)
            .map(|(k, _)| k.clone());

        let max_total = self.max_stack.values().copied().max().unwrap_or(0);
        let max_total_func = self
            .max_stack
            .iter()
            .find(|(_, &v)| v == max_total)
            .map(|(k, _)| k.clone());
        let max_total_path = max_total_func
            .as_ref()
            .map(|f| self.witness_strings(f))
            .unwrap_or_default();

        let mut histogram = StackHistogram::default();
        for &v in self.max_stack.values() {
            match v {
                v if v < 64 => histogram.under_64 += 1,
                v if v < 256 => histogram.from_64_to_255 += 1,
                v if v < 1024 => histogram.from_256_to_1023 += 1,
                _ => histogram.at_least_1024 += 1,
            }
        }

        StackSummary {
            architecture: self.profile.tag.to_string(),
            total_functions_analyzed: total_functions,
            functions_with_stack,
            max_local_stack_frame: max_local,
            max_total_stack_consumption: max_total,
            function_with_max_local_stack: max_local_func,
            function_with_max_total_stack: max_total_func,
            max_total_stack_call_path: max_total_path,
            stack_distribution: histogram,
            stack_pointer_register: self.profile.stack_pointer.to_string(),
            stack_alignment: self.profile.alignment,
        }
    }

    pub fn heavy_functions(&self, limit: usize, sort_by: SortBy) -> Vec<HeavyFunction> {
        let mut out: Vec<HeavyFunction> = self
            .local_frames
            .keys()
            .map(|name| {
                let local = self.local_frames[name];
                let total = *self.max_stack.get(name).unwrap_or(&local);
                let ratio = if local > 0 { total as f64 / local as f64 } else { 0.0 };
                HeavyFunction {
                    function: name.clone(),
                    local_stack_frame: local,
                    max_total_stack: total,
                    max_stack_call_path: self.witness_strings(name),
                    stack_ratio: ratio,
                }
            })
            .collect();

        match sort_by {
            SortBy::Local => out.sort_by(|a, b| b.local_stack_frame.cmp(&a.local_stack_frame)),
            SortBy::Total => out.sort_by(|a, b| b.max_total_stack.cmp(&a.max_total_stack)),
        }
        out.truncate(limit);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::{CallGraphEdge, CallType};
    use crate::core::function::{Binding, SymbolType, Visibility};
    use crate::core::section::SectionFlags;
    use crate::core::{Function, Section};

    fn edge(from: &str, to: &str) -> CallGraphEdge {
        CallGraphEdge {
            from: from.into(),
            to: to.into(),
            from_address: 0,
            to_address: None,
            instruction_text: "call".into(),
            edge_kind: CallType::Call,
            external: to.starts_with("external:"),
        }
    }

    fn function(name: &str, address: u64, size: u64) -> Function {
        Function {
            name: name.to_string(),
            address,
            size,
            symbol_type: SymbolType::Function,
            binding: Binding::Global,
            visibility: Visibility::Default,
            section_index: Some(0),
        }
    }

    fn text_section() -> Section {
        Section {
            name: ".text".into(),
            flags: SectionFlags { alloc: true, exec: true, write: false },
            virtual_address: 0x1000,
            file_offset: 0x1000,
            size: 0x1000,
            alignment: 16,
            entry_size: 0,
        }
    }

    /// `sub rsp, 0x20` then `call` then `ret`, at 0x1000; callee at 0x1020
    /// with just `ret`.
    fn image_with_frame() -> Image {
        let mut data = vec![0u8; 0x2000];
        data[0x1000] = 0x48; // REX.W
        data[0x1001] = 0x83; // sub r/m64, imm8
        data[0x1002] = 0xec; // /5, rsp
        data[0x1003] = 0x20; // imm8 = 0x20
        data[0x1004] = 0xe8; // call rel32
        data[0x1005..0x1009].copy_from_slice(&0x17u32.to_le_bytes()); // to 0x1020
        data[0x1009] = 0xc3; // ret
        data[0x1020] = 0xc3; // ret

        Image::for_test(
            Architecture::X86_64,
            data,
            vec![text_section()],
            vec![function("caller", 0x1000, 10), function("callee", 0x1020, 1)],
        )
    }

    #[test]
    fn local_frame_recovers_sub_immediate_rounded_to_alignment() {
        let image = image_with_frame();
        let mut graph = CallGraph::new();
        graph.add_edge(edge("caller", "callee"));
        let config = AnalysisConfig::default();
        let analyzer = StackAnalyzer::new(&image, &graph, &config).unwrap();

        assert_eq!(analyzer.local_or_estimate("caller"), 32);
        assert_eq!(analyzer.local_or_estimate("callee"), 0);
    }

    #[test]
    fn max_total_includes_deepest_callee() {
        let image = image_with_frame();
        let mut graph = CallGraph::new();
        graph.add_edge(edge("caller", "callee"));
        let config = AnalysisConfig::default();
        let analyzer = StackAnalyzer::new(&image, &graph, &config).unwrap();

        let info = analyzer.function_stack_info("caller");
        assert!(info.found);
        assert_eq!(info.local_frame, 32);
        assert_eq!(info.max_total, 32);
        assert_eq!(info.witness_path, vec!["caller".to_string(), "callee".to_string()]);
    }

    #[test]
    fn external_callee_uses_lookup_table_estimate() {
        let image = image_with_frame();
        let mut graph = CallGraph::new();
        graph.add_edge(edge("caller", "printf"));
        let config = AnalysisConfig::default();
        let analyzer = StackAnalyzer::new(&image, &graph, &config).unwrap();

        let info = analyzer.function_stack_info("caller");
        assert_eq!(info.max_total, 32 + 64);
        assert!(info.callees[0].external);
        assert_eq!(info.callees[0].stack_frame, 64);
    }

    #[test]
    fn unknown_external_defaults_to_32() {
        assert_eq!(external_stack_estimate("some_unlisted_symbol"), 32);
        assert_eq!(external_stack_estimate("printf"), 64);
    }

    #[test]
    fn direct_self_recursion_applies_multiplier() {
        let image = image_with_frame();
        let mut graph = CallGraph::new();
        graph.add_edge(edge("caller", "caller"));
        let config = AnalysisConfig::default();
        let analyzer = StackAnalyzer::new(&image, &graph, &config).unwrap();

        let info = analyzer.function_stack_info("caller");
        assert_eq!(info.max_total, 32 * 10);
        assert_eq!(info.witness_path, vec!["caller (recursive x10)".to_string()]);
        assert!(info.path_details[0].is_recursive);
    }

    #[test]
    fn indirect_cycle_sums_distinct_members_times_multiplier() {
        let image = image_with_frame();
        let mut graph = CallGraph::new();
        graph.add_edge(edge("caller", "callee"));
        graph.add_edge(edge("callee", "caller"));
        let config = AnalysisConfig::default();
        let analyzer = StackAnalyzer::new(&image, &graph, &config).unwrap();

        let info = analyzer.function_stack_info("caller");
        // cycle members {caller: 32, callee: 0} summed then x10; the cycle
        // marker already accounts for caller's own frame, so nothing is
        // added on top of it.
        assert_eq!(info.max_total, (32 + 0) * 10);
    }

    #[test]
    fn cycle_with_escape_adds_tail_from_any_member() {
        let image = image_with_frame();
        let mut graph = CallGraph::new();
        graph.add_edge(edge("caller", "callee"));
        graph.add_edge(edge("callee", "caller"));
        graph.add_edge(edge("callee", "printf"));
        let config = AnalysisConfig::default();
        let analyzer = StackAnalyzer::new(&image, &graph, &config).unwrap();

        // The escape leaves through `callee`, not through `caller` (the
        // member where the cycle was detected), so the tail search has to
        // look at every member's callees, not just the reentering one.
        let info = analyzer.function_stack_info("caller");
        assert_eq!(info.max_total, (32 + 0) * 10 + 64);
    }

    #[test]
    fn stack_summary_reports_max_local_and_total() {
        let image = image_with_frame();
        let mut graph = CallGraph::new();
        graph.add_edge(edge("caller", "callee"));
        let config = AnalysisConfig::default();
        let analyzer = StackAnalyzer::new(&image, &graph, &config).unwrap();

        let summary = analyzer.stack_summary();
        assert_eq!(summary.max_local_stack_frame, 32);
        assert_eq!(summary.function_with_max_local_stack, Some("caller".to_string()));
        assert_eq!(summary.stack_pointer_register, "rsp");
        assert_eq!(summary.stack_alignment, 16);
    }

    #[test]
    fn heavy_functions_sorts_by_total_descending() {
        let image = image_with_frame();
        let mut graph = CallGraph::new();
        graph.add_edge(edge("caller", "callee"));
        let config = AnalysisConfig::default();
        let analyzer = StackAnalyzer::new(&image, &graph, &config).unwrap();

        let heavy = analyzer.heavy_functions(10, SortBy::Total);
        assert_eq!(heavy[0].function, "caller");
    }
}
