//! Tunable knobs for the analysis pipeline.
//!
//! Mirrors the budget-struct pattern used elsewhere in this codebase for
//! bounding analysis work: a single plain struct with documented defaults,
//! passed by reference into the stages that need it.

use crate::io::IOLimits;

/// Per-run configuration for the call-graph and stack analyses.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Bounds on file size / cumulative bytes read.
    pub io_limits: IOLimits,
    /// The recursion multiplier `K` applied to a cycle's or direct
    /// recursion's local-frame sum. A policy choice, not a verified bound.
    pub recursion_multiplier: u64,
    /// Instructions scanned when recovering a local frame, when the loop
    /// stack-allocation idiom is not detected.
    pub frame_scan_window: usize,
    /// Instructions scanned forward from a `lea [sp - N]` looking for the
    /// loop's `sub sp, K` step.
    pub loop_lea_lookahead: usize,
    /// Instructions scanned forward from the step looking for the closing
    /// conditional branch.
    pub loop_sub_lookahead: usize,
    /// Maximum byte distance between a closing branch's target and the step
    /// instruction for the branch to be considered a loop-closing jump.
    pub loop_branch_tolerance_bytes: u64,
    /// Instructions scanned forward from the closing branch looking for a
    /// trailing fixed stack allocation.
    pub loop_trailing_lookahead: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            io_limits: IOLimits::default(),
            recursion_multiplier: 10,
            frame_scan_window: 100,
            loop_lea_lookahead: 50,
            loop_sub_lookahead: 10,
            loop_branch_tolerance_bytes: 100,
            loop_trailing_lookahead: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.recursion_multiplier, 10);
        assert_eq!(cfg.frame_scan_window, 100);
        assert_eq!(cfg.loop_lea_lookahead, 50);
        assert_eq!(cfg.loop_sub_lookahead, 10);
        assert_eq!(cfg.loop_branch_tolerance_bytes, 100);
        assert_eq!(cfg.loop_trailing_lookahead, 20);
    }
}
