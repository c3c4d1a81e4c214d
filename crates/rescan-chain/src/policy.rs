//! Incremental recompute policy.
//!
//! Decides which contiguous run of stages has to be re-executed when the
//! active stage changes or a new source image arrives. The chain is a
//! strict forward dependency (stage `i` reads only stage `i - 1`), so:
//!
//! - stages before the previously active one are already correct and are
//!   never touched by navigation;
//! - stages after the requested one are not displayed and stay stale
//!   until they are selected;
//! - moving the active pointer backward invalidates nothing.
//!
//! [`plan`] is a pure function: it performs no work and owns no state.
//! [`FilterChain`](crate::FilterChain) executes whatever it returns.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Active index meaning "nothing selected yet".
pub const NO_SELECTION: isize = -1;

/// The policy's answer for one navigation or source change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecomputePlan {
    /// The requested stage is the source (or nothing): no stage runs.
    Idle,
    /// Backward navigation: the requested stage's cached output is still
    /// valid and is returned without running anything.
    Reuse(usize),
    /// Re-run stages `from..=to` in ascending order, each fed the fresh
    /// output of the stage before it.
    Run {
        /// First stage to re-run (always `>= 1`).
        from: usize,
        /// Last stage to re-run, the requested active stage.
        to: usize,
    },
}

impl RecomputePlan {
    /// Stage indices that actually have to be executed, in order.
    ///
    /// Empty for [`Idle`](Self::Idle) and [`Reuse`](Self::Reuse).
    #[must_use]
    pub fn stages_to_run(self) -> RangeInclusive<usize> {
        match self {
            Self::Run { from, to } => from..=to,
            // 1..=0 is the canonical empty inclusive range.
            Self::Idle | Self::Reuse(_) => 1..=0,
        }
    }
}

/// Clamp an arbitrary requested index into `[-1, len - 1]`.
///
/// Malformed indices degrade to the nearest valid boundary rather than
/// being rejected.
#[must_use]
pub fn clamp_index(requested: isize, len: usize) -> isize {
    let last = isize::try_from(len).unwrap_or(isize::MAX) - 1;
    requested.clamp(NO_SELECTION, last.max(NO_SELECTION))
}

/// Compute the recompute plan for moving from `previous_active` to
/// `requested_active` in a chain of `len` stages.
///
/// A full source replacement is expressed by passing `0` (or anything
/// below `1`) as `previous_active`, which forces the run to start at
/// stage 1.
#[must_use]
pub fn plan(previous_active: isize, requested_active: isize, len: usize) -> RecomputePlan {
    let target = clamp_index(requested_active, len);
    let Ok(target) = usize::try_from(target) else {
        return RecomputePlan::Idle;
    };
    if target == 0 {
        return RecomputePlan::Idle;
    }

    // Stage 0 is never recomputed. Negative indices fall through to 1.
    let from = usize::try_from(previous_active).unwrap_or(0).max(1);

    if from > target {
        return RecomputePlan::Reuse(target);
    }
    RecomputePlan::Run { from, to: target }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_selection_is_idle() {
        assert_eq!(plan(NO_SELECTION, NO_SELECTION, 3), RecomputePlan::Idle);
        assert_eq!(plan(2, NO_SELECTION, 3), RecomputePlan::Idle);
    }

    #[test]
    fn source_stage_is_idle() {
        assert_eq!(plan(NO_SELECTION, 0, 3), RecomputePlan::Idle);
        assert_eq!(plan(2, 0, 3), RecomputePlan::Idle);
    }

    #[test]
    fn single_stage_chain_is_always_idle() {
        for requested in [-5, -1, 0, 1, 7] {
            for previous in [-1, 0, 1, 4] {
                assert_eq!(
                    plan(previous, requested, 1),
                    RecomputePlan::Idle,
                    "previous={previous} requested={requested}",
                );
            }
        }
    }

    #[test]
    fn first_selection_runs_from_stage_one() {
        assert_eq!(
            plan(NO_SELECTION, 2, 3),
            RecomputePlan::Run { from: 1, to: 2 }
        );
    }

    #[test]
    fn forward_navigation_starts_at_previous() {
        assert_eq!(plan(2, 4, 6), RecomputePlan::Run { from: 2, to: 4 });
    }

    #[test]
    fn source_reset_starts_at_one() {
        assert_eq!(plan(0, 3, 4), RecomputePlan::Run { from: 1, to: 3 });
    }

    #[test]
    fn equal_navigation_reruns_single_stage() {
        assert_eq!(plan(2, 2, 3), RecomputePlan::Run { from: 2, to: 2 });
    }

    #[test]
    fn backward_navigation_reuses_cache() {
        let p = plan(2, 1, 3);
        assert_eq!(p, RecomputePlan::Reuse(1));
        assert!(p.stages_to_run().is_empty());
    }

    #[test]
    fn requested_index_is_clamped_to_last_stage() {
        assert_eq!(plan(1, 99, 3), RecomputePlan::Run { from: 1, to: 2 });
        assert_eq!(plan(5, 99, 3), RecomputePlan::Reuse(2));
    }

    #[test]
    fn very_negative_request_clamps_to_no_selection() {
        assert_eq!(clamp_index(-42, 3), NO_SELECTION);
        assert_eq!(plan(1, -42, 3), RecomputePlan::Idle);
    }

    #[test]
    fn clamp_index_on_empty_chain() {
        assert_eq!(clamp_index(3, 0), NO_SELECTION);
    }

    #[test]
    fn forward_range_matches_closed_form() {
        let len = 8;
        for previous in -1..8_isize {
            for requested in 1..8_isize {
                if previous > requested {
                    continue;
                }
                let from = usize::try_from(previous.max(1)).unwrap_or(1);
                let to = usize::try_from(requested).unwrap_or(1);
                assert_eq!(
                    plan(previous, requested, len).stages_to_run(),
                    from..=to,
                    "previous={previous} requested={requested}",
                );
            }
        }
    }

    #[test]
    fn stages_to_run_are_ascending() {
        let stages: Vec<usize> = plan(1, 4, 5).stages_to_run().collect();
        assert_eq!(stages, vec![1, 2, 3, 4]);
    }
}
