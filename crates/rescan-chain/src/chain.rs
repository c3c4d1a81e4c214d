//! The chain registry: ordered stages, the active index, and lazy
//! recomputation.
//!
//! Stage 0 is the unmodified source image; stages `1..len` are the
//! transforms, each fed the previous stage's output. [`FilterChain`] is
//! the single source of truth for which stage outputs are valid. The
//! display layer only ever asks for "the output of stage k".
//!
//! ```rust
//! # use rescan_chain::{ChainConfig, ChainError, FilterChain, RgbaImage};
//! # fn run(scan: RgbaImage) -> Result<(), ChainError> {
//! let mut chain = FilterChain::from_config(&ChainConfig::default())?;
//! chain.set_source(scan)?;
//! let corrected = chain.select_stage(2)?; // runs rotation, then keystone
//! let rotated = chain.select_stage(1)?;   // backward: cached, nothing runs
//! # Ok(())
//! # }
//! ```

use tracing::{debug, trace, warn};
use web_time::Instant;

use crate::diagnostics::{RecomputeDiagnostics, StageRun, Trigger};
use crate::filter::{Filter, StageSlot};
use crate::keystone::Keystone;
use crate::policy::{self, NO_SELECTION, RecomputePlan};
use crate::rotate::Rotation;
use crate::types::{ChainConfig, ChainError, FilterParams, RecomputeMode, RgbaImage};

/// Name reported for stage 0.
pub const SOURCE_NAME: &str = "source";

/// An ordered chain of filter stages over one source image.
///
/// The chain length is fixed at construction. All operations are
/// synchronous and run to completion before returning.
#[derive(Debug)]
pub struct FilterChain {
    source: Option<RgbaImage>,
    /// Transform stages; stage `i` lives at `stages[i - 1]`.
    stages: Vec<StageSlot>,
    active: isize,
    previous_active: isize,
    mode: RecomputeMode,
    last: Option<RecomputeDiagnostics>,
}

impl FilterChain {
    /// Build a chain from transform filters, in order.
    ///
    /// The source stage is added implicitly, so the chain has
    /// `filters.len() + 1` stages.
    #[must_use]
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self {
            source: None,
            stages: filters.into_iter().map(StageSlot::new).collect(),
            active: NO_SELECTION,
            previous_active: NO_SELECTION,
            mode: RecomputeMode::default(),
            last: None,
        }
    }

    /// Build a chain from a [`ChainConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Params`] naming the first stage whose
    /// parameters fail validation.
    pub fn from_config(config: &ChainConfig) -> Result<Self, ChainError> {
        let filters = config
            .stages
            .iter()
            .enumerate()
            .map(|(i, params)| {
                params
                    .build()
                    .map_err(|source| ChainError::Params { index: i + 1, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(filters).with_mode(config.recompute))
    }

    /// Set the recompute mode.
    #[must_use]
    pub fn with_mode(mut self, mode: RecomputeMode) -> Self {
        self.mode = mode;
        self
    }

    /// The recompute mode.
    #[must_use]
    pub const fn mode(&self) -> RecomputeMode {
        self.mode
    }

    /// Number of stages, including the source stage. Always at least 1.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> usize {
        self.stages.len() + 1
    }

    /// The stage currently selected for display (`-1` = none).
    #[must_use]
    pub const fn active_index(&self) -> isize {
        self.active
    }

    /// The active index as of the last recompute.
    #[must_use]
    pub const fn previous_active(&self) -> isize {
        self.previous_active
    }

    /// Name of stage `index`, or `None` if out of range.
    #[must_use]
    pub fn stage_name(&self, index: usize) -> Option<&str> {
        match index {
            0 => Some(SOURCE_NAME),
            i => self.stages.get(i - 1).map(StageSlot::name),
        }
    }

    /// Names of all stages, in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        std::iter::once(SOURCE_NAME)
            .chain(self.stages.iter().map(StageSlot::name))
            .collect()
    }

    /// Parameters of stage `index`, if it is a transform stage exposing
    /// them.
    #[must_use]
    pub fn params(&self, index: usize) -> Option<FilterParams> {
        self.slot(index).and_then(|s| s.filter().params())
    }

    /// Mutable access to the filter of transform stage `index`.
    ///
    /// Editing a filter in place does not recompute anything; follow up
    /// with [`rerun_from(index)`](Self::rerun_from) so downstream outputs
    /// are re-derived.
    pub fn filter_mut(&mut self, index: usize) -> Option<&mut dyn Filter> {
        let slot = index.checked_sub(1).and_then(|i| self.stages.get_mut(i))?;
        Some(slot.filter_mut())
    }

    /// Diagnostics from the most recent recompute.
    #[must_use]
    pub const fn last_recompute(&self) -> Option<&RecomputeDiagnostics> {
        self.last.as_ref()
    }

    /// The cached output of stage `index`, without recomputation.
    ///
    /// Stage 0's output is the source image. Negative or out-of-range
    /// indices, and stages that have not been computed, return `None`.
    #[must_use]
    pub fn stage_output(&self, index: isize) -> Option<&RgbaImage> {
        match usize::try_from(index).ok()? {
            0 => self.source.as_ref(),
            i => self.slot(i)?.cached(),
        }
    }

    /// The output cached at the active index, without recomputation.
    #[must_use]
    pub fn active_output(&self) -> Option<&RgbaImage> {
        self.stage_output(self.active)
    }

    /// Replace the source image and recompute stages `1..=active`.
    ///
    /// Every transform stage's cache is dropped first; stages past the
    /// active one are recomputed lazily when selected.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Stage`] if a stage fails while recomputing.
    pub fn set_source(&mut self, image: RgbaImage) -> Result<(), ChainError> {
        debug!(
            width = image.width(),
            height = image.height(),
            "new source image"
        );
        self.source = Some(image);
        for slot in &mut self.stages {
            slot.invalidate();
        }
        let plan = policy::plan(0, self.active, self.len());
        self.execute(Trigger::Source, plan)
    }

    /// Make `index` the active stage and return its output.
    ///
    /// `index` is clamped into `[-1, len - 1]`. Forward or repeated
    /// selection re-runs `[max(previous, 1), index]`; backward selection
    /// runs nothing and returns the cached output. Nothing is returned
    /// for stage 0 or `-1`; the source stays reachable through
    /// [`active_output`](Self::active_output) and
    /// [`stage_output(0)`](Self::stage_output).
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Stage`] if a stage fails while recomputing.
    /// The active index still moves to `index`.
    pub fn select_stage(&mut self, index: isize) -> Result<Option<&RgbaImage>, ChainError> {
        let requested = policy::clamp_index(index, self.len());
        let previous = self.previous_active;
        let plan = policy::plan(previous, requested, self.len());

        self.active = requested;
        self.previous_active = requested;
        self.execute(
            Trigger::Select {
                previous,
                requested,
            },
            plan,
        )?;
        if requested <= 0 {
            return Ok(None);
        }
        Ok(self.stage_output(requested))
    }

    /// Re-derive stages `[max(from, 1), active]` after stage `from`
    /// changed outside the chain (e.g. its parameters were edited via
    /// [`filter_mut`](Self::filter_mut)).
    ///
    /// Stage `from` and everything downstream are invalidated. Nothing
    /// runs when `from` is past the active stage.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Stage`] if a stage fails while recomputing.
    pub fn rerun_from(&mut self, from: usize) -> Result<(), ChainError> {
        for slot in self.stages.iter_mut().skip(from.saturating_sub(1)) {
            slot.invalidate();
        }
        let from_index = isize::try_from(from).unwrap_or(isize::MAX);
        let plan = if from_index > self.active {
            RecomputePlan::Idle
        } else {
            policy::plan(from_index, self.active, self.len())
        };
        self.execute(Trigger::Rerun { from }, plan)
    }

    /// Replace the parameters of transform stage `index` and re-derive
    /// the active output.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NoSuchStage`] if `index` is 0 or out of
    /// range, [`ChainError::Params`] if the filter refuses the
    /// parameters (the old ones are kept), and [`ChainError::Stage`] if
    /// a stage fails while recomputing.
    pub fn set_stage_params(
        &mut self,
        index: usize,
        params: &FilterParams,
    ) -> Result<(), ChainError> {
        let len = self.len();
        let filter = self
            .filter_mut(index)
            .ok_or(ChainError::NoSuchStage { index, len })?;
        filter
            .set_params(params)
            .map_err(|source| ChainError::Params { index, source })?;
        debug!(stage = index, ?params, "stage parameters changed");
        self.rerun_from(index)
    }

    fn slot(&self, index: usize) -> Option<&StageSlot> {
        index.checked_sub(1).and_then(|i| self.stages.get(i))
    }

    /// Run `plan` and record diagnostics.
    fn execute(&mut self, trigger: Trigger, plan: RecomputePlan) -> Result<(), ChainError> {
        trace!(?trigger, ?plan, "recompute plan");
        let started = Instant::now();
        let mut diagnostics = RecomputeDiagnostics::new(trigger, plan);

        let result = self.run_range(plan, &mut diagnostics);

        diagnostics.total_duration = started.elapsed();
        self.last = Some(diagnostics);
        result
    }

    fn run_range(
        &mut self,
        plan: RecomputePlan,
        diagnostics: &mut RecomputeDiagnostics,
    ) -> Result<(), ChainError> {
        let stages = plan.stages_to_run();
        if stages.is_empty() {
            return Ok(());
        }
        if self.source.is_none() {
            debug!("no source image yet, nothing to recompute");
            return Ok(());
        }

        let from = self.first_runnable(*stages.start());
        // A stage whose upstream re-ran in this pass must re-run too.
        let mut upstream_changed = false;

        for index in from..=*stages.end() {
            if self.mode == RecomputeMode::Dirty
                && !upstream_changed
                && self.stages[index - 1].is_valid()
            {
                trace!(stage = index, "cache valid, skipping");
                diagnostics.skipped.push(index);
                continue;
            }

            let input = match index {
                1 => self.source.clone(),
                i => self.stages[i - 2].cached().cloned(),
            };
            let Some(input) = input else {
                // first_runnable guarantees the upstream output exists.
                warn!(stage = index, "upstream output missing, stopping");
                break;
            };

            let slot = &mut self.stages[index - 1];
            debug!(stage = index, name = slot.name(), "recomputing");
            let stage_started = Instant::now();
            slot.set_input(input);
            let (width, height) = match slot.output() {
                Ok(Some(output)) => output.dimensions(),
                Ok(None) => break,
                Err(source) => {
                    let name = slot.name().to_string();
                    warn!(stage = index, %name, %source, "stage failed");
                    self.fail_at(index);
                    return Err(ChainError::Stage {
                        index,
                        name,
                        source,
                    });
                }
            };
            diagnostics.runs.push(StageRun {
                index,
                name: slot.name().to_string(),
                duration: stage_started.elapsed(),
                width,
                height,
            });
            upstream_changed = true;
        }
        Ok(())
    }

    /// Lower `from` until the stage feeding it has a valid output.
    ///
    /// The chain invariant normally holds for every stage before the
    /// previously active one, so this is a no-op unless a cache was
    /// dropped out from under a planned range.
    fn first_runnable(&self, from: usize) -> usize {
        let mut start = from.max(1);
        while start > 1 && !self.stages[start - 2].is_valid() {
            start -= 1;
        }
        if start != from {
            debug!(planned = from, actual = start, "widened recompute range");
        }
        start
    }

    /// After stage `index` failed: drop every cache from `index` on and
    /// restart the next recompute there.
    fn fail_at(&mut self, index: usize) {
        for slot in self.stages.iter_mut().skip(index - 1) {
            slot.invalidate();
        }
        let index = isize::try_from(index).unwrap_or(isize::MAX);
        self.previous_active = self.previous_active.min(index);
    }
}

impl Default for FilterChain {
    /// Rotation followed by keystone correction, both identity.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Rotation::default()),
            Box::new(Keystone::default()),
        ])
    }
}
