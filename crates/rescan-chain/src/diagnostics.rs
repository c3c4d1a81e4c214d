//! Recompute diagnostics: which stages ran, which were skipped, and how
//! long each took.
//!
//! Every recompute performed by [`FilterChain`](crate::FilterChain)
//! leaves a [`RecomputeDiagnostics`] behind, available through
//! [`FilterChain::last_recompute`](crate::FilterChain::last_recompute).
//!
//! Timestamps are captured via the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::RecomputePlan;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// What caused a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A new source image was set.
    Source,
    /// The active stage changed (or was re-selected).
    Select {
        /// Previous active index.
        previous: isize,
        /// Requested index after clamping.
        requested: isize,
    },
    /// An external re-run request starting at `from`.
    Rerun {
        /// First stage named by the request.
        from: usize,
    },
}

/// One executed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRun {
    /// Stage index.
    pub index: usize,
    /// Stage name.
    pub name: String,
    /// Wall-clock duration of the stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
}

/// Diagnostics for a single recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeDiagnostics {
    /// What caused the recompute.
    pub trigger: Trigger,
    /// The plan returned by the policy.
    pub plan: RecomputePlan,
    /// Stages that actually ran, in execution order.
    pub runs: Vec<StageRun>,
    /// Stages in the planned range skipped because their cache was
    /// still valid ([`RecomputeMode::Dirty`](crate::RecomputeMode::Dirty)
    /// only).
    pub skipped: Vec<usize>,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl RecomputeDiagnostics {
    pub(crate) const fn new(trigger: Trigger, plan: RecomputePlan) -> Self {
        Self {
            trigger,
            plan,
            runs: Vec::new(),
            skipped: Vec::new(),
            total_duration: Duration::ZERO,
        }
    }

    /// Indices of the stages that ran, in order.
    #[must_use]
    pub fn ran(&self) -> Vec<usize> {
        self.runs.iter().map(|r| r.index).collect()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Recompute Report\n{}", "=".repeat(60)));
        lines.push(format!("Trigger: {}", describe_trigger(self.trigger)));
        lines.push(format!("Plan: {}", describe_plan(self.plan)));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));

        if self.runs.is_empty() {
            lines.push("No stages recomputed.".to_string());
        } else {
            lines.push(String::new());
            lines.push(format!(
                "{:<6} {:<16} {:>10}  {}",
                "Stage", "Name", "Duration", "Output"
            ));
            lines.push("-".repeat(60));
            for run in &self.runs {
                lines.push(format!(
                    "{:<6} {:<16} {:>8.3}ms  {}x{}",
                    run.index,
                    run.name,
                    duration_ms(run.duration),
                    run.width,
                    run.height,
                ));
            }
        }

        if !self.skipped.is_empty() {
            let skipped: Vec<String> = self.skipped.iter().map(ToString::to_string).collect();
            lines.push(format!("Skipped (cache valid): {}", skipped.join(", ")));
        }

        lines.join("\n")
    }
}

fn describe_trigger(trigger: Trigger) -> String {
    match trigger {
        Trigger::Source => "new source image".to_string(),
        Trigger::Select {
            previous,
            requested,
        } => format!("select {previous} -> {requested}"),
        Trigger::Rerun { from } => format!("re-run from stage {from}"),
    }
}

fn describe_plan(plan: RecomputePlan) -> String {
    match plan {
        RecomputePlan::Idle => "idle".to_string(),
        RecomputePlan::Reuse(target) => format!("reuse cached stage {target}"),
        RecomputePlan::Run { from, to } => format!("run [{from}, {to}]"),
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
