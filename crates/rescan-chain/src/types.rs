//! Shared types for the rescan filter chain.

use serde::{Deserialize, Serialize};

use crate::keystone::KeystoneParams;
use crate::rotate::RotationParams;

/// Re-export `RgbaImage` so downstream crates can hand images to the
/// chain without depending on `image` directly.
pub use image::RgbaImage;

/// Parameter set of one built-in transform stage.
///
/// The chain itself treats parameters as opaque; this enum only exists so
/// a whole chain can be described in a config file and so a stage's
/// parameters can be replaced through [`Filter::set_params`].
///
/// [`Filter::set_params`]: crate::filter::Filter::set_params
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum FilterParams {
    /// Rotation about the image centre.
    Rotation(RotationParams),
    /// Perspective (dekeystoning) correction.
    Keystone(KeystoneParams),
}

impl FilterParams {
    /// Short name of the filter these parameters belong to.
    #[must_use]
    pub const fn filter_name(&self) -> &'static str {
        match self {
            Self::Rotation(_) => crate::rotate::NAME,
            Self::Keystone(_) => crate::keystone::NAME,
        }
    }
}

/// How forward or repeated navigation treats stages whose cache is
/// still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeMode {
    /// Every stage in the planned range re-runs, even if nothing it
    /// depends on changed.
    #[default]
    Always,
    /// Stages in the planned range are skipped while their cache is
    /// still valid and no upstream stage re-ran in the same pass.
    Dirty,
}

/// Configuration for building a [`FilterChain`](crate::FilterChain).
///
/// The source stage is implicit; `stages` lists the transform stages in
/// chain order, so the resulting chain has `stages.len() + 1` stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Transform stages, in order.
    pub stages: Vec<FilterParams>,
    /// Recompute behavior for planned ranges.
    pub recompute: RecomputeMode,
}

impl Default for ChainConfig {
    /// Rotation followed by keystone correction, both as identity
    /// transforms.
    fn default() -> Self {
        Self {
            stages: vec![
                FilterParams::Rotation(RotationParams::default()),
                FilterParams::Keystone(KeystoneParams::default()),
            ],
            recompute: RecomputeMode::default(),
        }
    }
}

/// Errors raised by a single filter.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum FilterError {
    /// A parameter value is out of its valid domain.
    #[error("invalid filter parameters: {0}")]
    InvalidParams(String),

    /// The keystone corners do not define a perspective projection.
    #[error("keystone corners do not form a usable quadrilateral")]
    DegenerateQuad,

    /// Parameters for one filter were handed to another.
    #[error("{found} parameters cannot configure a {expected} filter")]
    ParamsMismatch {
        /// Name of the filter being configured.
        expected: String,
        /// Name of the filter the parameters belong to.
        found: String,
    },
}

/// Errors returned by [`FilterChain`](crate::FilterChain) operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum ChainError {
    /// A stage failed while recomputing its output.
    ///
    /// The offending stage's cache is left empty and the recompute stops,
    /// so no downstream stage consumes a stale image.
    #[error("stage {index} ({name}) failed: {source}")]
    Stage {
        /// Index of the failing stage.
        index: usize,
        /// Name of the failing stage's filter.
        name: String,
        /// The filter's own error.
        source: FilterError,
    },

    /// A parameter edit addressed a stage that has no parameters.
    #[error("no transform stage at index {index} (chain has {len} stages)")]
    NoSuchStage {
        /// The requested index.
        index: usize,
        /// Chain length, including the source stage.
        len: usize,
    },

    /// Parameters could not be applied to the addressed stage.
    #[error("cannot configure stage {index}: {source}")]
    Params {
        /// Index of the stage being configured.
        index: usize,
        /// Why the parameters were refused.
        source: FilterError,
    },
}
