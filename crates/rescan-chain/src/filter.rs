//! The transform-stage contract.
//!
//! This module defines the [`Filter`] trait every transform stage
//! implements and [`StageSlot`], which pairs a filter with the input and
//! cached output images the chain keeps for it.
//!
//! # Slot contract
//!
//! - [`StageSlot::set_input`] stores a new input and drops any cached
//!   output.
//! - [`StageSlot::output`] returns the output for the current input and
//!   parameters, computing it synchronously if the cache is empty. A
//!   "set" followed by a "get" is one recompute; there is no separate
//!   compute call.

use crate::keystone::Keystone;
use crate::rotate::Rotation;
use crate::types::{FilterError, FilterParams, RgbaImage};

/// A single transform stage.
///
/// Implementations must be deterministic: the same input and parameters
/// always produce the same output.
pub trait Filter: Send {
    /// Human-readable stage name (e.g. `"rotation"`).
    fn name(&self) -> &str;

    /// Compute this stage's output from `input` and the current
    /// parameters.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] if the current parameters cannot be
    /// applied to this input.
    fn apply(&self, input: &RgbaImage) -> Result<RgbaImage, FilterError>;

    /// The current parameter set, if this filter exposes one.
    fn params(&self) -> Option<FilterParams> {
        None
    }

    /// Replace the parameter set.
    ///
    /// On error the previous parameters are kept.
    ///
    /// # Errors
    ///
    /// The default implementation refuses every parameter set with
    /// [`FilterError::ParamsMismatch`].
    fn set_params(&mut self, params: &FilterParams) -> Result<(), FilterError> {
        Err(FilterError::ParamsMismatch {
            expected: self.name().to_string(),
            found: params.filter_name().to_string(),
        })
    }
}

impl FilterParams {
    /// Build the filter these parameters describe.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] if the parameters fail validation.
    pub fn build(&self) -> Result<Box<dyn Filter>, FilterError> {
        Ok(match self {
            Self::Rotation(p) => {
                p.validate()?;
                Box::new(Rotation::new(*p))
            }
            Self::Keystone(p) => {
                p.validate()?;
                Box::new(Keystone::new(*p))
            }
        })
    }
}

/// A transform stage together with its input and cached output.
pub struct StageSlot {
    filter: Box<dyn Filter>,
    input: Option<RgbaImage>,
    output: Option<RgbaImage>,
}

impl StageSlot {
    /// Wrap a filter with empty input and output slots.
    #[must_use]
    pub fn new(filter: Box<dyn Filter>) -> Self {
        Self {
            filter,
            input: None,
            output: None,
        }
    }

    /// The wrapped filter's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.filter.name()
    }

    /// The wrapped filter.
    #[must_use]
    pub fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    /// Mutable access to the wrapped filter.
    ///
    /// Does not invalidate the cache; callers that change parameters
    /// must call [`invalidate`](Self::invalidate).
    pub fn filter_mut(&mut self) -> &mut dyn Filter {
        self.filter.as_mut()
    }

    /// Store a new input image and drop the cached output.
    pub fn set_input(&mut self, image: RgbaImage) {
        self.input = Some(image);
        self.output = None;
    }

    /// Drop the cached output, keeping the input.
    pub fn invalidate(&mut self) {
        self.output = None;
    }

    /// Whether a cached output is present.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.output.is_some()
    }

    /// The cached output, without computing anything.
    #[must_use]
    pub const fn cached(&self) -> Option<&RgbaImage> {
        self.output.as_ref()
    }

    /// The output for the current input, computing it if the cache is
    /// empty.
    ///
    /// Returns `Ok(None)` if no input has ever been set.
    ///
    /// # Errors
    ///
    /// Returns the filter's error; the cache stays empty in that case.
    pub fn output(&mut self) -> Result<Option<&RgbaImage>, FilterError> {
        if self.output.is_none()
            && let Some(input) = self.input.as_ref()
        {
            let computed = self.filter.apply(input)?;
            self.output = Some(computed);
        }
        Ok(self.output.as_ref())
    }
}

impl std::fmt::Debug for StageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSlot")
            .field("filter", &self.filter.name())
            .field("input", &self.input.as_ref().map(RgbaImage::dimensions))
            .field("output", &self.output.as_ref().map(RgbaImage::dimensions))
            .finish()
    }
}
