//! Rotation about the image centre.
//!
//! Scans are rarely perfectly square on the glass; a small rotation
//! straightens the page before perspective correction. Wraps
//! [`imageproc::geometric_transformations::rotate_about_center`] with
//! bilinear interpolation. The output keeps the input dimensions, and
//! corners uncovered by the rotation are filled with [`FILL`].

use image::Rgba;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::types::{FilterError, FilterParams, RgbaImage};

/// Stage name reported by [`Rotation`].
pub const NAME: &str = "rotation";

/// Colour of the area exposed by rotating: opaque white, like paper.
pub const FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Parameters for [`Rotation`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RotationParams {
    /// Clockwise rotation in degrees.
    pub degrees: f32,
}

impl RotationParams {
    /// Check that the angle is usable.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidParams`] for NaN or infinite angles.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.degrees.is_finite() {
            Ok(())
        } else {
            Err(FilterError::InvalidParams(format!(
                "rotation degrees must be finite, got {}",
                self.degrees
            )))
        }
    }
}

/// Rotate an image clockwise by `degrees` about its centre.
///
/// A zero angle returns an exact copy so an untouched stage never
/// introduces interpolation noise.
///
/// # Errors
///
/// Returns [`FilterError::InvalidParams`] if `degrees` is not finite.
pub fn rotate(image: &RgbaImage, degrees: f32) -> Result<RgbaImage, FilterError> {
    RotationParams { degrees }.validate()?;
    if degrees == 0.0 {
        return Ok(image.clone());
    }
    Ok(rotate_about_center(
        image,
        degrees.to_radians(),
        Interpolation::Bilinear,
        FILL,
    ))
}

/// Rotation stage.
#[derive(Debug, Clone, Default)]
pub struct Rotation {
    params: RotationParams,
}

impl Rotation {
    /// Create a rotation stage.
    #[must_use]
    pub const fn new(params: RotationParams) -> Self {
        Self { params }
    }
}

impl Filter for Rotation {
    fn name(&self) -> &str {
        NAME
    }

    fn apply(&self, input: &RgbaImage) -> Result<RgbaImage, FilterError> {
        rotate(input, self.params.degrees)
    }

    fn params(&self) -> Option<FilterParams> {
        Some(FilterParams::Rotation(self.params))
    }

    fn set_params(&mut self, params: &FilterParams) -> Result<(), FilterError> {
        match params {
            FilterParams::Rotation(p) => {
                p.validate()?;
                self.params = *p;
                Ok(())
            }
            other => Err(FilterError::ParamsMismatch {
                expected: NAME.to_string(),
                found: other.filter_name().to_string(),
            }),
        }
    }
}
