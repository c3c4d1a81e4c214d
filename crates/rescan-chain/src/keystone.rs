//! Keystone (perspective) correction.
//!
//! A page photographed or scanned at an angle appears as a trapezoid.
//! The user marks the four page corners; this stage maps that
//! quadrilateral back onto the full output rectangle using
//! [`imageproc::geometric_transformations::warp`].
//!
//! Corners are stored as fractions of the input width and height so the
//! same parameters apply to any resolution of the same scan.

use imageproc::geometric_transformations::{Interpolation, Projection, warp};
use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::rotate::FILL;
use crate::types::{FilterError, FilterParams, RgbaImage};

/// Stage name reported by [`Keystone`].
pub const NAME: &str = "keystone";

/// Quads smaller than this (in normalized units) are rejected.
const MIN_AREA: f32 = 1e-4;

/// A corner position as a fraction of image width (`x`) and height (`y`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    /// Horizontal position, `0.0` = left edge, `1.0` = right edge.
    pub x: f32,
    /// Vertical position, `0.0` = top edge, `1.0` = bottom edge.
    pub y: f32,
}

impl Corner {
    /// Create a corner.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Parameters for [`Keystone`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeystoneParams {
    /// Page corners in the input: top-left, top-right, bottom-right,
    /// bottom-left.
    pub corners: [Corner; 4],
}

impl KeystoneParams {
    /// The corners of the whole image: no correction.
    pub const IDENTITY: [Corner; 4] = [
        Corner::new(0.0, 0.0),
        Corner::new(1.0, 0.0),
        Corner::new(1.0, 1.0),
        Corner::new(0.0, 1.0),
    ];

    /// Returns `true` if these parameters leave the image untouched.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.corners == Self::IDENTITY
    }

    /// Check that the corners describe a usable quadrilateral.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidParams`] if any coordinate is not
    /// finite, and [`FilterError::DegenerateQuad`] if the quad has
    /// (nearly) zero area.
    pub fn validate(&self) -> Result<(), FilterError> {
        if let Some(bad) = self
            .corners
            .iter()
            .find(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(FilterError::InvalidParams(format!(
                "keystone corner ({}, {}) is not finite",
                bad.x, bad.y
            )));
        }
        if quad_area(&self.corners) < MIN_AREA {
            return Err(FilterError::DegenerateQuad);
        }
        Ok(())
    }
}

impl Default for KeystoneParams {
    fn default() -> Self {
        Self {
            corners: Self::IDENTITY,
        }
    }
}

/// Absolute area of a quadrilateral via the shoelace formula.
fn quad_area(corners: &[Corner; 4]) -> f32 {
    let mut twice = 0.0_f32;
    for (i, a) in corners.iter().enumerate() {
        let b = corners[(i + 1) % corners.len()];
        twice += a.x.mul_add(b.y, -(b.x * a.y));
    }
    twice.abs() / 2.0
}

/// Map the quadrilateral `corners` of `image` onto the full output
/// rectangle.
///
/// The output has the input's dimensions. Pixels whose pre-image falls
/// outside the input are filled with white.
///
/// # Errors
///
/// Returns [`FilterError::InvalidParams`] or [`FilterError::DegenerateQuad`]
/// when the corners are unusable (see [`KeystoneParams::validate`]).
#[allow(clippy::cast_precision_loss)]
pub fn correct(image: &RgbaImage, params: &KeystoneParams) -> Result<RgbaImage, FilterError> {
    params.validate()?;
    if params.is_identity() {
        return Ok(image.clone());
    }

    let w = image.width() as f32;
    let h = image.height() as f32;
    let from = params.corners.map(|c| (c.x * w, c.y * h));
    let to = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    let projection = Projection::from_control_points(from, to).ok_or(FilterError::DegenerateQuad)?;

    Ok(warp(image, &projection, Interpolation::Bilinear, FILL))
}

/// Keystone correction stage.
#[derive(Debug, Clone, Default)]
pub struct Keystone {
    params: KeystoneParams,
}

impl Keystone {
    /// Create a keystone stage.
    #[must_use]
    pub const fn new(params: KeystoneParams) -> Self {
        Self { params }
    }
}

impl Filter for Keystone {
    fn name(&self) -> &str {
        NAME
    }

    fn apply(&self, input: &RgbaImage) -> Result<RgbaImage, FilterError> {
        correct(input, &self.params)
    }

    fn params(&self) -> Option<FilterParams> {
        Some(FilterParams::Keystone(self.params))
    }

    fn set_params(&mut self, params: &FilterParams) -> Result<(), FilterError> {
        match params {
            FilterParams::Keystone(p) => {
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
