//! rescan-chain: a lazily recomputed linear chain of image filters (sans-IO).
//!
//! A scanned page flows through an ordered chain of stages:
//! source -> rotation -> keystone correction. Each stage consumes the
//! previous stage's output. When the user switches which stage is being
//! viewed, or a new scan arrives, only the minimal contiguous range of
//! stages that may be stale is re-run (see [`policy`]).
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! images. Decoding, encoding and the command-line shell live in the
//! `rescan` crate.

pub mod chain;
pub mod diagnostics;
pub mod filter;
pub mod keystone;
pub mod policy;
pub mod rotate;
pub mod types;

pub use chain::FilterChain;
pub use diagnostics::RecomputeDiagnostics;
pub use filter::{Filter, StageSlot};
pub use keystone::{Corner, Keystone, KeystoneParams};
pub use policy::RecomputePlan;
pub use rotate::{Rotation, RotationParams};
pub use types::{ChainConfig, ChainError, FilterError, FilterParams, RecomputeMode, RgbaImage};

/// Run `source` through every stage of a chain built from `config` and
/// return the last stage's output.
///
/// Convenience for callers that only need the final image and never
/// navigate between stages.
///
/// # Errors
///
/// Returns [`ChainError::Params`] if the config is invalid and
/// [`ChainError::Stage`] if a stage fails.
pub fn process(source: RgbaImage, config: &ChainConfig) -> Result<RgbaImage, ChainError> {
    let mut chain = FilterChain::from_config(config)?;
    chain.set_source(source.clone())?;
    let last = isize::try_from(chain.len() - 1).unwrap_or(isize::MAX);
    Ok(chain.select_stage(last)?.cloned().unwrap_or(source))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    fn page() -> RgbaImage {
        RgbaImage::from_fn(24, 24, |x, y| {
            if x > 6 && x < 18 && y > 6 && y < 18 {
                Rgba([20, 20, 20, 255])
            } else {
                Rgba([250, 250, 250, 255])
            }
        })
    }

    #[test]
    fn default_config_is_identity() {
        let img = page();
        assert_eq!(process(img.clone(), &ChainConfig::default()).unwrap(), img);
    }

    #[test]
    fn empty_chain_returns_source() {
        let img = page();
        let config = ChainConfig {
            stages: vec![],
            ..ChainConfig::default()
        };
        assert_eq!(process(img.clone(), &config).unwrap(), img);
    }

    #[test]
    fn process_matches_manual_composition() {
        let img = page();
        let rotation = RotationParams { degrees: 4.0 };
        let keystone = KeystoneParams {
            corners: [
                Corner::new(0.05, 0.0),
                Corner::new(0.95, 0.02),
                Corner::new(1.0, 1.0),
                Corner::new(0.0, 0.97),
            ],
        };
        let config = ChainConfig {
            stages: vec![
                FilterParams::Rotation(rotation),
                FilterParams::Keystone(keystone),
            ],
            ..ChainConfig::default()
        };
        let expected =
            keystone::correct(&rotate::rotate(&img, 4.0).unwrap(), &keystone).unwrap();
        assert_eq!(process(img, &config).unwrap(), expected);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ChainConfig {
            stages: vec![FilterParams::Rotation(RotationParams {
                degrees: f32::INFINITY,
            })],
            ..ChainConfig::default()
        };
        assert!(matches!(
            process(page(), &config),
            Err(ChainError::Params { index: 1, .. })
        ));
    }
}
