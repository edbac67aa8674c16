//! Depth quality classification ahead of integration.

use crate::config::ReconstructionConfig;
use serde::Serialize;
use voxfuse_data::DepthBuffer;

/// Outcome of [`DepthValidator::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DepthClass {
    Usable,
    /// All valid samples share one value (a sensor placeholder frame)
    Degenerate,
    /// Too few valid samples
    Sparse { valid_fraction: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthValidator {
    pub min_valid_fraction: f32,
    pub depth_max: f32,
    pub degenerate_tolerance: f32,
}

impl DepthValidator {
    pub fn new(config: &ReconstructionConfig) -> Self {
        Self {
            min_valid_fraction: config.depth_valid_min_fraction,
            depth_max: config.depth_max,
            degenerate_tolerance: config.degenerate_tolerance,
        }
    }

    /// A sample is valid when finite, positive and within range.
    #[inline]
    pub fn is_valid(&self, depth: f32) -> bool {
        DepthBuffer::is_valid_sample(depth) && depth <= self.depth_max
    }

    pub fn classify(&self, depth: &DepthBuffer) -> DepthClass {
        let mut valid = 0usize;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &d in depth.as_slice() {
            if self.is_valid(d) {
                valid += 1;
                min = min.min(d);
                max = max.max(d);
            }
        }

        if valid == 0 {
            return DepthClass::Sparse {
                valid_fraction: 0.0,
            };
        }
        if max - min <= self.degenerate_tolerance {
            return DepthClass::Degenerate;
        }

        let valid_fraction = valid as f32 / depth.len() as f32;
        if valid_fraction >= self.min_valid_fraction {
            DepthClass::Usable
        } else {
            DepthClass::Sparse { valid_fraction }
        }
    }
}

impl Default for DepthValidator {
    fn default() -> Self {
        Self::new(&ReconstructionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxfuse_data::INVALID_DEPTH;

    #[test]
    fn test_varied_depth_is_usable() {
        let depth = DepthBuffer::from_fn(8, 8, |x, y| 0.5 + 0.01 * (x + y) as f32);
        assert_eq!(DepthValidator::default().classify(&depth), DepthClass::Usable);
    }

    #[test]
    fn test_constant_depth_is_degenerate() {
        let depth = DepthBuffer::filled(8, 8, 1.25);
        assert_eq!(DepthValidator::default().classify(&depth), DepthClass::Degenerate);
    }

    #[test]
    fn test_degenerate_wins_over_sparse() {
        // a single valid sample is trivially uniform
        let depth = DepthBuffer::from_fn(100, 100, |x, y| if x == 0 && y == 0 { 1.0 } else { 0.0 });
        assert_eq!(DepthValidator::default().classify(&depth), DepthClass::Degenerate);
    }

    #[test]
    fn test_empty_depth_is_sparse() {
        let depth = DepthBuffer::filled(4, 4, INVALID_DEPTH);
        let validator = DepthValidator {
            min_valid_fraction: 0.0,
            ..Default::default()
        };
        assert_eq!(
            validator.classify(&depth),
            DepthClass::Sparse {
                valid_fraction: 0.0
            }
        );
    }

    #[test]
    fn test_below_threshold_is_sparse() {
        // 2 of 100 samples valid and distinct, threshold 5%
        let depth = DepthBuffer::from_fn(10, 10, |x, y| match (x, y) {
            (0, 0) => 1.0,
            (1, 0) => 2.0,
            _ => 0.0,
        });
        let validator = DepthValidator {
            min_valid_fraction: 0.05,
            ..Default::default()
        };
        match validator.classify(&depth) {
            DepthClass::Sparse { valid_fraction } => assert!((valid_fraction - 0.02).abs() < 1e-6),
            other => panic!("expected sparse, got {other:?}"),
        }
    }

    #[test]
    fn test_far_samples_are_invalid() {
        let depth = DepthBuffer::from_fn(4, 4, |x, _| if x == 0 { 1.0 } else { 10.0 });
        // only the x == 0 column is within range, and it is uniform
        assert_eq!(DepthValidator::default().classify(&depth), DepthClass::Degenerate);
    }
}
