//! Colored point samples of a reconstructed surface.

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudPoint {
    pub position: Vec3,
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<CloudPoint>,
}

impl PointCloud {
    pub fn new(points: Vec<CloudPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
