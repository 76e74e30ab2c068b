//! Capped buffer of world frame points

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Buffer of points which evicts the oldest whole points once it holds more than its capacity.
#[derive(Debug, Clone)]
pub struct PointCloudBuffer {
    points: VecDeque<[f32; 3]>,

    capacity_points: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PointCloudBuffer {
    pub fn new(capacity_points: usize) -> Self {
        Self {
            points: VecDeque::new(),
            capacity_points,
        }
    }

    /// Append points, evicting the oldest ones if over capacity.
    pub fn extend<I: IntoIterator<Item = [f32; 3]>>(&mut self, points: I) {
        self.points.extend(points);

        if self.points.len() > self.capacity_points {
            let excess = self.points.len() - self.capacity_points;
            self.points.drain(..excess);
        }
    }

    /// Number of points held.
    pub fn len_points(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity_points(&self) -> usize {
        self.capacity_points
    }

    /// Iterate over the points, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &[f32; 3]> {
        self.points.iter()
    }

    /// The points as a flat `[x0, y0, z0, x1, ...]` array, oldest first.
    pub fn to_flat(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(self.points.len() * 3);
        for p in self.points.iter() {
            flat.extend_from_slice(p);
        }
        flat
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
